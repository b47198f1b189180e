use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AdminTransactionView, CreateOfflinePaymentRequest, OfflinePaymentResponse,
        TransactionList, TransactionView, UpdateStatusRequest, UpdateStatusResponse,
    },
    services,
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/create-offline-payment", post(create_offline_payment))
        .route("/transactions", get(list_transactions))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/transactions", get(list_all_transactions))
        .route("/admin/transactions/:id", put(update_status))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_offline_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<CreateOfflinePaymentRequest>,
) -> Result<(StatusCode, Json<OfflinePaymentResponse>), AppError> {
    let created = services::create_offline_transaction(
        &state.db,
        &state.config.bank,
        user.id,
        &payload.line_items,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<TransactionList<TransactionView>>, AppError> {
    let transactions = services::list_user_transactions(&state.db, user.id).await?;
    Ok(Json(TransactionList { transactions }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_all_transactions(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<TransactionList<AdminTransactionView>>, AppError> {
    let transactions = services::list_all_transactions(&state.db).await?;
    Ok(Json(TransactionList { transactions }))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    let updated = services::update_transaction_status(&state.db, id, &payload.status).await?;
    Ok(Json(updated))
}
