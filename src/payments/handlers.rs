use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::{
    gateway::CheckoutRequest,
    webhook::{self, SIGNATURE_HEADER},
};
use crate::{
    auth::extractors::AuthUser, error::AppError, extract::ApiJson, orders::dto::LineItem,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/webhook", post(handle_webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

/// Storefront pages the processor sends the buyer back to.
pub(crate) fn default_return_urls(frontend_url: &str) -> (String, String) {
    let base = frontend_url.trim_end_matches('/');
    (
        format!("{base}/sklep?success=true"),
        format!("{base}/sklep?canceled=true"),
    )
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    if payload.line_items.is_empty() {
        return Err(AppError::Validation("lineItems must not be empty".into()));
    }
    let (default_success, default_cancel) = default_return_urls(&state.config.frontend_url);
    let session = state
        .payments
        .create_checkout_session(CheckoutRequest {
            line_items: payload.line_items,
            success_url: payload.success_url.unwrap_or(default_success),
            cancel_url: payload.cancel_url.unwrap_or(default_cancel),
            customer_email: user.email,
            user_id: user.id,
        })
        .await?;
    Ok(Json(CheckoutSessionResponse { url: session.url }))
}

#[instrument(skip_all, fields(len = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let stripe = &state.config.stripe;
    if let Err(e) = webhook::verify_signature(
        &body,
        signature,
        &stripe.webhook_secret,
        stripe.webhook_tolerance_secs,
        OffsetDateTime::now_utc().unix_timestamp(),
    ) {
        warn!("webhook signature rejected");
        return Err(e);
    }
    let event = webhook::parse_event(&body)?;
    Ok(Json(webhook::handle_event(&event)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_urls_default_to_shop_page() {
        let (ok, cancel) = default_return_urls("http://localhost:5173/");
        assert_eq!(ok, "http://localhost:5173/sklep?success=true");
        assert_eq!(cancel, "http://localhost:5173/sklep?canceled=true");
    }

    #[test]
    fn checkout_body_uses_camel_case() {
        let req: CheckoutSessionRequest = serde_json::from_str(
            r#"{"lineItems":[{"price_data":{"unit_amount":100}}],"successUrl":"http://x/ok"}"#,
        )
        .unwrap();
        assert_eq!(req.line_items.len(), 1);
        assert_eq!(req.success_url.as_deref(), Some("http://x/ok"));
        assert!(req.cancel_url.is_none());
    }
}
