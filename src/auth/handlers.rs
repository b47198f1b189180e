use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookies::{
            clear_oauth_state_cookie, clear_session_cookie, oauth_state_cookie, read_cookie,
            session_cookie, OAUTH_STATE_COOKIE_NAME,
        },
        dto::{AuthResponse, LoginRequest, MessageResponse, OAuthCallbackQuery, PublicUser, RegisterRequest, UserResponse},
        extractors::AuthUser,
        jwt::JwtKeys,
        oauth::{new_state, parse_provider, IdentityProvider},
        repo_types::User,
        services,
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
};
use std::sync::Arc;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/:provider", get(oauth_start).post(oauth_start))
        .route("/login/:provider/callback", get(oauth_callback).post(oauth_callback))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/user", get(get_user))
}

/// Token, cookie and body for a freshly authenticated user.
fn issue_session(
    state: &AppState,
    user: &User,
    message: &str,
) -> Result<(AuthResponse, axum::http::HeaderValue), AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let public = PublicUser::from(user);
    let cookie_value = keys.sign_session_cookie(message, &token, &public)?;
    let cookie = session_cookie(&state.config.cookie, &cookie_value, keys.ttl_seconds())
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((
        AuthResponse {
            message: message.to_string(),
            token,
            user: public,
        },
        cookie,
    ))
}

fn provider_for(state: &AppState, name: &str) -> Result<Arc<dyn IdentityProvider>, AppError> {
    parse_provider(name)
        .and_then(|kind| state.oauth.get(kind))
        .ok_or(AppError::NotFound("OAuth provider"))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Response, AppError> {
    let user = services::register(&state.db, payload).await?;
    let (body, cookie) = issue_session(&state, &user, "Registration successful")?;
    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    let user = services::login(&state.db, &payload).await?;
    let (body, cookie) = issue_session(&state, &user, "Login successful")?;
    Ok((StatusCode::OK, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

#[instrument(skip(state))]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, AppError> {
    let provider = provider_for(&state, &provider)?;
    let csrf_state = new_state();
    let url = provider.authorize_url(&csrf_state)?;
    let cookie = oauth_state_cookie(&state.config.cookie, &csrf_state)
        .map_err(|e| AppError::Internal(e.into()))?;
    info!(provider = %provider.kind(), "oauth redirect");
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&url)).into_response())
}

#[instrument(skip(state, headers, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let provider = provider_for(&state, &provider)?;

    if let Some(err) = query.error {
        warn!(provider = %provider.kind(), error = %err, "provider denied authorization");
        return Err(AppError::OAuthProvider(err));
    }
    let expected = read_cookie(&headers, OAUTH_STATE_COOKIE_NAME);
    match (expected.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => {
            warn!(provider = %provider.kind(), "oauth state mismatch");
            return Err(AppError::OAuthState);
        }
    }
    let code = query
        .code
        .ok_or_else(|| AppError::Validation("Missing authorization code".into()))?;

    let identity = provider.exchange_code(&code).await?;
    let user =
        services::login_oauth(&state.db, &identity, state.config.oauth.allow_email_merge).await?;
    let (_, cookie) = issue_session(&state, &user, "Login successful")?;

    let target = format!("{}/login", state.config.frontend_url.trim_end_matches('/'));
    let mut response = Redirect::to(&target).into_response();
    let response_headers = response.headers_mut();
    response_headers.append(SET_COOKIE, cookie);
    response_headers.append(SET_COOKIE, clear_oauth_state_cookie());
    Ok(response)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, AppError> {
    let cookie = clear_session_cookie(&state.config.cookie)
        .map_err(|e| AppError::Internal(e.into()))?;
    info!(user_id = %user.id, "user logged out");
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(MessageResponse {
            message: "Logout successful".into(),
        }),
    )
        .into_response())
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_user(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_session_verifies_and_matches_user() {
        let state = AppState::fake();
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: "dave".into(),
            email: "dave@example.com".into(),
            password_hash: String::new(),
            auth_method: crate::auth::repo_types::AuthMethod::Local,
            is_admin: false,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let (body, cookie) = issue_session(&state, &user, "Login successful").unwrap();
        let claims = JwtKeys::from_ref(&state).verify(&body.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(body.user.username, "dave");
        assert!(cookie.to_str().unwrap().starts_with("session_data="));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user"]["auth_method"], "local");
        assert!(json["user"].get("is_admin").is_none());
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let state = AppState::fake();
        assert!(matches!(provider_for(&state, "facebook"), Err(AppError::NotFound(_))));
        assert!(provider_for(&state, "github").is_ok());
    }
}
