use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{cookies::{read_cookie, SESSION_COOKIE_NAME}, jwt::JwtKeys, repo_types::User};
use crate::{error::AppError, state::AppState};

/// Where the caller's session came from.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Credential {
    Bearer(String),
    Cookie(String),
}

/// `Authorization: Bearer` wins over the `session_data` cookie.
pub(crate) fn credential(headers: &HeaderMap) -> Result<Option<Credential>, AppError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AppError::Unauthorized)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;
        return Ok(Some(Credential::Bearer(token.to_string())));
    }
    Ok(read_cookie(headers, SESSION_COOKIE_NAME).map(Credential::Cookie))
}

/// Passes only when a session resolved to a live user.
pub fn require_authenticated(user: Option<User>) -> Result<User, AppError> {
    user.ok_or(AppError::Unauthorized)
}

/// Passes only for admins. Evaluated after [`require_authenticated`].
pub fn require_admin(user: User) -> Result<User, AppError> {
    if user.is_admin {
        Ok(user)
    } else {
        warn!(user_id = %user.id, "admin route refused");
        Err(AppError::Forbidden)
    }
}

/// Authenticated caller, loaded from the identity store.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = match credential(&parts.headers)? {
            Some(Credential::Bearer(token)) => keys.verify(&token)?,
            Some(Credential::Cookie(cookie)) => keys.verify_session_cookie(&cookie)?,
            None => return Err(AppError::Unauthorized),
        };

        let user = state.users.find_by_id(claims.sub).await?;
        if user.is_none() {
            warn!(user_id = %claims.sub, "token for unknown user");
        }
        require_authenticated(user).map(AuthUser)
    }
}

/// Authenticated caller with `is_admin` set.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_admin(user).map(AdminUser)
    }
}
