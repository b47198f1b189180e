use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Every failure a request can end with. Converted to a JSON body at the
/// handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("An account with this email already uses another sign-in method")]
    AccountConflict,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Admin privileges required")]
    Forbidden,
    #[error("Session token expired")]
    TokenExpired,
    #[error("Invalid session token")]
    TokenInvalid,
    #[error("Invalid status")]
    InvalidStatus,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("OAuth state mismatch")]
    OAuthState,
    #[error("OAuth provider error: {0}")]
    OAuthProvider(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),
    #[error("Invalid payload")]
    InvalidPayload,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateUsername | AppError::DuplicateEmail | AppError::AccountConflict => {
                StatusCode::CONFLICT
            }
            AppError::InvalidCredentials
            | AppError::Unauthorized
            | AppError::TokenExpired
            | AppError::TokenInvalid => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidStatus
            | AppError::Validation(_)
            | AppError::OAuthState
            | AppError::InvalidPayload
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::OAuthProvider(_) | AppError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            AppError::Transaction(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DuplicateUsername => "duplicate_username",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::AccountConflict => "account_conflict",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::TokenExpired => "token_expired",
            AppError::TokenInvalid => "token_invalid",
            AppError::InvalidStatus => "invalid_status",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::OAuthState => "oauth_state",
            AppError::OAuthProvider(_) => "oauth_provider_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::PaymentProvider(_) => "payment_provider_error",
            AppError::InvalidPayload => "invalid_payload",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            AppError::Transaction(detail) => {
                error!(detail = %detail, "ledger transaction rolled back");
                "Transaction failed".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}
