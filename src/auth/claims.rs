use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dto::PublicUser;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Payload of the `session_data` cookie: the auth response itself, signed
/// with the same key and expiry as the token it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookieClaims {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
