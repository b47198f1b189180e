use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{AuthMethod, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Query string the provider sends back to the callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub auth_method: AuthMethod,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            auth_method: u.auth_method,
        }
    }
}

/// Response returned after register or login; also the cookie payload.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub auth_method: AuthMethod,
    pub is_admin: bool,
}

/// Body of `GET /api/user`.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserInfo,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            user: UserInfo {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
                auth_method: u.auth_method,
                is_admin: u.is_admin,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
