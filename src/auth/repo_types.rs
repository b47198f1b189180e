use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// How an account was created. Fixed for the lifetime of the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Local,
    Google,
    Github,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Local => "local",
            AuthMethod::Google => "google",
            AuthMethod::Github => "github",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthMethod::Local),
            "google" => Ok(AuthMethod::Google),
            "github" => Ok(AuthMethod::Github),
            other => anyhow::bail!("unknown auth method: {other}"),
        }
    }
}

/// Raw `users` row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub auth_method: String,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub auth_method: AuthMethod,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            auth_method: r.auth_method.parse()?,
            is_admin: r.is_admin,
            created_at: r.created_at,
        })
    }
}

/// Fields needed to insert a user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub auth_method: AuthMethod,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_method_parses_stored_values() {
        for m in [AuthMethod::Local, AuthMethod::Google, AuthMethod::Github] {
            assert_eq!(m.as_str().parse::<AuthMethod>().unwrap(), m);
        }
        assert!("facebook".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn user_json_omits_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            auth_method: AuthMethod::Github,
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"auth_method\":\"github\""));
    }
}
