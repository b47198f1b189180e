use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User, UserRow};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, auth_method, is_admin, created_at";

impl User {
    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("select user by id")?;
        row.map(User::try_from).transpose()
    }

    /// Find a user by username.
    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
        .context("select user by username")?;
        row.map(User::try_from).transpose()
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("select user by email")?;
        row.map(User::try_from).transpose()
    }

    /// Insert a user. Unique violations surface as `sqlx::Error` inside the
    /// returned error so callers can classify them.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, auth_method, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.auth_method.as_str())
        .bind(new.is_admin)
        .fetch_one(db)
        .await
        .context("insert user")?;
        User::try_from(row)
    }
}

/// Resolves the user behind a verified session.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
}

pub struct PgUserDirectory(pub PgPool);

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        User::find_by_id(&self.0, id).await
    }
}

/// Name of the unique constraint an insert tripped over, if that is what
/// failed.
pub fn unique_violation(err: &anyhow::Error) -> Option<String> {
    let db_err = err.downcast_ref::<sqlx::Error>()?.as_database_error()?;
    if db_err.is_unique_violation() {
        db_err.constraint().map(str::to_owned)
    } else {
        None
    }
}
