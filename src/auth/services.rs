use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        oauth::OAuthIdentity,
        password::{hash_password, unusable_password_hash, verify_password},
        repo::unique_violation,
        repo_types::{AuthMethod, NewUser, User},
    },
    config::AdminBootstrap,
    error::AppError,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed username, lower-cased email; rejects malformed input.
pub(crate) fn normalize_registration(mut req: RegisterRequest) -> Result<RegisterRequest, AppError> {
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_lowercase();

    if req.username.is_empty() {
        return Err(AppError::Validation("Username is required".into()));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("Password too short".into()));
    }
    Ok(req)
}

/// Maps a unique-constraint failure to the matching duplicate error.
pub(crate) fn classify_duplicate(constraint: &str) -> Option<AppError> {
    if constraint.contains("username") {
        Some(AppError::DuplicateUsername)
    } else if constraint.contains("email") {
        Some(AppError::DuplicateEmail)
    } else {
        None
    }
}

async fn insert_user(db: &PgPool, new: NewUser<'_>) -> Result<User, AppError> {
    User::create(db, new).await.map_err(|e| {
        match unique_violation(&e).as_deref().and_then(classify_duplicate) {
            Some(dup) => dup,
            None => AppError::Internal(e),
        }
    })
}

/// Create a local account.
pub async fn register(db: &PgPool, req: RegisterRequest) -> Result<User, AppError> {
    let req = normalize_registration(req)?;

    if User::find_by_username(db, &req.username).await?.is_some() {
        warn!(username = %req.username, "username already taken");
        return Err(AppError::DuplicateUsername);
    }
    if User::find_by_email(db, &req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let hash = hash_password(&req.password)?;
    // A concurrent registration can still win between the checks and the
    // insert; the unique constraints decide.
    let user = insert_user(
        db,
        NewUser {
            username: &req.username,
            email: &req.email,
            password_hash: &hash,
            auth_method: AuthMethod::Local,
            is_admin: false,
        },
    )
    .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Checks `plain` against the stored hash. An unparsable hash counts as a
/// mismatch.
pub(crate) fn password_matches(user: &User, plain: &str) -> bool {
    match verify_password(plain, &user.password_hash) {
        Ok(ok) => ok,
        Err(e) => {
            error!(error = %e, user_id = %user.id, "stored password hash unreadable");
            false
        }
    }
}

/// Username + password login.
pub async fn login(db: &PgPool, req: &LoginRequest) -> Result<User, AppError> {
    let username = req.username.trim();
    let Some(user) = User::find_by_username(db, username).await? else {
        warn!(username = %username, "login unknown username");
        return Err(AppError::InvalidCredentials);
    };

    if !password_matches(&user, &req.password) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Whether an OAuth login may reuse `existing`.
pub(crate) fn may_reuse_account(
    existing: &User,
    provider: AuthMethod,
    allow_email_merge: bool,
) -> Result<(), AppError> {
    if existing.auth_method == provider {
        return Ok(());
    }
    if allow_email_merge {
        warn!(
            user_id = %existing.id,
            account_method = %existing.auth_method,
            %provider,
            "oauth login merged into existing account by email"
        );
        Ok(())
    } else {
        warn!(user_id = %existing.id, %provider, "oauth login refused: email belongs to another sign-in method");
        Err(AppError::AccountConflict)
    }
}

fn username_suffix() -> String {
    let mut bytes = [0u8; 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Resolve a provider identity to a user, creating the account on first
/// login.
pub async fn login_oauth(
    db: &PgPool,
    identity: &OAuthIdentity,
    allow_email_merge: bool,
) -> Result<User, AppError> {
    let email = identity.resolved_email();

    if let Some(existing) = User::find_by_email(db, &email).await? {
        may_reuse_account(&existing, identity.provider, allow_email_merge)?;
        info!(user_id = %existing.id, provider = %identity.provider, "oauth login");
        return Ok(existing);
    }

    let hash = unusable_password_hash()?;
    let base = identity.preferred_username();
    let mut username = base.clone();
    for attempt in 0..3 {
        let created = insert_user(
            db,
            NewUser {
                username: &username,
                email: &email,
                password_hash: &hash,
                auth_method: identity.provider,
                is_admin: false,
            },
        )
        .await;
        match created {
            Ok(user) => {
                info!(user_id = %user.id, provider = %identity.provider, "oauth account created");
                return Ok(user);
            }
            Err(AppError::DuplicateUsername) if attempt < 2 => {
                username = format!("{base}_{}", username_suffix());
            }
            Err(AppError::DuplicateEmail) => {
                // Created by a concurrent callback for the same identity.
                let user = User::find_by_email(db, &email)
                    .await?
                    .ok_or(AppError::DuplicateEmail)?;
                may_reuse_account(&user, identity.provider, allow_email_merge)?;
                return Ok(user);
            }
            Err(e) => return Err(e),
        }
    }
    Err(AppError::DuplicateUsername)
}

/// Create the configured admin account unless its email already exists.
pub async fn ensure_admin(db: &PgPool, admin: Option<&AdminBootstrap>) -> anyhow::Result<()> {
    let Some(admin) = admin else {
        info!("admin bootstrap variables not set; skipping");
        return Ok(());
    };
    let email = admin.email.trim().to_lowercase();
    if User::find_by_email(db, &email).await?.is_some() {
        info!(email = %email, "admin account already exists");
        return Ok(());
    }

    let hash = hash_password(&admin.password)?;
    let user = User::create(
        db,
        NewUser {
            username: admin.username.trim(),
            email: &email,
            password_hash: &hash,
            auth_method: AuthMethod::Local,
            is_admin: true,
        },
    )
    .await?;
    info!(user_id = %user.id, username = %user.username, "admin account created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_with(method: AuthMethod, password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: hash_password(password).unwrap(),
            auth_method: method,
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn registration(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spa ce@example.com"));
    }

    #[test]
    fn registration_is_normalized() {
        let req = normalize_registration(registration("  alice ", " Alice@Example.COM ", "longenough"))
            .unwrap();
        assert_eq!(req.username, "alice");
        assert_eq!(req.email, "alice@example.com");
    }

    #[test]
    fn registration_rejects_bad_input() {
        assert!(matches!(
            normalize_registration(registration(" ", "a@b.co", "longenough")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            normalize_registration(registration("bob", "nope", "longenough")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            normalize_registration(registration("bob", "a@b.co", "short")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn unique_constraints_map_to_duplicates() {
        assert!(matches!(
            classify_duplicate("users_username_key"),
            Some(AppError::DuplicateUsername)
        ));
        assert!(matches!(
            classify_duplicate("users_email_key"),
            Some(AppError::DuplicateEmail)
        ));
        assert!(classify_duplicate("users_pkey").is_none());
    }

    #[test]
    fn wrong_password_never_matches() {
        let user = user_with(AuthMethod::Local, "s3cret-password");
        assert!(password_matches(&user, "s3cret-password"));
        for attempt in ["", "s", "s3cret-passwor", "s3cret-password ", "S3CRET-PASSWORD"] {
            assert!(!password_matches(&user, attempt));
        }
    }

    #[test]
    fn corrupt_hash_is_a_mismatch_not_an_error() {
        let mut user = user_with(AuthMethod::Local, "whatever1");
        user.password_hash = "plaintext".into();
        assert!(!password_matches(&user, "plaintext"));
    }

    #[test]
    fn same_provider_account_is_reused() {
        let user = user_with(AuthMethod::Github, "x");
        assert!(may_reuse_account(&user, AuthMethod::Github, false).is_ok());
    }

    #[test]
    fn cross_method_merge_follows_configuration() {
        let local = user_with(AuthMethod::Local, "x");
        assert!(may_reuse_account(&local, AuthMethod::Google, true).is_ok());
        assert!(matches!(
            may_reuse_account(&local, AuthMethod::Google, false),
            Err(AppError::AccountConflict)
        ));
    }
}
