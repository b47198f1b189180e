use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};
use tracing::error;

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("hash password: {e}")
        })
}

/// `Ok(false)` on mismatch; `Err` only when `stored` is not a PHC string.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash unparsable");
        anyhow::anyhow!("parse password hash: {e}")
    })?;
    let matched = Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok();
    Ok(matched)
}

/// Hash of a random secret that is never stored or shown anywhere, for
/// accounts that may only sign in through an OAuth provider.
pub fn unusable_password_hash() -> anyhow::Result<String> {
    let mut secret = [0u8; 24];
    OsRng.fill_bytes(&mut secret);
    hash_password(&hex::encode(secret))
}
