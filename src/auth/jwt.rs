use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::{Claims, SessionCookieClaims},
        dto::PublicUser,
    },
    config::JwtConfig,
    error::AppError,
    state::AppState,
};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    fn expiry_from(&self, issued_at: OffsetDateTime) -> OffsetDateTime {
        issued_at + TimeDuration::seconds(self.ttl.as_secs() as i64)
    }

    pub(crate) fn sign_at(&self, user_id: Uuid, issued_at: OffsetDateTime) -> anyhow::Result<String> {
        let exp = self.expiry_from(issued_at);
        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Mint a session token for `user_id`, valid for the configured TTL.
    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_at(user_id, OffsetDateTime::now_utc())
    }

    /// Sign the `session_data` cookie payload with the same key and lifetime
    /// as the token inside it.
    pub fn sign_session_cookie(
        &self,
        message: &str,
        token: &str,
        user: &PublicUser,
    ) -> anyhow::Result<String> {
        let exp = self.expiry_from(OffsetDateTime::now_utc());
        let claims = SessionCookieClaims {
            message: message.to_string(),
            token: token.to_string(),
            user: user.clone(),
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn decode_checked<T: DeserializeOwned>(&self, token: &str) -> Result<T, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => {
                    warn!(error = %e, "jwt rejected");
                    AppError::TokenInvalid
                }
            })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let claims: Claims = self.decode_checked(token)?;
        debug!(user_id = %claims.sub, "jwt verified");
        Ok(claims)
    }

    /// Verify the cookie envelope, then the session token it carries.
    pub fn verify_session_cookie(&self, cookie: &str) -> Result<Claims, AppError> {
        let envelope: SessionCookieClaims = self.decode_checked(cookie)?;
        self.verify(&envelope.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::AuthMethod;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60 * 24,
        })
    }

    fn sample_user(id: Uuid) -> PublicUser {
        PublicUser {
            id,
            username: "alice".into(),
            email: "alice@example.com".into(),
            auth_method: AuthMethod::Local,
        }
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(25);
        let token = keys.sign_at(Uuid::new_v4(), issued).expect("sign");
        assert!(matches!(keys.verify(&token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn token_expiring_one_second_ago_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(24) - TimeDuration::seconds(1);
        let token = keys.sign_at(Uuid::new_v4(), issued).expect("sign");
        assert!(matches!(keys.verify(&token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign(Uuid::new_v4()).expect("sign");
        assert!(matches!(bad_keys.verify(&token), Err(AppError::TokenInvalid)));
    }

    #[test]
    fn verify_rejects_foreign_signature_and_garbage() {
        let keys = make_keys("secret-a", "iss", "aud");
        let other = make_keys("secret-b", "iss", "aud");
        let token = other.sign(Uuid::new_v4()).expect("sign");
        assert!(matches!(keys.verify(&token), Err(AppError::TokenInvalid)));
        assert!(matches!(keys.verify("not.a.jwt"), Err(AppError::TokenInvalid)));
    }

    #[test]
    fn session_cookie_carries_a_verifiable_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let cookie = keys
            .sign_session_cookie("Login successful", &token, &sample_user(user_id))
            .expect("sign cookie");
        let claims = keys.verify_session_cookie(&cookie).expect("verify cookie");
        assert_eq!(claims.sub, user_id);
        // the bare token is not a valid cookie envelope
        assert!(keys.verify_session_cookie(&token).is_err());
    }
}
