use std::{fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use tracing::error;

use super::{github::GitHubProvider, google::GoogleProvider, repo_types::AuthMethod};
use crate::{config::AppConfig, error::AppError};

/// One address reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// Verified profile returned by a provider after the code exchange.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub provider: AuthMethod,
    pub provider_user_id: String,
    pub display_name: Option<String>,
    pub login: Option<String>,
    pub emails: Vec<ProviderEmail>,
}

impl OAuthIdentity {
    pub fn resolved_email(&self) -> String {
        select_email(self.provider, &self.provider_user_id, &self.emails)
    }

    /// Username proposed for a new account.
    pub fn preferred_username(&self) -> String {
        let candidate = self
            .display_name
            .as_deref()
            .or(self.login.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match (candidate, self.provider) {
            (Some(name), _) => name.to_string(),
            (None, AuthMethod::Github) => "GitHub User".to_string(),
            (None, _) => self.resolved_email(),
        }
    }
}

/// Pick the account email: primary+verified, then any verified, then the
/// first listed, then a placeholder derived from the provider user id.
pub fn select_email(provider: AuthMethod, provider_user_id: &str, emails: &[ProviderEmail]) -> String {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .or_else(|| emails.first())
        .map(|e| e.email.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("{provider}_{provider_user_id}@placeholder.com"))
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> AuthMethod;
    /// Provider page the browser is sent to.
    fn authorize_url(&self, state: &str) -> anyhow::Result<String>;
    /// Trade the callback code for the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<OAuthIdentity, AppError>;
}

/// Configured providers. A provider without credentials is absent.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    google: Option<Arc<dyn IdentityProvider>>,
    github: Option<Arc<dyn IdentityProvider>>,
}

impl OAuthProviders {
    pub fn new(
        google: Option<Arc<dyn IdentityProvider>>,
        github: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self { google, github }
    }

    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Self {
        let google = config.oauth.google.clone().map(|creds| {
            Arc::new(GoogleProvider::new(
                creds,
                redirect_uri(&config.public_base_url, AuthMethod::Google),
                http.clone(),
            )) as Arc<dyn IdentityProvider>
        });
        let github = config.oauth.github.clone().map(|creds| {
            Arc::new(GitHubProvider::new(
                creds,
                redirect_uri(&config.public_base_url, AuthMethod::Github),
                http.clone(),
            )) as Arc<dyn IdentityProvider>
        });
        Self::new(google, github)
    }

    pub fn get(&self, kind: AuthMethod) -> Option<Arc<dyn IdentityProvider>> {
        match kind {
            AuthMethod::Google => self.google.clone(),
            AuthMethod::Github => self.github.clone(),
            AuthMethod::Local => None,
        }
    }
}

/// Maps the `{provider}` path segment to an OAuth auth method.
pub fn parse_provider(name: &str) -> Option<AuthMethod> {
    match name {
        "google" => Some(AuthMethod::Google),
        "github" => Some(AuthMethod::Github),
        _ => None,
    }
}

pub fn redirect_uri(public_base_url: &str, kind: AuthMethod) -> String {
    format!(
        "{}/api/login/{}/callback",
        public_base_url.trim_end_matches('/'),
        kind
    )
}

/// Random CSRF state for one authorization round trip.
pub fn new_state() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Shared client for outbound provider calls.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub(crate) fn provider_error(provider: AuthMethod, e: impl Display) -> AppError {
    error!(%provider, error = %e, "oauth provider call failed");
    AppError::OAuthProvider(format!("{provider}: {e}"))
}
