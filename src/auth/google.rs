//! Google authorization-code flow over plain HTTPS calls.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    oauth::{provider_error, IdentityProvider, OAuthIdentity, ProviderEmail},
    repo_types::AuthMethod,
};
use crate::{config::ProviderCredentials, error::AppError};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OpenID Connect userinfo.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

pub struct GoogleProvider {
    creds: ProviderCredentials,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(creds: ProviderCredentials, redirect_uri: String, http: reqwest::Client) -> Self {
        Self {
            creds,
            redirect_uri,
            http,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> AuthMethod {
        AuthMethod::Google
    }

    fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url = url::Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.creds.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthIdentity, AppError> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| provider_error(AuthMethod::Google, e))?
            .json()
            .await
            .map_err(|e| provider_error(AuthMethod::Google, e))?;

        let user: GoogleUser = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| provider_error(AuthMethod::Google, e))?
            .json()
            .await
            .map_err(|e| provider_error(AuthMethod::Google, e))?;

        debug!(sub = %user.sub, "google profile fetched");
        let emails = user
            .email
            .into_iter()
            .map(|email| ProviderEmail {
                email,
                primary: true,
                verified: user.email_verified,
            })
            .collect();

        Ok(OAuthIdentity {
            provider: AuthMethod::Google,
            provider_user_id: user.sub,
            display_name: user.name,
            login: None,
            emails,
        })
    }
}
