//! GitHub authorization-code flow. GitHub may hide the profile email, so the
//! address list from `/user/emails` is consulted as well.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    oauth::{provider_error, IdentityProvider, OAuthIdentity, ProviderEmail},
    repo_types::AuthMethod,
};
use crate::{config::ProviderCredentials, error::AppError};

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// GitHub answers token errors with 200 and an `error` field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

pub struct GitHubProvider {
    creds: ProviderCredentials,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(creds: ProviderCredentials, redirect_uri: String, http: reqwest::Client) -> Self {
        Self {
            creds,
            redirect_uri,
            http,
        }
    }

    async fn fetch_emails(&self, access_token: &str) -> reqwest::Result<Vec<GitHubEmail>> {
        self.http
            .get(EMAILS_URL)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Address list first, then the public profile email as a last candidate.
fn collect_emails(listed: Vec<GitHubEmail>, profile_email: Option<String>) -> Vec<ProviderEmail> {
    let mut emails: Vec<ProviderEmail> = listed
        .into_iter()
        .map(|e| ProviderEmail {
            email: e.email,
            primary: e.primary,
            verified: e.verified,
        })
        .collect();
    if let Some(email) = profile_email {
        if !emails.iter().any(|e| e.email.eq_ignore_ascii_case(&email)) {
            emails.push(ProviderEmail {
                email,
                primary: false,
                verified: false,
            });
        }
    }
    emails
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    fn kind(&self) -> AuthMethod {
        AuthMethod::Github
    }

    fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url = url::Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.creds.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", "user:email"),
                ("state", state),
            ],
        )?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthIdentity, AppError> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(ACCEPT, "application/json")
            .form(&[
                ("code", code),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| provider_error(AuthMethod::Github, e))?
            .json()
            .await
            .map_err(|e| provider_error(AuthMethod::Github, e))?;

        let access_token = match token.access_token {
            Some(t) => t,
            None => {
                let reason = token
                    .error_description
                    .or(token.error)
                    .unwrap_or_else(|| "no access token".into());
                return Err(provider_error(AuthMethod::Github, reason));
            }
        };

        let user: GitHubUser = self
            .http
            .get(USER_URL)
            .bearer_auth(&access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| provider_error(AuthMethod::Github, e))?
            .json()
            .await
            .map_err(|e| provider_error(AuthMethod::Github, e))?;

        let listed = match self.fetch_emails(&access_token).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, github_id = user.id, "github email list unavailable");
                Vec::new()
            }
        };
        debug!(github_id = user.id, emails = listed.len(), "github profile fetched");

        Ok(OAuthIdentity {
            provider: AuthMethod::Github,
            provider_user_id: user.id.to_string(),
            display_name: user.name,
            login: Some(user.login),
            emails: collect_emails(listed, user.email),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_email_is_appended_once() {
        let listed = vec![GitHubEmail {
            email: "Dev@Example.com".into(),
            primary: true,
            verified: true,
        }];
        let emails = collect_emails(listed, Some("dev@example.com".into()));
        assert_eq!(emails.len(), 1);

        let emails = collect_emails(vec![], Some("public@example.com".into()));
        assert_eq!(
            emails,
            vec![ProviderEmail {
                email: "public@example.com".into(),
                primary: false,
                verified: false,
            }]
        );
    }

    #[test]
    fn email_list_deserializes_with_missing_flags() {
        let list: Vec<GitHubEmail> =
            serde_json::from_str(r#"[{"email":"a@example.com"},{"email":"b@example.com","primary":true,"verified":true}]"#)
                .unwrap();
        assert!(!list[0].primary && !list[0].verified);
        assert!(list[1].primary && list[1].verified);
    }

    #[test]
    fn authorize_url_requests_email_scope() {
        let provider = GitHubProvider::new(
            ProviderCredentials {
                client_id: "gh-id".into(),
                client_secret: "gh-secret".into(),
            },
            "http://localhost:8080/api/login/github/callback".into(),
            reqwest::Client::new(),
        );
        let url = provider.authorize_url("abc").unwrap();
        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("scope=user%3Aemail"));
        assert!(url.contains("state=abc"));
    }
}
