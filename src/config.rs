use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Attributes of the `session_data` cookie. Both flags default to off.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub google: Option<ProviderCredentials>,
    pub github: Option<ProviderCredentials>,
    /// Reuse an existing account created with another auth method when the
    /// provider reports the same email.
    pub allow_email_merge: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub currency: String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Static bank transfer instructions handed out with offline payments.
#[derive(Debug, Clone, Deserialize)]
pub struct BankConfig {
    pub account_number: String,
    pub bank_name: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub public_base_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub oauth: OAuthConfig,
    pub stripe: StripeConfig,
    pub admin: Option<AdminBootstrap>,
    pub bank: BankConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "storefront".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "storefront-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let cookie = CookieConfig {
            secure: env_flag("SESSION_COOKIE_SECURE", false),
            http_only: env_flag("SESSION_COOKIE_HTTP_ONLY", false),
        };
        let oauth = OAuthConfig {
            google: provider_credentials("GOOGLE"),
            github: provider_credentials("GITHUB"),
            allow_email_merge: env_flag("OAUTH_ALLOW_EMAIL_MERGE", true),
        };
        let stripe = StripeConfig {
            secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            currency: std::env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "pln".into()),
            webhook_tolerance_secs: 300,
        };
        let admin = match (
            std::env::var("ADMIN_USERNAME"),
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(AdminBootstrap {
                username,
                email,
                password,
            }),
            _ => None,
        };
        let bank = BankConfig {
            account_number: std::env::var("BANK_ACCOUNT_NUMBER")
                .unwrap_or_else(|_| "PL 12 3456 7890 1234 5678 9012 3456".into()),
            bank_name: std::env::var("BANK_NAME").unwrap_or_else(|_| "Example Bank".into()),
            recipient: std::env::var("BANK_RECIPIENT")
                .unwrap_or_else(|_| "Gamer Shop Sp. z o.o.".into()),
        };
        let port = std::env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            frontend_url: std::env::var("FRONTEND_URL")
                .or_else(|_| std::env::var("CLIENT_URL"))
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            jwt,
            cookie,
            oauth,
            stripe,
            admin,
            bank,
        })
    }
}

fn provider_credentials(prefix: &str) -> Option<ProviderCredentials> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    if client_id.is_empty() || client_secret.is_empty() {
        return None;
    }
    Some(ProviderCredentials {
        client_id,
        client_secret,
    })
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
