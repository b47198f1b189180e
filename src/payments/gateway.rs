//! Hosted checkout at the payment processor. Handlers only see the
//! [`PaymentGateway`] trait; [`StripeGateway`] speaks the Stripe REST API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{config::StripeConfig, error::AppError, orders::dto::LineItem};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        req: CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(cfg: &StripeConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            secret_key: cfg.secret_key.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            currency: cfg.currency.clone(),
        }
    }
}

/// Form fields for `POST /v1/checkout/sessions` in bracket notation.
pub(crate) fn checkout_form(req: &CheckoutRequest, default_currency: &str) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
    ];
    for (i, item) in req.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        let currency = item
            .price_data
            .currency
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(default_currency);
        let name = item
            .price_data
            .product_data
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown Product");
        form.push((format!("{prefix}[price_data][currency]"), currency.to_string()));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.price_data.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[price_data][product_data][name]"), name.to_string()));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }
    form.push(("success_url".into(), req.success_url.clone()));
    form.push(("cancel_url".into(), req.cancel_url.clone()));
    form.push(("customer_email".into(), req.customer_email.clone()));
    form.push(("metadata[user_id]".into(), req.user_id.to_string()));
    form.push(("metadata[email]".into(), req.customer_email.clone()));
    form
}

fn processor_error(e: impl std::fmt::Display) -> AppError {
    error!(error = %e, "payment processor call failed");
    AppError::PaymentProvider(e.to_string())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        req: CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        if self.secret_key.is_empty() {
            return Err(processor_error("payment processor is not configured"));
        }
        let form = checkout_form(&req, &self.currency);
        let res = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(processor_error)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("processor returned {status}"));
            return Err(processor_error(message));
        }

        let session: CheckoutSession = res.json().await.map_err(processor_error)?;
        info!(
            session_id = %session.id,
            user_id = %req.user_id,
            items = req.line_items.len(),
            "checkout session created"
        );
        Ok(session)
    }
}
