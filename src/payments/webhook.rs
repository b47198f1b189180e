//! Processor webhook: signature check, event parsing and acknowledgement.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Value,
}

struct SignatureHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<Vec<u8>>,
}

/// `t=<unix>,v1=<hex>[,v1=<hex>...]`. Other schemes are ignored.
fn parse_header(header: &str) -> Option<SignatureHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(hex::decode(value).ok()?),
            _ => {}
        }
    }
    let timestamp = timestamp?;
    if signatures.is_empty() {
        return None;
    }
    Some(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// HMAC-SHA256 over `"<t>.<payload>"`, constant-time compared against every
/// `v1` entry. `now` and `tolerance_secs` are unix seconds.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), AppError> {
    if secret.is_empty() {
        warn!("webhook secret not configured");
        return Err(AppError::InvalidSignature);
    }
    let parsed = header
        .and_then(parse_header)
        .ok_or(AppError::InvalidSignature)?;
    let ts: i64 = parsed
        .timestamp
        .parse()
        .map_err(|_| AppError::InvalidSignature)?;
    if ts.abs_diff(now) > tolerance_secs.unsigned_abs() {
        warn!(timestamp = ts, now, "webhook timestamp outside tolerance");
        return Err(AppError::InvalidSignature);
    }

    let matches = parsed.signatures.iter().any(|sig| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(parsed.timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(sig).is_ok()
    });
    if matches {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, AppError> {
    let text = std::str::from_utf8(payload).map_err(|_| AppError::InvalidPayload)?;
    serde_json::from_str(text).map_err(|_| AppError::InvalidPayload)
}

fn object_str<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

/// Acknowledgement body for a verified event.
pub fn handle_event(event: &WebhookEvent) -> Value {
    let object = &event.data.object;
    let id = object_str(object, "id").unwrap_or_default();
    match event.kind.as_str() {
        "checkout.session.completed" => {
            let user_id = object
                .get("metadata")
                .and_then(|m| object_str(m, "user_id"))
                .unwrap_or_default();
            let payment_status = object_str(object, "payment_status").unwrap_or_default();
            let amount_total = object
                .get("amount_total")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            info!(
                session_id = %id,
                %user_id,
                %payment_status,
                amount = %Decimal::new(amount_total, 2),
                "checkout completed"
            );
            json!({"status": "success", "message": "Payment processed successfully"})
        }
        "checkout.session.async_payment_succeeded" => {
            info!(session_id = %id, "async payment succeeded");
            json!({"status": "success", "message": "Async payment succeeded"})
        }
        "checkout.session.async_payment_failed" => {
            warn!(session_id = %id, "async payment failed");
            json!({"status": "failed", "message": "Async payment failed"})
        }
        "payment_intent.created" => {
            info!(payment_intent = %id, "payment intent created");
            json!({"status": "success", "message": "Payment intent created"})
        }
        "charge.updated" => {
            info!(charge = %id, "charge updated");
            json!({"status": "success", "message": "Charge updated"})
        }
        other => {
            info!(event_type = %other, "unhandled webhook event");
            json!({"status": "received", "type": other})
        }
    }
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
