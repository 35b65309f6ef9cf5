//! Webhook signature verification (Standard Webhooks scheme).
//!
//! The signed content is `{webhook-id}.{webhook-timestamp}.{body}`, MACed with
//! HMAC-SHA256 and sent base64-encoded as `v1,<signature>`. The header may carry
//! several space-separated signatures during secret rotation.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

/// Maximum allowed clock difference between sender and receiver.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),
    #[error("Invalid webhook timestamp")]
    InvalidTimestamp,
    #[error("Webhook timestamp outside the allowed tolerance")]
    TimestampOutOfTolerance,
    #[error("No matching webhook signature")]
    NoMatchingSignature,
}

/// Secrets prefixed with `whsec_` are base64; anything else is used as raw bytes.
fn secret_bytes(secret: &str) -> Result<Vec<u8>, SignatureError> {
    match secret.strip_prefix("whsec_") {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::InvalidSecret(e.to_string())),
        None => Ok(secret.as_bytes().to_vec()),
    }
}

/// Compute the base64 signature for a payload.
pub fn sign_webhook(
    secret: &str,
    msg_id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<String, SignatureError> {
    let key = secret_bytes(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;

    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a webhook delivery against `now` (unix seconds).
pub fn verify_webhook(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    signature_header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;

    if (now - timestamp).abs() > DEFAULT_TOLERANCE_SECONDS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let expected = sign_webhook(secret, msg_id, timestamp, body)?;
    let expected_bytes = expected.as_bytes();

    let matched = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .any(|(_, candidate)| {
            let candidate = candidate.as_bytes();
            candidate.len() == expected_bytes.len() && bool::from(candidate.ct_eq(expected_bytes))
        });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::NoMatchingSignature)
    }
}
