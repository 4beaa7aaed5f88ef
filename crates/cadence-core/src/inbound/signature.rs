//! Webhook signature checks

use super::WebhookError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn verify_hmac_hex(key: &[u8], payload: &[&[u8]], signature_hex: &str) -> Result<(), WebhookError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| WebhookError::InvalidSignature)?;
    for part in payload {
        mac.update(part);
    }
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Mailgun: hex HMAC-SHA256 of `timestamp` followed by `token`
pub fn verify_mailgun(
    signing_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
) -> Result<(), WebhookError> {
    verify_hmac_hex(
        signing_key.as_bytes(),
        &[timestamp.as_bytes(), token.as_bytes()],
        signature,
    )
}

/// MailerSend: hex HMAC-SHA256 of the raw request body
pub fn verify_mailersend(secret: &str, body: &[u8], signature: &str) -> Result<(), WebhookError> {
    verify_hmac_hex(secret.as_bytes(), &[body], signature)
}

/// SMTP relay: `Authorization: Bearer <token>`
pub fn verify_bearer(expected: &str, authorization: Option<&str>) -> Result<(), WebhookError> {
    let provided = authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(WebhookError::Unauthorized)?;

    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
