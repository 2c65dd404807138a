use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verify the GitHub webhook HMAC-SHA256 signature.
///
/// GitHub sends the signature in the `X-Hub-Signature-256` header as `sha256=<hex>`.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> Result<()> {
    let signature_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| AppError::WebhookVerification("Missing sha256= prefix".to_string()))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::WebhookVerification(format!("Invalid hex in signature: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::WebhookVerification(format!("Invalid HMAC key: {e}")))?;
    mac.update(payload);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::WebhookVerification("Signature mismatch".to_string()))
}

/// Check a delivery against the configured secret.
///
/// Without a secret every delivery is accepted; with one, the header is mandatory.
pub fn verify_delivery(
    secret: Option<&str>,
    payload: &[u8],
    signature_header: Option<&str>,
) -> Result<()> {
    match (secret, signature_header) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(AppError::WebhookVerification(
            "Missing X-Hub-Signature-256 header".to_string(),
        )),
        (Some(secret), Some(header)) => verify_signature(secret, payload, header),
    }
}

/// Header value GitHub would send for `payload`.
#[cfg(test)]
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const PAYLOAD: &[u8] = b"hello world";

    #[test]
    fn test_valid_signature() {
        assert!(verify_signature(SECRET, PAYLOAD, &sign(SECRET, PAYLOAD)).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let header = "sha256=0000000000000000000000000000000000000000000000000000000000000000";
        assert!(verify_signature(SECRET, PAYLOAD, header).is_err());
    }

    #[test]
    fn test_missing_prefix() {
        assert!(verify_signature(SECRET, PAYLOAD, "abcdef1234567890").is_err());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let header = sign(SECRET, PAYLOAD);
        assert!(verify_signature(SECRET, b"hello world!", &header).is_err());
    }

    #[test]
    fn test_delivery_without_secret_is_accepted() {
        assert!(verify_delivery(None, PAYLOAD, None).is_ok());
        assert!(verify_delivery(None, PAYLOAD, Some("garbage")).is_ok());
    }

    #[test]
    fn test_delivery_with_secret_requires_header() {
        assert!(verify_delivery(Some(SECRET), PAYLOAD, None).is_err());
        assert!(verify_delivery(Some(SECRET), PAYLOAD, Some(&sign(SECRET, PAYLOAD))).is_ok());
    }
}
