use std::time::Duration;

use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::IdentityError;

type HmacSha256 = Hmac<Sha256>;

/// How far a webhook timestamp may drift from now before the event is
/// rejected, on either side.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Verifies webhook authenticity before the body is ever parsed.
///
/// The signed content is `"{id}.{timestamp}.{body}"`, MACed with
/// HMAC-SHA256. The signature header may carry several space-separated
/// `v1,<base64>` entries (key rotation); any constant-time match accepts.
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance: Duration,
}

impl WebhookVerifier {
    /// Accepts the provider's `whsec_<base64>` form or a raw secret string.
    pub fn new(secret: &SecretString, tolerance: Duration) -> Self {
        let raw = secret.expose_secret();
        let key = raw
            .strip_prefix("whsec_")
            .and_then(|b64| BASE64_STANDARD.decode(b64).ok())
            .unwrap_or_else(|| raw.as_bytes().to_vec());
        Self { key, tolerance }
    }

    pub fn with_default_tolerance(secret: &SecretString) -> Self {
        Self::new(secret, DEFAULT_TOLERANCE)
    }

    /// Verify a raw delivery. Returns `Authenticity` on any failure;
    /// the body must not be parsed unless this succeeds.
    pub fn verify(
        &self,
        message_id: &str,
        timestamp: &str,
        signature_header: &str,
        body: &[u8],
    ) -> Result<(), IdentityError> {
        self.verify_at(message_id, timestamp, signature_header, body, Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        message_id: &str,
        timestamp: &str,
        signature_header: &str,
        body: &[u8],
        now: i64,
    ) -> Result<(), IdentityError> {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| IdentityError::Authenticity("unreadable timestamp".into()))?;

        if (now - ts).unsigned_abs() > self.tolerance.as_secs() {
            return Err(IdentityError::Authenticity(
                "timestamp outside acceptance window".into(),
            ));
        }

        let expected = self.mac(message_id, timestamp, body);

        for entry in signature_header.split_whitespace() {
            let candidate = entry.strip_prefix("v1,").unwrap_or(entry);
            if let Ok(bytes) = BASE64_STANDARD.decode(candidate) {
                if expected.ct_eq(&bytes).into() {
                    return Ok(());
                }
            }
        }

        Err(IdentityError::Authenticity("signature mismatch".into()))
    }

    /// Produce the `v1,<base64>` signature for a delivery. Used by tests
    /// and by outbound tooling that replays events at this service.
    pub fn signature_header(&self, message_id: &str, timestamp: &str, body: &[u8]) -> String {
        format!("v1,{}", BASE64_STANDARD.encode(self.mac(message_id, timestamp, body)))
    }

    fn mac(&self, message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(format!("{message_id}.{timestamp}.").as_bytes());
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}
