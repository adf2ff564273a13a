//! Slack request signing (`X-Slack-Signature`).
//!
//! Slack signs every inbound request with HMAC-SHA256 over
//! `v0:<X-Slack-Request-Timestamp>:<raw body>` using the app's signing secret.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const SIGNATURE_VERSION: &str = "v0";
const MAX_REQUEST_AGE_SECS: i64 = 5 * 60;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {age_secs}s away from now")]
    StaleTimestamp { age_secs: i64 },
    #[error("signature is malformed")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
}

#[derive(Clone, Debug)]
pub struct RequestVerifier {
    signing_secret: SecretString,
}

impl RequestVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    pub fn verify_now(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify(timestamp, signature, body, chrono::Utc::now().timestamp())
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let issued_at = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let age_secs = now - issued_at;
        if age_secs.abs() > MAX_REQUEST_AGE_SECS {
            return Err(SignatureError::StaleTimestamp { age_secs });
        }

        let expected = signature
            .strip_prefix("v0=")
            .and_then(|digest| hex::decode(digest).ok())
            .ok_or(SignatureError::Malformed)?;

        let mac = self.mac(timestamp.trim(), body)?;
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the `X-Slack-Signature` header value for a body.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, body)?;
        Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes())))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}
