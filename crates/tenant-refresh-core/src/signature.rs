//! # Signature Verification
//!
//! HMAC-SHA256 verification of config-refresh webhooks.
//!
//! Callers send a header of the form `t=<unix-seconds>,v1=<hex-hmac>`. The
//! HMAC is computed over `"<t>.<raw body>"`, binding the timestamp into the
//! signed material so a captured body cannot be replayed under a new
//! timestamp. Several secrets may be valid at once (newest first) so that a
//! new secret can be rolled out before the old one is retired.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Secrets
// ============================================================================

/// Ordered set of currently valid signing secrets, newest first
///
/// Secret buffers are zeroized on drop and never appear in debug output.
#[derive(Clone, Default)]
pub struct SigningSecrets {
    secrets: Vec<Zeroizing<String>>,
}

impl SigningSecrets {
    /// Create from an ordered list, dropping empty entries
    pub fn new(secrets: Vec<String>) -> Self {
        Self {
            secrets: secrets
                .into_iter()
                .map(|s| Zeroizing::new(s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parse the deployment format: a comma-separated list, newest first
    ///
    /// Whitespace around entries is trimmed and empty entries are dropped, so
    /// `""`, `" , "` and an unset variable all yield an empty set.
    pub fn from_comma_separated(value: &str) -> Self {
        Self::new(value.split(',').map(str::to_string).collect())
    }

    /// Number of configured secrets
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// True when no secret is configured
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Iterate secrets in priority order (newest first)
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.secrets.iter().map(|s| s.as_str())
    }
}

impl fmt::Debug for SigningSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecrets")
            .field("count", &self.secrets.len())
            .field("secrets", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Parsed contents of the signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Unix timestamp (seconds) the sender signed at
    pub timestamp: i64,
    /// Hex-encoded HMAC-SHA256
    pub signature: String,
}

/// Reasons a signature header could not be used
///
/// These are internal detail only; callers of the HTTP endpoint see a single
/// undifferentiated authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is missing the '{component}' component")]
    MissingComponent { component: &'static str },

    #[error("Signature timestamp is not an integer")]
    InvalidTimestamp,

    #[error("Secret cannot be used as an HMAC key")]
    InvalidKey,
}

// ============================================================================
// Verifier
// ============================================================================

/// Stateless HMAC-SHA256 signature verifier
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Replay window applied when none is configured
    pub const DEFAULT_MAX_AGE_SECONDS: i64 = 300;

    /// Parse a `t=<timestamp>,v1=<hex>` header
    ///
    /// Pairs are comma-separated and whitespace around them is ignored.
    /// Unknown keys are skipped so new signature schemes can be added by the
    /// sender without breaking older receivers. When a key repeats, the first
    /// occurrence wins.
    ///
    /// # Errors
    ///
    /// - [`SignatureError::MissingComponent`] if `t` or `v1` is absent or empty
    /// - [`SignatureError::InvalidTimestamp`] if `t` is not an integer
    pub fn parse_header(header: &str) -> Result<SignedEnvelope, SignatureError> {
        let mut timestamp = None;
        let mut signature = None;

        for pair in header.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };

            match key.trim() {
                "t" if timestamp.is_none() => timestamp = Some(value.trim()),
                "v1" if signature.is_none() => signature = Some(value.trim()),
                _ => {}
            }
        }

        let timestamp = timestamp
            .filter(|t| !t.is_empty())
            .ok_or(SignatureError::MissingComponent { component: "t" })?;
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingComponent { component: "v1" })?;

        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp)?;

        Ok(SignedEnvelope {
            timestamp,
            signature: signature.to_string(),
        })
    }

    /// Build the canonical signed material `"<timestamp>.<body>"`
    pub fn signed_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
        let prefix = format!("{}.", timestamp);
        let mut payload = Vec::with_capacity(prefix.len() + body.len());
        payload.extend_from_slice(prefix.as_bytes());
        payload.extend_from_slice(body);
        payload
    }

    /// Compute the lowercase hex HMAC-SHA256 of `signed_payload`
    pub fn compute_signature(signed_payload: &[u8], secret: &str) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(signed_payload);

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Produce a complete header value for `body` signed at `timestamp`
    pub fn sign(timestamp: i64, body: &[u8], secret: &str) -> Result<String, SignatureError> {
        let payload = Self::signed_payload(timestamp, body);
        let signature = Self::compute_signature(&payload, secret)?;
        Ok(format!("t={},v1={}", timestamp, signature))
    }

    /// Check `received_hex` against every configured secret, newest first
    ///
    /// Returns `true` on the first matching secret. Each comparison is
    /// constant time over equal-length inputs; a length mismatch rejects the
    /// candidate without comparing bytes.
    pub fn verify(signed_payload: &[u8], received_hex: &str, secrets: &SigningSecrets) -> bool {
        secrets.iter().any(|secret| {
            match Self::compute_signature(signed_payload, secret) {
                Ok(expected) => constant_time_eq(expected.as_bytes(), received_hex.as_bytes()),
                Err(_) => false,
            }
        })
    }

    /// Whether `timestamp` lies within `[now - max_age_seconds, now]`
    ///
    /// Future timestamps are rejected outright. This bounds the replay window
    /// independently of the signature: a correctly signed but stale request
    /// still fails.
    pub fn validate_freshness(timestamp: i64, now: i64, max_age_seconds: i64) -> bool {
        if timestamp > now {
            return false;
        }

        now.saturating_sub(timestamp) <= max_age_seconds
    }
}

/// Length check first (not secret-dependent), then a full constant-time scan
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
