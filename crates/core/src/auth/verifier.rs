/// Request signature verification
///
/// A signature is accepted only when the claimed key is the one pinned by
/// the namespace policy, the request timestamp is within the validity
/// window around the verifier clock, and the signature checks out over the
/// operation's canonical message.

use crate::identity::PublicKey;
use crate::policy::Policy;
use dirnet_common::config::auth::{ALGORITHM_ED25519, TIMESTAMP_WINDOW_NANOS};
use dirnet_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Signature material carried by every directory request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Hex encoded public key of the signer
    #[serde(default, alias = "PublicKey")]
    pub public_key: String,

    #[serde(default, alias = "Algorithm")]
    pub algorithm: String,

    /// Hex encoded signature over the canonical message
    #[serde(default, alias = "Signature")]
    pub signature: String,

    /// Unix epoch nanoseconds at signing time
    #[serde(default, alias = "Timestamp")]
    pub timestamp: i64,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.public_key.is_empty() && self.signature.is_empty()
    }
}

/// Canonical message signed for a List request
///
/// The timestamp is truncated to milliseconds.
pub fn list_message(name: &str, timestamp: i64) -> String {
    format!("{}.{}", name, Timestamp::from_nanos(timestamp).as_millis())
}

/// Canonical message signed for an Add or Remove request
pub fn entry_message(name: &str, timestamp: i64, entry: &str) -> String {
    format!("{}.{}.{}", name, timestamp, entry)
}

/// Supported signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl FromStr for SignatureAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(ALGORITHM_ED25519) {
            Ok(Self::Ed25519)
        } else {
            Err(AuthError::BadSignature)
        }
    }
}

/// Verifies request credentials against a namespace policy
#[derive(Debug, Clone, Copy)]
pub struct SignatureVerifier {
    window_nanos: i64,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self {
            window_nanos: TIMESTAMP_WINDOW_NANOS,
        }
    }

    /// Verify against the current wall clock
    pub fn verify(
        &self,
        policy: &Policy,
        credentials: &Credentials,
        message: &str,
    ) -> Result<(), AuthError> {
        self.verify_at(policy, credentials, message, Timestamp::now())
    }

    /// Verify as if the clock read `now`
    pub fn verify_at(
        &self,
        policy: &Policy,
        credentials: &Credentials,
        message: &str,
        now: Timestamp,
    ) -> Result<(), AuthError> {
        if policy.is_unmanaged() {
            return Ok(());
        }

        if credentials.public_key != policy.public_key {
            return Err(AuthError::KeyMismatch);
        }

        let start = Timestamp::from_nanos(now.as_nanos().saturating_sub(self.window_nanos));
        let end = Timestamp::from_nanos(now.as_nanos().saturating_add(self.window_nanos));
        if !Timestamp::from_nanos(credentials.timestamp).is_within(start, end) {
            return Err(AuthError::TimestampOutOfRange);
        }

        // The policy's algorithm is authoritative; a request claiming a
        // different one cannot pass.
        if !credentials.algorithm.is_empty()
            && !credentials.algorithm.eq_ignore_ascii_case(&policy.algorithm)
        {
            debug!(
                "Algorithm {} does not match policy {}",
                credentials.algorithm, policy.algorithm
            );
            return Err(AuthError::BadSignature);
        }

        match policy.algorithm.parse::<SignatureAlgorithm>()? {
            SignatureAlgorithm::Ed25519 => {
                let key = PublicKey::from_hex(&credentials.public_key)
                    .map_err(|_| AuthError::BadSignature)?;
                key.verify_hex(message.as_bytes(), &credentials.signature)
                    .map_err(|_| AuthError::BadSignature)
            }
        }
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Signature verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Public key not allowed for this namespace")]
    KeyMismatch,

    #[error("Timestamp outside of the accepted window")]
    TimestampOutOfRange,

    #[error("Invalid signature")]
    BadSignature,
}
