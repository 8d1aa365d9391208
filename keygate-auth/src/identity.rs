//! Weak hash-derived client identity.
//!
//! An identity is a one-way hash of a stable connection tuple: the
//! originating network address and the client-supplied agent string. Two
//! requests from the same pair always yield the same identity; that is the
//! sole basis for binding a credential to "a machine".
//!
//! This is a known weak binding, not a security boundary of cryptographic
//! strength: clients behind the same NAT with the same agent string share
//! an identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex length of a SHA-256 digest.
const IDENTITY_HEX_LEN: usize = 64;

/// A client identity fingerprint: lowercase hex SHA-256.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive an identity from observable connection attributes.
    ///
    /// Deterministic: the same `(remote_addr, user_agent)` pair always
    /// produces the same identity. Fields are length-framed so that
    /// boundary-shifted pairs cannot collide.
    #[must_use]
    pub fn bind(remote_addr: &str, user_agent: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((remote_addr.len() as u32).to_be_bytes());
        hasher.update(remote_addr.as_bytes());
        hasher.update((user_agent.len() as u32).to_be_bytes());
        hasher.update(user_agent.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse an identity from its string form.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` unless the input is exactly
    /// 64 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if s.len() != IDENTITY_HEX_LEN {
            return Err(IdentityError::InvalidFormat);
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(IdentityError::InvalidFormat);
        }
        Ok(Self(s.to_string()))
    }

    /// Get the identity as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ClientIdentity {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison to prevent timing attacks
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for ClientIdentity {}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientIdentity({})", self.0)
    }
}

/// Errors that can occur when handling identities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// The string is not a valid identity fingerprint.
    #[error("invalid identity format")]
    InvalidFormat,
}
