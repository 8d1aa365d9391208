//! Single-use, time-limited credentials.

use keygate_auth::ClientIdentity;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Fixed credential lifetime: 24 hours.
pub const CREDENTIAL_TTL_SECS: i64 = 24 * 60 * 60;

/// A minted access credential.
///
/// The only legal state transition is `unused -> used`, exactly once;
/// `used_at` is set at most once and never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique high-entropy token value.
    pub key: String,
    /// Identity the credential is bound to.
    pub identity: ClientIdentity,
    /// Originating session.
    pub session_id: SessionId,
    /// Issuance time, Unix seconds.
    pub created_at: i64,
    /// Fixed-horizon expiry, Unix seconds.
    pub expires_at: i64,
    /// Set exactly once, on redemption.
    pub used_at: Option<i64>,
}

impl Credential {
    /// Mint a fresh credential for a session, expiring `ttl_secs` from now.
    #[must_use]
    pub fn mint(identity: ClientIdentity, session_id: SessionId, now: i64, ttl_secs: i64) -> Self {
        Self {
            key: generate_key(),
            identity,
            session_id,
            created_at: now,
            expires_at: now + ttl_secs,
            used_at: None,
        }
    }

    /// Whether the credential has passed its expiry horizon.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether the credential has already been redeemed.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

/// Generate a high-entropy key value: 32 random bytes, hex-encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);
    hex::encode(random)
}
