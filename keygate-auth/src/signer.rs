//! Tamper-evident tags over session state.
//!
//! A tag is a keyed MAC (HMAC-SHA256) over a canonical serialization of a
//! small structured record. The secret is generated once at process start
//! and never persisted or rotated within a run, so tags are only valid
//! against the process that minted them.
//!
//! Two tag scopes exist and are deliberately kept distinct: they cover
//! different field sets and authorize different operations. A tag from one
//! scope never verifies in the other.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation prefix for session-scope tags.
///
/// Covers `{session_id, identity, created_at}` and authorizes gate
/// requests on the code-verified checkpoint path.
const SESSION_SCOPE_PREFIX: &[u8] = b"KEYGATE-SESSION-v1:";

/// Domain separation prefix for grant-scope tags.
///
/// Covers `{session_id, identity}` and authorizes direct checkpoint
/// confirmation and credential issuance.
const GRANT_SCOPE_PREFIX: &[u8] = b"KEYGATE-GRANT-v1:";

/// A hex-encoded tag as handed to and presented by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    fn from_mac(mac: [u8; 32]) -> Self {
        Self(hex::encode(mac))
    }

    /// Get the tag as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison to prevent timing attacks
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for Tag {}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signs and verifies tags with a process-lifetime secret.
///
/// Verification failure is a boolean result, never an error: callers
/// translate it into an authorization failure.
pub struct TagSigner {
    secret: [u8; 32],
}

impl TagSigner {
    /// Create a signer with a fresh random secret.
    ///
    /// Called once at process start; all tags minted by this process are
    /// bound to this secret.
    #[must_use]
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self { secret }
    }

    /// Sign the session scope: `{session_id, identity, created_at}`.
    #[must_use]
    pub fn sign_session(&self, session_id: &str, identity: &str, created_at: i64) -> Tag {
        let payload = canonical_payload(
            SESSION_SCOPE_PREFIX,
            &[
                session_id.as_bytes(),
                identity.as_bytes(),
                &created_at.to_be_bytes(),
            ],
        );
        Tag::from_mac(self.mac(&payload))
    }

    /// Verify a presented tag against the session scope.
    #[must_use]
    pub fn verify_session(
        &self,
        session_id: &str,
        identity: &str,
        created_at: i64,
        presented: &str,
    ) -> bool {
        let expected = self.sign_session(session_id, identity, created_at);
        constant_time_tag_eq(&expected, presented)
    }

    /// Sign the grant scope: `{session_id, identity}`.
    #[must_use]
    pub fn sign_grant(&self, session_id: &str, identity: &str) -> Tag {
        let payload = canonical_payload(
            GRANT_SCOPE_PREFIX,
            &[session_id.as_bytes(), identity.as_bytes()],
        );
        Tag::from_mac(self.mac(&payload))
    }

    /// Verify a presented tag against the grant scope.
    #[must_use]
    pub fn verify_grant(&self, session_id: &str, identity: &str, presented: &str) -> bool {
        let expected = self.sign_grant(session_id, identity);
        constant_time_tag_eq(&expected, presented)
    }

    fn mac(&self, payload: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }
}

impl Default for TagSigner {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the canonical message that gets MACed.
///
/// Format: prefix || (len_be32 || field)*
///
/// Length-prefixing every field keeps the serialization order-stable and
/// unambiguous regardless of field contents; the domain prefix prevents a
/// tag from one scope verifying in another.
fn canonical_payload(prefix: &[u8], fields: &[&[u8]]) -> Vec<u8> {
    let total: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut payload = Vec::with_capacity(prefix.len() + total);
    payload.extend_from_slice(prefix);
    for field in fields {
        payload.extend_from_slice(&(field.len() as u32).to_be_bytes());
        payload.extend_from_slice(field);
    }
    payload
}

/// Compare a computed tag against a client-presented string in constant time.
///
/// Malformed input (wrong length, non-hex) fails verification rather than
/// erroring; a forged tag and a garbled tag are indistinguishable to the
/// caller.
fn constant_time_tag_eq(expected: &Tag, presented: &str) -> bool {
    expected.as_str().as_bytes().ct_eq(presented.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tag_verifies() {
        let signer = TagSigner::new();
        let tag = signer.sign_session("sess-1", "id-a", 1_700_000_000);
        assert!(signer.verify_session("sess-1", "id-a", 1_700_000_000, tag.as_str()));
    }

    #[test]
    fn grant_tag_verifies() {
        let signer = TagSigner::new();
        let tag = signer.sign_grant("sess-1", "id-a");
        assert!(signer.verify_grant("sess-1", "id-a", tag.as_str()));
    }

    #[test]
    fn mutated_session_id_rejected() {
        let signer = TagSigner::new();
        let tag = signer.sign_session("sess-1", "id-a", 1_700_000_000);
        assert!(!signer.verify_session("sess-2", "id-a", 1_700_000_000, tag.as_str()));
    }

    #[test]
    fn mutated_identity_rejected() {
        let signer = TagSigner::new();
        let tag = signer.sign_session("sess-1", "id-a", 1_700_000_000);
        assert!(!signer.verify_session("sess-1", "id-b", 1_700_000_000, tag.as_str()));
    }

    #[test]
    fn mutated_timestamp_rejected() {
        let signer = TagSigner::new();
        let tag = signer.sign_session("sess-1", "id-a", 1_700_000_000);
        assert!(!signer.verify_session("sess-1", "id-a", 1_700_000_001, tag.as_str()));
    }

    #[test]
    fn scopes_are_not_interchangeable() {
        // A grant tag must not authorize the session scope and vice versa,
        // even when the shared fields are identical.
        let signer = TagSigner::new();
        let grant = signer.sign_grant("sess-1", "id-a");
        assert!(!signer.verify_session("sess-1", "id-a", 0, grant.as_str()));

        let session = signer.sign_session("sess-1", "id-a", 0);
        assert!(!signer.verify_grant("sess-1", "id-a", session.as_str()));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        let signer = TagSigner::new();
        let tag = signer.sign_grant("ab", "c");
        assert!(!signer.verify_grant("a", "bc", tag.as_str()));
    }

    #[test]
    fn different_secrets_produce_different_tags() {
        let a = TagSigner::new();
        let b = TagSigner::new();
        let tag = a.sign_grant("sess-1", "id-a");
        assert!(!b.verify_grant("sess-1", "id-a", tag.as_str()));
    }

    #[test]
    fn garbage_presented_tag_rejected() {
        let signer = TagSigner::new();
        assert!(!signer.verify_grant("sess-1", "id-a", "not-hex-at-all"));
        assert!(!signer.verify_grant("sess-1", "id-a", ""));
    }
}
