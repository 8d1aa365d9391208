//! Pure authentication primitives for keygate.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! It provides the three building blocks the daemon composes:
//! - [`signer::TagSigner`] - keyed-MAC tags over session state, in two
//!   explicitly named scopes (session and grant)
//! - [`identity::ClientIdentity`] - weak hash-derived client fingerprint
//! - [`challenge`] - short human-entered challenge codes

pub mod challenge;
pub mod identity;
pub mod signer;

pub use challenge::{generate_challenge_code, is_challenge_code, normalize_challenge_code};
pub use identity::{ClientIdentity, IdentityError};
pub use signer::{Tag, TagSigner};
