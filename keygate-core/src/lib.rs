//! Domain model for the keygate credential lifecycle.
//!
//! A [`session::Session`] is created for a derived client identity,
//! advances through the closed [`checkpoint`] set via tamper-evident tags,
//! and is finally converted into a single-use, expiring
//! [`credential::Credential`]. The [`pending`] table bridges external
//! task-completion events to checkpoint confirmations via short challenge
//! codes.

pub mod checkpoint;
pub mod credential;
pub mod error;
pub mod pending;
pub mod session;

pub use checkpoint::{CheckpointId, GateReference, REQUIRED_CHECKPOINTS};
pub use credential::Credential;
pub use error::AccessError;
pub use pending::{PendingVerification, PendingVerifications};
pub use session::{CheckpointRecord, Session, SessionId};
