//! Keygate daemon: the access service and its durable store.
//!
//! Composes the IO-free primitives from `keygate-auth` and the domain
//! model from `keygate-core` into the full credential lifecycle:
//!
//! - [`store::AccessStore`] - SQLite persistence for sessions,
//!   checkpoints, and credentials
//! - [`services::AccessService`] - the transport-agnostic operation
//!   surface (start, gate, confirm, issue, redeem, health)
//! - [`sweep`] - the timer task that garbage-collects expired pending
//!   verifications
//!
//! Transport adapters (HTTP routing, CORS, landing pages) live outside
//! this crate and call the service methods directly.

pub mod config;
pub mod services;
pub mod store;
pub mod sweep;

pub use config::DaemonConfig;
pub use services::AccessService;
pub use store::{AccessStore, StoreError};
