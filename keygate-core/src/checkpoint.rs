//! The closed checkpoint set and its external gate references.
//!
//! Checkpoints are the named tasks a client must complete before a
//! credential can be issued. The set is fixed and unordered: issuance
//! checks presence only, never completion order.

use serde::{Deserialize, Serialize};

/// A checkpoint identifier from the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointId {
    /// First gated external task.
    Task1,
    /// Second gated external task.
    Task2,
}

/// Every checkpoint that must be present before a credential is issued.
///
/// An unordered requirement set: clients may complete them in any order.
pub const REQUIRED_CHECKPOINTS: [CheckpointId; 2] = [CheckpointId::Task1, CheckpointId::Task2];

impl CheckpointId {
    /// The fixed string id used on the wire and in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task1 => "task1",
            Self::Task2 => "task2",
        }
    }

    /// Parse a checkpoint id. Unknown ids are rejected, not created.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task1" => Some(Self::Task1),
            "task2" => Some(Self::Task2),
            _ => None,
        }
    }

    /// The fixed external gate reference for this checkpoint.
    ///
    /// The redirect target is where the client is sent to perform the
    /// external task; the landing pages only present a "task complete,
    /// return to the client" page and carry no state. Reaching them is an
    /// untrusted side-channel signal, never a verified proof.
    #[must_use]
    pub fn gate_reference(self) -> GateReference {
        match self {
            Self::Task1 => GateReference {
                redirect_url: "https://gate.keygate.dev/go/task1",
                landing_paths: ["/gate/task1/done", "/gate/task1/return"],
            },
            Self::Task2 => GateReference {
                redirect_url: "https://gate.keygate.dev/go/task2",
                landing_paths: ["/gate/task2/done", "/gate/task2/return"],
            },
        }
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed externally-facing references for a gated checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateReference {
    /// Redirect target for the external ad-gate task.
    pub redirect_url: &'static str,
    /// The two stateless human-readable landing pages.
    pub landing_paths: [&'static str; 2],
}
