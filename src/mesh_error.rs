//! AgglomError: unified error type for ldu-agglom public APIs
//!
//! Every violation detected here is an invariant breach rather than a transient
//! fault. Callers must treat any `Err` as fatal for the hierarchy being built
//! and must not retry the operation.

use thiserror::Error;

/// Unified error type for agglomeration operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgglomError {
    /// Restriction map has an unassigned entry, a wrong length, or an entry
    /// outside the coarse cell range; or mesh input is otherwise malformed.
    #[error("Inconsistent input: {0}")]
    InconsistentInput(String),

    /// A reconstructed coarse face matches neither orientation of the fine pair.
    #[error(
        "Topology violation: fine face {fine_face} maps to coarse cells \
         ({restricted_owner}, {restricted_neighbour}) but coarse face {coarse_face} \
         is ({coarse_owner}, {coarse_neighbour})"
    )]
    TopologyViolation {
        fine_face: usize,
        restricted_owner: usize,
        restricted_neighbour: usize,
        coarse_face: usize,
        coarse_owner: usize,
        coarse_neighbour: usize,
    },

    /// Coefficient array length does not match the addressing it is grouped by.
    #[error("Size mismatch: expected {expected} entries, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    /// Addressing points outside the coarse structure.
    #[error("Addressing out of bounds: max addressing {max} for coarse size {size}")]
    OutOfBoundsAddressing { max: usize, size: usize },

    /// A gather delivered data inconsistent with what the sender announced.
    #[error("Protocol violation from rank {rank}: {reason}")]
    ProtocolViolation { rank: usize, reason: String },

    /// A receive handle completed without data.
    #[error("Communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },

    /// Level data was requested after it was cleared or before it was built.
    #[error("Level {0} has no agglomeration data")]
    MissingLevel(usize),

    /// The requested side of a mirrored array is stale.
    #[error("Mirrored array `{0}` is out of sync; call upload/download first")]
    DeviceOutOfSync(&'static str),

    /// Data-parallel runtime could not be set up.
    #[error("Device fault: {0}")]
    DeviceFault(String),

    /// No constructor registered for an interface type tag.
    #[error("Unknown interface type `{0}`")]
    UnknownInterfaceType(String),
}

impl AgglomError {
    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        AgglomError::InconsistentInput(msg.into())
    }

    pub(crate) fn protocol(rank: usize, reason: impl Into<String>) -> Self {
        AgglomError::ProtocolViolation {
            rank,
            reason: reason.into(),
        }
    }
}
