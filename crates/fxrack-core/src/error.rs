//! Error types for rack control operations
//!
//! All of these are control-path errors: they are reported synchronously
//! to the caller and never surface into the audio path.

use thiserror::Error;

/// Errors that can occur while mutating the rack from the control path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RackError {
    /// Adding an effect slot beyond the configured maximum
    #[error("Chain slot {chain_slot} is at its maximum of {max} effect slots")]
    SlotCapacity { chain_slot: usize, max: usize },

    /// Indexing a non-existent effect slot
    #[error("Effect slot index {index} out of bounds (chain slot has {len})")]
    SlotIndexOutOfBounds { index: usize, len: usize },

    /// Indexing a non-existent chain slot
    #[error("Chain slot index {index} out of bounds (rack has {len})")]
    ChainSlotIndexOutOfBounds { index: usize, len: usize },

    /// The command queue to the audio path is full
    ///
    /// The mutation was not applied; retry after the audio path has had a
    /// chance to drain the queue.
    #[error("Control command queue is full; mutation dropped")]
    ControlQueueFull,

    /// A named control binding does not exist
    #[error("Unknown control {group}.{key}")]
    UnknownControl { group: String, key: String },
}

/// Result type for rack control operations
pub type RackResult<T> = Result<T, RackError>;
