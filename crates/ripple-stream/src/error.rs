//! Stream-specific error types.

use std::error::Error;
use std::fmt;

use ripple_core::{ConfigError, SlotId};

/// Errors that can occur during stream operations.
///
/// Every variant except `CapacityExceeded` and `Config` is a protocol
/// violation: a bug in the calling pipeline, never a transient condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// Configuration rejected before any allocation.
    Config(ConfigError),
    /// A single write larger than one block.
    OversizedWrite {
        /// Number of bytes requested.
        requested: usize,
        /// Block size in bytes.
        block_size: usize,
    },
    /// The slot's block budget is exhausted.
    CapacityExceeded {
        /// The slot that ran out of blocks.
        slot: SlotId,
        /// Configured per-slot block budget.
        max_blocks: u32,
    },
    /// Slot index outside `[0, slot_count)`.
    SlotOutOfRange {
        /// The requested slot.
        slot: SlotId,
        /// Number of slots in the stream.
        slot_count: u32,
    },
    /// The slot is claimed by another writer, or by a writer while a
    /// reader tried to begin it.
    SlotBusy {
        /// The contended slot.
        slot: SlotId,
    },
    /// A write was attempted after read-back began.
    Sealed {
        /// The slot that was written.
        slot: SlotId,
    },
    /// The stream handle was disposed before this view was used.
    NotCreated,
    /// The storage behind this view has been released.
    Disposed,
    /// A read past the slot's reported element count.
    ReadPastEnd {
        /// The slot being read.
        slot: SlotId,
        /// The slot's element count.
        count: usize,
    },
    /// A slot pass ended with elements left unread.
    UnreadElements {
        /// The slot being read.
        slot: SlotId,
        /// Elements not yet read.
        remaining: usize,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::OversizedWrite {
                requested,
                block_size,
            } => {
                write!(
                    f,
                    "write of {requested} bytes exceeds the {block_size}-byte block size"
                )
            }
            Self::CapacityExceeded { slot, max_blocks } => {
                write!(f, "slot {slot} exhausted its budget of {max_blocks} blocks")
            }
            Self::SlotOutOfRange { slot, slot_count } => {
                write!(f, "slot {slot} out of range [0, {slot_count})")
            }
            Self::SlotBusy { slot } => write!(f, "slot {slot} is claimed by another view"),
            Self::Sealed { slot } => {
                write!(f, "slot {slot} written after read-back began")
            }
            Self::NotCreated => write!(f, "stream is not created"),
            Self::Disposed => write!(f, "stream storage has been disposed"),
            Self::ReadPastEnd { slot, count } => {
                write!(f, "read past the {count} elements of slot {slot}")
            }
            Self::UnreadElements { slot, remaining } => {
                write!(f, "slot {slot} pass ended with {remaining} elements unread")
            }
        }
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for StreamError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
