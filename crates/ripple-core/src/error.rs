//! Configuration errors shared by the stream and engine crates.

use std::error::Error;
use std::fmt;

use crate::alloc::Allocator;

/// Errors detected while validating configuration, before any allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Block size is outside the supported range.
    InvalidBlockSize {
        /// The configured block size in bytes.
        value: usize,
    },
    /// A stream must have at least one slot.
    ZeroSlots,
    /// The per-slot block budget is zero.
    ZeroBlockBudget,
    /// The allocator tag cannot back a buffer that outlives the call.
    DisallowedAllocator {
        /// The rejected tag.
        allocator: Allocator,
        /// The operation that requested the buffer.
        operation: &'static str,
    },
    /// A block pool was built for a different block size than the stream.
    BlockSizeMismatch {
        /// Block size of the stream configuration.
        stream: usize,
        /// Block size of the pool.
        pool: usize,
    },
    /// Fewer slots than worker threads plus the reserved main slot.
    SlotsBelowWorkers {
        /// Configured slot count.
        slots: u32,
        /// Resolved worker count.
        workers: usize,
    },
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBlockSize { value } => {
                write!(f, "block size {value} is outside the supported range")
            }
            Self::ZeroSlots => write!(f, "slot count must be at least 1"),
            Self::ZeroBlockBudget => write!(f, "max_blocks_per_slot must be at least 1"),
            Self::DisallowedAllocator {
                allocator,
                operation,
            } => {
                write!(
                    f,
                    "allocator {allocator} cannot back the output of {operation}: it must outlive the call"
                )
            }
            Self::BlockSizeMismatch { stream, pool } => {
                write!(
                    f,
                    "block pool serves {pool}-byte blocks but the stream uses {stream}-byte blocks"
                )
            }
            Self::SlotsBelowWorkers { slots, workers } => {
                write!(
                    f,
                    "{slots} slots cannot serve {workers} workers plus the main slot"
                )
            }
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}
