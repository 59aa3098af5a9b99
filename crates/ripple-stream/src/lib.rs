//! Slot-partitioned, block-chained event streams.
//!
//! A [`Stream`] is an append-only buffer split into a fixed number of
//! worker slots. Each slot owns a chain of fixed-size blocks. Parallel
//! jobs append to their own slot through a [`Writer`]; once every writer
//! has finished, consumers read each slot back in write order through a
//! [`Reader`].
//!
//! # Architecture
//!
//! ```text
//! Stream
//! └── Arc<StreamStorage>  (shared by Writer / Reader views)
//!     ├── SlotCell × slot_count
//!     │   ├── RwLock<SlotRange> → Vec<Block> chain + write cursor
//!     │   └── AtomicUsize element count (lock-free totals)
//!     └── SharedBlockPool  (crossbeam free list, reused across cycles)
//! ```
//!
//! # Phase separation
//!
//! A slot is claimed with a non-blocking `try_write` by at most one
//! writer at a time, so slots never wait on each other. The first reader
//! seals the stream; from then on the slots are read-only. The registry in
//! `ripple-engine` sequences the two phases with completion handles.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod config;
pub mod error;
pub mod large;
pub mod read;
mod range;
pub mod stream;
pub mod write;

pub use block::{BlockPool, PoolStats, SharedBlockPool};
pub use config::{ProtocolChecks, StreamConfig};
pub use error::StreamError;
pub use large::LENGTH_HEADER_SIZE;
pub use read::{Reader, SlotReader};
pub use stream::Stream;
pub use write::{SlotWriter, Writer};
