//! Ripple: slot-partitioned event streams for parallel tick pipelines.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Ripple sub-crates. For most users, adding `ripple` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use ripple::prelude::*;
//!
//! let mut registry = EventRegistry::new(RegistryConfig {
//!     stream: StreamConfig::new(3),
//!     worker_count: Some(2),
//!     ..RegistryConfig::default()
//! })
//! .unwrap();
//!
//! // Producer: a worker job appends on its own slot.
//! let writer = registry.create_writer::<u32>().unwrap();
//! let scheduler = Arc::clone(registry.scheduler());
//! let produced = scheduler.schedule(
//!     JobHandle::completed(),
//!     Box::new(move |slot| {
//!         for i in 0..100u32 {
//!             writer.write(slot, i).unwrap();
//!         }
//!     }),
//! );
//! registry.add_producer_handle::<u32>(produced).unwrap();
//!
//! // Consumer: flatten every record once the producer has finished.
//! let (done, output) = registry
//!     .to_list::<u32>(JobHandle::completed(), Allocator::TempJob)
//!     .unwrap();
//! done.wait();
//! let events = output.take().unwrap().unwrap();
//! assert_eq!(events, (0..100).collect::<Vec<_>>());
//!
//! registry.dispose().wait();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ripple-core` | IDs, `EventRecord`, job handles, allocator tags |
//! | [`stream`] | `ripple-stream` | Block pool, `Stream`, writers and readers |
//! | [`engine`] | `ripple-engine` | Registry, consumer ops, worker pool |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`ripple-core`).
///
/// Contains [`types::EventRecord`], [`types::JobHandle`], the
/// [`types::JobScheduler`] seam, and configuration errors.
pub use ripple_core as types;

/// Slot-partitioned block-chained streams (`ripple-stream`).
///
/// [`stream::Stream`] owns the storage; [`stream::Writer`] and
/// [`stream::Reader`] are the views parallel jobs hold.
pub use ripple_stream as stream;

/// Event registry and consumer operations (`ripple-engine`).
///
/// [`engine::EventRegistry`] pairs writers with producer handles and hands
/// readers to consumers; [`engine::consumer`] holds the reader-list
/// algorithms.
pub use ripple_engine as engine;

/// Common imports for typical Ripple usage.
///
/// ```rust
/// use ripple::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use ripple_core::{
        completion, Allocator, EventRecord, JobHandle, JobOutput, JobScheduler, SlotId,
    };

    // Errors
    pub use ripple_core::ConfigError;
    pub use ripple_engine::RegistryError;
    pub use ripple_stream::StreamError;

    // Streams
    pub use ripple_stream::{
        BlockPool, ProtocolChecks, Reader, SlotReader, SlotWriter, Stream, StreamConfig, Writer,
    };

    // Engine
    pub use ripple_engine::{
        EventRegistry, ReaderEntry, RegistryConfig, RegistryMetrics, ReserveCapacity, WorkerPool,
    };
}
