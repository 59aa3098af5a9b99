//! Event registry and producer/consumer orchestration for Ripple.
//!
//! The [`EventRegistry`] keeps one entry per event type: the streams
//! written since the last drain, the writer/handle pairing counters and the
//! combined completion handles. It hands out [`Writer`](ripple_stream::Writer)
//! views to producers and reader lists to consumers, chaining handles so
//! consumers never observe a partially written stream.
//!
//! [`WorkerPool`] is a small crossbeam-backed [`JobScheduler`](ripple_core::JobScheduler)
//! so the registry is usable without a host scheduler. The consumer
//! operations in [`consumer`] run either inline over a reader list or as
//! scheduled jobs through the registry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod registry;

pub use config::RegistryConfig;
pub use consumer::ReserveCapacity;
pub use error::RegistryError;
pub use metrics::RegistryMetrics;
pub use pool::WorkerPool;
pub use registry::{EventRegistry, ReaderEntry};
