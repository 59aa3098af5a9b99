//! Core types and traits for the Ripple event stream framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the abstractions shared across the Ripple workspace: slot and event
//! type identifiers, the [`EventRecord`] encoding trait, completion
//! handles and the [`JobScheduler`] seam, allocator tags, and
//! configuration errors.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod alloc;
pub mod error;
pub mod id;
pub mod job;
pub mod record;

pub use alloc::Allocator;
pub use error::ConfigError;
pub use id::{CycleId, EventTypeId, SlotId};
pub use job::{completion, Completer, Job, JobHandle, JobOutput, JobScheduler};
pub use record::EventRecord;
