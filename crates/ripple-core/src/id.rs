//! Strongly-typed identifiers for slots, event types and cycles.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a worker slot within an event stream.
///
/// Every parallel job runs on a fixed slot drawn from a bounded pool.
/// `SlotId(0)` is reserved for non-parallel (orchestrating thread) callers;
/// worker threads are assigned `SlotId(1)..`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    /// The slot reserved for the single-threaded caller.
    pub const MAIN: SlotId = SlotId(0);

    /// The slot as an index into a per-slot table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an event type within a registry.
///
/// Equality and hashing use the [`TypeId`] only; the type name is carried
/// for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct EventTypeId {
    id: TypeId,
    name: &'static str,
}

impl EventTypeId {
    /// The identifier for event type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully-qualified type name of the event type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventTypeId {}

impl Hash for EventTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Monotonically increasing produce-then-drain round counter.
///
/// Incremented for an event type each time a writer is created after
/// readers were requested for the previous round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
