//! Allocator tags selecting the lifetime policy of a buffer.

use std::fmt;

/// Memory lifetime policy requested for a buffer.
///
/// Ripple does not manage lifetimes itself; the tag records the caller's
/// intent so that operations whose output must outlive the current call
/// can reject a scoped-temporary request up front.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Allocator {
    /// Scoped to the current call. Never valid for stream storage or for
    /// the output of a scheduled job.
    Temp,
    /// Lives until the job that consumes it has completed.
    TempJob,
    /// Lives until explicitly disposed.
    #[default]
    Persistent,
}

impl Allocator {
    /// Whether a buffer with this tag may outlive the call that created it.
    pub fn outlives_call(self) -> bool {
        !matches!(self, Self::Temp)
    }
}

impl fmt::Display for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp => write!(f, "Temp"),
            Self::TempJob => write!(f, "TempJob"),
            Self::Persistent => write!(f, "Persistent"),
        }
    }
}
