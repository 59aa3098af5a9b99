//! Registry error types.

use std::error::Error;
use std::fmt;

use ripple_core::ConfigError;
use ripple_stream::StreamError;

/// Errors from [`EventRegistry`](crate::EventRegistry) operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A writer was requested while the previous writer for the same event
    /// type has no registered producer handle.
    UnpairedWriter {
        /// Event type name.
        event: &'static str,
    },
    /// A producer handle was registered but no writer is waiting for one.
    NoOutstandingWriter {
        /// Event type name.
        event: &'static str,
    },
    /// Readers were requested while writers are still unpaired.
    WritersOutstanding {
        /// Event type name.
        event: &'static str,
        /// Writers created this cycle.
        writers: u32,
        /// Producer handles registered this cycle.
        handles: u32,
    },
    /// A stream operation failed.
    Stream(StreamError),
    /// The configuration was rejected.
    Config(ConfigError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnpairedWriter { event } => write!(
                f,
                "previous writer for {event} has no registered producer handle"
            ),
            Self::NoOutstandingWriter { event } => {
                write!(f, "no outstanding writer for {event} to pair a handle with")
            }
            Self::WritersOutstanding {
                event,
                writers,
                handles,
            } => write!(
                f,
                "readers requested for {event} with {writers} writers but only {handles} producer handles"
            ),
            Self::Stream(e) => write!(f, "stream error: {e}"),
            Self::Config(e) => write!(f, "config error: {e}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for RegistryError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_chain_as_source() {
        let err = RegistryError::from(StreamError::NotCreated);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("stream error"));
    }

    #[test]
    fn pairing_errors_name_the_event() {
        let err = RegistryError::WritersOutstanding {
            event: "Damage",
            writers: 2,
            handles: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("Damage"));
        assert!(msg.contains("2 writers"));
        assert!(err.source().is_none());
    }
}
