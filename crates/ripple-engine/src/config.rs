//! Registry configuration.

use ripple_core::{Allocator, ConfigError};
use ripple_stream::StreamConfig;

/// Configuration for an [`EventRegistry`](crate::EventRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Configuration applied to every stream the registry creates.
    pub stream: StreamConfig,
    /// Allocator tag for stream storage. `Temp` is rejected.
    pub allocator: Allocator,
    /// Released blocks kept for reuse across cycles. Default: 1024.
    pub pooled_blocks: usize,
    /// Worker threads for the built-in pool. `None` = auto-detect
    /// (available parallelism, clamped to `[1, 128]`).
    pub worker_count: Option<usize>,
}

impl RegistryConfig {
    /// Default number of pooled blocks.
    pub const DEFAULT_POOLED_BLOCKS: usize = 1024;

    /// Upper bound on worker threads.
    pub const MAX_WORKERS: usize = 128;

    /// Resolve the worker count, applying auto-detection if `None`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, Self::MAX_WORKERS),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.clamp(1, Self::MAX_WORKERS)
            }
        }
    }

    /// Validate the stream configuration, the allocator tag, and that
    /// every worker plus the main slot has a slot of its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        if !self.allocator.outlives_call() {
            return Err(ConfigError::DisallowedAllocator {
                allocator: self.allocator,
                operation: "EventRegistry::new",
            });
        }
        let workers = self.resolved_worker_count();
        if (self.stream.slot_count as usize) <= workers {
            return Err(ConfigError::SlotsBelowWorkers {
                slots: self.stream.slot_count,
                workers,
            });
        }
        Ok(())
    }

    /// Stream configuration for a writer asking for `slot_count_hint`
    /// slots.
    ///
    /// A hint of zero selects the configured slot count, larger hints are
    /// capped at it. The resulting count must still leave every worker
    /// and the main slot a slot of its own.
    pub fn stream_for_hint(&self, slot_count_hint: u32) -> Result<StreamConfig, ConfigError> {
        if slot_count_hint == 0 {
            return Ok(self.stream.clone());
        }
        let slot_count = slot_count_hint.min(self.stream.slot_count);
        let workers = self.resolved_worker_count();
        if (slot_count as usize) <= workers {
            return Err(ConfigError::SlotsBelowWorkers {
                slots: slot_count,
                workers,
            });
        }
        Ok(StreamConfig {
            slot_count,
            ..self.stream.clone()
        })
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            allocator: Allocator::Persistent,
            pooled_blocks: Self::DEFAULT_POOLED_BLOCKS,
            worker_count: None,
        }
    }
}
