//! Stream configuration parameters.

use ripple_core::ConfigError;

/// Whether protocol violations are detected and reported.
///
/// `Checked` is the default and the mode exercised by the test suite.
/// `Unchecked` skips the pairing and count bookkeeping checks for
/// throughput; the contracts are identical but a violation produces
/// unspecified (still memory-safe) results instead of an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolChecks {
    /// Report every protocol violation as an error.
    #[default]
    Checked,
    /// Trust the caller.
    Unchecked,
}

impl ProtocolChecks {
    /// Whether violations are reported.
    pub fn enabled(self) -> bool {
        matches!(self, Self::Checked)
    }
}

/// Configuration for event streams.
///
/// Shared by every stream created from the same registry. Validated at
/// construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Size of each block in bytes. Bounds the largest single write.
    ///
    /// Default: 4096. Must be in `[MIN_BLOCK_SIZE, MAX_BLOCK_SIZE]`.
    pub block_size: usize,

    /// Number of worker slots per stream, including the reserved main slot.
    ///
    /// Default: available parallelism + 1, clamped to `[2, 129]`.
    pub slot_count: u32,

    /// Maximum number of blocks a single slot may chain before writes fail
    /// with `CapacityExceeded`.
    ///
    /// Default: 16_384 (64MB per slot at the default block size).
    pub max_blocks_per_slot: u32,

    /// Protocol violation reporting.
    pub checks: ProtocolChecks,
}

impl StreamConfig {
    /// Default block size in bytes.
    pub const DEFAULT_BLOCK_SIZE: usize = 4096;

    /// Smallest accepted block size.
    pub const MIN_BLOCK_SIZE: usize = 16;

    /// Largest accepted block size (large-payload headers are `u32`).
    pub const MAX_BLOCK_SIZE: usize = 1 << 30;

    /// Default per-slot block budget.
    pub const DEFAULT_MAX_BLOCKS_PER_SLOT: u32 = 16_384;

    /// Create a config with the given slot count and defaults elsewhere.
    pub fn new(slot_count: u32) -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            slot_count,
            max_blocks_per_slot: Self::DEFAULT_MAX_BLOCKS_PER_SLOT,
            checks: ProtocolChecks::Checked,
        }
    }

    /// Slot count derived from the machine's available parallelism.
    pub fn default_slot_count() -> u32 {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus as u32).clamp(1, 128) + 1
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < Self::MIN_BLOCK_SIZE || self.block_size > Self::MAX_BLOCK_SIZE {
            return Err(ConfigError::InvalidBlockSize {
                value: self.block_size,
            });
        }
        if self.slot_count == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        if self.max_blocks_per_slot == 0 {
            return Err(ConfigError::ZeroBlockBudget);
        }
        Ok(())
    }

    /// Largest number of payload bytes one slot can hold.
    pub fn slot_capacity_bytes(&self) -> usize {
        self.block_size * self.max_blocks_per_slot as usize
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(Self::default_slot_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.slot_count >= 2);
        assert_eq!(config.block_size, 4096);
        assert!(config.checks.enabled());
    }

    #[test]
    fn tiny_block_rejected() {
        let config = StreamConfig {
            block_size: 8,
            ..StreamConfig::new(2)
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBlockSize { value: 8 })
        );
    }

    #[test]
    fn zero_slots_rejected() {
        assert_eq!(StreamConfig::new(0).validate(), Err(ConfigError::ZeroSlots));
    }

    #[test]
    fn zero_block_budget_rejected() {
        let config = StreamConfig {
            max_blocks_per_slot: 0,
            ..StreamConfig::new(2)
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBlockBudget));
    }

    #[test]
    fn slot_capacity_is_block_budget() {
        let config = StreamConfig {
            max_blocks_per_slot: 4,
            ..StreamConfig::new(2)
        };
        assert_eq!(config.slot_capacity_bytes(), 4 * 4096);
    }
}
