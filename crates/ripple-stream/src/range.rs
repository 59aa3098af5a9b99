//! Per-slot block chains.
//!
//! A [`SlotRange`] is the storage of one worker slot: an ordered chain of
//! blocks plus the bump cursor into the last one. Records never straddle
//! blocks. When a request does not fit before the end of the current
//! block, a new block is chained and the record starts at its offset 0.
//! Readers replay exactly the same decision to find each record.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use ripple_core::SlotId;

use crate::block::{Block, BlockPool};
use crate::error::StreamError;

/// Where the next record of a given size starts, given the current
/// `(block, offset)` position. Shared by the write and read paths.
pub(crate) fn locate(block: usize, offset: usize, size: usize, block_size: usize) -> (usize, usize) {
    if offset + size > block_size {
        (block + 1, 0)
    } else {
        (block, offset)
    }
}

/// Storage of a single slot.
#[derive(Default)]
pub(crate) struct SlotRange {
    /// Block chain in write order.
    pub(crate) blocks: Vec<Block>,
    /// Bump cursor within the last block.
    pub(crate) cursor: usize,
    /// Records written to this slot.
    pub(crate) element_count: usize,
    /// Offset of the most recent record within the last block.
    pub(crate) last_offset: usize,
}

impl SlotRange {
    /// Reserve `size` bytes for one record, chaining a block if needed.
    pub(crate) fn reserve(
        &mut self,
        slot: SlotId,
        size: usize,
        pool: &BlockPool,
        max_blocks: u32,
    ) -> Result<(), StreamError> {
        let block_size = pool.block_size();
        if size > block_size {
            return Err(StreamError::OversizedWrite {
                requested: size,
                block_size,
            });
        }

        if self.blocks.is_empty() || self.cursor + size > block_size {
            if self.blocks.len() >= max_blocks as usize {
                return Err(StreamError::CapacityExceeded { slot, max_blocks });
            }
            self.blocks.push(pool.acquire());
            self.cursor = 0;
        }

        self.last_offset = self.cursor;
        self.cursor += size;
        self.element_count += 1;
        Ok(())
    }

    /// The bytes of the most recently reserved record of length `size`.
    pub(crate) fn last_record_mut(&mut self, size: usize) -> &mut [u8] {
        let start = self.last_offset;
        match self.blocks.last_mut() {
            Some(block) => &mut block[start..start + size],
            None => &mut [],
        }
    }

    /// Reserve and return `size` bytes for one record.
    #[cfg(test)]
    pub(crate) fn allocate(
        &mut self,
        slot: SlotId,
        size: usize,
        pool: &BlockPool,
        max_blocks: u32,
    ) -> Result<&mut [u8], StreamError> {
        self.reserve(slot, size, pool, max_blocks)?;
        Ok(self.last_record_mut(size))
    }

    /// Blocks a length-prefixed payload of `len` bytes would chain onto
    /// this range, following the large-write chunking rule.
    pub(crate) fn blocks_for_large(&self, header: usize, len: usize, block_size: usize) -> usize {
        let (fresh, room) = if self.blocks.is_empty() || self.cursor + header > block_size {
            (1, block_size - header)
        } else {
            (0, block_size - self.cursor - header)
        };
        fresh + len.saturating_sub(room).div_ceil(block_size)
    }

    /// Bytes left before the end of the current block. Zero before the
    /// first write.
    pub(crate) fn remaining_in_block(&self, block_size: usize) -> usize {
        if self.blocks.is_empty() {
            0
        } else {
            block_size - self.cursor
        }
    }

    /// Hand every block back to `pool` and return to the empty state.
    pub(crate) fn release(&mut self, pool: &BlockPool) -> usize {
        let released = self.blocks.len();
        pool.release_all(self.blocks.drain(..));
        self.cursor = 0;
        self.element_count = 0;
        self.last_offset = 0;
        released
    }
}

/// A slot's lock-guarded range plus its lock-free element count.
///
/// The count mirrors `SlotRange::element_count` so totals can be summed
/// without touching the lock while writers are still active.
#[derive(Default)]
pub(crate) struct SlotCell {
    pub(crate) range: RwLock<SlotRange>,
    pub(crate) count: AtomicUsize,
}

impl SlotCell {
    pub(crate) fn publish_count(&self, count: usize) {
        self.count.store(count, Ordering::Release);
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
