//! Slot-affine append access to a stream.
//!
//! [`Writer`] is a cheap, cloneable view that parallel jobs capture. A job
//! claims its own slot with [`Writer::slot`] and appends through the
//! returned [`SlotWriter`]. Claims are non-blocking: two views contending
//! for the same slot is a protocol violation reported as
//! [`StreamError::SlotBusy`], never a wait.

use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLockWriteGuard, TryLockError};

use ripple_core::{EventRecord, SlotId};

use crate::error::StreamError;
use crate::range::{SlotCell, SlotRange};
use crate::stream::StreamStorage;

/// Append view over a stream, shared by every producing job.
#[derive(Clone)]
pub struct Writer {
    storage: Arc<StreamStorage>,
}

impl Writer {
    pub(crate) fn new(storage: Arc<StreamStorage>) -> Self {
        Self { storage }
    }

    /// Claim `slot` for appending.
    ///
    /// Fails if the slot is out of range, already claimed, the stream has
    /// been disposed, or (checked mode) read-back has already begun.
    pub fn slot(&self, slot: SlotId) -> Result<SlotWriter<'_>, StreamError> {
        let storage = &*self.storage;
        let cell = storage.check_slot(slot)?;
        if storage.config.checks.enabled() && storage.sealed.load(Ordering::Acquire) {
            return Err(StreamError::Sealed { slot });
        }
        let range = match cell.range.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(StreamError::SlotBusy { slot }),
            // A writer panicked mid-append; the range is still structurally valid.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Ok(SlotWriter {
            slot,
            range,
            cell,
            storage,
        })
    }

    /// Append one record to `slot`.
    pub fn write<T: EventRecord>(&self, slot: SlotId, value: T) -> Result<(), StreamError> {
        self.slot(slot)?.write(value)
    }

    /// Number of slots in the underlying stream.
    pub fn slot_count(&self) -> u32 {
        self.storage.config.slot_count
    }

    /// Block size of the underlying stream.
    pub fn block_size(&self) -> usize {
        self.storage.config.block_size
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("slot_count", &self.slot_count())
            .finish()
    }
}

/// Exclusive append cursor for one slot.
///
/// Publishes the slot's element count on every append and on drop.
pub struct SlotWriter<'a> {
    slot: SlotId,
    range: RwLockWriteGuard<'a, SlotRange>,
    cell: &'a SlotCell,
    storage: &'a StreamStorage,
}

impl SlotWriter<'_> {
    /// Reserve `size` bytes for one record and return them for filling.
    ///
    /// Chains a new block when the record does not fit in the current one.
    /// The returned bytes may hold stale data from a recycled block.
    pub fn allocate(&mut self, size: usize) -> Result<&mut [u8], StreamError> {
        let max_blocks = self.storage.config.max_blocks_per_slot;
        self.range
            .reserve(self.slot, size, &self.storage.pool, max_blocks)?;
        self.cell
            .count
            .store(self.range.element_count, Ordering::Relaxed);
        Ok(self.range.last_record_mut(size))
    }

    /// Fail with [`StreamError::CapacityExceeded`] unless `blocks` more
    /// blocks fit in the slot's budget.
    pub(crate) fn ensure_block_budget(&self, blocks: usize) -> Result<(), StreamError> {
        let max_blocks = self.storage.config.max_blocks_per_slot;
        if self.range.blocks.len() + blocks > max_blocks as usize {
            return Err(StreamError::CapacityExceeded {
                slot: self.slot,
                max_blocks,
            });
        }
        Ok(())
    }

    /// Blocks a large write of `len` payload bytes would chain.
    pub(crate) fn blocks_for_large(&self, header: usize, len: usize) -> usize {
        self.range.blocks_for_large(header, len, self.block_size())
    }

    /// Append one record.
    pub fn write<T: EventRecord>(&mut self, value: T) -> Result<(), StreamError> {
        let buf = self.allocate(T::SIZE)?;
        value.encode(buf);
        Ok(())
    }

    /// Bytes left before the current block ends. Zero before the first write.
    pub fn remaining_in_block(&self) -> usize {
        self.range.remaining_in_block(self.storage.config.block_size)
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.storage.config.block_size
    }

    /// Records written to this slot so far.
    pub fn count(&self) -> usize {
        self.range.element_count
    }

    /// The slot this cursor appends to.
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Drop for SlotWriter<'_> {
    fn drop(&mut self) {
        self.cell.publish_count(self.range.element_count);
    }
}
