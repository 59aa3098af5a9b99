//! Two-phase, per-slot sequential read access.
//!
//! A consumer walks a stream slot by slot. [`Reader::begin_slot`] opens a
//! pass over one slot and returns a [`SlotReader`] that borrows the reader
//! mutably, so only one pass per reader is live at a time. Records come
//! back in write order. [`SlotReader::end`] closes the pass and, in checked
//! mode, verifies that every record was consumed.

use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLockReadGuard, TryLockError};

use ripple_core::{EventRecord, SlotId};

use crate::error::StreamError;
use crate::range::{locate, SlotRange};
use crate::stream::StreamStorage;

/// Read view over a stream.
///
/// Cheap to clone; independent consumers may each hold a clone and read
/// the same slots concurrently.
#[derive(Clone)]
pub struct Reader {
    storage: Arc<StreamStorage>,
}

impl Reader {
    pub(crate) fn new(storage: Arc<StreamStorage>) -> Self {
        Self { storage }
    }

    /// Open a pass over `slot`, positioned at its first record.
    ///
    /// Seals the stream against further writes once the slot is claimed;
    /// a failed claim leaves the stream writable.
    pub fn begin_slot(&mut self, slot: SlotId) -> Result<SlotReader<'_>, StreamError> {
        let storage = &*self.storage;
        let cell = storage.check_slot(slot)?;
        let range = match cell.range.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(StreamError::SlotBusy { slot }),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        storage.sealed.store(true, Ordering::Release);
        let count = range.element_count;
        Ok(SlotReader {
            slot,
            range,
            block: 0,
            offset: 0,
            count,
            remaining: count,
            block_size: storage.config.block_size,
            checked: storage.config.checks.enabled(),
        })
    }

    /// Number of slots in the underlying stream.
    pub fn slot_count(&self) -> u32 {
        self.storage.config.slot_count
    }

    /// Total records across all slots.
    pub fn element_count(&self) -> usize {
        self.storage.element_count()
    }

    /// Records in a single slot, or zero if out of range.
    pub fn slot_element_count(&self, slot: SlotId) -> usize {
        self.storage
            .slots
            .get(slot.index())
            .map_or(0, |cell| cell.count())
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("slot_count", &self.slot_count())
            .field("element_count", &self.element_count())
            .finish()
    }
}

/// Sequential cursor over one slot's records.
pub struct SlotReader<'a> {
    slot: SlotId,
    range: RwLockReadGuard<'a, SlotRange>,
    block: usize,
    offset: usize,
    count: usize,
    remaining: usize,
    block_size: usize,
    checked: bool,
}

impl SlotReader<'_> {
    /// Records in this slot.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Records not yet read in this pass.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The slot this pass reads.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Bytes left before the current block ends, mirroring
    /// [`SlotWriter::remaining_in_block`](crate::SlotWriter::remaining_in_block).
    pub fn remaining_in_block(&self) -> usize {
        if self.range.blocks.is_empty() {
            0
        } else {
            self.block_size - self.offset
        }
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Consume the next record as `size` raw bytes.
    pub fn read_bytes(&mut self, size: usize) -> Result<&[u8], StreamError> {
        let (block, offset) = self.position(size)?;
        self.block = block;
        self.offset = offset + size;
        self.remaining = self.remaining.saturating_sub(1);
        Ok(&self.range.blocks[block][offset..offset + size])
    }

    /// Consume the next record.
    pub fn read<T: EventRecord>(&mut self) -> Result<T, StreamError> {
        self.read_bytes(T::SIZE).map(T::decode)
    }

    /// Decode the next record without consuming it.
    pub fn peek<T: EventRecord>(&self) -> Result<T, StreamError> {
        let (block, offset) = self.position(T::SIZE)?;
        Ok(T::decode(&self.range.blocks[block][offset..offset + T::SIZE]))
    }

    /// Close the pass.
    ///
    /// In checked mode, fails if records remain unread. Drop the reader
    /// instead to abandon a pass deliberately.
    pub fn end(self) -> Result<(), StreamError> {
        if self.checked && self.remaining != 0 {
            tracing::warn!(slot = %self.slot, remaining = self.remaining, "slot pass ended early");
            return Err(StreamError::UnreadElements {
                slot: self.slot,
                remaining: self.remaining,
            });
        }
        Ok(())
    }

    /// Where a record of `size` bytes starts, following the writer's
    /// block-overflow rule.
    fn position(&self, size: usize) -> Result<(usize, usize), StreamError> {
        let past_end = StreamError::ReadPastEnd {
            slot: self.slot,
            count: self.count,
        };
        if self.checked && self.remaining == 0 {
            return Err(past_end);
        }
        if size > self.block_size {
            return Err(StreamError::OversizedWrite {
                requested: size,
                block_size: self.block_size,
            });
        }
        let (block, offset) = locate(self.block, self.offset, size, self.block_size);
        if block >= self.range.blocks.len() {
            return Err(past_end);
        }
        Ok((block, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPool;
    use crate::config::StreamConfig;
    use crate::stream::Stream;
    use proptest::prelude::*;
    use ripple_core::Allocator;

    fn make_stream(block_size: usize, slots: u32) -> Stream {
        let config = StreamConfig {
            block_size,
            ..StreamConfig::new(slots)
        };
        let pool = BlockPool::shared(block_size, 16);
        Stream::new(config, pool, Allocator::Persistent).unwrap()
    }

    #[test]
    fn begin_reports_count_and_reads_in_order() {
        let stream = make_stream(4096, 2);
        let writer = stream.writer().unwrap();
        for i in 0..100u64 {
            writer.write(SlotId(1), i).unwrap();
        }
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(1)).unwrap();
        assert_eq!(pass.count(), 100);
        for i in 0..100u64 {
            assert_eq!(pass.read::<u64>().unwrap(), i);
        }
        assert_eq!(pass.remaining(), 0);
        pass.end().unwrap();
    }

    #[test]
    fn empty_slot_has_zero_count() {
        let stream = make_stream(4096, 2);
        let mut reader = stream.reader().unwrap();
        let pass = reader.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pass.count(), 0);
        assert_eq!(pass.remaining_in_block(), 0);
        pass.end().unwrap();
    }

    #[test]
    fn reads_cross_block_boundaries() {
        // 6-byte records in 16-byte blocks: two per block, 4 bytes of slack.
        let stream = make_stream(16, 1);
        let writer = stream.writer().unwrap();
        for i in 0..7u16 {
            writer.write(SlotId(0), [i, i + 1, i + 2]).unwrap();
        }
        assert_eq!(stream.block_count(), 4);
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        for i in 0..7u16 {
            assert_eq!(pass.read::<[u16; 3]>().unwrap(), [i, i + 1, i + 2]);
        }
        pass.end().unwrap();
    }

    #[test]
    fn peek_does_not_advance() {
        let stream = make_stream(16, 1);
        let writer = stream.writer().unwrap();
        writer.write(SlotId(0), 1u64).unwrap();
        writer.write(SlotId(0), 2u64).unwrap();
        writer.write(SlotId(0), 3u64).unwrap();
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pass.read::<u64>().unwrap(), 1);
        assert_eq!(pass.read::<u64>().unwrap(), 2);
        // Next record lives in the second block.
        assert_eq!(pass.peek::<u64>().unwrap(), 3);
        assert_eq!(pass.remaining(), 1);
        assert_eq!(pass.read::<u64>().unwrap(), 3);
        pass.end().unwrap();
    }

    #[test]
    fn reading_past_count_is_rejected() {
        let stream = make_stream(4096, 1);
        stream.writer().unwrap().write(SlotId(0), 9u32).unwrap();
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        pass.read::<u32>().unwrap();
        assert_eq!(
            pass.read::<u32>().unwrap_err(),
            StreamError::ReadPastEnd {
                slot: SlotId(0),
                count: 1
            }
        );
        assert!(pass.peek::<u32>().is_err());
    }

    #[test]
    fn ending_early_reports_unread_elements() {
        let stream = make_stream(4096, 1);
        let writer = stream.writer().unwrap();
        writer.write(SlotId(0), 1u8).unwrap();
        writer.write(SlotId(0), 2u8).unwrap();
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        pass.read::<u8>().unwrap();
        assert_eq!(
            pass.end().unwrap_err(),
            StreamError::UnreadElements {
                slot: SlotId(0),
                remaining: 1
            }
        );
    }

    #[test]
    fn begin_out_of_range_is_rejected() {
        let stream = make_stream(4096, 3);
        let mut reader = stream.reader().unwrap();
        assert!(matches!(
            reader.begin_slot(SlotId(3)),
            Err(StreamError::SlotOutOfRange {
                slot: SlotId(3),
                slot_count: 3
            })
        ));
    }

    #[test]
    fn begin_while_writer_holds_slot_is_busy() {
        let stream = make_stream(4096, 1);
        let writer = stream.writer().unwrap();
        let held = writer.slot(SlotId(0)).unwrap();
        let mut reader = stream.reader().unwrap();
        assert!(matches!(
            reader.begin_slot(SlotId(0)),
            Err(StreamError::SlotBusy { slot: SlotId(0) })
        ));
        drop(held);
        // The failed claim did not seal the stream.
        writer.write(SlotId(0), 3u32).unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pass.read::<u32>().unwrap(), 3);
        pass.end().unwrap();
        assert!(matches!(
            writer.write(SlotId(0), 4u32),
            Err(StreamError::Sealed { slot: SlotId(0) })
        ));
    }

    #[test]
    fn independent_readers_share_slots() {
        let stream = make_stream(4096, 1);
        stream.writer().unwrap().write(SlotId(0), 5u32).unwrap();
        let mut a = stream.reader().unwrap();
        let mut b = a.clone();
        let mut pa = a.begin_slot(SlotId(0)).unwrap();
        let mut pb = b.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pa.read::<u32>().unwrap(), 5);
        assert_eq!(pb.read::<u32>().unwrap(), 5);
    }

    #[test]
    fn reader_counts_match_stream() {
        let stream = make_stream(4096, 3);
        let writer = stream.writer().unwrap();
        writer.write(SlotId(2), 1u32).unwrap();
        writer.write(SlotId(2), 1u32).unwrap();
        let reader = stream.reader().unwrap();
        assert_eq!(reader.element_count(), 2);
        assert_eq!(reader.slot_element_count(SlotId(2)), 2);
        assert_eq!(reader.slot_element_count(SlotId(7)), 0);
    }

    proptest! {
        #[test]
        fn slot_reads_back_in_write_order(
            values in proptest::collection::vec(any::<u32>(), 0..300),
            slot in 0u32..4,
        ) {
            let stream = make_stream(64, 4);
            let writer = stream.writer().unwrap();
            {
                let mut cursor = writer.slot(SlotId(slot)).unwrap();
                for &v in &values {
                    cursor.write((v, v as u8)).unwrap();
                }
            }
            let mut reader = stream.reader().unwrap();
            let mut pass = reader.begin_slot(SlotId(slot)).unwrap();
            prop_assert_eq!(pass.count(), values.len());
            for &v in &values {
                prop_assert_eq!(pass.read::<(u32, u8)>().unwrap(), (v, v as u8));
            }
            prop_assert!(pass.end().is_ok());
        }
    }
}
