//! Byte payloads larger than a single block.
//!
//! A large write is a 4-byte little-endian length header followed by the
//! payload split into chunks. Each chunk fills whatever room is left in
//! the current block, or a whole fresh block when none is left, so the
//! payload occupies every byte between header and end. Each chunk is one
//! allocation and therefore counts as one record in the slot's element
//! count. The reader replays the same chunking rule.

use ripple_core::EventRecord;

use crate::error::StreamError;
use crate::read::SlotReader;
use crate::write::SlotWriter;

/// Size in bytes of the length prefix written before a large payload.
pub const LENGTH_HEADER_SIZE: usize = 4;

fn chunk_len(left: usize, room: usize, block_size: usize) -> usize {
    let room = if room == 0 { block_size } else { room };
    left.min(room)
}

impl SlotWriter<'_> {
    /// Append `bytes` as a length-prefixed payload that may span blocks.
    ///
    /// Fails with [`StreamError::CapacityExceeded`] before writing anything
    /// if the payload would overrun the slot's block budget.
    pub fn write_large(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        let len = u32::try_from(bytes.len()).map_err(|_| StreamError::OversizedWrite {
            requested: bytes.len(),
            block_size: self.block_size(),
        })?;
        // Check the whole chain up front so a failed write leaves nothing behind.
        self.ensure_block_budget(self.blocks_for_large(LENGTH_HEADER_SIZE, bytes.len()))?;
        self.write(len)?;

        let block_size = self.block_size();
        let mut left = bytes;
        while !left.is_empty() {
            let chunk = chunk_len(left.len(), self.remaining_in_block(), block_size);
            self.allocate(chunk)?.copy_from_slice(&left[..chunk]);
            left = &left[chunk..];
        }
        Ok(())
    }
}

impl SlotReader<'_> {
    /// Read back a payload written by [`SlotWriter::write_large`].
    pub fn read_large(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_bytes(LENGTH_HEADER_SIZE).map(u32::decode)? as usize;

        let block_size = self.block_size();
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let chunk = chunk_len(len - out.len(), self.remaining_in_block(), block_size);
            out.extend_from_slice(self.read_bytes(chunk)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPool;
    use crate::config::StreamConfig;
    use crate::stream::Stream;
    use proptest::prelude::*;
    use ripple_core::{Allocator, SlotId};

    fn make_stream() -> Stream {
        let pool = BlockPool::shared(StreamConfig::DEFAULT_BLOCK_SIZE, 16);
        Stream::new(StreamConfig::new(1), pool, Allocator::Persistent).unwrap()
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn round_trip(len: usize) -> (Stream, Vec<u8>) {
        let stream = make_stream();
        let bytes = payload(len);
        {
            let writer = stream.writer().unwrap();
            let mut slot = writer.slot(SlotId(0)).unwrap();
            slot.write_large(&bytes).unwrap();
        }
        let read = {
            let mut reader = stream.reader().unwrap();
            let mut pass = reader.begin_slot(SlotId(0)).unwrap();
            let read = pass.read_large().unwrap();
            pass.end().unwrap();
            read
        };
        assert_eq!(read, bytes);
        (stream, read)
    }

    #[test]
    fn small_payload_fits_after_header() {
        let (stream, _) = round_trip(512);
        assert_eq!(stream.block_count(), 1);
        assert_eq!(stream.element_count(), 2);
    }

    #[test]
    fn payload_filling_first_block_exactly() {
        let (stream, _) = round_trip(4096 - LENGTH_HEADER_SIZE);
        assert_eq!(stream.block_count(), 1);
        assert_eq!(stream.element_count(), 2);
    }

    #[test]
    fn payload_spanning_three_blocks() {
        // Header + 4092 in block 0, 4096 in block 1, last 4 bytes in block 2.
        let (stream, _) = round_trip(8192);
        assert_eq!(stream.block_count(), 3);
        assert_eq!(stream.element_count(), 4);
    }

    #[test]
    fn empty_payload_is_header_only() {
        let (stream, read) = round_trip(0);
        assert!(read.is_empty());
        assert_eq!(stream.element_count(), 1);
    }

    #[test]
    fn large_payload_after_small_records() {
        let stream = make_stream();
        let bytes = payload(10_000);
        {
            let writer = stream.writer().unwrap();
            let mut slot = writer.slot(SlotId(0)).unwrap();
            slot.write(7u64).unwrap();
            slot.write_large(&bytes).unwrap();
            slot.write(9u16).unwrap();
        }
        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pass.read::<u64>().unwrap(), 7);
        assert_eq!(pass.read_large().unwrap(), bytes);
        assert_eq!(pass.read::<u16>().unwrap(), 9);
        pass.end().unwrap();
    }

    fn small_block_stream(max_blocks_per_slot: u32) -> Stream {
        let config = StreamConfig {
            block_size: 64,
            max_blocks_per_slot,
            ..StreamConfig::new(1)
        };
        Stream::new(config, BlockPool::shared(64, 16), Allocator::Persistent).unwrap()
    }

    #[test]
    fn over_budget_payload_leaves_slot_untouched() {
        let stream = small_block_stream(2);
        let writer = stream.writer().unwrap();
        {
            let mut slot = writer.slot(SlotId(0)).unwrap();
            assert_eq!(
                slot.write_large(&[7; 200]),
                Err(StreamError::CapacityExceeded {
                    slot: SlotId(0),
                    max_blocks: 2
                })
            );
            assert_eq!(slot.count(), 0);
            slot.write_large(&payload(100)).unwrap();
        }
        assert_eq!(stream.block_count(), 2);
        assert_eq!(stream.element_count(), 3);

        let mut reader = stream.reader().unwrap();
        let mut pass = reader.begin_slot(SlotId(0)).unwrap();
        assert_eq!(pass.read_large().unwrap(), payload(100));
        pass.end().unwrap();
    }

    #[test]
    fn payload_exactly_filling_budget_is_accepted() {
        let stream = small_block_stream(2);
        let writer = stream.writer().unwrap();
        let mut slot = writer.slot(SlotId(0)).unwrap();
        slot.write(1u32).unwrap();
        // 56 bytes after the record and header, then one full block.
        slot.write_large(&payload(56 + 64)).unwrap();
        assert_eq!(
            slot.write(2u8),
            Err(StreamError::CapacityExceeded {
                slot: SlotId(0),
                max_blocks: 2
            })
        );
    }

    proptest! {
        #[test]
        fn predicted_blocks_match_chained_blocks(
            prefix in 0usize..40,
            len in 0usize..600,
        ) {
            let stream = small_block_stream(64);
            let writer = stream.writer().unwrap();
            for _ in 0..prefix {
                writer.write(SlotId(0), 0u8).unwrap();
            }
            let before = stream.block_count();
            let predicted = {
                let mut slot = writer.slot(SlotId(0)).unwrap();
                let predicted = slot.blocks_for_large(LENGTH_HEADER_SIZE, len);
                slot.write_large(&payload(len)).unwrap();
                predicted
            };
            prop_assert_eq!(stream.block_count() - before, predicted);
        }
    }

    #[test]
    fn chunking_uses_room_or_full_block() {
        assert_eq!(chunk_len(100, 0, 64), 64);
        assert_eq!(chunk_len(100, 10, 64), 10);
        assert_eq!(chunk_len(5, 10, 64), 5);
    }
}
