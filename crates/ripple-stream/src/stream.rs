//! The [`Stream`] handle and its shared storage.
//!
//! `Stream` owns an `Arc<StreamStorage>`; [`Writer`] and [`Reader`] views
//! hold clones of the same `Arc`. Disposing the stream drops the handle's
//! reference immediately (so no new views can be created) and returns the
//! block chains to the pool, either right away or from a scheduled job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ripple_core::{Allocator, ConfigError, EventRecord, JobHandle, JobScheduler, SlotId};

use crate::block::SharedBlockPool;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::range::SlotCell;
use crate::read::Reader;
use crate::write::Writer;

/// Storage shared by a stream and all of its views.
pub(crate) struct StreamStorage {
    pub(crate) slots: Box<[SlotCell]>,
    pub(crate) pool: SharedBlockPool,
    pub(crate) config: StreamConfig,
    /// Set by the first reader. Writes are rejected afterwards.
    pub(crate) sealed: AtomicBool,
    /// Set once the blocks have been handed back to the pool.
    pub(crate) disposed: AtomicBool,
}

impl StreamStorage {
    pub(crate) fn check_slot(&self, slot: SlotId) -> Result<&SlotCell, StreamError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StreamError::Disposed);
        }
        self.slots
            .get(slot.index())
            .ok_or(StreamError::SlotOutOfRange {
                slot,
                slot_count: self.config.slot_count,
            })
    }

    pub(crate) fn element_count(&self) -> usize {
        self.slots.iter().map(SlotCell::count).sum()
    }

    /// Return every free slot's blocks to the pool.
    ///
    /// Slots still claimed by a lingering view are skipped; their blocks
    /// are freed with the last reference to the storage instead.
    fn release(&self) -> usize {
        self.disposed.store(true, Ordering::Release);
        let mut released = 0;
        for (index, cell) in self.slots.iter().enumerate() {
            match cell.range.try_write() {
                Ok(mut range) => {
                    released += range.release(&self.pool);
                    cell.publish_count(0);
                }
                Err(_) => {
                    tracing::warn!(slot = index, "slot still claimed at disposal; blocks not pooled");
                }
            }
        }
        released
    }
}

/// A slot-partitioned, append-only event stream.
///
/// A default `Stream` is not created: it reports empty and disposing it
/// is a no-op.
#[derive(Default)]
pub struct Stream {
    storage: Option<Arc<StreamStorage>>,
}

impl Stream {
    /// Allocate a stream with one empty range per slot.
    ///
    /// Rejects the `Temp` allocator tag and mismatched pools before any
    /// allocation happens.
    pub fn new(
        config: StreamConfig,
        pool: SharedBlockPool,
        allocator: Allocator,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        if !allocator.outlives_call() {
            return Err(ConfigError::DisallowedAllocator {
                allocator,
                operation: "Stream::new",
            }
            .into());
        }
        if pool.block_size() != config.block_size {
            return Err(ConfigError::BlockSizeMismatch {
                stream: config.block_size,
                pool: pool.block_size(),
            }
            .into());
        }

        let slots = (0..config.slot_count).map(|_| SlotCell::default()).collect();
        Ok(Self {
            storage: Some(Arc::new(StreamStorage {
                slots,
                pool,
                config,
                sealed: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            })),
        })
    }

    /// Whether the stream's storage is allocated and not yet disposed.
    pub fn is_created(&self) -> bool {
        self.storage.is_some()
    }

    /// A writer view over this stream.
    pub fn writer(&self) -> Result<Writer, StreamError> {
        self.storage
            .as_ref()
            .map(|s| Writer::new(Arc::clone(s)))
            .ok_or(StreamError::NotCreated)
    }

    /// A reader view over this stream.
    ///
    /// Valid only once every writer has finished; the registry hands
    /// readers out together with the handle that guarantees it.
    pub fn reader(&self) -> Result<Reader, StreamError> {
        self.storage
            .as_ref()
            .map(|s| Reader::new(Arc::clone(s)))
            .ok_or(StreamError::NotCreated)
    }

    /// Total records across all slots. O(slot count).
    pub fn element_count(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.element_count())
    }

    /// Records written to a single slot.
    pub fn slot_element_count(&self, slot: SlotId) -> usize {
        self.storage
            .as_ref()
            .and_then(|s| s.slots.get(slot.index()))
            .map_or(0, SlotCell::count)
    }

    /// Whether the stream holds no records. True for a stream that was
    /// never created.
    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }

    /// Number of slots, or zero if not created.
    pub fn slot_count(&self) -> u32 {
        self.storage.as_ref().map_or(0, |s| s.config.slot_count)
    }

    /// Blocks currently chained across all free slots.
    pub fn block_count(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| {
            s.slots
                .iter()
                .filter_map(|cell| cell.range.try_read().ok().map(|r| r.blocks.len()))
                .sum()
        })
    }

    /// Memory held by this stream's block chains in bytes.
    pub fn memory_bytes(&self) -> usize {
        let block_size = self.storage.as_ref().map_or(0, |s| s.config.block_size);
        self.block_count() * block_size
    }

    /// The configuration this stream was created with.
    pub fn config(&self) -> Option<&StreamConfig> {
        self.storage.as_ref().map(|s| &s.config)
    }

    /// Read every slot, in slot order, into one flat vector.
    ///
    /// Seals the stream. Intended for debugging and bulk export.
    pub fn to_vec<T: EventRecord>(&self) -> Result<Vec<T>, StreamError> {
        let mut reader = self.reader()?;
        let mut out = Vec::with_capacity(self.element_count());
        for slot in 0..reader.slot_count() {
            let mut pass = reader.begin_slot(SlotId(slot))?;
            while pass.remaining() > 0 {
                out.push(pass.read::<T>()?);
            }
            pass.end()?;
        }
        Ok(out)
    }

    /// Release every block chain now. No-op if not created.
    pub fn dispose(&mut self) {
        if let Some(storage) = self.storage.take() {
            let released = storage.release();
            tracing::debug!(released, "stream disposed");
        }
    }

    /// Release the block chains from a job that runs after `dependency`.
    ///
    /// The stream reports `is_created() == false` as soon as this returns,
    /// even though the memory is only released once `dependency` has
    /// completed. Views created earlier remain usable until the job runs;
    /// callers must not touch them after the dependency completes.
    pub fn dispose_deferred(
        &mut self,
        scheduler: &dyn JobScheduler,
        dependency: JobHandle,
    ) -> JobHandle {
        match self.storage.take() {
            None => dependency,
            Some(storage) => scheduler.schedule(
                dependency,
                Box::new(move |_slot| {
                    let released = storage.release();
                    tracing::debug!(released, "stream disposed (deferred)");
                }),
            ),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("is_created", &self.is_created())
            .field("slot_count", &self.slot_count())
            .field("element_count", &self.element_count())
            .finish()
    }
}
