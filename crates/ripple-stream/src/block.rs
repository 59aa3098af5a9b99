//! Fixed-size blocks and the shared block free list.
//!
//! A block is a `Box<[u8]>` of exactly `block_size` bytes. Slots take
//! blocks from a [`BlockPool`] as they grow and hand them back when their
//! stream is disposed, so steady-state cycles stop touching the global
//! allocator once the pool is warm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// A single fixed-size block of stream memory.
pub type Block = Box<[u8]>;

/// A [`BlockPool`] shared between every stream of a registry.
pub type SharedBlockPool = Arc<BlockPool>;

/// Counters describing pool behaviour since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks served from the free list.
    pub hits: u64,
    /// Blocks freshly allocated because the free list was empty.
    pub misses: u64,
    /// Blocks dropped on release because the free list was full.
    pub dropped: u64,
    /// Blocks currently waiting in the free list.
    pub pooled: usize,
}

/// Bounded free list of blocks, safe to use from any thread.
///
/// The free list is a bounded crossbeam channel: acquiring is a
/// `try_recv`, releasing a `try_send`. Neither ever blocks.
pub struct BlockPool {
    block_size: usize,
    free_tx: Sender<Block>,
    free_rx: Receiver<Block>,
    hits: AtomicU64,
    misses: AtomicU64,
    dropped: AtomicU64,
}

impl BlockPool {
    /// Create a pool serving `block_size`-byte blocks, retaining at most
    /// `max_pooled` released blocks.
    pub fn new(block_size: usize, max_pooled: usize) -> Self {
        let (free_tx, free_rx) = crossbeam_channel::bounded(max_pooled);
        Self {
            block_size,
            free_tx,
            free_rx,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a pool already wrapped for sharing.
    pub fn shared(block_size: usize, max_pooled: usize) -> SharedBlockPool {
        Arc::new(Self::new(block_size, max_pooled))
    }

    /// Take a block from the free list, allocating a fresh one if empty.
    ///
    /// Recycled blocks are not zeroed; writers overwrite every byte a
    /// reader can reach.
    pub fn acquire(&self) -> Block {
        match self.free_rx.try_recv() {
            Ok(block) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                block
            }
            Err(_) => {
                let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
                if misses.is_power_of_two() {
                    tracing::debug!(
                        block_size = self.block_size,
                        misses,
                        "block pool allocating fresh blocks"
                    );
                }
                vec![0u8; self.block_size].into_boxed_slice()
            }
        }
    }

    /// Return a block to the free list, or drop it if the list is full.
    pub fn release(&self, block: Block) {
        if block.len() != self.block_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.free_tx.try_send(block) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Release every block in `blocks`.
    pub fn release_all(&self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            self.release(block);
        }
    }

    /// Size of the blocks this pool serves.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pooled: self.free_rx.len(),
        }
    }

    /// Memory held by the free list in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.free_rx.len() * self.block_size
    }
}

impl std::fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPool")
            .field("block_size", &self.block_size)
            .field("stats", &self.stats())
            .finish()
    }
}
