//! Benchmark fixtures for the Ripple event stream framework.
//!
//! - [`Impact`]: a 16-byte event record used by every benchmark
//! - [`bench_stream`]: a stream with its own block pool
//! - [`bench_registry`]: a registry with a fixed worker count

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use ripple_core::{Allocator, EventRecord};
use ripple_engine::{EventRegistry, RegistryConfig};
use ripple_stream::{BlockPool, Stream, StreamConfig};

/// A representative gameplay event: who hit whom, how hard, and when.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impact {
    /// Entity that caused the impact.
    pub source: u32,
    /// Entity that received it.
    pub target: u32,
    /// Damage dealt.
    pub amount: f32,
    /// Tick the impact happened on.
    pub tick: u32,
}

impl Impact {
    /// A deterministic impact derived from `i`.
    pub fn nth(i: u32) -> Self {
        Self {
            source: i,
            target: i.wrapping_mul(31) % 1024,
            amount: (i % 100) as f32 * 0.25,
            tick: i / 64,
        }
    }
}

impl EventRecord for Impact {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        self.source.encode(&mut out[0..4]);
        self.target.encode(&mut out[4..8]);
        self.amount.encode(&mut out[8..12]);
        self.tick.encode(&mut out[12..16]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            source: u32::decode(&bytes[0..4]),
            target: u32::decode(&bytes[4..8]),
            amount: f32::decode(&bytes[8..12]),
            tick: u32::decode(&bytes[12..16]),
        }
    }
}

/// A stream with `slot_count` slots and the default block size, backed
/// by a private pool retaining up to `pooled` blocks.
pub fn bench_stream(slot_count: u32, pooled: usize) -> Stream {
    let config = StreamConfig::new(slot_count);
    let pool = BlockPool::shared(config.block_size, pooled);
    Stream::new(config, pool, Allocator::Persistent).expect("bench stream config is valid")
}

/// A registry with `workers` worker threads and one extra slot for the
/// orchestrating thread.
pub fn bench_registry(workers: usize) -> EventRegistry {
    EventRegistry::new(RegistryConfig {
        stream: StreamConfig::new(workers as u32 + 1),
        worker_count: Some(workers),
        ..RegistryConfig::default()
    })
    .expect("bench registry config is valid")
}
