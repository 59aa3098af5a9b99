//! Per-event-type stream registry and the producer/consumer handshake.
//!
//! Each event type moves through a small state machine:
//!
//! ```text
//!             create_writer            add_producer_handle
//!   Idle ─────────────────────▶ Writing ─────────────────────▶ Idle
//!     │                                                         │
//!     │ get_readers (balanced)                                  │
//!     ▼                                                         │
//!   Draining ── create_writer ──▶ cycle rolls over ─────────────┘
//! ```
//!
//! A writer may only be created when every earlier writer for the type has
//! its producer handle registered, and readers may only be requested in
//! the same balanced state. Rolling over to a new cycle disposes the
//! drained streams behind every producer and consumer handle seen during
//! the cycle, so no job can still be touching them when they are freed.

use std::sync::Arc;

use indexmap::IndexMap;

use ripple_core::{CycleId, EventRecord, EventTypeId, JobHandle, JobScheduler};
use ripple_stream::{BlockPool, Reader, SharedBlockPool, Stream, Writer};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::metrics::RegistryMetrics;
use crate::pool::WorkerPool;

/// One stream's reader, as returned by [`EventRegistry::get_readers`].
#[derive(Clone, Debug)]
pub struct ReaderEntry {
    index: usize,
    reader: Reader,
}

impl ReaderEntry {
    /// Position of the stream in creation order within the cycle.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total records in the stream.
    pub fn count(&self) -> usize {
        self.reader.element_count()
    }

    /// The reader view.
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    /// Mutable access to the reader, needed to begin slot passes.
    pub fn reader_mut(&mut self) -> &mut Reader {
        &mut self.reader
    }

    /// Consume the entry, keeping the reader.
    pub fn into_reader(self) -> Reader {
        self.reader
    }
}

/// Bookkeeping for one event type.
#[derive(Default)]
struct RegistryEntry {
    /// Streams created since the last rollover, in creation order.
    streams: Vec<Stream>,
    writers_created: u32,
    handles_registered: u32,
    /// Every producer handle registered this cycle.
    producers: JobHandle,
    /// Every handle given to or registered by consumers this cycle.
    consumers: JobHandle,
    draining: bool,
    cycle: CycleId,
}

impl RegistryEntry {
    fn balanced(&self) -> bool {
        self.writers_created == self.handles_registered
    }

    fn retirement_dependency(&self) -> JobHandle {
        JobHandle::combine(&self.producers, &self.consumers)
    }
}

/// Dispose `streams` once `dependency` completes: immediately if it
/// already has, otherwise from a single job releasing all of them.
fn dispose_streams(
    streams: Vec<Stream>,
    dependency: JobHandle,
    scheduler: &dyn JobScheduler,
    metrics: &mut RegistryMetrics,
) -> JobHandle {
    if dependency.is_complete() {
        for mut stream in streams {
            stream.dispose();
            metrics.streams_disposed += 1;
        }
        return JobHandle::completed();
    }
    if streams.is_empty() {
        return dependency;
    }
    metrics.deferred_disposals += streams.len() as u64;
    scheduler.schedule(
        dependency,
        Box::new(move |_slot| {
            let count = streams.len();
            for mut stream in streams {
                stream.dispose();
            }
            tracing::debug!(count, "retired streams disposed");
        }),
    )
}

/// Registry of in-flight event streams, keyed by event type.
///
/// Driven from a single orchestrating thread; parallel work happens in
/// jobs holding cloned [`Writer`] and [`Reader`] views.
pub struct EventRegistry {
    config: RegistryConfig,
    pool: SharedBlockPool,
    scheduler: Arc<dyn JobScheduler>,
    entries: IndexMap<EventTypeId, RegistryEntry>,
    metrics: RegistryMetrics,
    /// Disposals of rolled-over cycles still pending.
    retired: JobHandle,
}

impl EventRegistry {
    /// Create a registry backed by a built-in [`WorkerPool`].
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let scheduler = WorkerPool::new(config.resolved_worker_count())?;
        Self::build(config, Arc::new(scheduler))
    }

    /// Create a registry that schedules its jobs on a host scheduler.
    ///
    /// The configured `worker_count` is replaced by the scheduler's.
    pub fn with_scheduler(
        config: RegistryConfig,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Result<Self, RegistryError> {
        let config = RegistryConfig {
            worker_count: Some(scheduler.worker_count()),
            ..config
        };
        config.validate()?;
        Self::build(config, scheduler)
    }

    fn build(
        config: RegistryConfig,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Result<Self, RegistryError> {
        let pool = BlockPool::shared(config.stream.block_size, config.pooled_blocks);
        Ok(Self {
            config,
            pool,
            scheduler,
            entries: IndexMap::new(),
            metrics: RegistryMetrics::default(),
            retired: JobHandle::completed(),
        })
    }

    fn checked(&self) -> bool {
        self.config.stream.checks.enabled()
    }

    fn violation(&mut self, err: RegistryError) -> RegistryError {
        self.metrics.protocol_violations += 1;
        tracing::warn!(error = %err, "event protocol violation");
        err
    }

    /// Allocate a new stream for `T` and return a writer over it.
    ///
    /// Fails with [`RegistryError::UnpairedWriter`] if the previous writer
    /// for `T` has no producer handle yet. The first writer after readers
    /// were requested starts a new cycle, retiring the drained streams.
    pub fn create_writer<T: EventRecord>(&mut self) -> Result<Writer, RegistryError> {
        self.create_writer_with_slots::<T>(0)
    }

    /// [`create_writer`](Self::create_writer) with a slot-count hint for
    /// the new stream.
    ///
    /// Zero selects the configured slot count and larger hints are capped
    /// at it. A hint that would leave fewer slots than workers plus the
    /// main slot fails with [`RegistryError::Config`] before any state
    /// changes.
    pub fn create_writer_with_slots<T: EventRecord>(
        &mut self,
        slot_count_hint: u32,
    ) -> Result<Writer, RegistryError> {
        let stream_config = self.config.stream_for_hint(slot_count_hint)?;
        let id = EventTypeId::of::<T>();
        let checked = self.checked();
        let entry = self.entries.entry(id).or_default();
        if checked && !entry.balanced() {
            let err = RegistryError::UnpairedWriter { event: id.name() };
            return Err(self.violation(err));
        }

        if entry.draining {
            let dependency = entry.retirement_dependency();
            let streams = std::mem::take(&mut entry.streams);
            let retired = dispose_streams(
                streams,
                dependency,
                &*self.scheduler,
                &mut self.metrics,
            );
            self.retired = JobHandle::combine(&self.retired, &retired);
            let cycle = CycleId(entry.cycle.0 + 1);
            *entry = RegistryEntry {
                cycle,
                ..RegistryEntry::default()
            };
            tracing::debug!(event = %id, %cycle, "event cycle rolled over");
        }

        let stream = Stream::new(
            stream_config,
            Arc::clone(&self.pool),
            self.config.allocator,
        )?;
        let writer = stream.writer()?;
        if entry.writers_created == 0 {
            self.metrics.cycles_started += 1;
        }
        entry.streams.push(stream);
        entry.writers_created += 1;
        self.metrics.streams_created += 1;
        Ok(writer)
    }

    /// Register the completion handle of the producer that used the most
    /// recent writer for `T`.
    pub fn add_producer_handle<T: EventRecord>(
        &mut self,
        handle: JobHandle,
    ) -> Result<(), RegistryError> {
        let id = EventTypeId::of::<T>();
        let checked = self.checked();
        let paired = match self.entries.get_mut(&id) {
            Some(entry) if !checked || !entry.balanced() => {
                entry.producers = JobHandle::combine(&entry.producers, &handle);
                entry.handles_registered += 1;
                true
            }
            Some(_) => false,
            None => !checked,
        };
        if paired {
            Ok(())
        } else {
            let err = RegistryError::NoOutstandingWriter { event: id.name() };
            Err(self.violation(err))
        }
    }

    /// Readers for every stream of `T` written this cycle.
    ///
    /// The returned handle completes once `input` and every producer
    /// registered for `T` have completed; consumers must depend on it. An
    /// unknown type yields `input` and no readers.
    pub fn get_readers<T: EventRecord>(
        &mut self,
        input: JobHandle,
    ) -> Result<(JobHandle, Vec<ReaderEntry>), RegistryError> {
        let id = EventTypeId::of::<T>();
        let checked = self.checked();
        self.metrics.reader_requests += 1;
        let Some(entry) = self.entries.get_mut(&id) else {
            return Ok((input, Vec::new()));
        };
        if checked && !entry.balanced() {
            let err = RegistryError::WritersOutstanding {
                event: id.name(),
                writers: entry.writers_created,
                handles: entry.handles_registered,
            };
            return Err(self.violation(err));
        }

        let handle = JobHandle::combine(&input, &entry.producers);
        entry.consumers = JobHandle::combine(&entry.consumers, &handle);
        entry.draining = true;
        let readers = entry
            .streams
            .iter()
            .enumerate()
            .map(|(index, stream)| stream.reader().map(|reader| ReaderEntry { index, reader }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((handle, readers))
    }

    /// Make the disposal of `T`'s current streams wait for `handle` too.
    ///
    /// For consumers whose jobs keep reading after the call that obtained
    /// the readers has returned.
    pub fn add_consumer_handle<T: EventRecord>(&mut self, handle: JobHandle) {
        if let Some(entry) = self.entries.get_mut(&EventTypeId::of::<T>()) {
            entry.consumers = JobHandle::combine(&entry.consumers, &handle);
        }
    }

    /// Dispose every stream of every event type and clear the registry.
    ///
    /// Streams whose producers and consumers have all completed are freed
    /// now; the rest are freed by jobs depending on those handles. The
    /// returned handle completes once everything has been released.
    pub fn dispose(&mut self) -> JobHandle {
        let mut handles = vec![std::mem::take(&mut self.retired)];
        for (id, entry) in self.entries.drain(..) {
            if !entry.balanced() {
                tracing::warn!(
                    event = %id,
                    writers = entry.writers_created,
                    handles = entry.handles_registered,
                    "disposing streams with unpaired writers"
                );
            }
            let dependency = entry.retirement_dependency();
            handles.push(dispose_streams(
                entry.streams,
                dependency,
                &*self.scheduler,
                &mut self.metrics,
            ));
        }
        tracing::debug!("event registry disposed");
        JobHandle::combine_all(&handles)
    }

    /// Writers created for `T` this cycle.
    pub fn writer_count<T: EventRecord>(&self) -> u32 {
        self.entry::<T>().map_or(0, |e| e.writers_created)
    }

    /// Streams held for `T` this cycle.
    pub fn stream_count<T: EventRecord>(&self) -> usize {
        self.entry::<T>().map_or(0, |e| e.streams.len())
    }

    /// Records written for `T` this cycle, across all streams.
    pub fn event_count<T: EventRecord>(&self) -> usize {
        self.entry::<T>()
            .map_or(0, |e| e.streams.iter().map(Stream::element_count).sum())
    }

    /// Whether readers have been requested for `T` this cycle.
    pub fn is_draining<T: EventRecord>(&self) -> bool {
        self.entry::<T>().is_some_and(|e| e.draining)
    }

    /// Current cycle of `T`. Zero before the first rollover.
    pub fn cycle<T: EventRecord>(&self) -> CycleId {
        self.entry::<T>().map_or(CycleId::default(), |e| e.cycle)
    }

    /// Number of event types with an entry.
    pub fn event_type_count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the lifecycle counters.
    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            pool: self.pool.stats(),
            ..self.metrics.clone()
        }
    }

    /// The scheduler running this registry's jobs.
    pub fn scheduler(&self) -> &Arc<dyn JobScheduler> {
        &self.scheduler
    }

    /// The block pool shared by every stream.
    pub fn block_pool(&self) -> &SharedBlockPool {
        &self.pool
    }

    /// The validated configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn entry<T: EventRecord>(&self) -> Option<&RegistryEntry> {
        self.entries.get(&EventTypeId::of::<T>())
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.entries.len())
            .field("worker_count", &self.scheduler.worker_count())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{completion, ConfigError, SlotId};
    use ripple_stream::StreamConfig;
    use std::time::Duration;

    fn registry() -> EventRegistry {
        EventRegistry::new(RegistryConfig {
            stream: StreamConfig::new(4),
            worker_count: Some(2),
            ..RegistryConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn second_writer_without_handle_is_rejected() {
        let mut reg = registry();
        let _w = reg.create_writer::<u32>().unwrap();
        assert_eq!(
            reg.create_writer::<u32>().unwrap_err(),
            RegistryError::UnpairedWriter { event: "u32" }
        );
        reg.add_producer_handle::<u32>(JobHandle::completed())
            .unwrap();
        assert!(reg.create_writer::<u32>().is_ok());
        assert_eq!(reg.writer_count::<u32>(), 2);
        assert_eq!(reg.metrics().protocol_violations, 1);
    }

    #[test]
    fn types_are_paired_independently() {
        let mut reg = registry();
        let _a = reg.create_writer::<u32>().unwrap();
        assert!(reg.create_writer::<u64>().is_ok());
        assert_eq!(reg.event_type_count(), 2);
    }

    #[test]
    fn handle_without_writer_is_rejected() {
        let mut reg = registry();
        assert_eq!(
            reg.add_producer_handle::<u8>(JobHandle::completed()),
            Err(RegistryError::NoOutstandingWriter { event: "u8" })
        );
        let _w = reg.create_writer::<u8>().unwrap();
        reg.add_producer_handle::<u8>(JobHandle::completed())
            .unwrap();
        assert!(reg
            .add_producer_handle::<u8>(JobHandle::completed())
            .is_err());
    }

    #[test]
    fn readers_require_balanced_writers() {
        let mut reg = registry();
        let _w = reg.create_writer::<u16>().unwrap();
        assert_eq!(
            reg.get_readers::<u16>(JobHandle::completed()).unwrap_err(),
            RegistryError::WritersOutstanding {
                event: "u16",
                writers: 1,
                handles: 0
            }
        );
    }

    #[test]
    fn unknown_type_returns_input_and_no_readers() {
        let mut reg = registry();
        let (gate, input) = completion();
        let (handle, readers) = reg.get_readers::<i64>(input).unwrap();
        assert!(readers.is_empty());
        assert!(!handle.is_complete());
        gate.complete();
        assert!(handle.is_complete());
        assert_eq!(reg.event_type_count(), 0);
    }

    #[test]
    fn readers_come_back_in_creation_order() {
        let mut reg = registry();
        for n in 1..=3u32 {
            let writer = reg.create_writer::<u32>().unwrap();
            for i in 0..n {
                writer.write(SlotId::MAIN, i).unwrap();
            }
            reg.add_producer_handle::<u32>(JobHandle::completed())
                .unwrap();
        }
        let (_, readers) = reg.get_readers::<u32>(JobHandle::completed()).unwrap();
        let counts: Vec<_> = readers.iter().map(|r| (r.index(), r.count())).collect();
        assert_eq!(counts, vec![(0, 1), (1, 2), (2, 3)]);
        assert!(reg.is_draining::<u32>());
        // Asking again does not clear the list.
        let (_, again) = reg.get_readers::<u32>(JobHandle::completed()).unwrap();
        assert_eq!(again.len(), 3);
    }

    #[test]
    fn reader_handle_waits_for_producers() {
        let mut reg = registry();
        let _w = reg.create_writer::<u32>().unwrap();
        let (producer_done, producer) = completion();
        reg.add_producer_handle::<u32>(producer).unwrap();
        let (handle, _) = reg.get_readers::<u32>(JobHandle::completed()).unwrap();
        assert!(!handle.is_complete());
        producer_done.complete();
        assert!(handle.is_complete());
    }

    #[test]
    fn writer_after_drain_starts_new_cycle() {
        let mut reg = registry();
        let writer = reg.create_writer::<u32>().unwrap();
        writer.write(SlotId::MAIN, 7u32).unwrap();
        reg.add_producer_handle::<u32>(JobHandle::completed())
            .unwrap();
        let _ = reg.get_readers::<u32>(JobHandle::completed()).unwrap();

        let _next = reg.create_writer::<u32>().unwrap();
        assert_eq!(reg.cycle::<u32>(), CycleId(1));
        assert_eq!(reg.stream_count::<u32>(), 1);
        assert_eq!(reg.event_count::<u32>(), 0);
        assert!(!reg.is_draining::<u32>());

        let m = reg.metrics();
        assert_eq!(m.streams_created, 2);
        assert_eq!(m.streams_disposed, 1);
        assert_eq!(m.cycles_started, 2);
        assert_eq!(m.pool.pooled, 1);
    }

    #[test]
    fn rollover_defers_behind_pending_consumer() {
        let mut reg = registry();
        let writer = reg.create_writer::<u32>().unwrap();
        writer.write(SlotId::MAIN, 1u32).unwrap();
        reg.add_producer_handle::<u32>(JobHandle::completed())
            .unwrap();
        let _ = reg.get_readers::<u32>(JobHandle::completed()).unwrap();
        let (consumer_done, consumer) = completion();
        reg.add_consumer_handle::<u32>(consumer);

        let _next = reg.create_writer::<u32>().unwrap();
        assert_eq!(reg.metrics().deferred_disposals, 1);
        assert_eq!(reg.metrics().pool.pooled, 0);

        consumer_done.complete();
        reg.dispose().wait();
        assert_eq!(reg.metrics().pool.pooled, 1);
    }

    #[test]
    fn pending_rollover_leaves_workers_free_for_producers() {
        let mut reg = registry();
        for _ in 0..2 {
            let writer = reg.create_writer::<u32>().unwrap();
            writer.write(SlotId::MAIN, 1u32).unwrap();
            reg.add_producer_handle::<u32>(JobHandle::completed())
                .unwrap();
        }
        let _ = reg.get_readers::<u32>(JobHandle::completed()).unwrap();
        let (consumer_done, consumer) = completion();
        reg.add_consumer_handle::<u32>(consumer);

        let writer = reg.create_writer::<u32>().unwrap();
        assert_eq!(reg.metrics().deferred_disposals, 2);
        let producer = reg.scheduler().schedule(
            JobHandle::completed(),
            Box::new(move |slot| {
                writer.write(slot, 9u32).unwrap();
            }),
        );
        assert!(producer.wait_timeout(Duration::from_secs(5)));
        assert!(!producer.is_failed());
        reg.add_producer_handle::<u32>(producer).unwrap();
        assert_eq!(reg.event_count::<u32>(), 1);
        assert_eq!(reg.metrics().pool.pooled, 0);

        consumer_done.complete();
        reg.dispose().wait();
        assert_eq!(reg.metrics().pool.pooled, 3);
    }

    #[test]
    fn slot_hint_sizes_the_new_stream() {
        let mut reg = EventRegistry::new(RegistryConfig {
            stream: StreamConfig::new(8),
            worker_count: Some(2),
            ..RegistryConfig::default()
        })
        .unwrap();
        let writer = reg.create_writer_with_slots::<u32>(4).unwrap();
        assert!(writer.slot(SlotId(3)).is_ok());
        assert!(writer.slot(SlotId(4)).is_err());
        reg.add_producer_handle::<u32>(JobHandle::completed())
            .unwrap();

        let err = reg.create_writer_with_slots::<u32>(2).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Config(ConfigError::SlotsBelowWorkers {
                slots: 2,
                workers: 2
            })
        );
        assert_eq!(reg.writer_count::<u32>(), 1);

        let capped = reg.create_writer_with_slots::<u32>(64).unwrap();
        assert!(capped.slot(SlotId(7)).is_ok());
        assert!(capped.slot(SlotId(8)).is_err());
    }

    #[test]
    fn dispose_clears_every_type() {
        let mut reg = registry();
        let _a = reg.create_writer::<u32>().unwrap();
        reg.add_producer_handle::<u32>(JobHandle::completed())
            .unwrap();
        let _b = reg.create_writer::<u64>().unwrap();
        reg.add_producer_handle::<u64>(JobHandle::completed())
            .unwrap();
        let done = reg.dispose();
        assert!(done.is_complete());
        assert_eq!(reg.event_type_count(), 0);
        assert_eq!(reg.metrics().streams_disposed, 2);
        assert_eq!(reg.metrics().live_streams(), 0);
    }

    #[test]
    fn temp_allocator_rejected_at_construction() {
        let err = EventRegistry::new(RegistryConfig {
            allocator: ripple_core::Allocator::Temp,
            stream: StreamConfig::new(4),
            worker_count: Some(2),
            ..RegistryConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }
}
