//! Consumer operations over reader lists.
//!
//! The free functions are pure algorithms over a list of
//! [`ReaderEntry`] values and touch no registry state. The
//! `EventRegistry` methods at the bottom wrap them as scheduled jobs:
//! each fetches the readers, schedules the work behind the returned
//! handle, and registers the job as a consumer so the streams outlive it.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::{IndexMap, IndexSet};

use ripple_core::{Allocator, ConfigError, EventRecord, JobHandle, JobOutput, SlotId};
use ripple_stream::StreamError;

use crate::error::RegistryError;
use crate::registry::{EventRegistry, ReaderEntry};

/// Containers that can reserve room for additional entries up front.
pub trait ReserveCapacity {
    /// Entries currently held.
    fn entry_count(&self) -> usize;

    /// Entries the container can hold without reallocating.
    fn capacity(&self) -> usize;

    /// Reserve room for at least `additional` more entries.
    fn reserve(&mut self, additional: usize);
}

impl<K: Eq + Hash, V, S: BuildHasher> ReserveCapacity for HashMap<K, V, S> {
    fn entry_count(&self) -> usize {
        self.len()
    }
    fn capacity(&self) -> usize {
        HashMap::capacity(self)
    }
    fn reserve(&mut self, additional: usize) {
        HashMap::reserve(self, additional);
    }
}

impl<T: Eq + Hash, S: BuildHasher> ReserveCapacity for HashSet<T, S> {
    fn entry_count(&self) -> usize {
        self.len()
    }
    fn capacity(&self) -> usize {
        HashSet::capacity(self)
    }
    fn reserve(&mut self, additional: usize) {
        HashSet::reserve(self, additional);
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> ReserveCapacity for IndexMap<K, V, S> {
    fn entry_count(&self) -> usize {
        self.len()
    }
    fn capacity(&self) -> usize {
        IndexMap::capacity(self)
    }
    fn reserve(&mut self, additional: usize) {
        IndexMap::reserve(self, additional);
    }
}

impl<T: Eq + Hash, S: BuildHasher> ReserveCapacity for IndexSet<T, S> {
    fn entry_count(&self) -> usize {
        self.len()
    }
    fn capacity(&self) -> usize {
        IndexSet::capacity(self)
    }
    fn reserve(&mut self, additional: usize) {
        IndexSet::reserve(self, additional);
    }
}

impl<T> ReserveCapacity for Vec<T> {
    fn entry_count(&self) -> usize {
        self.len()
    }
    fn capacity(&self) -> usize {
        Vec::capacity(self)
    }
    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }
}

/// Record count of each reader, in list order.
pub fn count_per_reader(readers: &[ReaderEntry]) -> Vec<usize> {
    readers.iter().map(ReaderEntry::count).collect()
}

/// Sum of per-reader counts.
pub fn sum(counts: &[usize]) -> usize {
    counts.iter().sum()
}

/// Reserve so that `map` can take every counted record on top of its
/// current entries without resizing.
pub fn ensure_capacity<M: ReserveCapacity + ?Sized>(map: &mut M, counts: &[usize]) {
    let total = sum(counts);
    if map.capacity() < map.entry_count() + total {
        map.reserve(total);
    }
}

/// Every record of every reader in one vector: reader order, then slot
/// order, then write order within a slot.
pub fn flatten_to_list<T: EventRecord>(readers: &[ReaderEntry]) -> Result<Vec<T>, StreamError> {
    let total = sum(&count_per_reader(readers));
    let mut out = Vec::with_capacity(total);
    for entry in readers {
        let mut reader = entry.reader().clone();
        for slot in 0..reader.slot_count() {
            let mut pass = reader.begin_slot(SlotId(slot))?;
            for _ in 0..pass.count() {
                out.push(pass.read::<T>()?);
            }
            pass.end()?;
        }
    }
    Ok(out)
}

impl EventRegistry {
    /// Schedule one counting job per reader, each writing its count into
    /// its own index, plus a final job collecting them into `out`. The
    /// counting jobs run after `input` and every producer of `T`; the
    /// returned handle completes once `out` is set.
    pub fn count_events<T: EventRecord>(
        &mut self,
        input: JobHandle,
        out: JobOutput<Vec<usize>>,
    ) -> Result<JobHandle, RegistryError> {
        let (dependency, readers) = self.get_readers::<T>(input)?;
        let scheduler = Arc::clone(self.scheduler());
        let counts: Arc<[AtomicUsize]> = readers.iter().map(|_| AtomicUsize::new(0)).collect();
        let per_reader: Vec<JobHandle> = readers
            .into_iter()
            .map(|entry| {
                let counts = Arc::clone(&counts);
                scheduler.schedule(
                    dependency.clone(),
                    Box::new(move |_slot| {
                        counts[entry.index()].store(entry.count(), Ordering::Relaxed);
                    }),
                )
            })
            .collect();
        let counted = JobHandle::combine(&dependency, &JobHandle::combine_all(&per_reader));
        let job = scheduler.schedule(
            counted,
            Box::new(move |_slot| {
                out.set(counts.iter().map(|c| c.load(Ordering::Relaxed)).collect());
            }),
        );
        self.add_consumer_handle::<T>(job.clone());
        Ok(job)
    }

    /// Schedule a job reserving room in `map` for every record of `T`.
    pub fn ensure_capacity<T, M>(
        &mut self,
        input: JobHandle,
        map: Arc<Mutex<M>>,
    ) -> Result<JobHandle, RegistryError>
    where
        T: EventRecord,
        M: ReserveCapacity + Send + 'static,
    {
        let (dependency, readers) = self.get_readers::<T>(input)?;
        let job = self.scheduler().schedule(
            dependency,
            Box::new(move |_slot| {
                let counts = count_per_reader(&readers);
                let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
                ensure_capacity(&mut *map, &counts);
            }),
        );
        self.add_consumer_handle::<T>(job.clone());
        Ok(job)
    }

    /// Schedule a job flattening every record of `T` into a list.
    ///
    /// The output must outlive this call, so the `Temp` allocator tag is
    /// rejected.
    pub fn to_list<T: EventRecord>(
        &mut self,
        input: JobHandle,
        allocator: Allocator,
    ) -> Result<(JobHandle, JobOutput<Result<Vec<T>, StreamError>>), RegistryError> {
        if !allocator.outlives_call() {
            return Err(ConfigError::DisallowedAllocator {
                allocator,
                operation: "EventRegistry::to_list",
            }
            .into());
        }
        let (dependency, readers) = self.get_readers::<T>(input)?;
        let output = JobOutput::new();
        let sink = output.clone();
        let job = self.scheduler().schedule(
            dependency,
            Box::new(move |_slot| sink.set(flatten_to_list::<T>(&readers))),
        );
        self.add_consumer_handle::<T>(job.clone());
        Ok((job, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sum_of_counts() {
        assert_eq!(sum(&[]), 0);
        assert_eq!(sum(&[3, 0, 4]), 7);
    }

    #[test]
    fn ensure_capacity_leaves_room_for_existing_plus_total() {
        let mut map: HashMap<u32, u32> = (0..5).map(|i| (i, i)).collect();
        ensure_capacity(&mut map, &[10, 20]);
        assert!(map.capacity() >= 35);
        let capacity = map.capacity();
        for i in 5..35 {
            map.insert(i, i);
        }
        assert_eq!(map.capacity(), capacity);
    }

    #[test]
    fn ensure_capacity_is_noop_when_room_exists() {
        let mut v: Vec<u8> = Vec::with_capacity(64);
        ensure_capacity(&mut v, &[8]);
        assert_eq!(v.capacity(), 64);
    }

    #[test]
    fn index_containers_reserve() {
        let mut map: IndexMap<u64, ()> = IndexMap::new();
        ensure_capacity(&mut map, &[100]);
        assert!(map.capacity() >= 100);
        let mut set: IndexSet<u64> = IndexSet::new();
        ensure_capacity(&mut set, &[7, 7]);
        assert!(set.capacity() >= 14);
        let mut hs: HashSet<u64> = HashSet::new();
        ensure_capacity(&mut hs, &[3]);
        assert!(hs.capacity() >= 3);
    }

    proptest! {
        #[test]
        fn ensure_capacity_covers_any_counts(
            existing in 0usize..200,
            counts in proptest::collection::vec(0usize..100, 0..8),
        ) {
            let mut v: Vec<u32> = (0..existing as u32).collect();
            ensure_capacity(&mut v, &counts);
            prop_assert!(v.capacity() >= existing + sum(&counts));
        }
    }
}
