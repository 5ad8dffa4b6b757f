//! Keyed read-through cache with coalesced loads.
//!
//! Each key owns a slot holding a [`VersionedEntry`] and, while a backing
//! fetch is running, an in-flight token. The first reader of a missing key
//! registers the token and owns the load; readers arriving later attach to
//! the token and wait for the owner's published result instead of issuing
//! their own fetch.
//!
//! # Per-key state
//!
//! ```text
//! Absent ── get_or_load ──→ Loading ── Ok ──→ Present ── put ──→ Present'
//!                              │                  │
//!                              └── Err ──→ Absent └── invalidate ──→ Absent
//! ```
//!
//! A load commits with [`VersionedEntry::try_commit`] against the generation
//! observed when it was registered. A `put` or `invalidate` landing while the
//! load is in flight advances the generation, so the late result is dropped
//! and the newer state stands. If the key was removed while loading, the
//! owner goes back to the key map and serves whatever is there now,
//! reloading if it has to; its waiters get that answer, never the fetch that
//! was overtaken.
//!
//! Removed slots are marked detached. A reader that picked up a slot just
//! before it was removed sees the mark and starts over from the map.
//!
//! # Locking
//!
//! The key map and each slot are guarded by `std::sync::Mutex`. The map lock
//! is always taken before a slot lock, and neither is held across an
//! `.await`: backing fetches run with no lock held, and waiters block on the
//! in-flight token only.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use roster_core::{RosterResult, StorageError};
use tokio::sync::watch;

use super::stats::{CacheStats, StatsCounters};
use super::versioned::VersionedEntry;

/// Secondary index over the keys of a [`KeyedCache`].
///
/// Maintained inside the same critical section as the key map, so an index
/// lookup followed by removal never races with inserts.
pub trait KeyIndex<K>: Default + Send {
    /// Record a key that just gained a slot.
    fn insert(&mut self, key: &K);

    /// Forget a key whose slot was removed.
    fn remove(&mut self, key: &K);

    /// Forget every key.
    fn clear(&mut self);
}

/// Index that tracks nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndex;

impl<K> KeyIndex<K> for NoIndex {
    fn insert(&mut self, _key: &K) {}

    fn remove(&mut self, _key: &K) {}

    fn clear(&mut self) {}
}

/// Result published by the owner of a load; `None` until it finishes.
type LoadOutcome<V> = Option<RosterResult<V>>;

struct InFlight<V> {
    id: u64,
    outcome: watch::Receiver<LoadOutcome<V>>,
}

struct SlotState<V> {
    entry: VersionedEntry<V>,
    loading: Option<InFlight<V>>,
    detached: bool,
}

impl<V> SlotState<V> {
    fn is_vacant(&self) -> bool {
        !self.entry.is_present() && self.loading.is_none()
    }

    /// Mark the slot as gone from the key map. Clearing bumps the
    /// generation, so a load still running on it cannot commit.
    fn retire(&mut self) {
        self.entry.clear();
        self.detached = true;
    }
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                entry: VersionedEntry::default(),
                loading: None,
                detached: false,
            }),
        }
    }
}

struct Shard<K, V, I> {
    slots: HashMap<K, Arc<Slot<V>>>,
    index: I,
}

impl<K, V, I> Shard<K, V, I>
where
    K: Eq + Hash + Clone,
    I: KeyIndex<K>,
{
    fn slot(&mut self, key: &K) -> Arc<Slot<V>> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(Slot::new());
        self.slots.insert(key.clone(), Arc::clone(&slot));
        self.index.insert(key);
        slot
    }

    /// Remove `key` from the map and retire its slot.
    fn detach(&mut self, key: &K) -> RosterResult<bool> {
        let Some(slot) = self.slots.remove(key) else {
            return Ok(false);
        };
        self.index.remove(key);
        lock(&slot.state)?.retire();
        Ok(true)
    }

    /// Remove `key` if `slot` is still its slot and holds nothing.
    fn prune_if_vacant(&mut self, key: &K, slot: &Arc<Slot<V>>) -> RosterResult<()> {
        let current = self
            .slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if !current {
            return Ok(());
        }
        {
            let mut state = lock(&slot.state)?;
            if !state.is_vacant() {
                return Ok(());
            }
            state.retire();
        }
        self.slots.remove(key);
        self.index.remove(key);
        Ok(())
    }
}

/// What a reader does after inspecting a slot.
enum Begin<V> {
    Hit(V),
    Wait(watch::Receiver<LoadOutcome<V>>),
    Load {
        id: u64,
        observed: u64,
        publish: watch::Sender<LoadOutcome<V>>,
    },
    /// The slot left the key map after it was looked up.
    Detached,
}

/// How a finished load ends.
enum Finish<V> {
    Done(RosterResult<V>),
    /// The key was removed while loading; the result must not be served.
    Superseded,
}

/// Ends a load: withdraws the in-flight token if it is still ours and drops
/// the slot from the map when nothing is left in it. Runs on completion and
/// when the owning future is dropped, so waiters of a cancelled owner retry
/// instead of waiting forever.
struct LoadGuard<'a, K, V, I>
where
    K: Eq + Hash + Clone,
    I: KeyIndex<K>,
{
    shard: &'a Mutex<Shard<K, V, I>>,
    key: &'a K,
    slot: Arc<Slot<V>>,
    id: u64,
}

impl<K, V, I> Drop for LoadGuard<'_, K, V, I>
where
    K: Eq + Hash + Clone,
    I: KeyIndex<K>,
{
    fn drop(&mut self) {
        let Ok(mut shard) = self.shard.lock() else {
            return;
        };
        if let Ok(mut state) = self.slot.state.lock() {
            if state.loading.as_ref().is_some_and(|f| f.id == self.id) {
                state.loading = None;
            }
        }
        let _ = shard.prune_if_vacant(self.key, &self.slot);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> RosterResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StorageError::LockPoisoned.into())
}

/// Concurrency-safe key to value cache with stampede-free loading.
///
/// `I` is an optional secondary index kept in step with the key set; see
/// [`KeyIndex`].
pub struct KeyedCache<K, V, I = NoIndex> {
    name: &'static str,
    shard: Mutex<Shard<K, V, I>>,
    next_load_id: AtomicU64,
    counters: StatsCounters,
}

impl<K, V, I> KeyedCache<K, V, I>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Clone + Send + Sync,
    I: KeyIndex<K>,
{
    /// Create an empty cache. `name` labels log events and stats.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shard: Mutex::new(Shard {
                slots: HashMap::new(),
                index: I::default(),
            }),
            next_load_id: AtomicU64::new(1),
            counters: StatsCounters::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the cached value for `key`, loading it with `loader` on a miss.
    ///
    /// Concurrent callers for the same missing key share one `loader`
    /// invocation and all receive its result, success or error. Errors are
    /// never cached. `loader` may be called again if the caller that owned a
    /// load was dropped before finishing it, or if the key was removed while
    /// the load was running.
    pub async fn get_or_load<F, Fut>(&self, key: &K, loader: F) -> RosterResult<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RosterResult<V>>,
    {
        self.get_or_load_retaining(key, loader, |_| true).await
    }

    /// Like [`get_or_load`](Self::get_or_load), but a loaded value is only
    /// committed when `retain` accepts it. Rejected values are still returned
    /// to the caller and to every attached waiter.
    pub async fn get_or_load_retaining<F, Fut, R>(
        &self,
        key: &K,
        loader: F,
        retain: R,
    ) -> RosterResult<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RosterResult<V>>,
        R: Fn(&V) -> bool,
    {
        // Waiters of loads this caller owned but that were superseded.
        let mut handed_over: Vec<watch::Sender<LoadOutcome<V>>> = Vec::new();
        loop {
            let slot = self.slot_for(key)?;
            match self.begin(&slot)? {
                Begin::Hit(value) => {
                    self.counters.hit();
                    tracing::trace!(cache = self.name, key = ?key, "cache hit");
                    let result = Ok(value);
                    publish_all(&handed_over, &result);
                    return result;
                }
                Begin::Wait(outcome) => {
                    self.counters.coalesced();
                    tracing::trace!(cache = self.name, key = ?key, "attached to in-flight load");
                    match wait_for_outcome(outcome).await {
                        Some(result) => {
                            publish_all(&handed_over, &result);
                            return result;
                        }
                        None => {
                            tracing::debug!(
                                cache = self.name,
                                key = ?key,
                                "in-flight load abandoned, retrying"
                            );
                        }
                    }
                }
                Begin::Detached => {
                    tracing::trace!(cache = self.name, key = ?key, "slot removed under reader, retrying");
                }
                Begin::Load {
                    id,
                    observed,
                    publish,
                } => {
                    self.counters.miss();
                    tracing::debug!(
                        cache = self.name,
                        key = ?key,
                        generation = observed,
                        "loading from backing store"
                    );
                    let guard = LoadGuard {
                        shard: &self.shard,
                        key,
                        slot: Arc::clone(&slot),
                        id,
                    };
                    let loaded = loader().await;
                    let finish = self.finish(key, &slot, id, observed, loaded, &retain)?;
                    drop(guard);
                    match finish {
                        Finish::Done(result) => {
                            // No receivers left is fine; the result still goes to our caller.
                            let _ = publish.send(Some(result.clone()));
                            publish_all(&handed_over, &result);
                            return result;
                        }
                        Finish::Superseded => handed_over.push(publish),
                    }
                }
            }
        }
    }

    /// Install `value` for `key` unconditionally, superseding any load in
    /// flight for that key.
    pub fn put(&self, key: K, value: V) -> RosterResult<()> {
        let mut shard = lock(&self.shard)?;
        let slot = shard.slot(&key);
        let mut state = lock(&slot.state)?;
        state.entry.force_commit(value);
        tracing::debug!(
            cache = self.name,
            key = ?key,
            generation = state.entry.generation(),
            "write committed"
        );
        Ok(())
    }

    /// Remove `key`. A load in flight for it will not be committed.
    ///
    /// Returns whether the key had a slot.
    pub fn invalidate(&self, key: &K) -> RosterResult<bool> {
        let mut shard = lock(&self.shard)?;
        let removed = shard.detach(key)?;
        if removed {
            tracing::debug!(cache = self.name, key = ?key, "invalidated");
        }
        Ok(removed)
    }

    /// Remove every key accepted by `predicate`. Scans the whole key set.
    pub fn invalidate_matching<P>(&self, predicate: P) -> RosterResult<usize>
    where
        P: Fn(&K) -> bool,
    {
        let mut shard = lock(&self.shard)?;
        let doomed: Vec<K> = shard
            .slots
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        self.detach_all(&mut shard, &doomed)
    }

    /// Remove the keys that `select` picks out of the secondary index.
    pub fn invalidate_indexed<F>(&self, select: F) -> RosterResult<usize>
    where
        F: FnOnce(&I) -> Vec<K>,
    {
        let mut shard = lock(&self.shard)?;
        let doomed = select(&shard.index);
        self.detach_all(&mut shard, &doomed)
    }

    /// Remove every key. Loads in flight will not be committed.
    pub fn clear(&self) -> RosterResult<usize> {
        let mut shard = lock(&self.shard)?;
        shard.index.clear();
        let drained: Vec<Arc<Slot<V>>> = shard.slots.drain().map(|(_, slot)| slot).collect();
        for slot in &drained {
            lock(&slot.state)?.retire();
        }
        tracing::debug!(cache = self.name, removed = drained.len(), "cleared");
        Ok(drained.len())
    }

    /// Copy of the keys that currently hold a value.
    pub fn keys(&self) -> RosterResult<Vec<K>> {
        let shard = lock(&self.shard)?;
        let mut keys = Vec::with_capacity(shard.slots.len());
        for (key, slot) in shard.slots.iter() {
            if lock(&slot.state)?.entry.is_present() {
                keys.push(key.clone());
            }
        }
        Ok(keys)
    }

    /// Cached value for `key`, without loading.
    pub fn peek(&self, key: &K) -> RosterResult<Option<V>> {
        let shard = lock(&self.shard)?;
        match shard.slots.get(key) {
            Some(slot) => Ok(lock(&slot.state)?.entry.value().cloned()),
            None => Ok(None),
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> RosterResult<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> RosterResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> RosterResult<CacheStats> {
        let entries = self.len()? as u64;
        Ok(self.counters.snapshot(entries))
    }

    fn slot_for(&self, key: &K) -> RosterResult<Arc<Slot<V>>> {
        Ok(lock(&self.shard)?.slot(key))
    }

    fn begin(&self, slot: &Slot<V>) -> RosterResult<Begin<V>> {
        let mut state = lock(&slot.state)?;
        if state.detached {
            return Ok(Begin::Detached);
        }
        if let Some(value) = state.entry.value() {
            return Ok(Begin::Hit(value.clone()));
        }
        if let Some(in_flight) = &state.loading {
            return Ok(Begin::Wait(in_flight.outcome.clone()));
        }
        let (publish, outcome) = watch::channel(None);
        let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
        state.loading = Some(InFlight { id, outcome });
        Ok(Begin::Load {
            id,
            observed: state.entry.generation(),
            publish,
        })
    }

    fn finish<R>(
        &self,
        key: &K,
        slot: &Slot<V>,
        id: u64,
        observed: u64,
        loaded: RosterResult<V>,
        retain: &R,
    ) -> RosterResult<Finish<V>>
    where
        R: Fn(&V) -> bool,
    {
        let mut state = lock(&slot.state)?;
        if state.loading.as_ref().is_some_and(|f| f.id == id) {
            state.loading = None;
        }

        let value = match loaded {
            Ok(value) => value,
            Err(err) => {
                self.counters.failed();
                tracing::warn!(
                    cache = self.name,
                    key = ?key,
                    error = %err,
                    "backing store load failed, nothing cached"
                );
                return Ok(Finish::Done(Err(err)));
            }
        };

        if state.entry.generation() != observed {
            self.counters.discarded();
            tracing::debug!(
                cache = self.name,
                key = ?key,
                observed,
                current = state.entry.generation(),
                "stale load discarded, newer state stands"
            );
            // A write on this slot beat us: serve it. A removal leaves
            // nothing here, so the caller starts over from the key map.
            return Ok(match state.entry.value() {
                Some(current) => Finish::Done(Ok(current.clone())),
                None => Finish::Superseded,
            });
        }

        if retain(&value) && state.entry.try_commit(value.clone(), observed) {
            tracing::debug!(
                cache = self.name,
                key = ?key,
                generation = state.entry.generation(),
                "load committed"
            );
        }
        Ok(Finish::Done(Ok(value)))
    }

    fn detach_all(&self, shard: &mut Shard<K, V, I>, keys: &[K]) -> RosterResult<usize> {
        let mut removed = 0;
        for key in keys {
            if shard.detach(key)? {
                removed += 1;
            }
        }
        tracing::debug!(cache = self.name, removed, "invalidated matching keys");
        Ok(removed)
    }
}

/// Pass a result on to waiters whose load was superseded.
fn publish_all<V: Clone>(senders: &[watch::Sender<LoadOutcome<V>>], result: &RosterResult<V>) {
    for sender in senders {
        let _ = sender.send(Some(result.clone()));
    }
}

/// Wait for the owner of a load to publish. `None` means the owner went
/// away without publishing.
async fn wait_for_outcome<V: Clone>(
    mut outcome: watch::Receiver<LoadOutcome<V>>,
) -> LoadOutcome<V> {
    loop {
        let current = outcome.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if outcome.changed().await.is_err() {
            return outcome.borrow().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::RosterError;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::{Barrier, Notify};

    type Cache = KeyedCache<u32, String>;

    fn counting_loader(
        loads: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl Fn() -> std::future::Ready<RosterResult<String>> {
        let loads = Arc::clone(loads);
        move || {
            loads.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value.to_string()))
        }
    }

    async fn wait_until_coalesced(cache: &Cache, expected: u64) {
        while cache.stats().unwrap().coalesced < expected {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = Cache::new("test");
        let loads = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_load(&1, counting_loader(&loads, "one")).await.unwrap();
        let second = cache.get_or_load(&1, counting_loader(&loads, "other")).await.unwrap();

        assert_eq!(first, "one");
        assert_eq!(second, "one");
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_load() {
        const WORKERS: usize = 10;
        let cache = Arc::new(Cache::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(WORKERS));

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_load(&7, || {
                        let loads = Arc::clone(&loads);
                        async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok("seven".to_string())
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "seven");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = Cache::new("test");

        let err = cache
            .get_or_load(&1, || async { Err(RosterError::backend("down")) })
            .await
            .unwrap_err();
        assert_eq!(err, RosterError::backend("down"));
        assert!(cache.keys().unwrap().is_empty());

        let loads = Arc::new(AtomicUsize::new(0));
        let value = cache.get_or_load(&1, counting_loader(&loads, "up")).await.unwrap();
        assert_eq!(value, "up");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().unwrap().failed_loads, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiters_observe_the_owner_error() {
        let cache = Arc::new(Cache::new("test"));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let owner = {
            let cache = Arc::clone(&cache);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || {
                        let entered = Arc::clone(&entered);
                        let release = Arc::clone(&release);
                        async move {
                            entered.notify_one();
                            release.notified().await;
                            Err(RosterError::backend("flaky"))
                        }
                    })
                    .await
            })
        };
        entered.notified().await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || async { Ok("must not run".to_string()) })
                    .await
            })
        };
        wait_until_coalesced(&cache, 1).await;
        release.notify_one();

        assert_eq!(owner.await.unwrap(), Err(RosterError::backend("flaky")));
        assert_eq!(waiter.await.unwrap(), Err(RosterError::backend("flaky")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_put_during_load_wins() {
        let cache = Arc::new(Cache::new("test"));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let reader = {
            let cache = Arc::clone(&cache);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || {
                        let entered = Arc::clone(&entered);
                        let release = Arc::clone(&release);
                        async move {
                            entered.notify_one();
                            release.notified().await;
                            Ok("stale".to_string())
                        }
                    })
                    .await
            })
        };

        entered.notified().await;
        cache.put(1, "fresh".to_string()).unwrap();
        release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), "fresh");
        assert_eq!(cache.peek(&1).unwrap(), Some("fresh".to_string()));
        assert_eq!(cache.stats().unwrap().discarded_loads, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidate_during_load_reloads_instead_of_serving_stale() {
        let cache = Arc::new(Cache::new("test"));
        let loads = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let reader = {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || {
                        let loads = Arc::clone(&loads);
                        let entered = Arc::clone(&entered);
                        let release = Arc::clone(&release);
                        async move {
                            let n = loads.fetch_add(1, Ordering::SeqCst) + 1;
                            entered.notify_one();
                            release.notified().await;
                            Ok(format!("load {n}"))
                        }
                    })
                    .await
            })
        };

        entered.notified().await;
        assert!(cache.invalidate(&1).unwrap());
        release.notify_one();

        // The first fetch started before the invalidation, so it is thrown
        // away and the reader fetches again.
        entered.notified().await;
        release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), "load 2");
        assert_eq!(cache.peek(&1).unwrap(), Some("load 2".to_string()));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().unwrap().discarded_loads, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiters_follow_a_superseded_load() {
        let cache = Arc::new(Cache::new("test"));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let owner = {
            let cache = Arc::clone(&cache);
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || {
                        let entered = Arc::clone(&entered);
                        let release = Arc::clone(&release);
                        async move {
                            entered.notify_one();
                            release.notified().await;
                            Ok("stale".to_string())
                        }
                    })
                    .await
            })
        };
        entered.notified().await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || async { Ok("must not run".to_string()) })
                    .await
            })
        };
        wait_until_coalesced(&cache, 1).await;

        cache.clear().unwrap();
        cache.put(1, "fresh".to_string()).unwrap();
        release.notify_one();

        assert_eq!(owner.await.unwrap().unwrap(), "fresh");
        assert_eq!(waiter.await.unwrap().unwrap(), "fresh");
        assert_eq!(cache.peek(&1).unwrap(), Some("fresh".to_string()));
    }

    #[test]
    fn test_detached_slot_sends_reader_back_to_map() {
        let cache = Cache::new("test");
        let slot = cache.slot_for(&1).unwrap();
        assert!(cache.invalidate(&1).unwrap());

        assert!(matches!(cache.begin(&slot).unwrap(), Begin::Detached));

        let fresh = cache.slot_for(&1).unwrap();
        assert!(!Arc::ptr_eq(&slot, &fresh));
        assert!(matches!(cache.begin(&fresh).unwrap(), Begin::Load { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_load_is_retried_by_waiter() {
        let cache = Arc::new(Cache::new("test"));
        let entered = Arc::new(Notify::new());

        let owner = {
            let cache = Arc::clone(&cache);
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || {
                        let entered = Arc::clone(&entered);
                        async move {
                            entered.notify_one();
                            std::future::pending::<RosterResult<String>>().await
                        }
                    })
                    .await
            })
        };
        entered.notified().await;

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load(&1, || async { Ok("second".to_string()) })
                    .await
            })
        };
        wait_until_coalesced(&cache, 1).await;
        owner.abort();

        assert_eq!(waiter.await.unwrap().unwrap(), "second");
        assert_eq!(cache.peek(&1).unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_values_are_not_retained() {
        let cache: KeyedCache<u32, Option<String>> = KeyedCache::new("test");
        let loads = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let loads = Arc::clone(&loads);
            let value = cache
                .get_or_load_retaining(
                    &1,
                    move || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        std::future::ready(Ok(None))
                    },
                    |value| value.is_some(),
                )
                .await
                .unwrap();
            assert_eq!(value, None);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_keys_is_a_snapshot() {
        let cache = Cache::new("test");
        for key in 1..=3 {
            cache.put(key, format!("v{key}")).unwrap();
        }

        let keys = cache.keys().unwrap();
        cache.clear().unwrap();

        let keys: BTreeSet<_> = keys.into_iter().collect();
        assert_eq!(keys, BTreeSet::from([1, 2, 3]));
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_invalidate_matching() {
        let cache = Cache::new("test");
        for key in 1..=6 {
            cache.put(key, key.to_string()).unwrap();
        }

        let removed = cache.invalidate_matching(|key| key % 2 == 0).unwrap();
        assert_eq!(removed, 3);

        let mut keys = cache.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![1, 3, 5]);
    }

    #[test]
    fn test_invalidate_missing_key() {
        let cache = Cache::new("test");
        assert!(!cache.invalidate(&42).unwrap());
    }

    #[derive(Default)]
    struct EvenKeys(BTreeSet<u32>);

    impl KeyIndex<u32> for EvenKeys {
        fn insert(&mut self, key: &u32) {
            if key % 2 == 0 {
                self.0.insert(*key);
            }
        }

        fn remove(&mut self, key: &u32) {
            self.0.remove(key);
        }

        fn clear(&mut self) {
            self.0.clear();
        }
    }

    #[test]
    fn test_index_tracks_slots() {
        let cache: KeyedCache<u32, u32, EvenKeys> = KeyedCache::new("indexed");
        for key in 1..=4 {
            cache.put(key, key * 10).unwrap();
        }

        let removed = cache
            .invalidate_indexed(|even| even.0.iter().copied().collect())
            .unwrap();
        assert_eq!(removed, 2);

        // The index forgot the removed keys, so a second pass is a no-op.
        let removed = cache
            .invalidate_indexed(|even| even.0.iter().copied().collect())
            .unwrap();
        assert_eq!(removed, 0);

        let mut keys = cache.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![1, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_load_without_waiters_leaves_no_slot() {
        let cache: Arc<KeyedCache<u32, u32, EvenKeys>> = Arc::new(KeyedCache::new("indexed"));
        let entered = Arc::new(Notify::new());

        let owner = {
            let cache = Arc::clone(&cache);
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                cache
                    .get_or_load(&2, || {
                        let entered = Arc::clone(&entered);
                        async move {
                            entered.notify_one();
                            std::future::pending::<RosterResult<u32>>().await
                        }
                    })
                    .await
            })
        };
        entered.notified().await;
        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());

        let indexed = cache
            .invalidate_indexed(|even| even.0.iter().copied().collect())
            .unwrap();
        assert_eq!(indexed, 0);
        assert!(!cache.invalidate(&2).unwrap());
        assert_eq!(cache.name(), "indexed");
    }
}
