use crate::{ContainerKey, Slot, Weigh};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

/// Counters since the cache was created, plus what it holds right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Entries dropped to stay within budget or because their container
    /// key went stale.
    pub evictions: u64,
    /// Resident bytes.
    pub bytes: u64,
    pub entries: usize,
}

struct Item<V> {
    value: V,
    weight: u64,
    last_used: AtomicU64,
}

struct Inner<V> {
    entries: HashMap<(blake3::Hash, Slot), Item<V>>,
    /// The newest key seen for each path, with its modification time.
    current: HashMap<PathBuf, (blake3::Hash, i128)>,
    bytes: u64,
}

/// How a key relates to the newest key seen for its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Standing {
    Current,
    /// First sighting of the path, or the file changed since.
    Newer,
    /// An older version of a file the cache has already seen replaced.
    Superseded,
}

impl<V> Inner<V> {
    fn standing(&self, key: &ContainerKey) -> Standing {
        match self.current.get(key.path()) {
            Some((digest, _)) if *digest == key.digest() => Standing::Current,
            Some((_, modified)) if key.modified() < *modified => Standing::Superseded,
            _ => Standing::Newer,
        }
    }

    /// Make `key` current for its path, dropping everything cached under
    /// the key it replaces. Returns how many entries were dropped.
    fn promote(&mut self, key: &ContainerKey) -> u64 {
        let previous = self.current.insert(key.path().to_path_buf(), (key.digest(), key.modified()));
        let Some((previous, _)) = previous.filter(|(previous, _)| *previous != key.digest()) else {
            return 0;
        };
        let mut dropped = 0;
        self.entries.retain(|(digest, _), item| {
            if *digest != previous {
                return true;
            }
            self.bytes -= item.weight;
            dropped += 1;
            false
        });
        tracing::debug!(path = %key.path().display(), dropped, "Dropped entries for stale container key");
        dropped
    }

    fn evict_least_recent(&mut self) -> Option<u64> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, item)| item.last_used.load(Ordering::Relaxed))
            .map(|(slot, _)| *slot)?;
        let item = self.entries.remove(&victim)?;
        self.bytes -= item.weight;
        Some(item.weight)
    }
}

/// Decoded pages and covers shared by every open container.
///
/// Bounded by the total [`Weigh::weight`] of its values; once over budget the
/// least recently used entries are evicted. Lookups take only a shared lock
/// and record recency with atomics.
pub struct ExtractionCache<V> {
    budget: u64,
    inner: RwLock<Inner<V>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Weigh + Clone> ExtractionCache<V> {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget: budget_bytes,
            inner: RwLock::new(Inner { entries: HashMap::new(), current: HashMap::new(), bytes: 0 }),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a cached value.
    ///
    /// A key newer than the one last seen for its path (the file changed)
    /// drops the older key's entries and misses. A superseded key misses
    /// and leaves the newer entries alone.
    pub fn get(&self, key: &ContainerKey, slot: Slot) -> Option<V> {
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            match inner.standing(key) {
                Standing::Current => {
                    let found = inner.entries.get(&(key.digest(), slot)).map(|item| {
                        item.last_used.store(self.tick(), Ordering::Relaxed);
                        item.value.clone()
                    });
                    let counter = if found.is_some() { &self.hits } else { &self.misses };
                    counter.fetch_add(1, Ordering::Relaxed);
                    return found;
                },
                Standing::Superseded => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                },
                Standing::Newer => {},
            }
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Re-checked: another writer may have moved on while unlocked.
        if inner.standing(key) == Standing::Newer {
            let dropped = inner.promote(key);
            self.evictions.fetch_add(dropped, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, evicting least recently used entries as needed.
    ///
    /// Returns `false` when the value alone is larger than the whole budget,
    /// or when `key` has been superseded by a newer version of its file;
    /// such values are never stored.
    #[instrument(skip(self, key, value), fields(key = %key))]
    pub fn insert(&self, key: &ContainerKey, slot: Slot, value: V) -> bool {
        let weight = value.weight();
        if weight > self.budget {
            tracing::debug!(weight, budget = self.budget, "Not caching value larger than the budget");
            return false;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.standing(key) == Standing::Superseded {
            tracing::debug!(path = %key.path().display(), "Not caching value for a superseded container key");
            return false;
        }
        let mut evicted = inner.promote(key);
        let item = Item { value, weight, last_used: AtomicU64::new(self.tick()) };
        if let Some(replaced) = inner.entries.insert((key.digest(), slot), item) {
            inner.bytes -= replaced.weight;
        }
        inner.bytes += weight;
        // The new item is the most recent, so it is never picked while
        // anything else is left, and it fits on its own.
        while inner.bytes > self.budget {
            let Some(freed) = inner.evict_least_recent() else {
                break;
            };
            tracing::trace!(freed, "Evicted least recently used entry");
            evicted += 1;
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        true
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes: inner.bytes,
            entries: inner.entries.len(),
        }
    }
}
