//! Single-slot cache of the full role list.

use std::future::Future;

use roster_core::{Role, RosterResult};

use super::keyed::KeyedCache;
use super::stats::CacheStats;

/// Cache of every role known to the backing store.
///
/// Uses the same coalescing discipline as [`KeyedCache`] over a single unit
/// key. Any role mutation clears it wholesale.
pub struct AllRolesCache {
    slot: KeyedCache<(), Vec<Role>>,
}

impl Default for AllRolesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AllRolesCache {
    pub fn new() -> Self {
        Self {
            slot: KeyedCache::new("all_roles"),
        }
    }

    /// Cached role list, loading it with `loader` when absent.
    ///
    /// Every caller gets its own copy of the list.
    pub async fn get<F, Fut>(&self, loader: F) -> RosterResult<Vec<Role>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RosterResult<Vec<Role>>>,
    {
        self.slot.get_or_load(&(), loader).await
    }

    /// Drop the cached list. A load in flight will not repopulate it.
    pub fn clear(&self) -> RosterResult<()> {
        self.slot.invalidate(&())?;
        Ok(())
    }

    pub fn is_cached(&self) -> RosterResult<bool> {
        Ok(!self.slot.is_empty()?)
    }

    pub fn stats(&self) -> RosterResult<CacheStats> {
        self.slot.stats()
    }
}
