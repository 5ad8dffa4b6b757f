//! Generation-stamped cache slot.
//!
//! A [`VersionedEntry`] pairs a value with a write generation. Every write
//! and every clear advances the generation, so a reader that recorded the
//! generation before a slow fetch can later tell whether anything landed in
//! the meantime:
//!
//! ```text
//! snapshot() ──→ (None, g0)            reader starts backing fetch
//!                 force_commit(v') ──→ g1   writer lands first
//! try_commit(v, g0) ──→ false          stale fetch is rejected, v' stands
//! ```
//!
//! The entry itself is not synchronized; its owner wraps it in a lock and
//! all methods take `&mut self` under that lock.

/// A cache slot holding an optional value and its write generation.
#[derive(Debug, Clone)]
pub struct VersionedEntry<T> {
    value: Option<T>,
    generation: u64,
}

impl<T> Default for VersionedEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            generation: 0,
        }
    }
}

impl<T: Clone> VersionedEntry<T> {
    /// Current value (cloned) and the generation it was observed at.
    pub fn snapshot(&self) -> (Option<T>, u64) {
        (self.value.clone(), self.generation)
    }
}

impl<T> VersionedEntry<T> {
    /// Create an empty entry at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the current value.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Install `value` only if no write or clear happened since
    /// `observed_generation` was read. Returns whether the commit happened.
    pub fn try_commit(&mut self, value: T, observed_generation: u64) -> bool {
        if self.generation != observed_generation {
            return false;
        }
        self.value = Some(value);
        self.generation += 1;
        true
    }

    /// Install `value` unconditionally. Used by the write path, whose value
    /// has already been accepted by the backing store.
    pub fn force_commit(&mut self, value: T) {
        self.value = Some(value);
        self.generation += 1;
    }

    /// Drop the value and advance the generation so that any load started
    /// before the clear loses its commit race.
    pub fn clear(&mut self) {
        self.value = None;
        self.generation += 1;
    }
}
