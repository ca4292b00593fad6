//! Recency cache for currency checks.

use crate::stats::CoreStats;
use crate::types::Timestamp;
use corral_meta::{ObjectKey, TypeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    Object(ObjectKey),
    Type(TypeId),
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    stamp: Timestamp,
    inserted: Instant,
}

/// Bounded cache of last-known modification stamps.
///
/// Used only to short-circuit the physical re-check in
/// `lock_ensure_current`: a fresh entry answers the currency question
/// without a store round trip, a miss always falls through to the physical
/// read. Entries expire by age and count; setting either bound to zero
/// disables the cache entirely. Anything suspicious in an entry is handled
/// by dropping it - the physical check is the authority, so the cache can
/// never fail a caller.
#[derive(Debug)]
pub struct ModificationCache {
    max_items: usize,
    max_age: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    stats: Arc<CoreStats>,
}

impl ModificationCache {
    /// Creates a cache with the given bounds.
    #[must_use]
    pub fn new(max_items: usize, max_age: Duration, stats: Arc<CoreStats>) -> Self {
        Self {
            max_items,
            max_age,
            entries: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Returns true if the cache is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.max_items > 0 && !self.max_age.is_zero()
    }

    /// Notes the latest stamp of an object.
    pub fn note_object(&self, key: ObjectKey, stamp: Timestamp) {
        self.note(CacheKey::Object(key), stamp);
    }

    /// Notes the latest modification stamp of a type.
    pub fn note_type(&self, type_id: TypeId, stamp: Timestamp) {
        self.note(CacheKey::Type(type_id), stamp);
    }

    /// Drops an object entry (used after removal).
    pub fn forget_object(&self, key: ObjectKey) {
        self.entries.lock().remove(&CacheKey::Object(key));
    }

    /// Answers whether `known` is the object's current stamp, if the cache
    /// can. `None` means the caller must perform a physical check.
    pub fn check_object(&self, key: ObjectKey, known: Timestamp) -> Option<bool> {
        self.check(CacheKey::Object(key)).map(|stamp| stamp == known)
    }

    /// Answers whether no member of `types` changed after `reference`, if
    /// every member has a fresh entry. Any miss defers to a physical check.
    pub fn check_type_set(&self, types: &[TypeId], reference: Timestamp) -> Option<bool> {
        let mut stamps = Vec::with_capacity(types.len());
        for type_id in types {
            match self.check(CacheKey::Type(*type_id)) {
                Some(stamp) => stamps.push(stamp),
                None => return None,
            }
        }
        Some(stamps.into_iter().all(|s| s <= reference))
    }

    /// Drops all entries for a type and its objects.
    pub fn remove_type(&self, type_id: TypeId) {
        let mut entries = self.entries.lock();
        entries.retain(|key, _| match key {
            CacheKey::Type(t) => *t != type_id,
            CacheKey::Object(k) => k.type_id != type_id,
        });
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn note(&self, key: CacheKey, stamp: Timestamp) {
        if !self.enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                stamp,
                inserted: Instant::now(),
            },
        );
        while entries.len() > self.max_items {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| *k);
            match oldest {
                Some(k) => entries.remove(&k),
                None => break,
            };
        }
    }

    fn check(&self, key: CacheKey) -> Option<Timestamp> {
        if !self.enabled() {
            return None;
        }
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.inserted.elapsed() <= self.max_age => {
                self.stats.record_cache_hit();
                Some(entry.stamp)
            }
            Some(_) => {
                // Expired. Drop it and let the physical check answer.
                entries.remove(&key);
                self.stats.record_cache_miss();
                None
            }
            None => {
                self.stats.record_cache_miss();
                None
            }
        }
    }
}
