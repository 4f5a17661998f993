/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use arc_swap::ArcSwap;

use super::TagSet;

/// Interning cache mapping raw tag text to shared [`TagSet`] records.
///
/// Lookups run against an immutable snapshot of the table and never take a
/// lock. Inserts are serialized through a single writer mutex which also
/// guards the monotonic index counter; a thread that loses an insert race
/// discards its candidate and returns the winner's record.
pub struct TagCache {
    table: ArcSwap<AHashMap<Arc<str>, Arc<TagSet>>>,
    // also the next intern index to hand out
    insert_lock: Mutex<u32>,
}

impl Default for TagCache {
    fn default() -> Self {
        TagCache::new()
    }
}

impl TagCache {
    pub fn new() -> Self {
        TagCache {
            table: ArcSwap::from_pointee(AHashMap::new()),
            insert_lock: Mutex::new(0),
        }
    }

    pub fn get_or_create(&self, raw: &str) -> Arc<TagSet> {
        if let Some(set) = self.table.load().get(raw) {
            return set.clone();
        }

        let mut candidate = TagSet::parse(raw);

        let mut next_index = self.insert_lock.lock().unwrap();
        let table = self.table.load_full();
        if let Some(set) = table.get(raw) {
            // another thread won the race
            return set.clone();
        }

        candidate.index = *next_index;
        *next_index += 1;

        let set = Arc::new(candidate);
        let mut new_table = (*table).clone();
        new_table.insert(Arc::from(raw), set.clone());
        self.table.store(Arc::new(new_table));
        set
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_returns_identical_set() {
        let cache = TagCache::new();
        let a = cache.get_or_create("foo=bar,baz=42");
        let b = cache.get_or_create("foo=bar,baz=42");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.index(), b.index());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn equivalent_text_is_a_distinct_set() {
        let cache = TagCache::new();
        let a = cache.get_or_create("foo=bar");
        // collapsed separators parse to the same content but intern separately
        let b = cache.get_or_create("foo===bar");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.index() > a.index());
        assert_eq!(a.tags(), b.tags());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn indices_are_monotonic() {
        let cache = TagCache::new();
        let a = cache.get_or_create("a=1");
        let b = cache.get_or_create("b=2");
        let c = cache.get_or_create("c=3");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
    }

    #[test]
    fn concurrent_interning_no_duplicates() {
        let cache = Arc::new(TagCache::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let cache = cache.clone();
                s.spawn(move || {
                    for i in 0..100 {
                        let _ = cache.get_or_create(&format!("host=h{i}"));
                    }
                });
            }
        });
        assert_eq!(cache.len(), 100);
        // every index in [0, 100) was assigned exactly once
        let mut seen = vec![false; 100];
        for i in 0..100 {
            let set = cache.get_or_create(&format!("host=h{i}"));
            assert!(!seen[set.index() as usize]);
            seen[set.index() as usize] = true;
        }
    }
}
