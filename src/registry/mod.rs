/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::BuildHasher;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use foldhash::fast::FixedState;

use crate::metric::Metric;
use crate::tags::{TagCache, tag_offset};
use crate::types::MetricType;

// seed kept fixed so shard assignment is a pure function of the key text
const HASH_SEED: u64 = 0x0BAD_F00D;

struct RegistryShard {
    map: ArcSwap<AHashMap<Arc<str>, Arc<Metric>>>,
    insert_lock: Mutex<()>,
}

impl RegistryShard {
    fn new() -> Self {
        RegistryShard {
            map: ArcSwap::from_pointee(AHashMap::new()),
            insert_lock: Mutex::new(()),
        }
    }
}

/// Sharded hash table mapping metric keys to live [`Metric`] records.
///
/// Lookup of an existing key runs on an immutable shard snapshot and never
/// blocks on the insert lock. Creation serializes through the owning shard's
/// mutex and re-checks for a race-inserted duplicate. Records are never
/// removed; slots are reset at flush time, not freed.
pub struct MetricRegistry {
    shards: Vec<RegistryShard>,
    tags: TagCache,
    hasher: FixedState,
    blacklist: Vec<String>,
}

impl MetricRegistry {
    pub fn new(num_shards: usize) -> Self {
        Self::with_blacklist(num_shards, Vec::new())
    }

    pub fn with_blacklist(num_shards: usize, blacklist: Vec<String>) -> Self {
        let num_shards = num_shards.max(1);
        let shards = (0..num_shards).map(|_| RegistryShard::new()).collect();
        MetricRegistry {
            shards,
            tags: TagCache::new(),
            hasher: FixedState::with_seed(HASH_SEED),
            blacklist,
        }
    }

    #[inline]
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn tag_cache(&self) -> &TagCache {
        &self.tags
    }

    /// Shard index owning `key`, fixed for the life of the key.
    pub fn shard_of(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % self.shards.len() as u64) as usize
    }

    pub fn find_or_create(&self, key: &str, r#type: MetricType) -> Arc<Metric> {
        let shard = &self.shards[self.shard_of(key)];

        if let Some(metric) = shard.map.load().get(key) {
            return metric.clone();
        }

        let (name_len, tags) = match tag_offset(key) {
            Some(offset) => {
                let raw = &key[offset + 1..];
                if raw.is_empty() {
                    (offset, None)
                } else {
                    (offset, Some(self.tags.get_or_create(raw)))
                }
            }
            None => (key.len(), None),
        };
        let name = &key[..name_len];
        let disabled = self.blacklist.iter().any(|b| b == name);

        let _guard = shard.insert_lock.lock().unwrap();
        let map = shard.map.load_full();
        if let Some(metric) = map.get(key) {
            // another thread won the creation race
            return metric.clone();
        }

        let metric = Arc::new(Metric::new(key, name_len, r#type, tags, disabled));
        let mut new_map = (*map).clone();
        new_map.insert(Arc::from(key), metric.clone());
        shard.map.store(Arc::new(new_map));
        metric
    }

    /// Walk one shard's metrics on a point-in-time snapshot. The callback
    /// returns whether to keep going, letting a flush loop honor a shutdown
    /// signal between metrics.
    pub fn walk_shard<F>(&self, shard: usize, f: &mut F)
    where
        F: FnMut(&Arc<Metric>) -> bool,
    {
        let Some(shard) = self.shards.get(shard) else {
            return;
        };
        let snapshot = shard.map.load_full();
        for metric in snapshot.values() {
            if !f(metric) {
                return;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.load().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
