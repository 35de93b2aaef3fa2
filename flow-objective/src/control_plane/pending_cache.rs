/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Keyed, time-aware map for work awaiting asynchronous confirmation.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct PendingEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Entries leave exactly once: through [`PendingCache::take`] or through
/// [`PendingCache::evict_expired`]. Both remove under the same lock, so two
/// racing callers can never both receive the same entry.
pub(crate) struct PendingCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, PendingEntry<V>>>,
}

impl<K, V> PendingCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts with a fresh timestamp. Returns the entry this one superseded.
    pub(crate) async fn insert(&self, key: K, value: V) -> Option<V> {
        let mut entries = self.entries.lock().await;
        entries
            .insert(
                key,
                PendingEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            )
            .map(|superseded| superseded.value)
    }

    /// Removes and returns the entry for `key`, if still present.
    pub(crate) async fn take(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        entries.remove(key).map(|entry| entry.value)
    }

    pub(crate) async fn keys(&self) -> Vec<K> {
        let entries = self.entries.lock().await;
        entries.keys().cloned().collect()
    }

    pub(crate) async fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let entries = self.entries.lock().await;
        entries.values().map(|entry| entry.value.clone()).collect()
    }

    /// Removes and returns every entry at least `ttl` old.
    pub(crate) async fn evict_expired(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| entries.remove(&key).map(|entry| (key, entry.value)))
            .collect()
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
