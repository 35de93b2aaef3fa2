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

//! Objectives parked until the next id they reference is written to the store.

use crate::flow::DeviceId;
use crate::objective::{NextId, Objective};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub(crate) struct QueuedObjective {
    pub(crate) device_id: DeviceId,
    pub(crate) objective: Objective,
    queued_at: Instant,
}

/// Queue keyed by next id. Every queued objective leaves exactly once, either
/// released by [`ObjectiveQueue::take_for`] or expired by
/// [`ObjectiveQueue::evict_older_than`].
pub(crate) struct ObjectiveQueue {
    entries: Mutex<BTreeMap<NextId, Vec<QueuedObjective>>>,
}

impl ObjectiveQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) async fn enqueue(&self, next_id: NextId, device_id: DeviceId, objective: Objective) {
        let mut entries = self.entries.lock().await;
        entries.entry(next_id).or_default().push(QueuedObjective {
            device_id,
            objective,
            queued_at: Instant::now(),
        });
    }

    /// Removes and returns everything queued behind `next_id`.
    pub(crate) async fn take_for(&self, next_id: NextId) -> Vec<QueuedObjective> {
        let mut entries = self.entries.lock().await;
        entries.remove(&next_id).unwrap_or_default()
    }

    /// Removes and returns every objective queued for at least `timeout`.
    pub(crate) async fn evict_older_than(&self, timeout: Duration) -> Vec<QueuedObjective> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut expired = Vec::new();

        entries.retain(|_, queued| {
            let (stale, fresh): (Vec<_>, Vec<_>) = queued
                .drain(..)
                .partition(|entry| now.duration_since(entry.queued_at) >= timeout);
            expired.extend(stale);
            *queued = fresh;
            !queued.is_empty()
        });

        expired
    }

    /// Copy of the queue contents, ordered by next id.
    pub(crate) async fn snapshot(&self) -> Vec<(NextId, Vec<QueuedObjective>)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(next_id, queued)| (*next_id, queued.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectiveQueue;
    use crate::flow::{eth_type, ApplicationId, DeviceId, TrafficSelector};
    use crate::objective::{ForwardingFlag, ForwardingObjective, NextId, Objective};
    use std::time::Duration;

    fn forward(next_id: u32) -> Objective {
        ForwardingObjective::builder()
            .from_app(ApplicationId::new("app"))
            .with_selector(
                TrafficSelector::builder()
                    .match_eth_type(eth_type::IPV4)
                    .build(),
            )
            .with_flag(ForwardingFlag::Specific)
            .next_step(NextId(next_id))
            .add()
            .expect("forwarding objective should build")
            .into()
    }

    #[tokio::test]
    async fn take_for_releases_only_that_next_id() {
        let queue = ObjectiveQueue::new();
        queue.enqueue(NextId(1), DeviceId::new("of:1"), forward(1)).await;
        queue.enqueue(NextId(1), DeviceId::new("of:2"), forward(1)).await;
        queue.enqueue(NextId(2), DeviceId::new("of:1"), forward(2)).await;

        let released = queue.take_for(NextId(1)).await;

        assert_eq!(released.len(), 2);
        assert!(queue.take_for(NextId(1)).await.is_empty());
        assert_eq!(queue.snapshot().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_only_takes_stale_entries() {
        let queue = ObjectiveQueue::new();
        queue.enqueue(NextId(1), DeviceId::new("of:1"), forward(1)).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        queue.enqueue(NextId(1), DeviceId::new("of:1"), forward(1)).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let expired = queue.evict_older_than(Duration::from_secs(15)).await;

        assert_eq!(expired.len(), 1);
        assert_eq!(queue.snapshot().await[0].1.len(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(queue.evict_older_than(Duration::from_secs(15)).await.len(), 1);
        assert!(queue.snapshot().await.is_empty());
    }
}
