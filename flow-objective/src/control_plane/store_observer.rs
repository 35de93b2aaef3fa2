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

//! Store decorator that reports next-id writes to the dispatch service.

use crate::objective::NextId;
use crate::store::{FlowObjectiveStore, NextGroup};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Wraps the real store. Pipeliners are handed this wrapper, so every
/// `put_next_group` they make is announced on the write channel after it
/// has landed in the inner store.
pub(crate) struct ObservedStore {
    inner: Arc<dyn FlowObjectiveStore>,
    written: UnboundedSender<NextId>,
    known: Mutex<BTreeSet<NextId>>,
}

impl ObservedStore {
    pub(crate) fn new(inner: Arc<dyn FlowObjectiveStore>) -> (Self, UnboundedReceiver<NextId>) {
        let (written, receiver) = mpsc::unbounded_channel();
        (
            Self {
                inner,
                written,
                known: Mutex::new(BTreeSet::new()),
            },
            receiver,
        )
    }

    /// Next ids written through this wrapper and not removed since.
    pub(crate) async fn known_next_ids(&self) -> Vec<NextId> {
        self.known.lock().await.iter().copied().collect()
    }
}

#[async_trait]
impl FlowObjectiveStore for ObservedStore {
    async fn put_next_group(&self, next_id: NextId, group: NextGroup) {
        self.inner.put_next_group(next_id, group).await;
        self.known.lock().await.insert(next_id);
        // The receiver only goes away with the dispatch service itself.
        let _ = self.written.send(next_id);
    }

    async fn get_next_group(&self, next_id: NextId) -> Option<NextGroup> {
        self.inner.get_next_group(next_id).await
    }

    async fn remove_next_group(&self, next_id: NextId) -> Option<NextGroup> {
        let removed = self.inner.remove_next_group(next_id).await;
        self.known.lock().await.remove(&next_id);
        removed
    }

    async fn allocate_next_id(&self) -> NextId {
        self.inner.allocate_next_id().await
    }
}

#[cfg(test)]
mod tests {
    use super::ObservedStore;
    use crate::objective::NextId;
    use crate::store::{FlowObjectiveStore, NextGroup};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        groups: Mutex<HashMap<NextId, NextGroup>>,
    }

    #[async_trait]
    impl FlowObjectiveStore for MapStore {
        async fn put_next_group(&self, next_id: NextId, group: NextGroup) {
            self.groups.lock().await.insert(next_id, group);
        }

        async fn get_next_group(&self, next_id: NextId) -> Option<NextGroup> {
            self.groups.lock().await.get(&next_id).cloned()
        }

        async fn remove_next_group(&self, next_id: NextId) -> Option<NextGroup> {
            self.groups.lock().await.remove(&next_id)
        }

        async fn allocate_next_id(&self) -> NextId {
            NextId(42)
        }
    }

    #[tokio::test]
    async fn writes_are_announced_after_landing() {
        let inner = Arc::new(MapStore::default());
        let (store, mut written) = ObservedStore::new(inner.clone());

        store.put_next_group(NextId(3), NextGroup::new(vec![1])).await;

        assert_eq!(written.recv().await, Some(NextId(3)));
        assert!(inner.get_next_group(NextId(3)).await.is_some());
        assert_eq!(store.known_next_ids().await, vec![NextId(3)]);
    }

    #[tokio::test]
    async fn removal_forgets_the_id_and_allocation_passes_through() {
        let (store, _written) = ObservedStore::new(Arc::new(MapStore::default()));
        store.put_next_group(NextId(3), NextGroup::new(vec![1])).await;

        assert_eq!(
            store.remove_next_group(NextId(3)).await,
            Some(NextGroup::new(vec![1]))
        );
        assert!(store.known_next_ids().await.is_empty());
        assert_eq!(store.allocate_next_id().await, NextId(42));
    }
}
