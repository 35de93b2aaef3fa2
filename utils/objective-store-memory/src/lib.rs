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


//! In-process [`FlowObjectiveStore`].
//!
//! Backs the next-id mapping with a map behind an async mutex and simulates
//! cluster-unique allocation with an atomic counter. Suitable for a single
//! controller process, simulations and tests.

use async_trait::async_trait;
use flow_objective::objective::NextId;
use flow_objective::store::{FlowObjectiveStore, NextGroup};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

const COMPONENT: &str = "objective_store_memory";

pub struct MemoryObjectiveStore {
    next_groups: Mutex<HashMap<NextId, NextGroup>>,
    next_id: AtomicU32,
}

impl MemoryObjectiveStore {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocation starts at `first`; useful to keep ids recognizable in logs.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next_groups: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(first),
        }
    }

    pub async fn len(&self) -> usize {
        self.next_groups.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryObjectiveStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowObjectiveStore for MemoryObjectiveStore {
    async fn put_next_group(&self, next_id: NextId, group: NextGroup) {
        let replaced = self
            .next_groups
            .lock()
            .await
            .insert(next_id, group)
            .is_some();
        debug!(
            component = COMPONENT,
            next_id = %next_id,
            replaced,
            "stored next group"
        );
    }

    async fn get_next_group(&self, next_id: NextId) -> Option<NextGroup> {
        self.next_groups.lock().await.get(&next_id).cloned()
    }

    async fn remove_next_group(&self, next_id: NextId) -> Option<NextGroup> {
        self.next_groups.lock().await.remove(&next_id)
    }

    async fn allocate_next_id(&self) -> NextId {
        NextId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
