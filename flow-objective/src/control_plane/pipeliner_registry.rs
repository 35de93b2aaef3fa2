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

//! Device to pipeliner ownership.

use crate::flow::DeviceId;
use crate::pipeline::Pipeliner;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) struct PipelinerRegistry {
    pipeliners: Mutex<HashMap<DeviceId, Arc<dyn Pipeliner>>>,
}

impl PipelinerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            pipeliners: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a pipeliner. Returns `false`, leaving the existing one in
    /// place, when the device already has one.
    pub(crate) async fn insert(&self, device_id: DeviceId, pipeliner: Arc<dyn Pipeliner>) -> bool {
        let mut pipeliners = self.pipeliners.lock().await;
        if pipeliners.contains_key(&device_id) {
            return false;
        }
        pipeliners.insert(device_id, pipeliner);
        true
    }

    pub(crate) async fn remove(&self, device_id: &DeviceId) -> Option<Arc<dyn Pipeliner>> {
        let mut pipeliners = self.pipeliners.lock().await;
        pipeliners.remove(device_id)
    }

    pub(crate) async fn get(&self, device_id: &DeviceId) -> Option<Arc<dyn Pipeliner>> {
        let pipeliners = self.pipeliners.lock().await;
        pipeliners.get(device_id).cloned()
    }

    pub(crate) async fn all(&self) -> Vec<Arc<dyn Pipeliner>> {
        let pipeliners = self.pipeliners.lock().await;
        let mut all: Vec<_> = pipeliners.values().cloned().collect();
        all.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        all
    }
}
