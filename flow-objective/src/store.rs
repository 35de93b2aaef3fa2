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

//! The next-id store contract.

use crate::objective::NextId;
use async_trait::async_trait;

/// Opaque, driver-defined record of how a next id was realized on a device.
///
/// Only the driver that wrote it knows how to read it back.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NextGroup(Vec<u8>);

impl NextGroup {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }
}

/// Durable next-id to [`NextGroup`] mapping plus next-id allocation.
///
/// Implementations are expected to be cluster-consistent; callers never hold
/// their own locks while awaiting these calls.
#[async_trait]
pub trait FlowObjectiveStore: Send + Sync {
    /// Writes (or replaces) the mapping for `next_id`.
    async fn put_next_group(&self, next_id: NextId, group: NextGroup);

    async fn get_next_group(&self, next_id: NextId) -> Option<NextGroup>;

    /// Removes the mapping and returns what was there.
    async fn remove_next_group(&self, next_id: NextId) -> Option<NextGroup>;

    /// Returns an id no other caller in the cluster has been given.
    async fn allocate_next_id(&self) -> NextId;
}
