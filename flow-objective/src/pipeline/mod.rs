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


//! Per-device translation engines.
//!
//! A [`Pipeliner`] owns one device. It turns objectives into rule batches and
//! group submissions for that device's table layout, and resolves every
//! objective it accepts exactly once: immediately, from a rule-batch
//! completion, or through the pending-group confirmation protocol.

pub(crate) mod corsa_pipeliner;
mod next_handle;
mod profile;
mod treatment_policy;

pub use corsa_pipeliner::CorsaPipeliner;
pub use next_handle::{group_key_for, NextHandle};
pub use profile::{
    DriverKind, TableMissAction, CONTROLLER_PRIORITY, DROP_PRIORITY, HIGHEST_PRIORITY,
};
pub use treatment_policy::{
    AlwaysGroupPolicy, ClassifiedTreatment, NextEncoding, PopVlanCorrectingPolicy,
    RewriteGroupPolicy, TreatmentPolicy,
};

use crate::config::PipelinerConfig;
use crate::flow::{ApplicationId, DeviceId, FlowRuleService};
use crate::group::GroupService;
use crate::objective::{FilteringObjective, ForwardingObjective, NextId, NextObjective};
use crate::store::{FlowObjectiveStore, NextGroup};
use async_trait::async_trait;
use std::sync::Arc;

/// Collaborators handed to an engine for one device.
#[derive(Clone)]
pub struct PipelinerContext {
    pub device_id: DeviceId,
    pub flow_rules: Arc<dyn FlowRuleService>,
    pub groups: Arc<dyn GroupService>,
    pub store: Arc<dyn FlowObjectiveStore>,
    pub config: PipelinerConfig,
}

#[async_trait]
pub trait Pipeliner: Send + Sync {
    fn device_id(&self) -> &DeviceId;

    fn driver_name(&self) -> &'static str;

    /// Installs the device's fixed rules and starts confirmation tracking.
    /// Calling it again is harmless.
    async fn init(&self);

    async fn filter(&self, objective: FilteringObjective);

    async fn forward(&self, objective: ForwardingObjective);

    async fn next(&self, objective: NextObjective);

    /// Purges every rule and group `app_id` owns on the device.
    async fn purge_all(&self, app_id: &ApplicationId);

    /// Human-readable description of how a stored next group is realized.
    async fn next_mappings(&self, group: &NextGroup) -> Vec<String>;

    /// Next ids whose group has been submitted but not yet confirmed.
    async fn pending_next_ids(&self) -> Vec<NextId>;

    /// Stops confirmation tracking. Pending entries stay until the engine is
    /// dropped; none of them is resolved by shutdown.
    async fn shutdown(&self);
}

/// Builds the engine for `kind`. The caller still has to `init()` it.
pub fn build_pipeliner(kind: DriverKind, context: PipelinerContext) -> Arc<dyn Pipeliner> {
    Arc::new(CorsaPipeliner::new(kind, context))
}
