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

use super::{ApplicationId, DeviceId, FlowRuleOperations};
use async_trait::async_trait;

/// Completion sink for one [`FlowRuleOperations`] batch. Called once per batch.
pub trait FlowRuleOperationsContext: Send + Sync {
    fn on_success(&self, operations: &FlowRuleOperations);

    fn on_error(&self, operations: &FlowRuleOperations);
}

/// Rule-submission collaborator.
///
/// `apply` returns once the batch has been accepted; the outcome is reported
/// later through the batch's completion context, possibly from another task.
#[async_trait]
pub trait FlowRuleService: Send + Sync {
    async fn apply(&self, device_id: &DeviceId, operations: FlowRuleOperations);

    /// Removes every rule `app_id` owns on the device.
    async fn purge_rules(&self, device_id: &DeviceId, app_id: &ApplicationId);
}
