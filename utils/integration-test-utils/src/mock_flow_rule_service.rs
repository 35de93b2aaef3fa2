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


use async_trait::async_trait;
use flow_objective::flow::{
    ApplicationId, DeviceId, FlowRule, FlowRuleOperations, FlowRuleService, RuleOperationKind,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// How [`MockFlowRuleService`] completes a batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchCompletion {
    /// Succeeds before `apply` returns.
    Succeed,
    /// Succeeds later, from a spawned task.
    SucceedLater,
    /// Fails before `apply` returns; the tables are left untouched.
    Fail,
}

#[derive(Default)]
struct RuleTables {
    devices: HashMap<DeviceId, Vec<FlowRule>>,
    batches: usize,
    purges: Vec<(DeviceId, ApplicationId)>,
}

impl RuleTables {
    fn apply(&mut self, device_id: &DeviceId, operations: &FlowRuleOperations) {
        let rules = self.devices.entry(device_id.clone()).or_default();
        for operation in operations.operations() {
            rules.retain(|installed| installed.slot() != operation.rule.slot());
            if operation.kind == RuleOperationKind::Add {
                rules.push(operation.rule.clone());
            }
        }
    }
}

/// Rule service that keeps one table image per device. A rule added to an
/// occupied slot replaces the previous one, as a switch would.
#[derive(Clone)]
pub struct MockFlowRuleService {
    completion: Arc<Mutex<BatchCompletion>>,
    tables: Arc<Mutex<RuleTables>>,
}

impl MockFlowRuleService {
    pub fn new() -> Self {
        Self::with_completion(BatchCompletion::Succeed)
    }

    pub fn with_completion(completion: BatchCompletion) -> Self {
        Self {
            completion: Arc::new(Mutex::new(completion)),
            tables: Arc::new(Mutex::new(RuleTables::default())),
        }
    }

    pub fn set_completion(&self, completion: BatchCompletion) {
        *self.completion.lock().expect("completion lock poisoned") = completion;
    }

    /// Rules currently installed on `device_id`.
    pub fn rules(&self, device_id: &DeviceId) -> Vec<FlowRule> {
        self.tables
            .lock()
            .expect("rule table lock poisoned")
            .devices
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Rules on `device_id` owned by `app_id`.
    pub fn rules_for_app(&self, device_id: &DeviceId, app_id: &ApplicationId) -> Vec<FlowRule> {
        self.rules(device_id)
            .into_iter()
            .filter(|rule| &rule.app_id == app_id)
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.tables.lock().expect("rule table lock poisoned").batches
    }

    pub fn purges(&self) -> Vec<(DeviceId, ApplicationId)> {
        self.tables
            .lock()
            .expect("rule table lock poisoned")
            .purges
            .clone()
    }
}

impl Default for MockFlowRuleService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowRuleService for MockFlowRuleService {
    async fn apply(&self, device_id: &DeviceId, operations: FlowRuleOperations) {
        let completion = *self.completion.lock().expect("completion lock poisoned");
        debug!(
            device_id = device_id.as_str(),
            rules = operations.len(),
            completion = ?completion,
            "mock rule batch"
        );

        {
            let mut tables = self.tables.lock().expect("rule table lock poisoned");
            tables.batches += 1;
            if completion != BatchCompletion::Fail {
                tables.apply(device_id, &operations);
            }
        }

        match completion {
            BatchCompletion::Succeed => operations.complete_success(),
            BatchCompletion::SucceedLater => {
                tokio::spawn(async move { operations.complete_success() });
            }
            BatchCompletion::Fail => operations.complete_error(),
        }
    }

    async fn purge_rules(&self, device_id: &DeviceId, app_id: &ApplicationId) {
        let mut tables = self.tables.lock().expect("rule table lock poisoned");
        if let Some(rules) = tables.devices.get_mut(device_id) {
            rules.retain(|rule| &rule.app_id != app_id);
        }
        tables.purges.push((device_id.clone(), app_id.clone()));
    }
}
