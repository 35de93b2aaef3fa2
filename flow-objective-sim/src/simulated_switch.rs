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


//! In-process stand-in for the devices behind the rule and group services.

use crate::config::SwitchConfig;
use async_trait::async_trait;
use flow_objective::flow::{
    ApplicationId, DeviceId, FlowRule, FlowRuleOperations, FlowRuleService, RuleOperationKind,
};
use flow_objective::group::{
    Group, GroupDescription, GroupEvent, GroupEventType, GroupId, GroupKey, GroupListener,
    GroupService,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const COMPONENT: &str = "simulated_switch";

#[derive(Default)]
struct Fabric {
    rules: HashMap<DeviceId, Vec<FlowRule>>,
    groups: HashMap<(DeviceId, GroupKey), Group>,
    listeners: Vec<Arc<dyn GroupListener>>,
    last_group_id: u32,
}

/// Every simulated device shares one fabric. Rule batches always succeed;
/// groups go live after a configurable delay.
#[derive(Clone)]
pub struct SimulatedSwitch {
    fabric: Arc<Mutex<Fabric>>,
    confirm_delay: Duration,
    silent_confirmations: bool,
}

impl SimulatedSwitch {
    pub fn new(config: &SwitchConfig) -> Self {
        Self {
            fabric: Arc::new(Mutex::new(Fabric::default())),
            confirm_delay: Duration::from_millis(config.group_confirm_delay_ms),
            silent_confirmations: config.silent_confirmations,
        }
    }

    pub async fn rules(&self, device_id: &DeviceId) -> Vec<FlowRule> {
        let fabric = self.fabric.lock().await;
        let mut rules = fabric.rules.get(device_id).cloned().unwrap_or_default();
        rules.sort_by(|left, right| {
            (left.table, std::cmp::Reverse(left.priority))
                .cmp(&(right.table, std::cmp::Reverse(right.priority)))
        });
        rules
    }

    async fn notify(&self, event_type: GroupEventType, subject: Group) {
        let listeners = self.fabric.lock().await.listeners.clone();
        for listener in listeners {
            listener
                .on_event(GroupEvent {
                    event_type,
                    subject: subject.clone(),
                })
                .await;
        }
    }

    async fn go_live(&self, group: Group) {
        self.fabric.lock().await.groups.insert(
            (group.device_id().clone(), group.key().clone()),
            group.clone(),
        );
        info!(
            component = COMPONENT,
            device_id = group.device_id().as_str(),
            group_key = %group.key(),
            group_id = %group.id,
            "group live on device"
        );
        if !self.silent_confirmations {
            self.notify(GroupEventType::Added, group).await;
        }
    }
}

#[async_trait]
impl FlowRuleService for SimulatedSwitch {
    async fn apply(&self, device_id: &DeviceId, operations: FlowRuleOperations) {
        {
            let mut fabric = self.fabric.lock().await;
            let rules = fabric.rules.entry(device_id.clone()).or_default();
            for operation in operations.operations() {
                rules.retain(|rule| rule.slot() != operation.rule.slot());
                if operation.kind == RuleOperationKind::Add {
                    rules.push(operation.rule.clone());
                }
            }
        }
        debug!(
            component = COMPONENT,
            device_id = device_id.as_str(),
            operations = operations.len(),
            "applied rule batch"
        );
        operations.complete_success();
    }

    async fn purge_rules(&self, device_id: &DeviceId, app_id: &ApplicationId) {
        if let Some(rules) = self.fabric.lock().await.rules.get_mut(device_id) {
            rules.retain(|rule| &rule.app_id != app_id);
        }
    }
}

#[async_trait]
impl GroupService for SimulatedSwitch {
    async fn add_group(&self, description: GroupDescription) {
        let id = match description.group_id {
            Some(id) => id,
            None => {
                let mut fabric = self.fabric.lock().await;
                fabric.last_group_id += 1;
                GroupId(fabric.last_group_id)
            }
        };
        let group = Group { id, description };
        let switch = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(switch.confirm_delay).await;
            switch.go_live(group).await;
        });
    }

    async fn remove_group(&self, device_id: &DeviceId, key: &GroupKey, _app_id: &ApplicationId) {
        let removed = self
            .fabric
            .lock()
            .await
            .groups
            .remove(&(device_id.clone(), key.clone()));
        if let Some(group) = removed {
            self.notify(GroupEventType::Removed, group).await;
        }
    }

    async fn get_group(&self, device_id: &DeviceId, key: &GroupKey) -> Option<Group> {
        self.fabric
            .lock()
            .await
            .groups
            .get(&(device_id.clone(), key.clone()))
            .cloned()
    }

    async fn get_groups(&self, device_id: &DeviceId) -> Vec<Group> {
        self.fabric
            .lock()
            .await
            .groups
            .values()
            .filter(|group| group.device_id() == device_id)
            .cloned()
            .collect()
    }

    async fn add_listener(&self, listener: Arc<dyn GroupListener>) {
        self.fabric.lock().await.listeners.push(listener);
    }

    async fn remove_listener(&self, listener: &Arc<dyn GroupListener>) {
        self.fabric
            .lock()
            .await
            .listeners
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    async fn purge_groups(&self, device_id: &DeviceId, app_id: &ApplicationId) {
        self.fabric.lock().await.groups.retain(|(device, _), group| {
            device != device_id || &group.description.app_id != app_id
        });
    }
}
