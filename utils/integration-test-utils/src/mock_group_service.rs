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
use flow_objective::flow::{ApplicationId, DeviceId};
use flow_objective::group::{
    Group, GroupDescription, GroupEvent, GroupEventType, GroupId, GroupKey, GroupListener,
    GroupService,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What [`MockGroupService`] does with a submitted group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupInstallMode {
    /// The group goes live and an `Added` event is emitted.
    Confirm,
    /// The group goes live without an event; only polling can see it.
    ConfirmSilently,
    /// The device refuses the group and an `AddFailed` event is emitted.
    Fail,
    /// The submission is swallowed.
    Ignore,
}

struct GroupTable {
    mode: GroupInstallMode,
    next_group_id: u32,
    live: HashMap<(DeviceId, GroupKey), Group>,
    submitted: Vec<GroupDescription>,
    listeners: Vec<Arc<dyn GroupListener>>,
}

/// Group service that keeps live groups in memory and notifies listeners
/// the way a device-backed service would.
#[derive(Clone)]
pub struct MockGroupService {
    table: Arc<Mutex<GroupTable>>,
}

impl MockGroupService {
    pub fn new(mode: GroupInstallMode) -> Self {
        Self {
            table: Arc::new(Mutex::new(GroupTable {
                mode,
                next_group_id: 0x1000,
                live: HashMap::new(),
                submitted: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    pub fn set_mode(&self, mode: GroupInstallMode) {
        self.table.lock().expect("group table lock poisoned").mode = mode;
    }

    pub fn submitted(&self) -> Vec<GroupDescription> {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .submitted
            .clone()
    }

    pub fn live_groups(&self, device_id: &DeviceId) -> Vec<Group> {
        let table = self.table.lock().expect("group table lock poisoned");
        let mut groups: Vec<Group> = table
            .live
            .values()
            .filter(|group| group.device_id() == device_id)
            .cloned()
            .collect();
        groups.sort_by_key(|group| group.id);
        groups
    }

    pub fn listener_count(&self) -> usize {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .listeners
            .len()
    }

    /// Drops a live group without telling anyone, as a device reboot would.
    pub fn remove_live(&self, device_id: &DeviceId, key: &GroupKey) -> Option<Group> {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .live
            .remove(&(device_id.clone(), key.clone()))
    }

    /// Brings the most recent submission for `key` live and emits `Added`,
    /// as a device would after accepting it late.
    pub async fn bring_live(&self, device_id: &DeviceId, key: &GroupKey) -> bool {
        let group = {
            let mut table = self.table.lock().expect("group table lock poisoned");
            let Some(description) = table
                .submitted
                .iter()
                .rev()
                .find(|submitted| &submitted.device_id == device_id && &submitted.app_cookie == key)
                .cloned()
            else {
                return false;
            };
            table.next_group_id += 1;
            let group = Group {
                id: description.group_id.unwrap_or(GroupId(table.next_group_id)),
                description,
            };
            table
                .live
                .insert((device_id.clone(), key.clone()), group.clone());
            group
        };
        self.emit(GroupEventType::Added, group).await;
        true
    }

    /// Emits a second `Added` event for a live group.
    pub async fn replay_added(&self, device_id: &DeviceId, key: &GroupKey) -> bool {
        let group = self
            .table
            .lock()
            .expect("group table lock poisoned")
            .live
            .get(&(device_id.clone(), key.clone()))
            .cloned();
        match group {
            Some(group) => {
                self.emit(GroupEventType::Added, group).await;
                true
            }
            None => false,
        }
    }

    async fn emit(&self, event_type: GroupEventType, subject: Group) {
        let listeners = self
            .table
            .lock()
            .expect("group table lock poisoned")
            .listeners
            .clone();
        for listener in listeners {
            listener
                .on_event(GroupEvent {
                    event_type,
                    subject: subject.clone(),
                })
                .await;
        }
    }
}

#[async_trait]
impl GroupService for MockGroupService {
    async fn add_group(&self, description: GroupDescription) {
        let (mode, group) = {
            let mut table = self.table.lock().expect("group table lock poisoned");
            table.submitted.push(description.clone());
            let id = match description.group_id {
                Some(id) => id,
                None => {
                    table.next_group_id += 1;
                    GroupId(table.next_group_id)
                }
            };
            let group = Group { id, description };
            if matches!(
                table.mode,
                GroupInstallMode::Confirm | GroupInstallMode::ConfirmSilently
            ) {
                table.live.insert(
                    (group.device_id().clone(), group.key().clone()),
                    group.clone(),
                );
            }
            (table.mode, group)
        };

        debug!(
            device_id = group.device_id().as_str(),
            group_key = %group.key(),
            mode = ?mode,
            "mock group submission"
        );

        match mode {
            GroupInstallMode::Confirm => self.emit(GroupEventType::Added, group).await,
            GroupInstallMode::Fail => self.emit(GroupEventType::AddFailed, group).await,
            GroupInstallMode::ConfirmSilently | GroupInstallMode::Ignore => {}
        }
    }

    async fn remove_group(&self, device_id: &DeviceId, key: &GroupKey, _app_id: &ApplicationId) {
        if let Some(group) = self.remove_live(device_id, key) {
            self.emit(GroupEventType::Removed, group).await;
        }
    }

    async fn get_group(&self, device_id: &DeviceId, key: &GroupKey) -> Option<Group> {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .live
            .get(&(device_id.clone(), key.clone()))
            .cloned()
    }

    async fn get_groups(&self, device_id: &DeviceId) -> Vec<Group> {
        self.live_groups(device_id)
    }

    async fn add_listener(&self, listener: Arc<dyn GroupListener>) {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .listeners
            .push(listener);
    }

    async fn remove_listener(&self, listener: &Arc<dyn GroupListener>) {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .listeners
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    async fn purge_groups(&self, device_id: &DeviceId, app_id: &ApplicationId) {
        self.table
            .lock()
            .expect("group table lock poisoned")
            .live
            .retain(|(device, _), group| {
                device != device_id || &group.description.app_id != app_id
            });
    }
}
