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

//! Hardware group vocabulary and the group-submission collaborator.

use crate::flow::{ApplicationId, DeviceId, TrafficTreatment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Caller-chosen correlation key ("app cookie") that ties a submitted group
/// description to the live group and to its events.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GroupKey(Vec<u8>);

impl GroupKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Device-assigned group identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum GroupType {
    Indirect,
    Select,
    All,
    Failover,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct GroupBucket {
    pub treatment: TrafficTreatment,
    pub weight: u16,
}

impl GroupBucket {
    pub fn indirect(treatment: TrafficTreatment) -> Self {
        Self {
            treatment,
            weight: 1,
        }
    }

    pub fn select(treatment: TrafficTreatment, weight: u16) -> Self {
        Self { treatment, weight }
    }

    pub fn all(treatment: TrafficTreatment) -> Self {
        Self {
            treatment,
            weight: 0,
        }
    }
}

/// What the caller asks the group service to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupDescription {
    pub device_id: DeviceId,
    pub group_type: GroupType,
    pub buckets: Vec<GroupBucket>,
    pub app_cookie: GroupKey,
    /// `None` lets the group service pick the id.
    pub group_id: Option<GroupId>,
    pub app_id: ApplicationId,
}

/// A group as known to the group service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub description: GroupDescription,
}

impl Group {
    pub fn key(&self) -> &GroupKey {
        &self.description.app_cookie
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.description.device_id
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GroupEventType {
    Added,
    Removed,
    Updated,
    AddFailed,
    RemoveFailed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupEvent {
    pub event_type: GroupEventType,
    pub subject: Group,
}

#[async_trait]
pub trait GroupListener: Send + Sync {
    async fn on_event(&self, event: GroupEvent);
}

/// Group-submission collaborator.
///
/// `add_group` and `remove_group` return once the request is accepted; the
/// result shows up as a [`GroupEvent`] and in later `get_group(s)` reads.
#[async_trait]
pub trait GroupService: Send + Sync {
    async fn add_group(&self, description: GroupDescription);

    async fn remove_group(&self, device_id: &DeviceId, key: &GroupKey, app_id: &ApplicationId);

    async fn get_group(&self, device_id: &DeviceId, key: &GroupKey) -> Option<Group>;

    async fn get_groups(&self, device_id: &DeviceId) -> Vec<Group>;

    async fn add_listener(&self, listener: Arc<dyn GroupListener>);

    /// Removes a listener previously added; identity is the `Arc` allocation.
    async fn remove_listener(&self, listener: &Arc<dyn GroupListener>);

    /// Removes every group `app_id` owns on the device.
    async fn purge_groups(&self, device_id: &DeviceId, app_id: &ApplicationId);
}
