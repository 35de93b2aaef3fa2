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


//! Group-event listener adapter that feeds the pending-confirmation protocol.

use crate::flow::DeviceId;
use crate::group::{GroupEvent, GroupEventType, GroupListener};
use crate::observability::fields;
use crate::pipeline::corsa_pipeliner::PipelineState;
use async_trait::async_trait;
use std::sync::Weak;

/// Registered with the group service for one device. Holds the engine state
/// weakly so a forgotten registration cannot keep a torn-down engine alive.
pub(crate) struct PendingGroupListener {
    device_id: DeviceId,
    state: Weak<PipelineState>,
}

impl PendingGroupListener {
    pub(crate) fn new(device_id: DeviceId, state: Weak<PipelineState>) -> Self {
        Self { device_id, state }
    }
}

#[async_trait]
impl GroupListener for PendingGroupListener {
    async fn on_event(&self, event: GroupEvent) {
        if event.subject.device_id() != &self.device_id {
            return;
        }
        let Some(state) = self.state.upgrade() else {
            return;
        };

        match event.event_type {
            GroupEventType::Added => {
                state
                    .confirm_pending(&event.subject, fields::CHANNEL_EVENT)
                    .await;
            }
            GroupEventType::AddFailed => {
                state.reject_pending(event.subject.key()).await;
            }
            GroupEventType::Removed
            | GroupEventType::Updated
            | GroupEventType::RemoveFailed => {}
        }
    }
}
