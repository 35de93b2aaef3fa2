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

//! Runtime helper for fixed-period background sweeps.

use crate::observability::events;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

const COMPONENT: &str = "sweep_runtime";

/// Owner of a spawned sweep task. Dropping the handle stops the sweep.
pub(crate) struct SweepLoopHandle {
    worker_id: String,
    label: &'static str,
    task: JoinHandle<()>,
}

impl SweepLoopHandle {
    pub(crate) fn worker_id(&self) -> &str {
        &self.worker_id
    }
}

impl Drop for SweepLoopHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(
            event = events::SWEEP_LOOP_STOP,
            component = COMPONENT,
            worker_id = self.worker_id.as_str(),
            label = self.label,
            "sweep loop stopped"
        );
    }
}

/// Runs `tick` immediately and then every `period` on the current tokio runtime.
///
/// A tick that overruns the period delays the next one rather than bunching
/// ticks up. Must be called from within a tokio runtime.
pub(crate) fn spawn_sweep_loop<F, Fut>(
    label: &'static str,
    period: Duration,
    mut tick: F,
) -> SweepLoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let worker_id = Uuid::new_v4().to_string();

    info!(
        event = events::SWEEP_LOOP_START,
        component = COMPONENT,
        worker_id = worker_id.as_str(),
        label,
        period_ms = period.as_millis() as u64,
        "starting sweep loop"
    );

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick().await;
        }
    });

    SweepLoopHandle {
        worker_id,
        label,
        task,
    }
}
