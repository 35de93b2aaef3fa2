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


use flow_objective::objective::{Objective, ObjectiveContext, ObjectiveError, ObjectiveId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    pub objective_id: ObjectiveId,
    pub kind: &'static str,
    pub result: Result<(), ObjectiveError>,
}

/// Objective context that records every callback it receives.
#[derive(Default)]
pub struct RecordingContext {
    outcomes: Mutex<Vec<Outcome>>,
    resolved: Notify,
}

impl RecordingContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .expect("outcome lock poisoned")
            .clone()
    }

    pub fn resolution_count(&self) -> usize {
        self.outcomes.lock().expect("outcome lock poisoned").len()
    }

    pub fn errors(&self) -> Vec<ObjectiveError> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| outcome.result.err())
            .collect()
    }

    /// Waits until at least `count` outcomes were recorded. Returns whether
    /// that happened before `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.resolved.notified();
                if self.resolution_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    fn record(&self, objective: &Objective, result: Result<(), ObjectiveError>) {
        self.outcomes
            .lock()
            .expect("outcome lock poisoned")
            .push(Outcome {
                objective_id: objective.id(),
                kind: objective.kind(),
                result,
            });
        self.resolved.notify_waiters();
    }
}

impl ObjectiveContext for RecordingContext {
    fn on_success(&self, objective: &Objective) {
        self.record(objective, Ok(()));
    }

    fn on_error(&self, objective: &Objective, error: ObjectiveError) {
        self.record(objective, Err(error));
    }
}
