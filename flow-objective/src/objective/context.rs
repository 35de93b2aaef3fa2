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

use super::{Objective, ObjectiveError};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller-supplied outcome sink for one objective.
///
/// At most one of the two callbacks is invoked, at most once, by whichever
/// component resolves the objective. Both default to doing nothing.
pub trait ObjectiveContext: Send + Sync {
    fn on_success(&self, _objective: &Objective) {}

    fn on_error(&self, _objective: &Objective, _error: ObjectiveError) {}
}

/// One-shot guard around a caller's context.
///
/// Copies of an objective (including ones rebuilt through a copy builder)
/// share the guard, so whichever copy resolves first wins.
#[derive(Clone)]
pub(crate) struct ContextHandle {
    context: Arc<dyn ObjectiveContext>,
    resolved: Arc<AtomicBool>,
}

impl ContextHandle {
    pub(crate) fn new(context: Arc<dyn ObjectiveContext>) -> Self {
        Self {
            context,
            resolved: Arc::new(AtomicBool::new(false)),
        }
    }

    fn claim(&self) -> bool {
        !self.resolved.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn succeed(&self, objective: &Objective) -> bool {
        if !self.claim() {
            return false;
        }
        self.context.on_success(objective);
        true
    }

    pub(crate) fn fail(&self, objective: &Objective, error: ObjectiveError) -> bool {
        if !self.claim() {
            return false;
        }
        self.context.on_error(objective, error);
        true
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

impl Debug for ContextHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
