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

use super::{
    CommonFields, NextId, Objective, ObjectiveBuildError, ObjectiveContext, ObjectiveError,
    ObjectiveHeader, ObjectiveId, Operation,
};
use crate::flow::{ApplicationId, TrafficSelector, TrafficTreatment};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ForwardingFlag {
    /// Narrow match handled by a dedicated pipeline stage (routing, switching).
    Specific,
    /// ACL-style match on arbitrary fields.
    Versatile,
    /// Egress processing; needs egress tables on the device.
    Egress,
}

impl Display for ForwardingFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ForwardingFlag::Specific => "SPECIFIC",
            ForwardingFlag::Versatile => "VERSATILE",
            ForwardingFlag::Egress => "EGRESS",
        };
        write!(f, "{name}")
    }
}

/// Send matching traffic to a next hop (by next id) or through an inline treatment.
#[derive(Clone, Debug)]
pub struct ForwardingObjective {
    header: ObjectiveHeader,
    selector: TrafficSelector,
    next_id: Option<NextId>,
    treatment: Option<TrafficTreatment>,
    flag: ForwardingFlag,
    meta: Option<TrafficSelector>,
}

impl ForwardingObjective {
    pub fn builder() -> ForwardingObjectiveBuilder {
        ForwardingObjectiveBuilder::default()
    }

    /// Builder pre-populated with this objective, context included.
    pub fn copy(&self) -> ForwardingObjectiveBuilder {
        ForwardingObjectiveBuilder {
            common: CommonFields::from_header(&self.header),
            selector: Some(self.selector.clone()),
            next_id: self.next_id,
            treatment: self.treatment.clone(),
            flag: Some(self.flag),
            meta: self.meta.clone(),
        }
    }

    pub fn header(&self) -> &ObjectiveHeader {
        &self.header
    }

    pub fn id(&self) -> ObjectiveId {
        self.header.id()
    }

    pub fn operation(&self) -> Operation {
        self.header.operation()
    }

    pub fn selector(&self) -> &TrafficSelector {
        &self.selector
    }

    pub fn next_id(&self) -> Option<NextId> {
        self.next_id
    }

    pub fn treatment(&self) -> Option<&TrafficTreatment> {
        self.treatment.as_ref()
    }

    pub fn flag(&self) -> ForwardingFlag {
        self.flag
    }

    pub fn meta(&self) -> Option<&TrafficSelector> {
        self.meta.as_ref()
    }

    pub fn succeed(&self) -> bool {
        self.header.has_context() && Objective::from(self.clone()).succeed()
    }

    pub fn fail(&self, error: ObjectiveError) -> bool {
        self.header.has_context() && Objective::from(self.clone()).fail(error)
    }
}

#[derive(Clone, Default)]
pub struct ForwardingObjectiveBuilder {
    common: CommonFields,
    selector: Option<TrafficSelector>,
    next_id: Option<NextId>,
    treatment: Option<TrafficTreatment>,
    flag: Option<ForwardingFlag>,
    meta: Option<TrafficSelector>,
}

impl ForwardingObjectiveBuilder {
    pub fn from_app(mut self, app_id: ApplicationId) -> Self {
        self.common.app_id = Some(app_id);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.common.priority = Some(priority);
        self
    }

    pub fn make_temporary(mut self, timeout: u32) -> Self {
        self.common.permanent = Some(false);
        self.common.timeout = Some(timeout);
        self
    }

    pub fn make_permanent(mut self) -> Self {
        self.common.permanent = Some(true);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ObjectiveContext>) -> Self {
        self.common.set_context(context);
        self
    }

    pub fn with_selector(mut self, selector: TrafficSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn next_step(mut self, next_id: NextId) -> Self {
        self.next_id = Some(next_id);
        self
    }

    pub fn with_treatment(mut self, treatment: TrafficTreatment) -> Self {
        self.treatment = Some(treatment);
        self
    }

    /// Drops any previously set next id. Used when rewriting a copy.
    pub fn clear_next_step(mut self) -> Self {
        self.next_id = None;
        self
    }

    pub fn with_flag(mut self, flag: ForwardingFlag) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn with_meta(mut self, meta: TrafficSelector) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn add(self) -> Result<ForwardingObjective, ObjectiveBuildError> {
        self.build(Operation::Add)
    }

    pub fn remove(self) -> Result<ForwardingObjective, ObjectiveBuildError> {
        self.build(Operation::Remove)
    }

    fn build(self, operation: Operation) -> Result<ForwardingObjective, ObjectiveBuildError> {
        let validated = self.common.validate()?;
        let selector = self
            .selector
            .clone()
            .ok_or(ObjectiveBuildError::MissingSelector)?;
        let flag = self.flag.ok_or(ObjectiveBuildError::MissingFlag)?;
        match (&self.next_id, &self.treatment) {
            (Some(_), Some(_)) => return Err(ObjectiveBuildError::BothNextIdAndTreatment),
            (None, None) => return Err(ObjectiveBuildError::NeitherNextIdNorTreatment),
            _ => {}
        }

        let id = ObjectiveId::of(&(
            "forwarding",
            &validated,
            &selector,
            &self.next_id,
            &self.treatment,
            flag,
        ));

        Ok(ForwardingObjective {
            header: self.common.into_header(validated, id, operation),
            selector,
            next_id: self.next_id,
            treatment: self.treatment,
            flag,
            meta: self.meta,
        })
    }
}
