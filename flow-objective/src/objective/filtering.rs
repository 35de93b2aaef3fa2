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
    CommonFields, Objective, ObjectiveBuildError, ObjectiveContext, ObjectiveError,
    ObjectiveHeader, ObjectiveId, Operation,
};
use crate::flow::{ApplicationId, Criterion, TrafficTreatment};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterType {
    Permit,
    Deny,
}

/// Admit or drop traffic entering the device, typically keyed on the ingress port.
#[derive(Clone, Debug)]
pub struct FilteringObjective {
    header: ObjectiveHeader,
    key: Option<Criterion>,
    conditions: Vec<Criterion>,
    filter_type: FilterType,
    meta: Option<TrafficTreatment>,
}

impl FilteringObjective {
    pub fn builder() -> FilteringObjectiveBuilder {
        FilteringObjectiveBuilder::default()
    }

    /// Builder pre-populated with this objective, context included.
    pub fn copy(&self) -> FilteringObjectiveBuilder {
        FilteringObjectiveBuilder {
            common: CommonFields::from_header(&self.header),
            key: self.key,
            conditions: self.conditions.clone(),
            filter_type: Some(self.filter_type),
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

    pub fn key(&self) -> Option<&Criterion> {
        self.key.as_ref()
    }

    pub fn conditions(&self) -> &[Criterion] {
        &self.conditions
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn meta(&self) -> Option<&TrafficTreatment> {
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
pub struct FilteringObjectiveBuilder {
    common: CommonFields,
    key: Option<Criterion>,
    conditions: Vec<Criterion>,
    filter_type: Option<FilterType>,
    meta: Option<TrafficTreatment>,
}

impl FilteringObjectiveBuilder {
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

    pub fn with_key(mut self, key: Criterion) -> Self {
        self.key = Some(key);
        self
    }

    pub fn add_condition(mut self, condition: Criterion) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn permit(mut self) -> Self {
        self.filter_type = Some(FilterType::Permit);
        self
    }

    pub fn deny(mut self) -> Self {
        self.filter_type = Some(FilterType::Deny);
        self
    }

    pub fn with_meta(mut self, meta: TrafficTreatment) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn add(self) -> Result<FilteringObjective, ObjectiveBuildError> {
        self.build(Operation::Add)
    }

    pub fn remove(self) -> Result<FilteringObjective, ObjectiveBuildError> {
        self.build(Operation::Remove)
    }

    fn build(self, operation: Operation) -> Result<FilteringObjective, ObjectiveBuildError> {
        let validated = self.common.validate()?;
        let filter_type = self
            .filter_type
            .ok_or(ObjectiveBuildError::MissingFilterType)?;
        if self.conditions.is_empty() {
            return Err(ObjectiveBuildError::EmptyConditions);
        }

        let id = ObjectiveId::of(&(
            "filtering",
            &validated,
            &self.key,
            &self.conditions,
            filter_type,
        ));

        Ok(FilteringObjective {
            header: self.common.into_header(validated, id, operation),
            key: self.key,
            conditions: self.conditions,
            filter_type,
            meta: self.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterType, FilteringObjective};
    use crate::flow::{ApplicationId, Criterion, MacAddress, PortNumber, VlanId};
    use crate::objective::{ObjectiveBuildError, Operation, DEFAULT_PRIORITY};

    fn base() -> super::FilteringObjectiveBuilder {
        FilteringObjective::builder()
            .from_app(ApplicationId::new("segmentrouting"))
            .with_key(Criterion::InPort(PortNumber(1)))
            .permit()
    }

    #[test]
    fn add_requires_conditions() {
        let result = base().add();

        assert_eq!(result.err(), Some(ObjectiveBuildError::EmptyConditions));
    }

    #[test]
    fn remove_requires_conditions_too() {
        let result = base().remove();

        assert_eq!(result.err(), Some(ObjectiveBuildError::EmptyConditions));
    }

    #[test]
    fn missing_app_and_type_are_reported() {
        let no_app = FilteringObjective::builder()
            .permit()
            .add_condition(Criterion::VlanVid(VlanId(1)))
            .add();
        let no_type = FilteringObjective::builder()
            .from_app(ApplicationId::new("app"))
            .add_condition(Criterion::VlanVid(VlanId(1)))
            .add();

        assert_eq!(no_app.err(), Some(ObjectiveBuildError::MissingAppId));
        assert_eq!(no_type.err(), Some(ObjectiveBuildError::MissingFilterType));
    }

    #[test]
    fn priority_bound_is_enforced_at_build() {
        let result = base()
            .add_condition(Criterion::VlanVid(VlanId(1)))
            .with_priority(65536)
            .add();

        assert_eq!(
            result.err(),
            Some(ObjectiveBuildError::PriorityOutOfRange(65536))
        );
    }

    #[test]
    fn defaults_and_operation_are_stamped() {
        let objective = base()
            .add_condition(Criterion::EthDst(MacAddress([0, 0, 0, 0, 0, 1])))
            .remove()
            .expect("objective should build");

        assert_eq!(objective.operation(), Operation::Remove);
        assert_eq!(objective.header().priority(), DEFAULT_PRIORITY);
        assert!(objective.header().is_permanent());
        assert_eq!(objective.filter_type(), FilterType::Permit);
    }

    #[test]
    fn identical_content_gives_identical_id() {
        let build = || {
            base()
                .add_condition(Criterion::VlanVid(VlanId(10)))
                .with_priority(100)
                .add()
                .expect("objective should build")
        };
        let other = base()
            .add_condition(Criterion::VlanVid(VlanId(11)))
            .with_priority(100)
            .add()
            .expect("objective should build");

        assert_eq!(build().id(), build().id());
        assert_ne!(build().id(), other.id());
    }

    #[test]
    fn operation_does_not_change_the_id() {
        let add = base()
            .add_condition(Criterion::VlanVid(VlanId(10)))
            .add()
            .expect("objective should build");
        let remove = add.copy().remove().expect("objective should build");

        assert_eq!(add.id(), remove.id());
    }
}
