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
use crate::flow::{ApplicationId, TrafficSelector, TrafficTreatment};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const DEFAULT_WEIGHT: u16 = 1;

/// Cluster-unique handle for a set of next-hop treatments. Allocate through the
/// objective store, never invent one.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NextId(pub u32);

impl Display for NextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NextType {
    Hashed,
    Broadcast,
    Failover,
    Simple,
}

impl Display for NextType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NextType::Hashed => "HASHED",
            NextType::Broadcast => "BROADCAST",
            NextType::Failover => "FAILOVER",
            NextType::Simple => "SIMPLE",
        };
        write!(f, "{name}")
    }
}

/// One member of a next objective.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum NextTreatment {
    Treatment {
        treatment: TrafficTreatment,
        weight: u16,
    },
    /// Reference to another next objective.
    Id { next_id: NextId, weight: u16 },
}

impl NextTreatment {
    pub fn of(treatment: TrafficTreatment) -> Self {
        NextTreatment::Treatment {
            treatment,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn weight(&self) -> u16 {
        match self {
            NextTreatment::Treatment { weight, .. } | NextTreatment::Id { weight, .. } => *weight,
        }
    }

    pub fn treatment(&self) -> Option<&TrafficTreatment> {
        match self {
            NextTreatment::Treatment { treatment, .. } => Some(treatment),
            NextTreatment::Id { .. } => None,
        }
    }
}

/// Collection of next-hop treatments published under a next id.
#[derive(Clone, Debug)]
pub struct NextObjective {
    header: ObjectiveHeader,
    next_id: NextId,
    next_type: NextType,
    treatments: Vec<NextTreatment>,
    meta: Option<TrafficSelector>,
}

impl NextObjective {
    pub fn builder() -> NextObjectiveBuilder {
        NextObjectiveBuilder::default()
    }

    /// Builder pre-populated with this objective, context included.
    pub fn copy(&self) -> NextObjectiveBuilder {
        NextObjectiveBuilder {
            common: CommonFields::from_header(&self.header),
            next_id: Some(self.next_id),
            next_type: Some(self.next_type),
            treatments: self.treatments.clone(),
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

    pub fn next_id(&self) -> NextId {
        self.next_id
    }

    pub fn next_type(&self) -> NextType {
        self.next_type
    }

    pub fn treatments(&self) -> &[NextTreatment] {
        &self.treatments
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
pub struct NextObjectiveBuilder {
    common: CommonFields,
    next_id: Option<NextId>,
    next_type: Option<NextType>,
    treatments: Vec<NextTreatment>,
    meta: Option<TrafficSelector>,
}

impl NextObjectiveBuilder {
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

    pub fn with_id(mut self, next_id: NextId) -> Self {
        self.next_id = Some(next_id);
        self
    }

    pub fn with_type(mut self, next_type: NextType) -> Self {
        self.next_type = Some(next_type);
        self
    }

    pub fn add_treatment(self, treatment: TrafficTreatment) -> Self {
        self.add_next_treatment(NextTreatment::of(treatment))
    }

    pub fn add_next_treatment(mut self, treatment: NextTreatment) -> Self {
        self.treatments.push(treatment);
        self
    }

    pub fn with_meta(mut self, meta: TrafficSelector) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn add(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::Add)
    }

    pub fn remove(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::Remove)
    }

    pub fn add_to_existing(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::AddToExisting)
    }

    pub fn remove_from_existing(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::RemoveFromExisting)
    }

    pub fn modify(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::Modify)
    }

    pub fn verify(self) -> Result<NextObjective, ObjectiveBuildError> {
        self.build(Operation::Verify)
    }

    fn build(self, operation: Operation) -> Result<NextObjective, ObjectiveBuildError> {
        let validated = self.common.validate()?;
        let next_id = self.next_id.ok_or(ObjectiveBuildError::MissingNextId)?;
        let next_type = self.next_type.ok_or(ObjectiveBuildError::MissingNextType)?;
        let needs_treatments = matches!(operation, Operation::Add | Operation::AddToExisting);
        if needs_treatments && self.treatments.is_empty() {
            return Err(ObjectiveBuildError::EmptyTreatments);
        }

        let id = ObjectiveId::of(&("next", &validated, next_id, next_type, &self.treatments));

        Ok(NextObjective {
            header: self.common.into_header(validated, id, operation),
            next_id,
            next_type,
            treatments: self.treatments,
            meta: self.meta,
        })
    }
}
