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

//! Device-independent objectives.
//!
//! Objectives are immutable once built. Every builder validates in its
//! terminal call (`add()`, `remove()`, ...) and returns an
//! [`ObjectiveBuildError`] instead of a half-formed value. Runtime failures
//! are a different thing: they are reported later, through the
//! [`ObjectiveContext`] attached to the objective, as an [`ObjectiveError`].

mod context;
mod filtering;
mod forwarding;
mod next;

pub use context::ObjectiveContext;
pub use filtering::{FilterType, FilteringObjective, FilteringObjectiveBuilder};
pub use forwarding::{ForwardingFlag, ForwardingObjective, ForwardingObjectiveBuilder};
pub use next::{NextId, NextObjective, NextObjectiveBuilder, NextTreatment, NextType};

pub(crate) use context::ContextHandle;

use crate::flow::ApplicationId;
use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const DEFAULT_PRIORITY: u16 = 32768;
pub const MIN_PRIORITY: u32 = 0;
pub const MAX_PRIORITY: u32 = 65535;
pub const DEFAULT_TIMEOUT: u32 = 0;
pub const DEFAULT_PERMANENT: bool = true;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Add,
    Remove,
    /// Next objectives only.
    AddToExisting,
    /// Next objectives only.
    RemoveFromExisting,
    /// Next objectives only.
    Modify,
    /// Next objectives only.
    Verify,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Add => "ADD",
            Operation::Remove => "REMOVE",
            Operation::AddToExisting => "ADD_TO_EXISTING",
            Operation::RemoveFromExisting => "REMOVE_FROM_EXISTING",
            Operation::Modify => "MODIFY",
            Operation::Verify => "VERIFY",
        };
        write!(f, "{name}")
    }
}

/// Content-derived objective identity. Identical content gives an identical id,
/// so retries and duplicates of the same objective collapse.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectiveId(u64);

impl ObjectiveId {
    pub(crate) fn of(content: &impl Hash) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for ObjectiveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Runtime outcome vocabulary delivered through [`ObjectiveContext::on_error`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ObjectiveError {
    Unsupported,
    FlowInstallationFailed,
    GroupInstallationFailed,
    GroupRemovalFailed,
    GroupMissing,
    DeviceMissing,
    BadParams,
    NoPipeliner,
    Unknown,
    InstallationThresholdExceeded,
    InstallationTimeout,
    GroupExists,
}

impl ObjectiveError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveError::Unsupported => "UNSUPPORTED",
            ObjectiveError::FlowInstallationFailed => "FLOWINSTALLATIONFAILED",
            ObjectiveError::GroupInstallationFailed => "GROUPINSTALLATIONFAILED",
            ObjectiveError::GroupRemovalFailed => "GROUPREMOVALFAILED",
            ObjectiveError::GroupMissing => "GROUPMISSING",
            ObjectiveError::DeviceMissing => "DEVICEMISSING",
            ObjectiveError::BadParams => "BADPARAMS",
            ObjectiveError::NoPipeliner => "NOPIPELINER",
            ObjectiveError::Unknown => "UNKNOWN",
            ObjectiveError::InstallationThresholdExceeded => "INSTALLATIONTHRESHOLDEXCEEDED",
            ObjectiveError::InstallationTimeout => "INSTALLATIONTIMEOUT",
            ObjectiveError::GroupExists => "GROUPEXISTS",
        }
    }
}

impl Display for ObjectiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Error for ObjectiveError {}

/// Builder validation failures. Returned synchronously by builder terminals,
/// never reported through a context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ObjectiveBuildError {
    MissingAppId,
    EmptyConditions,
    EmptyTreatments,
    PriorityOutOfRange(u32),
    MissingFilterType,
    MissingSelector,
    MissingFlag,
    MissingNextId,
    MissingNextType,
    BothNextIdAndTreatment,
    NeitherNextIdNorTreatment,
}

impl Display for ObjectiveBuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveBuildError::MissingAppId => write!(f, "an application id must be set"),
            ObjectiveBuildError::EmptyConditions => {
                write!(f, "filtering conditions must not be empty")
            }
            ObjectiveBuildError::EmptyTreatments => {
                write!(f, "next treatments must not be empty")
            }
            ObjectiveBuildError::PriorityOutOfRange(priority) => write!(
                f,
                "priority {priority} is outside [{MIN_PRIORITY}, {MAX_PRIORITY}]"
            ),
            ObjectiveBuildError::MissingFilterType => {
                write!(f, "filter type must be PERMIT or DENY")
            }
            ObjectiveBuildError::MissingSelector => write!(f, "a selector must be set"),
            ObjectiveBuildError::MissingFlag => write!(f, "a forwarding flag must be set"),
            ObjectiveBuildError::MissingNextId => write!(f, "a next id must be set"),
            ObjectiveBuildError::MissingNextType => write!(f, "a next type must be set"),
            ObjectiveBuildError::BothNextIdAndTreatment => {
                write!(f, "next id and treatment are mutually exclusive")
            }
            ObjectiveBuildError::NeitherNextIdNorTreatment => {
                write!(f, "either a next id or a treatment must be set")
            }
        }
    }
}

impl Error for ObjectiveBuildError {}

/// Fields every objective carries.
#[derive(Clone, Debug)]
pub struct ObjectiveHeader {
    id: ObjectiveId,
    priority: u16,
    app_id: ApplicationId,
    timeout: u32,
    permanent: bool,
    operation: Operation,
    context: Option<ContextHandle>,
}

impl ObjectiveHeader {
    pub fn id(&self) -> ObjectiveId {
        self.id
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn app_id(&self) -> &ApplicationId {
        &self.app_id
    }

    /// Seconds; meaningful only when not permanent.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub(crate) fn context(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }
}

/// Builder fields shared by the three objective builders.
#[derive(Clone, Default)]
pub(crate) struct CommonFields {
    pub(crate) app_id: Option<ApplicationId>,
    pub(crate) priority: Option<u32>,
    pub(crate) timeout: Option<u32>,
    pub(crate) permanent: Option<bool>,
    pub(crate) context: Option<ContextHandle>,
}

impl CommonFields {
    pub(crate) fn from_header(header: &ObjectiveHeader) -> Self {
        Self {
            app_id: Some(header.app_id.clone()),
            priority: Some(u32::from(header.priority)),
            timeout: Some(header.timeout),
            permanent: Some(header.permanent),
            context: header.context.clone(),
        }
    }

    pub(crate) fn set_context(&mut self, context: Arc<dyn ObjectiveContext>) {
        self.context = Some(ContextHandle::new(context));
    }

    pub(crate) fn validate(&self) -> Result<ValidatedCommon, ObjectiveBuildError> {
        let app_id = self
            .app_id
            .clone()
            .ok_or(ObjectiveBuildError::MissingAppId)?;
        let priority = self.priority.unwrap_or(u32::from(DEFAULT_PRIORITY));
        let priority =
            u16::try_from(priority).map_err(|_| ObjectiveBuildError::PriorityOutOfRange(priority))?;

        Ok(ValidatedCommon {
            app_id,
            priority,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            permanent: self.permanent.unwrap_or(DEFAULT_PERMANENT),
        })
    }

    pub(crate) fn into_header(
        self,
        validated: ValidatedCommon,
        id: ObjectiveId,
        operation: Operation,
    ) -> ObjectiveHeader {
        ObjectiveHeader {
            id,
            priority: validated.priority,
            app_id: validated.app_id,
            timeout: validated.timeout,
            permanent: validated.permanent,
            operation,
            context: self.context,
        }
    }
}

/// Common fields after validation; these feed the content hash.
#[derive(Clone, Debug, Hash)]
pub(crate) struct ValidatedCommon {
    pub(crate) app_id: ApplicationId,
    pub(crate) priority: u16,
    pub(crate) timeout: u32,
    pub(crate) permanent: bool,
}

/// Closed set of objective kinds.
#[derive(Clone, Debug)]
pub enum Objective {
    Filtering(FilteringObjective),
    Forwarding(ForwardingObjective),
    Next(NextObjective),
}

impl Objective {
    pub fn header(&self) -> &ObjectiveHeader {
        match self {
            Objective::Filtering(filtering) => filtering.header(),
            Objective::Forwarding(forwarding) => forwarding.header(),
            Objective::Next(next) => next.header(),
        }
    }

    pub fn id(&self) -> ObjectiveId {
        self.header().id()
    }

    pub fn operation(&self) -> Operation {
        self.header().operation()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Objective::Filtering(_) => "filtering",
            Objective::Forwarding(_) => "forwarding",
            Objective::Next(_) => "next",
        }
    }

    /// Resolves the objective successfully. Returns `false` when there is no
    /// context or it was already resolved.
    pub fn succeed(&self) -> bool {
        match self.header().context() {
            Some(context) => context.succeed(self),
            None => false,
        }
    }

    /// Resolves the objective with `error`. Returns `false` when there is no
    /// context or it was already resolved.
    pub fn fail(&self, error: ObjectiveError) -> bool {
        match self.header().context() {
            Some(context) => context.fail(self, error),
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.header()
            .context()
            .map(ContextHandle::is_resolved)
            .unwrap_or(false)
    }
}

impl From<FilteringObjective> for Objective {
    fn from(value: FilteringObjective) -> Self {
        Objective::Filtering(value)
    }
}

impl From<ForwardingObjective> for Objective {
    fn from(value: ForwardingObjective) -> Self {
        Objective::Forwarding(value)
    }
}

impl From<NextObjective> for Objective {
    fn from(value: NextObjective) -> Self {
        Objective::Next(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectiveBuildError, ObjectiveError, ObjectiveId};
    use std::error::Error;

    #[test]
    fn objective_error_names_are_canonical() {
        assert_eq!(ObjectiveError::GroupMissing.to_string(), "GROUPMISSING");
        assert_eq!(
            ObjectiveError::InstallationThresholdExceeded.as_str(),
            "INSTALLATIONTHRESHOLDEXCEEDED"
        );
    }

    #[test]
    fn build_error_display_is_stable() {
        let error = ObjectiveBuildError::PriorityOutOfRange(70000);

        assert_eq!(error.to_string(), "priority 70000 is outside [0, 65535]");
        assert!(error.source().is_none());
    }

    #[test]
    fn objective_id_is_content_derived() {
        assert_eq!(ObjectiveId::of(&("a", 1u32)), ObjectiveId::of(&("a", 1u32)));
        assert_ne!(ObjectiveId::of(&("a", 1u32)), ObjectiveId::of(&("a", 2u32)));
    }
}
