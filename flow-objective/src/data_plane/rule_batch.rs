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


//! Completion contexts for rule batches.

use crate::control_plane::default_rule_table::{DefaultRuleKey, DefaultRuleTable};
use crate::flow::{DeviceId, FlowRuleOperations, FlowRuleOperationsContext};
use crate::objective::{Objective, ObjectiveError};
use crate::observability::{events, fields};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "rule_batch";

/// Resolves one objective from the outcome of the batch its rules went out in.
pub(crate) struct ObjectiveRuleContext {
    device_id: DeviceId,
    objective: Objective,
}

impl ObjectiveRuleContext {
    pub(crate) fn new(device_id: DeviceId, objective: impl Into<Objective>) -> Self {
        Self {
            device_id,
            objective: objective.into(),
        }
    }
}

impl FlowRuleOperationsContext for ObjectiveRuleContext {
    fn on_success(&self, operations: &FlowRuleOperations) {
        let resolved = self.objective.succeed();
        debug!(
            event = events::RULE_BATCH_OK,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            objective_id = fields::format_objective(&self.objective),
            rules = fields::format_rule_batch(operations),
            resolved,
            "applied rule batch"
        );
    }

    fn on_error(&self, operations: &FlowRuleOperations) {
        let resolved = self.objective.fail(ObjectiveError::FlowInstallationFailed);
        warn!(
            event = events::RULE_BATCH_FAILED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            objective_id = fields::format_objective(&self.objective),
            rules = fields::format_rule_batch(operations),
            resolved,
            "failed to apply rule batch"
        );
    }
}

/// Logs the outcome of a default-rule batch and, when the device refuses it,
/// rolls the default-rule bookkeeping back so a later call can retry.
pub(crate) struct ProvisionContext {
    device_id: DeviceId,
    description: &'static str,
    table: Arc<DefaultRuleTable>,
    keys: Vec<DefaultRuleKey>,
    install: bool,
}

impl ProvisionContext {
    pub(crate) fn new(
        device_id: DeviceId,
        description: &'static str,
        table: Arc<DefaultRuleTable>,
        keys: Vec<DefaultRuleKey>,
        install: bool,
    ) -> Self {
        Self {
            device_id,
            description,
            table,
            keys,
            install,
        }
    }
}

impl FlowRuleOperationsContext for ProvisionContext {
    fn on_success(&self, operations: &FlowRuleOperations) {
        info!(
            event = events::TABLE_PROVISION_OK,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            table = self.description,
            rules = fields::format_rule_batch(operations),
            "provisioned default rules"
        );
    }

    fn on_error(&self, operations: &FlowRuleOperations) {
        let rolled_back = self.table.roll_back(&self.keys, self.install);
        warn!(
            event = events::TABLE_PROVISION_FAILED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            table = self.description,
            rules = fields::format_rule_batch(operations),
            rolled_back,
            "failed to provision default rules"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectiveRuleContext, ProvisionContext};
    use crate::control_plane::default_rule_table::{DefaultRuleKey, DefaultRuleTable};
    use crate::flow::{
        ApplicationId, Criterion, DeviceId, FlowRule, FlowRuleOperations,
        FlowRuleOperationsContext, PortNumber, TableId, VlanId,
    };
    use crate::objective::{FilteringObjective, Objective, ObjectiveContext, ObjectiveError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outcomes {
        seen: Mutex<Vec<Option<ObjectiveError>>>,
    }

    impl ObjectiveContext for Outcomes {
        fn on_success(&self, _objective: &Objective) {
            self.seen.lock().unwrap().push(None);
        }

        fn on_error(&self, _objective: &Objective, error: ObjectiveError) {
            self.seen.lock().unwrap().push(Some(error));
        }
    }

    fn filter(outcomes: Arc<Outcomes>) -> FilteringObjective {
        FilteringObjective::builder()
            .from_app(ApplicationId::new("app"))
            .with_key(Criterion::InPort(PortNumber(1)))
            .add_condition(Criterion::VlanVid(VlanId(10)))
            .permit()
            .with_context(outcomes)
            .add()
            .expect("filter should build")
    }

    fn batch() -> FlowRuleOperations {
        FlowRuleOperations::builder()
            .add(FlowRule::builder(DeviceId::new("of:1"), ApplicationId::new("app")).build())
            .build(None)
    }

    #[test]
    fn batch_failure_maps_to_flow_installation_failed() {
        let outcomes = Arc::new(Outcomes::default());
        let context = ObjectiveRuleContext::new(DeviceId::new("of:1"), filter(outcomes.clone()));

        context.on_error(&batch());

        assert_eq!(
            *outcomes.seen.lock().unwrap(),
            vec![Some(ObjectiveError::FlowInstallationFailed)]
        );
    }

    #[test]
    fn an_already_resolved_objective_is_not_resolved_again() {
        let outcomes = Arc::new(Outcomes::default());
        let objective = filter(outcomes.clone());
        objective.fail(ObjectiveError::Unsupported);
        let context = ObjectiveRuleContext::new(DeviceId::new("of:1"), objective);

        context.on_success(&batch());

        assert_eq!(
            *outcomes.seen.lock().unwrap(),
            vec![Some(ObjectiveError::Unsupported)]
        );
    }

    #[test]
    fn refused_default_rules_can_be_provisioned_again() {
        let table = Arc::new(DefaultRuleTable::new());
        let rule = FlowRule::builder(DeviceId::new("of:1"), ApplicationId::new("driver"))
            .for_table(TableId(3))
            .build();
        let key = DefaultRuleKey::from_rule(&rule);
        assert!(table.insert_rule(key.clone()));
        let context = ProvisionContext::new(
            DeviceId::new("of:1"),
            "table miss",
            table.clone(),
            vec![key.clone()],
            true,
        );

        context.on_error(&batch());

        assert_eq!(table.len(), 0);
        assert!(table.insert_rule(key));
    }
}
