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

//! Concrete table entries and the batches they are submitted in.

use super::{ApplicationId, DeviceId, FlowRuleOperationsContext, TableId};
use super::{TrafficSelector, TrafficTreatment};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// One match-action entry for one table of one device.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FlowRule {
    pub device_id: DeviceId,
    pub table: TableId,
    pub priority: u16,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
    pub app_id: ApplicationId,
    pub permanent: bool,
    /// Idle timeout in seconds; ignored for permanent rules.
    pub timeout: u32,
}

impl FlowRule {
    pub fn builder(device_id: DeviceId, app_id: ApplicationId) -> FlowRuleBuilder {
        FlowRuleBuilder {
            rule: FlowRule {
                device_id,
                table: TableId(0),
                priority: 0,
                selector: TrafficSelector::empty(),
                treatment: TrafficTreatment::empty(),
                app_id,
                permanent: true,
                timeout: 0,
            },
        }
    }

    /// Identity of the table slot this rule occupies; a second rule with the
    /// same slot replaces the first.
    pub fn slot(&self) -> (TableId, u16, &TrafficSelector) {
        (self.table, self.priority, &self.selector)
    }
}

impl Display for FlowRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table={} priority={} selector={} treatment={{{}}}",
            self.table, self.priority, self.selector, self.treatment
        )
    }
}

pub struct FlowRuleBuilder {
    rule: FlowRule,
}

impl FlowRuleBuilder {
    pub fn for_table(mut self, table: TableId) -> Self {
        self.rule.table = table;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.rule.priority = priority;
        self
    }

    pub fn with_selector(mut self, selector: TrafficSelector) -> Self {
        self.rule.selector = selector;
        self
    }

    pub fn with_treatment(mut self, treatment: TrafficTreatment) -> Self {
        self.rule.treatment = treatment;
        self
    }

    pub fn make_permanent(mut self) -> Self {
        self.rule.permanent = true;
        self.rule.timeout = 0;
        self
    }

    pub fn make_temporary(mut self, timeout: u32) -> Self {
        self.rule.permanent = false;
        self.rule.timeout = timeout;
        self
    }

    pub fn build(self) -> FlowRule {
        self.rule
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RuleOperationKind {
    Add,
    Remove,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowRuleOperation {
    pub kind: RuleOperationKind,
    pub rule: FlowRule,
}

/// Batch of rule operations resolved as a whole through one completion context.
#[derive(Clone)]
pub struct FlowRuleOperations {
    operations: Vec<FlowRuleOperation>,
    context: Option<Arc<dyn FlowRuleOperationsContext>>,
}

impl FlowRuleOperations {
    pub fn builder() -> FlowRuleOperationsBuilder {
        FlowRuleOperationsBuilder::default()
    }

    pub fn operations(&self) -> &[FlowRuleOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Reports batch success to the submitter, if it asked to be told.
    pub fn complete_success(&self) {
        if let Some(context) = self.context.as_ref() {
            context.on_success(self);
        }
    }

    /// Reports batch failure to the submitter, if it asked to be told.
    pub fn complete_error(&self) {
        if let Some(context) = self.context.as_ref() {
            context.on_error(self);
        }
    }
}

impl Debug for FlowRuleOperations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuleOperations")
            .field("operations", &self.operations)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct FlowRuleOperationsBuilder {
    operations: Vec<FlowRuleOperation>,
}

impl FlowRuleOperationsBuilder {
    pub fn add(mut self, rule: FlowRule) -> Self {
        self.operations.push(FlowRuleOperation {
            kind: RuleOperationKind::Add,
            rule,
        });
        self
    }

    pub fn remove(mut self, rule: FlowRule) -> Self {
        self.operations.push(FlowRuleOperation {
            kind: RuleOperationKind::Remove,
            rule,
        });
        self
    }

    /// Adds or removes depending on `install`.
    pub fn add_or_remove(self, install: bool, rule: FlowRule) -> Self {
        if install {
            self.add(rule)
        } else {
            self.remove(rule)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn build(self, context: Option<Arc<dyn FlowRuleOperationsContext>>) -> FlowRuleOperations {
        FlowRuleOperations {
            operations: self.operations,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowRule, FlowRuleOperations, RuleOperationKind};
    use crate::flow::{
        ApplicationId, DeviceId, FlowRuleOperationsContext, TableId, TrafficSelector,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingContext {
        successes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl FlowRuleOperationsContext for CountingContext {
        fn on_success(&self, _operations: &FlowRuleOperations) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _operations: &FlowRuleOperations) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn rule(table: u8) -> FlowRule {
        FlowRule::builder(DeviceId::new("of:1"), ApplicationId::new("test"))
            .for_table(TableId(table))
            .with_selector(TrafficSelector::empty())
            .make_temporary(30)
            .build()
    }

    #[test]
    fn batch_keeps_operation_order_and_kinds() {
        let operations = FlowRuleOperations::builder()
            .add(rule(0))
            .add_or_remove(false, rule(1))
            .build(None);

        assert_eq!(operations.len(), 2);
        assert_eq!(operations.operations()[0].kind, RuleOperationKind::Add);
        assert_eq!(operations.operations()[1].kind, RuleOperationKind::Remove);
        assert!(!operations.operations()[0].rule.permanent);
    }

    #[test]
    fn completion_reaches_context() {
        let context = Arc::new(CountingContext::default());
        let operations = FlowRuleOperations::builder()
            .add(rule(0))
            .build(Some(context.clone()));

        operations.complete_success();
        operations.complete_error();

        assert_eq!(context.successes.load(Ordering::SeqCst), 1);
        assert_eq!(context.errors.load(Ordering::SeqCst), 1);
    }
}
