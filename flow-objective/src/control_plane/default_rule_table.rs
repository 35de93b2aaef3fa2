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

//! Per-device bookkeeping of installed table-miss and fixed rules.

use crate::flow::{FlowRule, TableId, TrafficSelector};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
/// Table slot a default rule occupies.
///
/// Treatment is deliberately left out: re-issuing a default with a different
/// action for the same slot counts as the same rule.
pub(crate) struct DefaultRuleKey {
    pub(crate) table: TableId,
    pub(crate) priority: u16,
    pub(crate) selector: TrafficSelector,
}

impl DefaultRuleKey {
    #[inline(always)]
    pub(crate) fn from_rule(rule: &FlowRule) -> Self {
        let (table, priority, selector) = rule.slot();
        Self {
            table,
            priority,
            selector: selector.clone(),
        }
    }
}

/// Storage owner for idempotent default-rule installs on one device.
///
/// Kept behind a std mutex so batch completion callbacks, which are not
/// async, can roll entries back.
pub(crate) struct DefaultRuleTable {
    rules: Mutex<HashSet<DefaultRuleKey>>,
}

impl DefaultRuleTable {
    pub(crate) fn new() -> Self {
        Self {
            rules: Mutex::new(HashSet::new()),
        }
    }

    fn rules(&self) -> MutexGuard<'_, HashSet<DefaultRuleKey>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a default rule. Returns `true` only when first inserted.
    pub(crate) fn insert_rule(&self, key: DefaultRuleKey) -> bool {
        self.rules().insert(key)
    }

    /// Forgets a default rule. Returns `true` only when the rule was recorded.
    pub(crate) fn remove_rule(&self, key: &DefaultRuleKey) -> bool {
        self.rules().remove(key)
    }

    /// Undoes the bookkeeping of a batch the device did not apply: keys that
    /// were being installed are forgotten, keys being removed come back.
    pub(crate) fn roll_back(&self, keys: &[DefaultRuleKey], installed: bool) -> usize {
        let mut rules = self.rules();
        keys.iter()
            .filter(|key| {
                if installed {
                    rules.remove(*key)
                } else {
                    rules.insert((*key).clone())
                }
            })
            .count()
    }

    /// Forgets every recorded rule, e.g. after the device's rules were purged.
    pub(crate) fn clear(&self) -> usize {
        let mut rules = self.rules();
        let cleared = rules.len();
        rules.clear();
        cleared
    }

    pub(crate) fn len(&self) -> usize {
        self.rules().len()
    }
}

#[cfg(test)]
mod tests {
    use super::{DefaultRuleKey, DefaultRuleTable};
    use crate::flow::{ApplicationId, DeviceId, FlowRule, TableId, TrafficTreatment};

    fn table_miss(table: u8, treatment: TrafficTreatment) -> FlowRule {
        FlowRule::builder(DeviceId::new("of:1"), ApplicationId::new("driver"))
            .for_table(TableId(table))
            .with_treatment(treatment)
            .build()
    }

    #[test]
    fn key_ignores_treatment() {
        let drop = table_miss(0, TrafficTreatment::builder().drop().build());
        let goto = table_miss(0, TrafficTreatment::builder().transition(TableId(1)).build());
        let other_table = table_miss(1, TrafficTreatment::builder().drop().build());

        assert_eq!(DefaultRuleKey::from_rule(&drop), DefaultRuleKey::from_rule(&goto));
        assert_ne!(
            DefaultRuleKey::from_rule(&drop),
            DefaultRuleKey::from_rule(&other_table)
        );
    }

    #[test]
    fn insert_and_remove_are_idempotent() {
        let table = DefaultRuleTable::new();
        let key = DefaultRuleKey::from_rule(&table_miss(4, TrafficTreatment::empty()));

        assert!(table.insert_rule(key.clone()));
        assert!(!table.insert_rule(key.clone()));
        assert_eq!(table.len(), 1);

        assert!(table.remove_rule(&key));
        assert!(!table.remove_rule(&key));
    }

    #[test]
    fn roll_back_reverses_the_batch_direction() {
        let table = DefaultRuleTable::new();
        let installed = DefaultRuleKey::from_rule(&table_miss(1, TrafficTreatment::empty()));
        let removed = DefaultRuleKey::from_rule(&table_miss(2, TrafficTreatment::empty()));
        table.insert_rule(installed.clone());

        assert_eq!(table.roll_back(&[installed.clone()], true), 1);
        assert_eq!(table.len(), 0);

        assert_eq!(table.roll_back(&[removed.clone()], false), 1);
        assert!(!table.insert_rule(removed));
    }
}
