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

//! Canonical structured field keys and value-format helpers.

use crate::flow::{FlowRuleOperations, RuleOperationKind};
use crate::objective::Objective;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const WORKER_ID: &str = "worker_id";

pub const DEVICE_ID: &str = "device_id";
pub const DRIVER: &str = "driver";
pub const OBJECTIVE_ID: &str = "objective_id";
pub const OPERATION: &str = "operation";
pub const NEXT_ID: &str = "next_id";
pub const GROUP_KEY: &str = "group_key";
pub const TABLE: &str = "table";
pub const CHANNEL: &str = "channel";
pub const ATTEMPT: &str = "attempt";

pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const CHANNEL_EVENT: &str = "event";
pub const CHANNEL_POLL: &str = "poll";
pub const REASON_DENY_FILTER: &str = "deny_filter";
pub const REASON_MISSING_PORT_KEY: &str = "missing_port_key";
pub const REASON_UNSUPPORTED_CRITERION: &str = "unsupported_criterion";
pub const REASON_UNSUPPORTED_FLAG: &str = "unsupported_flag";
pub const REASON_UNSUPPORTED_NEXT_TYPE: &str = "unsupported_next_type";
pub const REASON_UNSUPPORTED_OPERATION: &str = "unsupported_operation";
pub const REASON_MISSING_ETH_TYPE: &str = "missing_eth_type";
pub const REASON_NEXT_NOT_STORED: &str = "next_not_stored";
pub const REASON_GROUP_NOT_LIVE: &str = "group_not_live";
pub const REASON_MISSING_NEXT_ID: &str = "missing_next_id";
pub const REASON_MISSING_MATCH: &str = "missing_match";
pub const REASON_BAD_NEXT_TREATMENT: &str = "bad_next_treatment";
pub const REASON_HANDLE_CODEC: &str = "handle_codec";
pub const REASON_REBUILD_FAILED: &str = "rebuild_failed";

/// Compact `kind:id` label for an objective.
pub fn format_objective(objective: &Objective) -> String {
    format!("{}:{}", objective.kind(), objective.id())
}

/// Summary such as `add=2 remove=1` for a rule batch.
pub fn format_rule_batch(operations: &FlowRuleOperations) -> String {
    let adds = operations
        .operations()
        .iter()
        .filter(|operation| operation.kind == RuleOperationKind::Add)
        .count();
    format!("add={} remove={}", adds, operations.len() - adds)
}
