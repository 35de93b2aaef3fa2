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

//! Canonical structured event names used across `flow-objective`.

// Pipeline provisioning events.
pub const PIPELINE_INIT_START: &str = "pipeline_init_start";
pub const PIPELINE_INIT_OK: &str = "pipeline_init_ok";
pub const PIPELINE_SHUTDOWN: &str = "pipeline_shutdown";
pub const DEFAULT_RULE_SKIPPED: &str = "default_rule_skipped";
pub const TABLE_PROVISION_OK: &str = "table_provision_ok";
pub const TABLE_PROVISION_FAILED: &str = "table_provision_failed";

// Objective translation events.
pub const FILTER_TRANSLATE: &str = "filter_translate";
pub const FORWARD_TRANSLATE: &str = "forward_translate";
pub const NEXT_TRANSLATE: &str = "next_translate";
pub const VERSATILE_CLEAR_DEFERRED_STRIPPED: &str = "versatile_clear_deferred_stripped";
pub const OBJECTIVE_UNSUPPORTED: &str = "objective_unsupported";
pub const OBJECTIVE_REJECTED: &str = "objective_rejected";
pub const RULE_BATCH_OK: &str = "rule_batch_ok";
pub const RULE_BATCH_FAILED: &str = "rule_batch_failed";

// Next-hop group confirmation events.
pub const NEXT_GROUP_SUBMITTED: &str = "next_group_submitted";
pub const NEXT_ACTIONS_STORED: &str = "next_actions_stored";
pub const NEXT_PENDING_SUPERSEDED: &str = "next_pending_superseded";
pub const NEXT_CONFIRMED: &str = "next_confirmed";
pub const NEXT_EXPIRED: &str = "next_expired";
pub const NEXT_GROUP_ADD_FAILED: &str = "next_group_add_failed";
pub const NEXT_GROUP_MISSING: &str = "next_group_missing";
pub const NEXT_REMOVED: &str = "next_removed";
pub const NEXT_HANDLE_CODEC_FAILED: &str = "next_handle_codec_failed";

// Dispatch service events.
pub const DEVICE_REGISTER_OK: &str = "device_register_ok";
pub const DEVICE_REGISTER_FAILED: &str = "device_register_failed";
pub const DEVICE_UNREGISTER: &str = "device_unregister";
pub const NO_PIPELINER_RETRY: &str = "no_pipeliner_retry";
pub const NO_PIPELINER_GIVE_UP: &str = "no_pipeliner_give_up";
pub const OBJECTIVE_QUEUED: &str = "objective_queued";
pub const OBJECTIVE_RELEASED: &str = "objective_released";
pub const OBJECTIVE_QUEUE_EXPIRED: &str = "objective_queue_expired";
pub const PURGE_ALL: &str = "purge_all";

// Runtime events.
pub const SWEEP_LOOP_START: &str = "sweep_loop_start";
pub const SWEEP_LOOP_STOP: &str = "sweep_loop_stop";
