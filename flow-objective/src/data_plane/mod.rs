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


//! Data-plane layer.
//!
//! Completion sinks handed to the rule-submission service and the listener
//! registered with the group-submission service. Both turn collaborator
//! callbacks into objective resolutions or pending-entry confirmations.

pub(crate) mod group_listener;
pub(crate) mod rule_batch;
