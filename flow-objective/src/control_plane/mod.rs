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

//! Control-plane layer.
//!
//! Owns the state that decides *whether* work happens: which device has which
//! pipeliner, which default rules a device already has, which next objectives
//! are waiting for a group, and which objectives wait for a next id. Every
//! owner here removes entries atomically so that competing callers observe a
//! single winner.

pub(crate) mod default_rule_table;
pub(crate) mod objective_queue;
pub(crate) mod pending_cache;
pub(crate) mod pipeliner_registry;
pub(crate) mod store_observer;
