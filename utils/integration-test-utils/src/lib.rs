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


//! Test doubles for the collaborators `flow-objective` talks to.

mod mock_flow_rule_service;
pub use mock_flow_rule_service::{BatchCompletion, MockFlowRuleService};
mod mock_group_service;
pub use mock_group_service::{GroupInstallMode, MockGroupService};
mod recording_context;
pub use recording_context::{Outcome, RecordingContext};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per test binary.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
