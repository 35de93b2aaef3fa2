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

//! Timing knobs for the translation engine and the dispatch service.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GROUP_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_PENDING_GROUP_TTL_MS: u64 = 20_000;
pub const DEFAULT_OBJECTIVE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_INSTALL_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_INSTALL_RETRY_INTERVAL_MS: u64 = 1_000;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct PipelinerConfig {
    /// Period of the pending-group poll and expiry sweep.
    pub group_poll_interval_ms: u64,
    /// How long a next objective may wait for its group before failing.
    pub pending_group_ttl_ms: u64,
    /// How long a queued objective may wait for its next id to be stored.
    pub objective_timeout_ms: u64,
    /// Attempts made for an objective whose device has no pipeliner yet.
    pub install_retry_attempts: u32,
    pub install_retry_interval_ms: u64,
}

impl Default for PipelinerConfig {
    fn default() -> Self {
        Self {
            group_poll_interval_ms: DEFAULT_GROUP_POLL_INTERVAL_MS,
            pending_group_ttl_ms: DEFAULT_PENDING_GROUP_TTL_MS,
            objective_timeout_ms: DEFAULT_OBJECTIVE_TIMEOUT_MS,
            install_retry_attempts: DEFAULT_INSTALL_RETRY_ATTEMPTS,
            install_retry_interval_ms: DEFAULT_INSTALL_RETRY_INTERVAL_MS,
        }
    }
}

impl PipelinerConfig {
    pub fn from_json5_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelinerConfig = json5::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json5_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("group_poll_interval_ms", self.group_poll_interval_ms),
            ("pending_group_ttl_ms", self.pending_group_ttl_ms),
            ("objective_timeout_ms", self.objective_timeout_ms),
            ("install_retry_interval_ms", self.install_retry_interval_ms),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }
        if self.pending_group_ttl_ms < self.group_poll_interval_ms {
            return Err(ConfigError::Invalid(
                "pending_group_ttl_ms must not be shorter than group_poll_interval_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn group_poll_interval(&self) -> Duration {
        Duration::from_millis(self.group_poll_interval_ms)
    }

    pub fn pending_group_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_group_ttl_ms)
    }

    pub fn objective_timeout(&self) -> Duration {
        Duration::from_millis(self.objective_timeout_ms)
    }

    pub fn install_retry_interval(&self) -> Duration {
        Duration::from_millis(self.install_retry_interval_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(json5::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "unable to read config file: {err}"),
            ConfigError::Parse(err) => write!(f, "unable to parse config: {err}"),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}
