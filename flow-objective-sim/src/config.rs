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


use flow_objective::config::{ConfigError, PipelinerConfig};
use flow_objective::pipeline::DriverKind;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default)]
    pub(crate) pipeliner: PipelinerConfig,
    #[serde(default)]
    pub(crate) switch: SwitchConfig,
    #[serde(default)]
    pub(crate) scenario: ScenarioConfig,
    pub(crate) devices: Vec<DeviceConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SwitchConfig {
    pub(crate) group_confirm_delay_ms: u64,
    pub(crate) silent_confirmations: bool,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            group_confirm_delay_ms: 50,
            silent_confirmations: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ScenarioConfig {
    pub(crate) app_id: String,
    pub(crate) resolution_timeout_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            app_id: "org.example.sim".to_string(),
            resolution_timeout_ms: 5_000,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub(crate) device_id: String,
    pub(crate) driver: DriverKind,
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: SimConfig = json5::from_str(&contents).map_err(ConfigError::Parse)?;
        config.pipeliner.validate()?;
        if config.devices.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one device must be configured".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::SimConfig;
    use flow_objective::pipeline::DriverKind;

    #[test]
    fn devices_parse_with_kebab_case_drivers() {
        let config: SimConfig = json5::from_str(
            "{ devices: [ { device_id: 'of:1', driver: 'corsa-v39' } ] }",
        )
        .expect("config should parse");

        assert_eq!(config.devices[0].driver, DriverKind::CorsaV39);
        assert_eq!(config.switch.group_confirm_delay_ms, 50);
        assert_eq!(config.pipeliner.group_poll_interval_ms, 500);
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let result: Result<SimConfig, _> =
            json5::from_str("{ devices: [ { device_id: 'of:1', driver: 'corsa-v2' } ] }");

        assert!(result.is_err());
    }
}
