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


mod config;
mod scenario;
mod simulated_switch;

use crate::config::SimConfig;
use crate::scenario::Scenario;
use crate::simulated_switch::SimulatedSwitch;
use clap::Parser;
use flow_objective::flow::DeviceId;
use flow_objective::FlowObjectiveService;
use objective_store_memory::MemoryObjectiveStore;
use std::error::Error;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command()]
struct SimArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started flow-objective-sim");

    let args = SimArgs::parse();
    let config = SimConfig::from_file(&args.config)?;

    let switch = Arc::new(SimulatedSwitch::new(&config.switch));
    let service = FlowObjectiveService::new(
        switch.clone(),
        switch.clone(),
        Arc::new(MemoryObjectiveStore::new()),
        config.pipeliner.clone(),
    );

    for device in &config.devices {
        service
            .register_device(DeviceId::new(&device.device_id), device.driver)
            .await?;
    }

    let mut scenario = Scenario::new(&config.scenario);
    for (index, device) in config.devices.iter().enumerate() {
        let index = u8::try_from(index + 1)?;
        scenario.drive(&service, device, index).await?;
    }

    println!("== resolutions");
    for resolution in scenario.collect().await {
        match resolution.result {
            Ok(()) => println!("{}: ok", resolution.label),
            Err(err) => println!("{}: {err}", resolution.label),
        }
    }

    println!("== next mappings");
    for line in service.next_mappings().await {
        println!("{line}");
    }

    println!("== pending flow objectives");
    for line in service.pending_flow_objectives().await {
        println!("{line}");
    }

    println!("== installed rules");
    for device in &config.devices {
        let device_id = DeviceId::new(&device.device_id);
        let rules = switch.rules(&device_id).await;
        println!("{device_id} ({}): {} rules", device.driver, rules.len());
        for rule in rules {
            println!(
                "  table={} priority={} match={} treatment={}",
                rule.table, rule.priority, rule.selector, rule.treatment
            );
        }
    }

    service.shutdown().await;
    Ok(())
}
