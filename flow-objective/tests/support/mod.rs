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


#![allow(dead_code)]

use flow_objective::config::PipelinerConfig;
use flow_objective::flow::{
    eth_type, ApplicationId, DeviceId, Ipv4Prefix, MacAddress, PortNumber, TrafficSelector,
    TrafficTreatment, VlanId,
};
use flow_objective::objective::{
    ForwardingFlag, ForwardingObjective, ForwardingObjectiveBuilder, NextId, NextObjective,
    NextObjectiveBuilder, NextType, ObjectiveContext,
};
use flow_objective::pipeline::DriverKind;
use flow_objective::FlowObjectiveService;
use integration_test_utils::{GroupInstallMode, MockFlowRuleService, MockGroupService};
use objective_store_memory::MemoryObjectiveStore;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const POLL_MS: u64 = 100;
pub(crate) const TTL_MS: u64 = 1_000;
pub(crate) const QUEUE_TIMEOUT_MS: u64 = 1_000;
pub(crate) const RETRY_ATTEMPTS: u32 = 3;
pub(crate) const RETRY_INTERVAL_MS: u64 = 100;
pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) const ROUTER_MAC: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x01]);
pub(crate) const NEIGHBOR_MAC: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0xfe]);

pub(crate) fn app() -> ApplicationId {
    ApplicationId::new("org.example.routing")
}

pub(crate) fn device(n: u8) -> DeviceId {
    DeviceId::new(&format!("of:000000000000000{n}"))
}

pub(crate) fn fast_config() -> PipelinerConfig {
    PipelinerConfig {
        group_poll_interval_ms: POLL_MS,
        pending_group_ttl_ms: TTL_MS,
        objective_timeout_ms: QUEUE_TIMEOUT_MS,
        install_retry_attempts: RETRY_ATTEMPTS,
        install_retry_interval_ms: RETRY_INTERVAL_MS,
    }
}

pub(crate) struct Fixture {
    pub(crate) service: FlowObjectiveService,
    pub(crate) rules: MockFlowRuleService,
    pub(crate) groups: MockGroupService,
    pub(crate) store: Arc<MemoryObjectiveStore>,
}

/// A service with no devices registered yet.
pub(crate) fn fixture(mode: GroupInstallMode) -> Fixture {
    let rules = MockFlowRuleService::new();
    let groups = MockGroupService::new(mode);
    let store = Arc::new(MemoryObjectiveStore::new());
    let service = FlowObjectiveService::new(
        Arc::new(rules.clone()),
        Arc::new(groups.clone()),
        store.clone(),
        fast_config(),
    );
    Fixture {
        service,
        rules,
        groups,
        store,
    }
}

/// A service with `device(1)` registered under `driver`.
pub(crate) async fn fixture_with_device(driver: DriverKind, mode: GroupInstallMode) -> Fixture {
    let fixture = fixture(mode);
    fixture
        .service
        .register_device(device(1), driver)
        .await
        .expect("first registration should succeed");
    fixture
}

/// VLAN rewrite, both MAC rewrites and an output: a group on every driver.
pub(crate) fn full_rewrite(port: u32) -> TrafficTreatment {
    TrafficTreatment::builder()
        .set_vlan_id(VlanId(20))
        .set_eth_src(ROUTER_MAC)
        .set_eth_dst(NEIGHBOR_MAC)
        .set_output(PortNumber(port))
        .build()
}

pub(crate) fn simple_next(next_id: NextId, treatment: TrafficTreatment) -> NextObjectiveBuilder {
    NextObjective::builder()
        .from_app(app())
        .with_id(next_id)
        .with_type(NextType::Simple)
        .add_treatment(treatment)
}

pub(crate) fn add_next(
    next_id: NextId,
    treatment: TrafficTreatment,
    context: Arc<dyn ObjectiveContext>,
) -> NextObjective {
    simple_next(next_id, treatment)
        .with_context(context)
        .add()
        .expect("next objective should build")
}

pub(crate) fn route(next_id: NextId, subnet: u8) -> ForwardingObjectiveBuilder {
    ForwardingObjective::builder()
        .from_app(app())
        .with_flag(ForwardingFlag::Specific)
        .with_priority(40_000)
        .with_selector(
            TrafficSelector::builder()
                .match_eth_type(eth_type::IPV4)
                .match_ipv4_dst(Ipv4Prefix::new(Ipv4Addr::new(10, 0, subnet, 0), 24))
                .build(),
        )
        .next_step(next_id)
}

pub(crate) fn add_route(
    next_id: NextId,
    subnet: u8,
    context: Arc<dyn ObjectiveContext>,
) -> ForwardingObjective {
    route(next_id, subnet)
        .with_context(context)
        .add()
        .expect("route should build")
}

/// Lets spawned tasks run; with paused time this also moves the clock.
pub(crate) async fn run_for(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
