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


//! Scripted objective sequence run against every configured device.

use crate::config::{DeviceConfig, ScenarioConfig};
use flow_objective::flow::{
    eth_type, ApplicationId, Criterion, DeviceId, Ipv4Prefix, MacAddress, PortNumber,
    TrafficSelector, TrafficTreatment, VlanId,
};
use flow_objective::objective::{
    FilteringObjective, ForwardingFlag, ForwardingObjective, NextObjective, NextType, Objective,
    ObjectiveBuildError, ObjectiveContext, ObjectiveError,
};
use flow_objective::FlowObjectiveService;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

const COMPONENT: &str = "scenario";
const ROUTER_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const NEIGHBOR_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0xfe]);

pub struct Resolution {
    pub label: String,
    pub result: Result<(), ObjectiveError>,
}

struct ReportingContext {
    label: String,
    sender: UnboundedSender<Resolution>,
}

impl ReportingContext {
    fn report(&self, result: Result<(), ObjectiveError>) {
        let _ = self.sender.send(Resolution {
            label: self.label.clone(),
            result,
        });
    }
}

impl ObjectiveContext for ReportingContext {
    fn on_success(&self, _objective: &Objective) {
        self.report(Ok(()));
    }

    fn on_error(&self, _objective: &Objective, error: ObjectiveError) {
        self.report(Err(error));
    }
}

pub struct Scenario {
    app_id: ApplicationId,
    resolution_timeout: Duration,
    sender: UnboundedSender<Resolution>,
    receiver: UnboundedReceiver<Resolution>,
    submitted: usize,
}

impl Scenario {
    pub fn new(config: &ScenarioConfig) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            app_id: ApplicationId::new(&config.app_id),
            resolution_timeout: Duration::from_millis(config.resolution_timeout_ms),
            sender,
            receiver,
            submitted: 0,
        }
    }

    fn context(&mut self, device_id: &DeviceId, what: &str) -> Arc<dyn ObjectiveContext> {
        self.submitted += 1;
        Arc::new(ReportingContext {
            label: format!("{device_id} {what}"),
            sender: self.sender.clone(),
        })
    }

    /// Submits the route before its next hop, so the dispatch service has
    /// to queue it until the next id is stored.
    pub async fn drive(
        &mut self,
        service: &FlowObjectiveService,
        device: &DeviceConfig,
        index: u8,
    ) -> Result<(), ObjectiveBuildError> {
        let device_id = DeviceId::new(&device.device_id);
        let next_id = service.allocate_next_id().await;
        let vlan = VlanId(100 + u16::from(index));

        let route = ForwardingObjective::builder()
            .from_app(self.app_id.clone())
            .with_flag(ForwardingFlag::Specific)
            .with_priority(40_000)
            .with_selector(
                TrafficSelector::builder()
                    .match_eth_type(eth_type::IPV4)
                    .match_ipv4_dst(Ipv4Prefix::new(Ipv4Addr::new(10, 0, index, 0), 24))
                    .build(),
            )
            .next_step(next_id)
            .with_context(self.context(&device_id, "route"))
            .add()?;
        service.forward(&device_id, route).await;

        let next = NextObjective::builder()
            .from_app(self.app_id.clone())
            .with_id(next_id)
            .with_type(NextType::Simple)
            .add_treatment(
                TrafficTreatment::builder()
                    .set_vlan_id(vlan)
                    .set_eth_src(ROUTER_MAC)
                    .set_eth_dst(NEIGHBOR_MAC)
                    .set_output(PortNumber(2))
                    .build(),
            )
            .with_context(self.context(&device_id, &format!("next {next_id}")))
            .add()?;
        service.next(&device_id, next).await;

        let filter = FilteringObjective::builder()
            .from_app(self.app_id.clone())
            .permit()
            .with_key(Criterion::InPort(PortNumber(1)))
            .add_condition(Criterion::EthDst(ROUTER_MAC))
            .add_condition(Criterion::VlanVid(vlan))
            .with_context(self.context(&device_id, "filter"))
            .add()?;
        service.filter(&device_id, filter).await;

        let punt_arp = ForwardingObjective::builder()
            .from_app(self.app_id.clone())
            .with_flag(ForwardingFlag::Versatile)
            .with_priority(50_000)
            .with_selector(TrafficSelector::builder().match_eth_type(eth_type::ARP).build())
            .with_treatment(
                TrafficTreatment::builder()
                    .punt()
                    .wipe_deferred()
                    .build(),
            )
            .with_context(self.context(&device_id, "arp punt"))
            .add()?;
        service.forward(&device_id, punt_arp).await;

        Ok(())
    }

    /// Collects one resolution per submitted objective, or as many as arrive
    /// before the timeout.
    pub async fn collect(&mut self) -> Vec<Resolution> {
        let mut resolutions = Vec::with_capacity(self.submitted);
        let deadline = tokio::time::Instant::now() + self.resolution_timeout;
        while resolutions.len() < self.submitted {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(resolution)) => {
                    match &resolution.result {
                        Ok(()) => info!(
                            component = COMPONENT,
                            objective = resolution.label.as_str(),
                            "objective resolved"
                        ),
                        Err(err) => warn!(
                            component = COMPONENT,
                            objective = resolution.label.as_str(),
                            err = %err,
                            "objective failed"
                        ),
                    }
                    resolutions.push(resolution);
                }
                Ok(None) | Err(_) => {
                    warn!(
                        component = COMPONENT,
                        expected = self.submitted,
                        received = resolutions.len(),
                        "stopped waiting for resolutions"
                    );
                    break;
                }
            }
        }
        resolutions
    }
}
