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


//! # flow-objective
//!
//! `flow-objective` lets applications describe *what* a device should do with
//! traffic (filter it, forward it, send it to a set of next hops) without
//! knowing the device's table and group layout. A per-device [`Pipeliner`]
//! translates each objective into rule batches and hardware groups and
//! reports the outcome through the objective's [`ObjectiveContext`].
//!
//! Typical usage goes through [`FlowObjectiveService`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use flow_objective::config::PipelinerConfig;
//! use flow_objective::flow::{eth_type, ApplicationId, DeviceId, Ipv4Prefix, PortNumber};
//! use flow_objective::flow::{FlowRuleService, TrafficSelector, TrafficTreatment};
//! use flow_objective::group::GroupService;
//! use flow_objective::objective::{ForwardingFlag, ForwardingObjective, NextObjective, NextType};
//! use flow_objective::pipeline::DriverKind;
//! use flow_objective::store::FlowObjectiveStore;
//! use flow_objective::FlowObjectiveService;
//!
//! # async fn example(
//! #     flow_rules: Arc<dyn FlowRuleService>,
//! #     groups: Arc<dyn GroupService>,
//! #     store: Arc<dyn FlowObjectiveStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let service = FlowObjectiveService::new(flow_rules, groups, store, PipelinerConfig::default());
//! let device = DeviceId::new("of:0000000000000001");
//! service.register_device(device.clone(), DriverKind::CorsaV39).await?;
//!
//! let app = ApplicationId::new("org.example.routing");
//! let next_id = service.allocate_next_id().await;
//! let next = NextObjective::builder()
//!     .from_app(app.clone())
//!     .with_id(next_id)
//!     .with_type(NextType::Simple)
//!     .add_treatment(TrafficTreatment::builder().set_output(PortNumber(2)).build())
//!     .add()?;
//! service.next(&device, next).await;
//!
//! let route = ForwardingObjective::builder()
//!     .from_app(app)
//!     .with_flag(ForwardingFlag::Specific)
//!     .with_selector(
//!         TrafficSelector::builder()
//!             .match_eth_type(eth_type::IPV4)
//!             .match_ipv4_dst(Ipv4Prefix::new([10, 0, 1, 0].into(), 24))
//!             .build(),
//!     )
//!     .next_step(next_id)
//!     .add()?;
//! service.forward(&device, route).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Internal architecture map
//!
//! - Objective model: immutable objectives with validating builders
//! - Control plane: pipeliner ownership, pending-group cache, queued objectives,
//!   default-rule bookkeeping
//! - Pipeline: the Corsa driver family and its group-versus-actions policies
//! - Data plane: rule-batch completion and group-event adapters
//! - Runtime: owned background sweep tasks
//!
//! ## Observability model
//!
//! The crate emits `tracing` events and never installs a global subscriber.
//! Binaries and tests initialize `tracing_subscriber` themselves.
//!
//! [`Pipeliner`]: pipeline::Pipeliner
//! [`ObjectiveContext`]: objective::ObjectiveContext

pub mod config;
mod control_plane;
mod data_plane;
pub mod flow;
pub mod group;
pub mod objective;
#[doc(hidden)]
pub mod observability;
pub mod pipeline;
mod runtime;
pub mod store;

mod flow_objective_service;
pub use flow_objective_service::{FlowObjectiveService, RegisterDeviceError};
