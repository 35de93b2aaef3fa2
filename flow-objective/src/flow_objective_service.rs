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


//! Entry point applications talk to.
//!
//! The service owns one [`Pipeliner`] per registered device and routes each
//! objective to it. Objectives that cannot be translated yet are held back:
//! a forward whose next id has not been stored waits in a queue until a
//! pipeliner writes that id, and an objective for a device without a
//! pipeliner is retried for a bounded number of attempts.

use crate::config::PipelinerConfig;
use crate::control_plane::objective_queue::ObjectiveQueue;
use crate::control_plane::pipeliner_registry::PipelinerRegistry;
use crate::control_plane::store_observer::ObservedStore;
use crate::flow::{ApplicationId, DeviceId, FlowRuleService};
use crate::group::GroupService;
use crate::objective::{
    FilteringObjective, ForwardingObjective, NextId, NextObjective, Objective, ObjectiveError,
    Operation,
};
use crate::observability::{events, fields};
use crate::pipeline::{build_pipeliner, DriverKind, Pipeliner, PipelinerContext};
use crate::runtime::sweep_runtime::{spawn_sweep_loop, SweepLoopHandle};
use crate::store::FlowObjectiveStore;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "flow_objective_service";

/// Failures for device registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterDeviceError {
    AlreadyRegistered(DeviceId),
}

impl Display for RegisterDeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterDeviceError::AlreadyRegistered(device_id) => {
                write!(f, "device {device_id} already has a pipeliner")
            }
        }
    }
}

impl Error for RegisterDeviceError {}

struct ServiceState {
    config: PipelinerConfig,
    flow_rules: Arc<dyn FlowRuleService>,
    groups: Arc<dyn GroupService>,
    store: Arc<ObservedStore>,
    pipeliners: PipelinerRegistry,
    queue: ObjectiveQueue,
    next_devices: Mutex<HashMap<NextId, DeviceId>>,
}

#[derive(Default)]
struct Background {
    release: Option<JoinHandle<()>>,
    queue_sweep: Option<SweepLoopHandle>,
}

pub struct FlowObjectiveService {
    state: Arc<ServiceState>,
    background: Mutex<Background>,
}

impl FlowObjectiveService {
    /// Creates the service and starts its background work (queued-objective
    /// release and expiry). Must be called from within a tokio runtime.
    pub fn new(
        flow_rules: Arc<dyn FlowRuleService>,
        groups: Arc<dyn GroupService>,
        store: Arc<dyn FlowObjectiveStore>,
        config: PipelinerConfig,
    ) -> Self {
        let (store, written) = ObservedStore::new(store);
        let state = Arc::new(ServiceState {
            config,
            flow_rules,
            groups,
            store: Arc::new(store),
            pipeliners: PipelinerRegistry::new(),
            queue: ObjectiveQueue::new(),
            next_devices: Mutex::new(HashMap::new()),
        });

        let release = tokio::spawn(release_loop(state.clone(), written));
        let sweep_state = state.clone();
        let queue_sweep = spawn_sweep_loop(
            "objective-queue-sweep",
            state.config.group_poll_interval(),
            move || {
                let state = sweep_state.clone();
                async move { state.expire_queued().await }
            },
        );

        Self {
            state,
            background: Mutex::new(Background {
                release: Some(release),
                queue_sweep: Some(queue_sweep),
            }),
        }
    }

    pub fn config(&self) -> &PipelinerConfig {
        &self.state.config
    }

    /// Builds and initializes the pipeliner for `device_id`.
    pub async fn register_device(
        &self,
        device_id: DeviceId,
        driver: DriverKind,
    ) -> Result<(), RegisterDeviceError> {
        let state = &self.state;
        let store: Arc<dyn FlowObjectiveStore> = state.store.clone();
        let pipeliner = build_pipeliner(
            driver,
            PipelinerContext {
                device_id: device_id.clone(),
                flow_rules: state.flow_rules.clone(),
                groups: state.groups.clone(),
                store,
                config: state.config.clone(),
            },
        );

        if !state
            .pipeliners
            .insert(device_id.clone(), pipeliner.clone())
            .await
        {
            warn!(
                event = events::DEVICE_REGISTER_FAILED,
                component = COMPONENT,
                device_id = device_id.as_str(),
                driver = driver.name(),
                "device already registered"
            );
            return Err(RegisterDeviceError::AlreadyRegistered(device_id));
        }

        pipeliner.init().await;
        info!(
            event = events::DEVICE_REGISTER_OK,
            component = COMPONENT,
            device_id = device_id.as_str(),
            driver = driver.name(),
            "device registered"
        );
        Ok(())
    }

    /// Tears down the pipeliner for `device_id`. Returns `false` when the
    /// device was not registered.
    pub async fn unregister_device(&self, device_id: &DeviceId) -> bool {
        let Some(pipeliner) = self.state.pipeliners.remove(device_id).await else {
            return false;
        };
        pipeliner.shutdown().await;
        self.state
            .next_devices
            .lock()
            .await
            .retain(|_, owner| owner != device_id);
        info!(
            event = events::DEVICE_UNREGISTER,
            component = COMPONENT,
            device_id = device_id.as_str(),
            driver = pipeliner.driver_name(),
            "device unregistered"
        );
        true
    }

    pub async fn filter(&self, device_id: &DeviceId, objective: FilteringObjective) {
        self.apply(device_id, objective.into()).await;
    }

    pub async fn forward(&self, device_id: &DeviceId, objective: ForwardingObjective) {
        self.apply(device_id, objective.into()).await;
    }

    pub async fn next(&self, device_id: &DeviceId, objective: NextObjective) {
        self.apply(device_id, objective.into()).await;
    }

    /// Routes any objective by its kind.
    pub async fn apply(&self, device_id: &DeviceId, objective: Objective) {
        self.state.dispatch(device_id.clone(), objective).await;
    }

    /// Hands out a next id no other caller has been given.
    pub async fn allocate_next_id(&self) -> NextId {
        self.state.store.allocate_next_id().await
    }

    /// Purges every rule and group `app_id` owns on `device_id`.
    pub async fn purge_all(&self, device_id: &DeviceId, app_id: &ApplicationId) {
        let pipeliner = self.state.pipeliners.get(device_id).await;
        info!(
            event = events::PURGE_ALL,
            component = COMPONENT,
            device_id = device_id.as_str(),
            app_id = app_id.name(),
            registered = pipeliner.is_some(),
            "purging application state"
        );
        if let Some(pipeliner) = pipeliner {
            pipeliner.purge_all(app_id).await;
        }
    }

    /// One line per stored next id: its device and how the driver realized it.
    pub async fn next_mappings(&self) -> Vec<String> {
        let state = &self.state;
        let next_devices = state.next_devices.lock().await.clone();
        let mut lines = Vec::new();

        for next_id in state.store.known_next_ids().await {
            let Some(stored) = state.store.get_next_group(next_id).await else {
                continue;
            };
            let Some(device_id) = next_devices.get(&next_id) else {
                lines.push(format!("next_id={next_id} device={}", fields::NONE));
                continue;
            };
            match state.pipeliners.get(device_id).await {
                Some(pipeliner) => {
                    for mapping in pipeliner.next_mappings(&stored).await {
                        lines.push(format!("next_id={next_id} device={device_id} {mapping}"));
                    }
                }
                None => lines.push(format!("next_id={next_id} device={device_id} (no pipeliner)")),
            }
        }
        lines
    }

    /// Objectives waiting on a next id, then next ids waiting on a group.
    pub async fn pending_flow_objectives(&self) -> Vec<String> {
        let state = &self.state;
        let mut lines = Vec::new();

        for (next_id, queued) in state.queue.snapshot().await {
            for entry in queued {
                lines.push(format!(
                    "next_id={next_id} queued {} {} device={}",
                    fields::format_objective(&entry.objective),
                    entry.objective.operation(),
                    entry.device_id
                ));
            }
        }
        for pipeliner in state.pipeliners.all().await {
            for next_id in pipeliner.pending_next_ids().await {
                lines.push(format!(
                    "next_id={next_id} pending group device={}",
                    pipeliner.device_id()
                ));
            }
        }
        lines
    }

    /// Stops background work and tears down every registered pipeliner.
    /// Queued objectives stay unresolved.
    pub async fn shutdown(&self) {
        {
            let mut background = self.background.lock().await;
            if let Some(release) = background.release.take() {
                release.abort();
            }
            background.queue_sweep = None;
        }

        for pipeliner in self.state.pipeliners.all().await {
            self.unregister_device(pipeliner.device_id()).await;
        }
    }
}

impl Drop for FlowObjectiveService {
    fn drop(&mut self) {
        if let Some(release) = self.background.get_mut().release.take() {
            release.abort();
        }
    }
}

impl ServiceState {
    async fn dispatch(self: &Arc<Self>, device_id: DeviceId, objective: Objective) {
        if let Some(next_id) = waits_for_next_id(&objective) {
            if self.store.get_next_group(next_id).await.is_none() {
                self.enqueue(next_id, device_id, objective).await;
                return;
            }
        }
        self.install(device_id, objective).await;
    }

    async fn enqueue(self: &Arc<Self>, next_id: NextId, device_id: DeviceId, objective: Objective) {
        debug!(
            event = events::OBJECTIVE_QUEUED,
            component = COMPONENT,
            device_id = device_id.as_str(),
            next_id = %next_id,
            objective_id = fields::format_objective(&objective),
            "waiting for next id to be stored"
        );
        self.queue.enqueue(next_id, device_id, objective).await;

        // The id may have been written between the lookup and the enqueue.
        if self.store.get_next_group(next_id).await.is_some() {
            self.release(next_id).await;
        }
    }

    async fn release(self: &Arc<Self>, next_id: NextId) {
        for queued in self.queue.take_for(next_id).await {
            debug!(
                event = events::OBJECTIVE_RELEASED,
                component = COMPONENT,
                device_id = queued.device_id.as_str(),
                next_id = %next_id,
                objective_id = fields::format_objective(&queued.objective),
                "next id stored; releasing objective"
            );
            self.install(queued.device_id, queued.objective).await;
        }
    }

    async fn expire_queued(&self) {
        for queued in self
            .queue
            .evict_older_than(self.config.objective_timeout())
            .await
        {
            let resolved = queued.objective.fail(ObjectiveError::InstallationTimeout);
            warn!(
                event = events::OBJECTIVE_QUEUE_EXPIRED,
                component = COMPONENT,
                device_id = queued.device_id.as_str(),
                objective_id = fields::format_objective(&queued.objective),
                resolved,
                "next id was never stored"
            );
        }
    }

    /// Hands the objective to the device's pipeliner, retrying in the
    /// background while the device has none.
    async fn install(self: &Arc<Self>, device_id: DeviceId, objective: Objective) {
        track_next_device(&mut *self.next_devices.lock().await, &device_id, &objective);
        if let Some(pipeliner) = self.pipeliners.get(&device_id).await {
            invoke(pipeliner.as_ref(), objective).await;
            return;
        }

        let state = self.clone();
        tokio::spawn(async move {
            let attempts = state.config.install_retry_attempts;
            for attempt in 1..=attempts {
                debug!(
                    event = events::NO_PIPELINER_RETRY,
                    component = COMPONENT,
                    device_id = device_id.as_str(),
                    objective_id = fields::format_objective(&objective),
                    attempt,
                    attempts,
                    "no pipeliner for device; retrying"
                );
                tokio::time::sleep(state.config.install_retry_interval()).await;
                if let Some(pipeliner) = state.pipeliners.get(&device_id).await {
                    invoke(pipeliner.as_ref(), objective).await;
                    return;
                }
            }

            let resolved = objective.fail(ObjectiveError::NoPipeliner);
            warn!(
                event = events::NO_PIPELINER_GIVE_UP,
                component = COMPONENT,
                device_id = device_id.as_str(),
                objective_id = fields::format_objective(&objective),
                attempts,
                resolved,
                "no pipeliner for device"
            );
        });
    }
}

/// Next id an objective must wait for before it can be translated.
fn waits_for_next_id(objective: &Objective) -> Option<NextId> {
    match objective {
        Objective::Forwarding(forward) if forward.operation() != Operation::Remove => {
            forward.next_id()
        }
        Objective::Next(next) if next.operation() != Operation::Add => Some(next.next_id()),
        Objective::Filtering(_) | Objective::Forwarding(_) | Objective::Next(_) => None,
    }
}

/// Keeps the next-id to device association in step with next ADD and REMOVE.
/// A REMOVE only forgets the id when it targets the device that added it.
fn track_next_device(
    next_devices: &mut HashMap<NextId, DeviceId>,
    device_id: &DeviceId,
    objective: &Objective,
) {
    let Objective::Next(next) = objective else {
        return;
    };
    match next.operation() {
        Operation::Add => {
            next_devices.insert(next.next_id(), device_id.clone());
        }
        Operation::Remove => {
            if next_devices.get(&next.next_id()) == Some(device_id) {
                next_devices.remove(&next.next_id());
            }
        }
        _ => {}
    }
}

async fn invoke(pipeliner: &dyn Pipeliner, objective: Objective) {
    match objective {
        Objective::Filtering(filter) => pipeliner.filter(filter).await,
        Objective::Forwarding(forward) => pipeliner.forward(forward).await,
        Objective::Next(next) => pipeliner.next(next).await,
    }
}

async fn release_loop(state: Arc<ServiceState>, mut written: UnboundedReceiver<NextId>) {
    while let Some(next_id) = written.recv().await {
        state.release(next_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{track_next_device, waits_for_next_id, RegisterDeviceError};
    use crate::flow::{
        eth_type, ApplicationId, Criterion, DeviceId, MacAddress, PortNumber, TrafficSelector,
        TrafficTreatment,
    };
    use crate::objective::{
        FilteringObjective, ForwardingFlag, ForwardingObjective, ForwardingObjectiveBuilder,
        NextId, NextObjective, NextObjectiveBuilder, NextType, Objective,
    };
    use std::collections::HashMap;
    use std::error::Error;

    fn route(next_id: u32) -> ForwardingObjectiveBuilder {
        ForwardingObjective::builder()
            .from_app(ApplicationId::new("app"))
            .with_flag(ForwardingFlag::Specific)
            .with_selector(
                TrafficSelector::builder()
                    .match_eth_type(eth_type::IPV4)
                    .build(),
            )
            .next_step(NextId(next_id))
    }

    fn next(next_id: u32) -> NextObjectiveBuilder {
        NextObjective::builder()
            .from_app(ApplicationId::new("app"))
            .with_id(NextId(next_id))
            .with_type(NextType::Simple)
            .add_treatment(TrafficTreatment::builder().set_output(PortNumber(1)).build())
    }

    #[test]
    fn register_error_display_is_stable() {
        let error = RegisterDeviceError::AlreadyRegistered(DeviceId::new("of:1"));

        assert_eq!(error.to_string(), "device of:1 already has a pipeliner");
        assert!(error.source().is_none());
    }

    #[test]
    fn only_next_dependent_objectives_wait() {
        let add_route: Objective = route(3).add().expect("route should build").into();
        let remove_route: Objective = route(3).remove().expect("route should build").into();
        let add_next: Objective = next(4).add().expect("next should build").into();
        let remove_next: Objective = next(4).remove().expect("next should build").into();
        let filter: Objective = FilteringObjective::builder()
            .from_app(ApplicationId::new("app"))
            .with_key(Criterion::InPort(PortNumber(1)))
            .add_condition(Criterion::EthDst(MacAddress::BROADCAST))
            .permit()
            .add()
            .expect("filter should build")
            .into();

        assert_eq!(waits_for_next_id(&add_route), Some(NextId(3)));
        assert_eq!(waits_for_next_id(&remove_route), None);
        assert_eq!(waits_for_next_id(&add_next), None);
        assert_eq!(waits_for_next_id(&remove_next), Some(NextId(4)));
        assert_eq!(waits_for_next_id(&filter), None);
    }

    #[test]
    fn next_device_association_follows_add_and_remove() {
        let mut next_devices = HashMap::new();
        let owner = DeviceId::new("of:1");
        let other = DeviceId::new("of:2");
        let add: Objective = next(5).add().expect("next should build").into();
        let remove: Objective = next(5).remove().expect("next should build").into();
        let verify: Objective = next(5).verify().expect("next should build").into();

        track_next_device(&mut next_devices, &owner, &add);
        track_next_device(&mut next_devices, &owner, &verify);
        assert_eq!(next_devices.get(&NextId(5)), Some(&owner));

        track_next_device(&mut next_devices, &other, &remove);
        assert_eq!(next_devices.get(&NextId(5)), Some(&owner));

        track_next_device(&mut next_devices, &owner, &remove);
        assert!(next_devices.is_empty());
    }
}
