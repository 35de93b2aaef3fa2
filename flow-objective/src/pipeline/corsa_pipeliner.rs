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

//! Translation engine shared by the Corsa driver family.
//!
//! The variants differ only in their [`DriverProfile`]: table layout, fixed
//! rules, supported match shapes and the group-versus-actions policy.

use super::next_handle::{group_key_for, NextHandle};
use super::profile::{
    DefaultRule, DriverKind, DriverProfile, SwitchingMode, TableMissAction, VersatileMode,
};
use super::treatment_policy::NextEncoding;
use super::{Pipeliner, PipelinerContext};
use crate::control_plane::default_rule_table::{DefaultRuleKey, DefaultRuleTable};
use crate::control_plane::pending_cache::PendingCache;
use crate::data_plane::group_listener::PendingGroupListener;
use crate::data_plane::rule_batch::{ObjectiveRuleContext, ProvisionContext};
use crate::flow::{
    eth_type, ApplicationId, Criterion, CriterionKind, DeviceId, FlowRule,
    FlowRuleOperations, FlowRuleOperationsBuilder, FlowRuleOperationsContext, FlowRuleService,
    PortNumber, TableId, TrafficSelector, TrafficTreatment,
};
use crate::group::{
    Group, GroupBucket, GroupDescription, GroupKey, GroupListener, GroupService, GroupType,
};
use crate::objective::{
    FilterType, FilteringObjective, ForwardingFlag, ForwardingObjective, NextId, NextObjective,
    NextType, Objective, ObjectiveError, Operation,
};
use crate::observability::{events, fields};
use crate::runtime::sweep_runtime::{spawn_sweep_loop, SweepLoopHandle};
use crate::store::{FlowObjectiveStore, NextGroup};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Level};

const COMPONENT: &str = "corsa_pipeliner";
const DRIVER_APP: &str = "flow-objective.corsa";

/// Why a translation stopped short of producing rules.
#[derive(Clone, Copy, Debug)]
struct Rejection {
    error: ObjectiveError,
    reason: &'static str,
}

impl Rejection {
    fn new(error: ObjectiveError, reason: &'static str) -> Self {
        Self { error, reason }
    }
}

type Translation<T> = Result<T, Rejection>;

enum NextPlan {
    Group {
        group_type: GroupType,
        buckets: Vec<GroupBucket>,
    },
    Actions(TrafficTreatment),
}

/// State shared by the engine, its sweep task and its group listener.
pub(crate) struct PipelineState {
    device_id: DeviceId,
    profile: DriverProfile,
    driver_app: ApplicationId,
    flow_rules: Arc<dyn FlowRuleService>,
    groups: Arc<dyn GroupService>,
    store: Arc<dyn FlowObjectiveStore>,
    pending: PendingCache<GroupKey, NextObjective>,
    default_rules: Arc<DefaultRuleTable>,
}

#[derive(Default)]
struct Lifecycle {
    sweep: Option<SweepLoopHandle>,
    listener: Option<Arc<dyn GroupListener>>,
}

pub struct CorsaPipeliner {
    state: Arc<PipelineState>,
    poll_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl CorsaPipeliner {
    pub fn new(kind: DriverKind, context: PipelinerContext) -> Self {
        let PipelinerContext {
            device_id,
            flow_rules,
            groups,
            store,
            config,
        } = context;

        Self {
            state: Arc::new(PipelineState {
                device_id,
                profile: DriverProfile::for_kind(kind),
                driver_app: ApplicationId::new(DRIVER_APP),
                flow_rules,
                groups,
                store,
                pending: PendingCache::new(config.pending_group_ttl()),
                default_rules: Arc::new(DefaultRuleTable::new()),
            }),
            poll_interval: config.group_poll_interval(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn kind(&self) -> DriverKind {
        self.state.profile.kind
    }

    /// Installs (or, with `install == false`, removes) a catch-all rule for
    /// `table`. Repeating a call that already took effect submits nothing.
    pub async fn install_default(
        &self,
        table: TableId,
        action: TableMissAction,
        priority: u16,
        install: bool,
    ) {
        let rule = DefaultRule {
            table,
            priority,
            selector: TrafficSelector::empty(),
            action,
        };
        self.state.provision("table miss", vec![rule], install).await;
    }
}

#[async_trait]
impl Pipeliner for CorsaPipeliner {
    fn device_id(&self) -> &DeviceId {
        &self.state.device_id
    }

    fn driver_name(&self) -> &'static str {
        self.state.profile.kind.name()
    }

    async fn init(&self) {
        let state = &self.state;
        info!(
            event = events::PIPELINE_INIT_START,
            component = COMPONENT,
            device_id = state.device_id.as_str(),
            driver = self.driver_name(),
            "initializing pipeline"
        );

        for set in state.profile.default_rules() {
            state.provision(set.description, set.rules, true).await;
        }

        let new_listener = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.sweep.is_none() {
                let sweep_state = state.clone();
                let sweep = spawn_sweep_loop(
                    "pending-group-sweep",
                    self.poll_interval,
                    move || {
                        let state = sweep_state.clone();
                        async move { state.sweep().await }
                    },
                );
                debug!(
                    component = COMPONENT,
                    device_id = state.device_id.as_str(),
                    worker_id = sweep.worker_id(),
                    "pending-group sweep attached"
                );
                lifecycle.sweep = Some(sweep);
            }
            if lifecycle.listener.is_none() {
                let listener: Arc<dyn GroupListener> = Arc::new(PendingGroupListener::new(
                    state.device_id.clone(),
                    Arc::downgrade(state),
                ));
                lifecycle.listener = Some(listener.clone());
                Some(listener)
            } else {
                None
            }
        };
        if let Some(listener) = new_listener {
            state.groups.add_listener(listener).await;
        }

        let default_rules = state.default_rules.len();
        info!(
            event = events::PIPELINE_INIT_OK,
            component = COMPONENT,
            device_id = state.device_id.as_str(),
            driver = self.driver_name(),
            default_rules,
            "pipeline initialized"
        );
    }

    async fn filter(&self, filter: FilteringObjective) {
        let state = &self.state;
        let objective = Objective::from(filter.clone());
        state.trace_translate(events::FILTER_TRANSLATE, &objective);

        if filter.filter_type() != FilterType::Permit {
            state.reject(&objective, Rejection::new(ObjectiveError::Unsupported, fields::REASON_DENY_FILTER));
            return;
        }
        let install = match filter.operation() {
            Operation::Add => true,
            Operation::Remove => false,
            _ => {
                state.reject(
                    &objective,
                    Rejection::new(ObjectiveError::Unsupported, fields::REASON_UNSUPPORTED_OPERATION),
                );
                return;
            }
        };
        let Some(Criterion::InPort(port)) = filter.key() else {
            state.reject(
                &objective,
                Rejection::new(ObjectiveError::Unknown, fields::REASON_MISSING_PORT_KEY),
            );
            return;
        };

        let mut operations = FlowRuleOperations::builder();
        for condition in filter.conditions() {
            match state.filter_rule(&filter, *port, condition) {
                Some(rule) => operations = operations.add_or_remove(install, rule),
                None => state.reject(
                    &objective,
                    Rejection::new(
                        ObjectiveError::Unsupported,
                        fields::REASON_UNSUPPORTED_CRITERION,
                    ),
                ),
            }
        }

        state.submit(operations, objective).await;
    }

    async fn forward(&self, forward: ForwardingObjective) {
        let state = &self.state;
        let forward = match state.strip_clear_deferred(forward) {
            Ok(forward) => forward,
            Err((original, rejection)) => {
                state.reject(&Objective::from(original), rejection);
                return;
            }
        };
        let objective = Objective::from(forward.clone());
        state.trace_translate(events::FORWARD_TRANSLATE, &objective);

        let install = match forward.operation() {
            Operation::Add => true,
            Operation::Remove => false,
            _ => {
                state.reject(
                    &objective,
                    Rejection::new(
                        ObjectiveError::Unsupported,
                        fields::REASON_UNSUPPORTED_OPERATION,
                    ),
                );
                return;
            }
        };

        let translated = match forward.flag() {
            ForwardingFlag::Specific => state.specific_rule(&forward, install).await.map(Some),
            ForwardingFlag::Versatile => state.versatile_rule(&forward, install).await,
            ForwardingFlag::Egress => Err(Rejection::new(
                ObjectiveError::Unsupported,
                fields::REASON_UNSUPPORTED_FLAG,
            )),
        };

        match translated {
            Ok(rule) => {
                let operations = rule
                    .into_iter()
                    .fold(FlowRuleOperations::builder(), |operations, rule| {
                        operations.add_or_remove(install, rule)
                    });
                state.submit(operations, objective).await;
            }
            Err(rejection) => state.reject(&objective, rejection),
        }
    }

    async fn next(&self, next: NextObjective) {
        let state = &self.state;
        let objective = Objective::from(next.clone());
        state.trace_translate(events::NEXT_TRANSLATE, &objective);

        let outcome = match next.operation() {
            Operation::Add => state.install_next(&next).await,
            Operation::Remove => state.remove_next(&next).await,
            Operation::Verify => state.verify_next(&next).await,
            Operation::AddToExisting | Operation::RemoveFromExisting | Operation::Modify => Err(
                Rejection::new(ObjectiveError::Unsupported, fields::REASON_UNSUPPORTED_OPERATION),
            ),
        };

        if let Err(rejection) = outcome {
            state.reject(&objective, rejection);
        }
    }

    async fn purge_all(&self, app_id: &ApplicationId) {
        let state = &self.state;
        state.flow_rules.purge_rules(&state.device_id, app_id).await;
        state.groups.purge_groups(&state.device_id, app_id).await;
        if app_id == &state.driver_app {
            state.default_rules.clear();
        }
    }

    async fn next_mappings(&self, group: &NextGroup) -> Vec<String> {
        let state = &self.state;
        match NextHandle::decode(group) {
            Ok(NextHandle::Group { key }) => {
                match state.groups.get_group(&state.device_id, &key).await {
                    Some(live) => vec![format!("group key={key} id={}", live.id)],
                    None => vec![format!("group key={key} (not on device)")],
                }
            }
            Ok(handle) => vec![handle.to_string()],
            Err(_) => vec![format!(
                "unrecognized next group ({} bytes)",
                group.data().len()
            )],
        }
    }

    async fn pending_next_ids(&self) -> Vec<NextId> {
        let mut next_ids: Vec<NextId> = self
            .state
            .pending
            .values()
            .await
            .iter()
            .map(NextObjective::next_id)
            .collect();
        next_ids.sort();
        next_ids.dedup();
        next_ids
    }

    async fn shutdown(&self) {
        let (sweep, listener) = {
            let mut lifecycle = self.lifecycle.lock().await;
            (lifecycle.sweep.take(), lifecycle.listener.take())
        };
        drop(sweep);
        if let Some(listener) = listener {
            self.state.groups.remove_listener(&listener).await;
        }

        let pending = self.state.pending.len().await;
        info!(
            event = events::PIPELINE_SHUTDOWN,
            component = COMPONENT,
            device_id = self.state.device_id.as_str(),
            driver = self.driver_name(),
            pending,
            "pipeline shut down"
        );
    }
}

impl PipelineState {
    fn trace_translate(&self, event: &'static str, objective: &Objective) {
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = event,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                objective_id = fields::format_objective(objective),
                operation = %objective.operation(),
                "translating objective"
            );
        }
    }

    fn reject(&self, objective: &Objective, rejection: Rejection) {
        let resolved = objective.fail(rejection.error);
        if rejection.error == ObjectiveError::Unsupported {
            warn!(
                event = events::OBJECTIVE_UNSUPPORTED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                driver = self.profile.kind.name(),
                objective_id = fields::format_objective(objective),
                reason = rejection.reason,
                resolved,
                "objective not supported by this driver"
            );
        } else {
            warn!(
                event = events::OBJECTIVE_REJECTED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                objective_id = fields::format_objective(objective),
                err = rejection.error.as_str(),
                reason = rejection.reason,
                resolved,
                "objective rejected"
            );
        }
    }

    async fn submit(&self, operations: FlowRuleOperationsBuilder, objective: Objective) {
        if operations.is_empty() {
            // Nothing to install; an earlier rejection, if any, already won.
            objective.succeed();
            return;
        }
        let context: Arc<dyn FlowRuleOperationsContext> =
            Arc::new(ObjectiveRuleContext::new(self.device_id.clone(), objective));
        self.flow_rules
            .apply(&self.device_id, operations.build(Some(context)))
            .await;
    }

    async fn provision(&self, description: &'static str, rules: Vec<DefaultRule>, install: bool) {
        let mut operations = FlowRuleOperations::builder();
        let mut changed_keys = Vec::new();
        for rule in rules {
            let flow_rule = FlowRule::builder(self.device_id.clone(), self.driver_app.clone())
                .for_table(rule.table)
                .with_priority(rule.priority)
                .with_selector(rule.selector)
                .with_treatment(rule.action.treatment())
                .make_permanent()
                .build();
            let key = DefaultRuleKey::from_rule(&flow_rule);
            let changed = if install {
                self.default_rules.insert_rule(key.clone())
            } else {
                self.default_rules.remove_rule(&key)
            };

            if changed {
                changed_keys.push(key);
                operations = operations.add_or_remove(install, flow_rule);
            } else {
                debug!(
                    event = events::DEFAULT_RULE_SKIPPED,
                    component = COMPONENT,
                    device_id = self.device_id.as_str(),
                    table = %flow_rule.table,
                    priority = flow_rule.priority,
                    install,
                    "default rule already in requested state"
                );
            }
        }

        if operations.is_empty() {
            return;
        }
        let context: Arc<dyn FlowRuleOperationsContext> =
            Arc::new(ProvisionContext::new(
                self.device_id.clone(),
                description,
                self.default_rules.clone(),
                changed_keys,
                install,
            ));
        self.flow_rules
            .apply(&self.device_id, operations.build(Some(context)))
            .await;
    }

    fn filter_rule(
        &self,
        filter: &FilteringObjective,
        port: PortNumber,
        condition: &Criterion,
    ) -> Option<FlowRule> {
        let profile = &self.profile;
        let (stage, selector, treatment) = match condition {
            Criterion::EthDst(mac) => (
                profile.mac_stage,
                TrafficSelector::builder().match_eth_dst(*mac).build(),
                TrafficTreatment::builder(),
            ),
            Criterion::VlanVid(vlan) => {
                let treatment = if profile.vlan_filter_pops {
                    TrafficTreatment::builder().deferred().pop_vlan().immediate()
                } else {
                    TrafficTreatment::builder()
                };
                (
                    profile.vlan_stage,
                    TrafficSelector::builder()
                        .match_in_port(port)
                        .match_vlan_id(*vlan)
                        .build(),
                    treatment,
                )
            }
            Criterion::Ipv4Dst(prefix) => (
                profile.ip_stage,
                TrafficSelector::builder()
                    .match_eth_type(eth_type::IPV4)
                    .match_ipv4_dst(*prefix)
                    .build(),
                TrafficTreatment::builder(),
            ),
            _ => return None,
        };

        Some(
            FlowRule::builder(self.device_id.clone(), filter.header().app_id().clone())
                .for_table(stage.table)
                .with_priority(stage.priority)
                .with_selector(selector)
                .with_treatment(treatment.transition(stage.goto).build())
                .make_permanent()
                .build(),
        )
    }

    /// Rebuilds a versatile objective without the clear-deferred flag when the
    /// device cannot execute it. The rebuilt objective keeps the caller's
    /// operation and context.
    fn strip_clear_deferred(
        &self,
        forward: ForwardingObjective,
    ) -> Result<ForwardingObjective, (ForwardingObjective, Rejection)> {
        if forward.flag() != ForwardingFlag::Versatile
            || !matches!(self.profile.versatile, VersatileMode::Acl(_))
        {
            return Ok(forward);
        }
        let Some(treatment) = forward.treatment().filter(|treatment| treatment.clears_deferred())
        else {
            return Ok(forward);
        };

        let builder = forward
            .copy()
            .with_treatment(treatment.without_clear_deferred());
        let rebuilt = match forward.operation() {
            Operation::Add => builder.add(),
            Operation::Remove => builder.remove(),
            _ => return Ok(forward),
        };

        match rebuilt {
            Ok(rebuilt) => {
                debug!(
                    event = events::VERSATILE_CLEAR_DEFERRED_STRIPPED,
                    component = COMPONENT,
                    device_id = self.device_id.as_str(),
                    objective_id = %forward.id(),
                    rebuilt_id = %rebuilt.id(),
                    "stripped clear-deferred from versatile treatment"
                );
                Ok(rebuilt)
            }
            Err(err) => {
                error!(
                    event = events::OBJECTIVE_REJECTED,
                    component = COMPONENT,
                    device_id = self.device_id.as_str(),
                    objective_id = %forward.id(),
                    err = %err,
                    "unable to rebuild versatile objective"
                );
                Err((
                    forward,
                    Rejection::new(ObjectiveError::BadParams, fields::REASON_REBUILD_FAILED),
                ))
            }
        }
    }

    async fn specific_rule(
        &self,
        forward: &ForwardingObjective,
        install: bool,
    ) -> Translation<FlowRule> {
        let selector = forward.selector();
        match (selector.eth_type(), selector.vlan_id()) {
            (Some(eth_type::IPV4), _) => self.route_rule(forward, install).await,
            (Some(eth_type::VLAN), _) | (None, Some(_)) => self.switch_rule(forward, install).await,
            _ => Err(Rejection::new(
                ObjectiveError::Unsupported,
                fields::REASON_UNSUPPORTED_CRITERION,
            )),
        }
    }

    async fn route_rule(&self, forward: &ForwardingObjective, install: bool) -> Translation<FlowRule> {
        let prefix = forward
            .selector()
            .ipv4_dst()
            .ok_or(Rejection::new(ObjectiveError::BadParams, fields::REASON_MISSING_MATCH))?;
        let next_id = forward
            .next_id()
            .ok_or(Rejection::new(ObjectiveError::BadParams, fields::REASON_MISSING_NEXT_ID))?;
        let treatment = if install {
            self.resolve_next(next_id).await?
        } else {
            TrafficTreatment::empty()
        };

        let selector = TrafficSelector::builder()
            .match_eth_type(eth_type::IPV4)
            .match_ipv4_dst(prefix)
            .build();
        Ok(self.objective_rule(
            forward,
            self.profile.route_table,
            selector,
            treatment,
            forward.header().is_permanent(),
        ))
    }

    async fn switch_rule(&self, forward: &ForwardingObjective, install: bool) -> Translation<FlowRule> {
        let SwitchingMode::VlanCircuit(table) = self.profile.switching else {
            return Err(Rejection::new(
                ObjectiveError::Unsupported,
                fields::REASON_UNSUPPORTED_CRITERION,
            ));
        };
        let vlan = forward
            .selector()
            .vlan_id()
            .ok_or(Rejection::new(ObjectiveError::BadParams, fields::REASON_MISSING_MATCH))?;

        let mut circuit = TrafficSelector::builder();
        if let Some(port) = forward.selector().in_port() {
            circuit = circuit.match_in_port(port);
        }
        let treatment = self.forward_treatment(forward, install).await?;

        Ok(self.objective_rule(
            forward,
            table,
            circuit.match_vlan_id(vlan).build(),
            treatment,
            forward.header().is_permanent(),
        ))
    }

    async fn versatile_rule(
        &self,
        forward: &ForwardingObjective,
        install: bool,
    ) -> Translation<Option<FlowRule>> {
        let selector = forward.selector();
        let Some(ether) = selector.eth_type() else {
            return Err(Rejection::new(
                ObjectiveError::Unknown,
                fields::REASON_MISSING_ETH_TYPE,
            ));
        };
        let unsupported = Rejection::new(
            ObjectiveError::Unsupported,
            fields::REASON_UNSUPPORTED_CRITERION,
        );

        match self.profile.versatile {
            // ARP and IPv4 reaching LOCAL are punted by the fixed rules.
            VersatileMode::DefaultsOnly => match ether {
                eth_type::ARP => Ok(None),
                eth_type::IPV4
                    if selector.get(CriterionKind::Ipv4Src).is_none()
                        && selector.ipv4_dst().is_none() =>
                {
                    Ok(None)
                }
                _ => Err(unsupported),
            },
            VersatileMode::Acl(table) => match ether {
                eth_type::ARP | eth_type::LLDP | eth_type::BSN | eth_type::IPV4 => {
                    let treatment = self.forward_treatment(forward, install).await?;
                    Ok(Some(self.objective_rule(
                        forward,
                        table,
                        selector.clone(),
                        treatment,
                        true,
                    )))
                }
                _ => Err(unsupported),
            },
        }
    }

    async fn forward_treatment(
        &self,
        forward: &ForwardingObjective,
        install: bool,
    ) -> Translation<TrafficTreatment> {
        if !install {
            // Removal matches on the table slot only.
            return Ok(TrafficTreatment::empty());
        }
        match (forward.next_id(), forward.treatment()) {
            (Some(next_id), _) => self.resolve_next(next_id).await,
            (None, Some(treatment)) => Ok(treatment.clone()),
            (None, None) => Err(Rejection::new(
                ObjectiveError::BadParams,
                fields::REASON_MISSING_NEXT_ID,
            )),
        }
    }

    fn objective_rule(
        &self,
        forward: &ForwardingObjective,
        table: TableId,
        selector: TrafficSelector,
        treatment: TrafficTreatment,
        permanent: bool,
    ) -> FlowRule {
        let rule = FlowRule::builder(self.device_id.clone(), forward.header().app_id().clone())
            .for_table(table)
            .with_priority(forward.header().priority())
            .with_selector(selector)
            .with_treatment(treatment);
        if permanent {
            rule.make_permanent().build()
        } else {
            rule.make_temporary(forward.header().timeout()).build()
        }
    }

    /// Treatment that sends traffic to whatever realizes `next_id` right now.
    async fn resolve_next(&self, next_id: NextId) -> Translation<TrafficTreatment> {
        let Some(stored) = self.store.get_next_group(next_id).await else {
            warn!(
                event = events::NEXT_GROUP_MISSING,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next_id,
                reason = fields::REASON_NEXT_NOT_STORED,
                "next id has no stored group"
            );
            return Err(Rejection::new(
                ObjectiveError::GroupMissing,
                fields::REASON_NEXT_NOT_STORED,
            ));
        };

        match self.decode(next_id, &stored)? {
            NextHandle::Group { key } => match self.groups.get_group(&self.device_id, &key).await {
                Some(group) => Ok(TrafficTreatment::builder().group(group.id).build()),
                None => {
                    warn!(
                        event = events::NEXT_GROUP_MISSING,
                        component = COMPONENT,
                        device_id = self.device_id.as_str(),
                        next_id = %next_id,
                        group_key = %key,
                        reason = fields::REASON_GROUP_NOT_LIVE,
                        "group for next id is no longer on the device"
                    );
                    Err(Rejection::new(
                        ObjectiveError::GroupMissing,
                        fields::REASON_GROUP_NOT_LIVE,
                    ))
                }
            },
            NextHandle::Actions { treatment, .. } => Ok(treatment),
        }
    }

    fn decode(&self, next_id: NextId, stored: &NextGroup) -> Translation<NextHandle> {
        NextHandle::decode(stored).map_err(|err| {
            error!(
                event = events::NEXT_HANDLE_CODEC_FAILED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next_id,
                err = %err,
                "stored next group was not written by this driver family"
            );
            Rejection::new(ObjectiveError::BadParams, fields::REASON_HANDLE_CODEC)
        })
    }

    fn encode(&self, next_id: NextId, handle: &NextHandle) -> Translation<NextGroup> {
        handle.encode().map_err(|err| {
            error!(
                event = events::NEXT_HANDLE_CODEC_FAILED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next_id,
                err = %err,
                "unable to encode next handle"
            );
            Rejection::new(ObjectiveError::Unknown, fields::REASON_HANDLE_CODEC)
        })
    }

    fn plan_next(&self, next: &NextObjective) -> Translation<NextPlan> {
        let bad_member = Rejection::new(ObjectiveError::BadParams, fields::REASON_BAD_NEXT_TREATMENT);
        let policy = &self.profile.policy;

        match next.next_type() {
            NextType::Simple => {
                let [member] = next.treatments() else {
                    return Err(bad_member);
                };
                let treatment = member.treatment().ok_or(bad_member)?;
                let classified = policy.classify(treatment);
                Ok(match classified.encoding {
                    NextEncoding::Group => NextPlan::Group {
                        group_type: GroupType::Indirect,
                        buckets: vec![GroupBucket::indirect(classified.treatment)],
                    },
                    NextEncoding::Actions => NextPlan::Actions(classified.treatment),
                })
            }
            next_type @ (NextType::Hashed | NextType::Broadcast)
                if self.profile.multi_bucket_groups =>
            {
                let buckets = next
                    .treatments()
                    .iter()
                    .map(|member| {
                        let treatment = policy.classify(member.treatment()?).treatment;
                        Some(if next_type == NextType::Hashed {
                            GroupBucket::select(treatment, member.weight())
                        } else {
                            GroupBucket::all(treatment)
                        })
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or(bad_member)?;
                let group_type = if next_type == NextType::Hashed {
                    GroupType::Select
                } else {
                    GroupType::All
                };
                Ok(NextPlan::Group {
                    group_type,
                    buckets,
                })
            }
            NextType::Hashed | NextType::Broadcast | NextType::Failover => Err(Rejection::new(
                ObjectiveError::Unsupported,
                fields::REASON_UNSUPPORTED_NEXT_TYPE,
            )),
        }
    }

    async fn install_next(&self, next: &NextObjective) -> Translation<()> {
        match self.plan_next(next)? {
            NextPlan::Actions(treatment) => self.store_actions(next, treatment).await,
            NextPlan::Group {
                group_type,
                buckets,
            } => {
                self.submit_group(next, group_type, buckets).await;
                Ok(())
            }
        }
    }

    async fn store_actions(&self, next: &NextObjective, treatment: TrafficTreatment) -> Translation<()> {
        let next_id = next.next_id();
        let handle = NextHandle::Actions {
            key: group_key_for(next_id),
            treatment,
        };
        let payload = self.encode(next_id, &handle)?;
        if let Some(superseded) = self.pending.take(handle.key()).await {
            warn!(
                event = events::NEXT_PENDING_SUPERSEDED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next_id,
                group_key = %handle.key(),
                superseded_id = %superseded.id(),
                "pending next objective superseded; its context will not be notified"
            );
        }
        self.store.put_next_group(next_id, payload).await;
        next.succeed();

        info!(
            event = events::NEXT_ACTIONS_STORED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            next_id = %next_id,
            handle = %handle,
            "stored next as action list"
        );
        Ok(())
    }

    /// Records the pending entry before submitting, so a confirmation can
    /// never arrive ahead of it.
    async fn submit_group(&self, next: &NextObjective, group_type: GroupType, buckets: Vec<GroupBucket>) {
        let next_id = next.next_id();
        let key = group_key_for(next_id);

        if let Some(superseded) = self.pending.insert(key.clone(), next.clone()).await {
            warn!(
                event = events::NEXT_PENDING_SUPERSEDED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next_id,
                group_key = %key,
                superseded_id = %superseded.id(),
                "pending next objective superseded; its context will not be notified"
            );
        }

        let bucket_count = buckets.len();
        self.groups
            .add_group(GroupDescription {
                device_id: self.device_id.clone(),
                group_type,
                buckets,
                app_cookie: key.clone(),
                group_id: None,
                app_id: next.header().app_id().clone(),
            })
            .await;

        debug!(
            event = events::NEXT_GROUP_SUBMITTED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            next_id = %next_id,
            group_key = %key,
            group_type = ?group_type,
            buckets = bucket_count,
            "submitted group for next objective"
        );
    }

    async fn remove_next(&self, next: &NextObjective) -> Translation<()> {
        let next_id = next.next_id();
        let Some(stored) = self.store.remove_next_group(next_id).await else {
            return Err(Rejection::new(
                ObjectiveError::GroupMissing,
                fields::REASON_NEXT_NOT_STORED,
            ));
        };

        let handle = self.decode(next_id, &stored)?;
        if let NextHandle::Group { key } = &handle {
            self.groups
                .remove_group(&self.device_id, key, next.header().app_id())
                .await;
        }
        next.succeed();

        info!(
            event = events::NEXT_REMOVED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            next_id = %next_id,
            handle = %handle,
            "removed next"
        );
        Ok(())
    }

    async fn verify_next(&self, next: &NextObjective) -> Translation<()> {
        self.resolve_next(next.next_id()).await?;
        next.succeed();
        Ok(())
    }

    /// Confirms the pending entry for `group`, if one is still waiting. The
    /// event and poll channels both land here; only the first finds an entry.
    pub(crate) async fn confirm_pending(&self, group: &Group, channel: &'static str) {
        let Some(next) = self.pending.take(group.key()).await else {
            return;
        };
        let next_id = next.next_id();
        let handle = NextHandle::Group {
            key: group.key().clone(),
        };

        match self.encode(next_id, &handle) {
            Ok(payload) => {
                self.store.put_next_group(next_id, payload).await;
                next.succeed();
                info!(
                    event = events::NEXT_CONFIRMED,
                    component = COMPONENT,
                    device_id = self.device_id.as_str(),
                    next_id = %next_id,
                    group_key = %group.key(),
                    group_id = %group.id,
                    channel,
                    "group for next objective confirmed"
                );
            }
            Err(rejection) => {
                next.fail(rejection.error);
            }
        }
    }

    /// Fails the pending entry for `key` after the device refused the group.
    pub(crate) async fn reject_pending(&self, key: &GroupKey) {
        let Some(next) = self.pending.take(key).await else {
            return;
        };
        next.fail(ObjectiveError::GroupInstallationFailed);
        warn!(
            event = events::NEXT_GROUP_ADD_FAILED,
            component = COMPONENT,
            device_id = self.device_id.as_str(),
            next_id = %next.next_id(),
            group_key = %key,
            "device refused group for next objective"
        );
    }

    /// One sweep: expire stale entries, then confirm any whose group is live.
    pub(crate) async fn sweep(&self) {
        for (key, next) in self.pending.evict_expired().await {
            next.fail(ObjectiveError::GroupInstallationFailed);
            warn!(
                event = events::NEXT_EXPIRED,
                component = COMPONENT,
                device_id = self.device_id.as_str(),
                next_id = %next.next_id(),
                group_key = %key,
                "group for next objective never confirmed"
            );
        }

        let pending: HashSet<GroupKey> = self.pending.keys().await.into_iter().collect();
        if pending.is_empty() {
            return;
        }
        for group in self.groups.get_groups(&self.device_id).await {
            if pending.contains(group.key()) {
                self.confirm_pending(&group, fields::CHANNEL_POLL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CorsaPipeliner;
    use crate::config::PipelinerConfig;
    use crate::flow::{
        eth_type, ApplicationId, Criterion, DeviceId, FlowRule, FlowRuleOperations,
        FlowRuleService, Instruction, Ipv4Prefix, MacAddress, PortNumber, RuleOperationKind,
        TableId, TrafficSelector, TrafficTreatment, VlanId,
    };
    use crate::group::{
        Group, GroupDescription, GroupEvent, GroupEventType, GroupId, GroupKey, GroupListener,
        GroupService,
    };
    use crate::objective::{
        FilteringObjective, ForwardingFlag, ForwardingObjective, NextId, NextObjective, NextType,
        Objective, ObjectiveContext, ObjectiveError,
    };
    use crate::pipeline::{
        group_key_for, DriverKind, NextHandle, Pipeliner, PipelinerContext, TableMissAction,
    };
    use crate::store::{FlowObjectiveStore, NextGroup};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const MAC: MacAddress = MacAddress([0, 0, 0, 0, 0, 0x0a]);

    #[derive(Default)]
    struct RecordingRules {
        batches: Mutex<Vec<FlowRuleOperations>>,
        purged: Mutex<Vec<ApplicationId>>,
        refuse: Mutex<bool>,
    }

    impl RecordingRules {
        fn refuse_batches(&self, refuse: bool) {
            *self.refuse.lock().unwrap() = refuse;
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }

        fn installed(&self) -> Vec<FlowRule> {
            self.rules_of(RuleOperationKind::Add)
        }

        fn removed(&self) -> Vec<FlowRule> {
            self.rules_of(RuleOperationKind::Remove)
        }

        fn rules_of(&self, kind: RuleOperationKind) -> Vec<FlowRule> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|batch| batch.operations().to_vec())
                .filter(|operation| operation.kind == kind)
                .map(|operation| operation.rule)
                .collect()
        }
    }

    #[async_trait]
    impl FlowRuleService for RecordingRules {
        async fn apply(&self, _device_id: &DeviceId, operations: FlowRuleOperations) {
            if *self.refuse.lock().unwrap() {
                operations.complete_error();
            } else {
                operations.complete_success();
            }
            self.batches.lock().unwrap().push(operations);
        }

        async fn purge_rules(&self, _device_id: &DeviceId, app_id: &ApplicationId) {
            self.purged.lock().unwrap().push(app_id.clone());
        }
    }

    /// Accepts every group submission; tests decide when a group goes live.
    #[derive(Default)]
    struct LiveGroups {
        submitted: Mutex<Vec<GroupDescription>>,
        live: Mutex<HashMap<GroupKey, Group>>,
        listeners: Mutex<Vec<Arc<dyn GroupListener>>>,
        removed: Mutex<Vec<GroupKey>>,
    }

    impl LiveGroups {
        fn submitted(&self) -> Vec<GroupDescription> {
            self.submitted.lock().unwrap().clone()
        }

        fn group_for(&self, key: &GroupKey) -> Group {
            let description = self
                .submitted
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|description| &description.app_cookie == key)
                .cloned()
                .expect("group should have been submitted");
            Group {
                id: GroupId(0x100 + self.submitted.lock().unwrap().len() as u32),
                description,
            }
        }

        fn materialize(&self, key: &GroupKey) -> Group {
            let group = self.group_for(key);
            self.live.lock().unwrap().insert(key.clone(), group.clone());
            group
        }

        fn vanish(&self, key: &GroupKey) {
            self.live.lock().unwrap().remove(key);
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }

        async fn emit(&self, event_type: GroupEventType, subject: Group) {
            let listeners = self.listeners.lock().unwrap().clone();
            for listener in listeners {
                listener
                    .on_event(GroupEvent {
                        event_type,
                        subject: subject.clone(),
                    })
                    .await;
            }
        }
    }

    #[async_trait]
    impl GroupService for LiveGroups {
        async fn add_group(&self, description: GroupDescription) {
            self.submitted.lock().unwrap().push(description);
        }

        async fn remove_group(&self, _device_id: &DeviceId, key: &GroupKey, _app_id: &ApplicationId) {
            self.live.lock().unwrap().remove(key);
            self.removed.lock().unwrap().push(key.clone());
        }

        async fn get_group(&self, _device_id: &DeviceId, key: &GroupKey) -> Option<Group> {
            self.live.lock().unwrap().get(key).cloned()
        }

        async fn get_groups(&self, _device_id: &DeviceId) -> Vec<Group> {
            self.live.lock().unwrap().values().cloned().collect()
        }

        async fn add_listener(&self, listener: Arc<dyn GroupListener>) {
            self.listeners.lock().unwrap().push(listener);
        }

        async fn remove_listener(&self, listener: &Arc<dyn GroupListener>) {
            self.listeners
                .lock()
                .unwrap()
                .retain(|registered| !Arc::ptr_eq(registered, listener));
        }

        async fn purge_groups(&self, _device_id: &DeviceId, app_id: &ApplicationId) {
            self.live
                .lock()
                .unwrap()
                .retain(|_, group| &group.description.app_id != app_id);
        }
    }

    #[derive(Default)]
    struct MapStore {
        groups: Mutex<HashMap<NextId, NextGroup>>,
    }

    impl MapStore {
        fn handle(&self, next_id: NextId) -> Option<NextHandle> {
            self.groups
                .lock()
                .unwrap()
                .get(&next_id)
                .map(|stored| NextHandle::decode(stored).expect("stored handle should decode"))
        }
    }

    #[async_trait]
    impl FlowObjectiveStore for MapStore {
        async fn put_next_group(&self, next_id: NextId, group: NextGroup) {
            self.groups.lock().unwrap().insert(next_id, group);
        }

        async fn get_next_group(&self, next_id: NextId) -> Option<NextGroup> {
            self.groups.lock().unwrap().get(&next_id).cloned()
        }

        async fn remove_next_group(&self, next_id: NextId) -> Option<NextGroup> {
            self.groups.lock().unwrap().remove(&next_id)
        }

        async fn allocate_next_id(&self) -> NextId {
            NextId(1)
        }
    }

    #[derive(Default)]
    struct Outcomes {
        results: Mutex<Vec<Result<(), ObjectiveError>>>,
    }

    impl Outcomes {
        fn results(&self) -> Vec<Result<(), ObjectiveError>> {
            self.results.lock().unwrap().clone()
        }
    }

    impl ObjectiveContext for Outcomes {
        fn on_success(&self, _objective: &Objective) {
            self.results.lock().unwrap().push(Ok(()));
        }

        fn on_error(&self, _objective: &Objective, error: ObjectiveError) {
            self.results.lock().unwrap().push(Err(error));
        }
    }

    struct Harness {
        pipeliner: CorsaPipeliner,
        rules: Arc<RecordingRules>,
        groups: Arc<LiveGroups>,
        store: Arc<MapStore>,
    }

    fn harness(kind: DriverKind) -> Harness {
        harness_with(kind, PipelinerConfig::default())
    }

    fn harness_with(kind: DriverKind, config: PipelinerConfig) -> Harness {
        let rules = Arc::new(RecordingRules::default());
        let groups = Arc::new(LiveGroups::default());
        let store = Arc::new(MapStore::default());
        let pipeliner = CorsaPipeliner::new(
            kind,
            PipelinerContext {
                device_id: DeviceId::new("of:0000000000000001"),
                flow_rules: rules.clone(),
                groups: groups.clone(),
                store: store.clone(),
                config,
            },
        );
        Harness {
            pipeliner,
            rules,
            groups,
            store,
        }
    }

    fn app() -> ApplicationId {
        ApplicationId::new("org.example.routing")
    }

    fn prefix(last: u8, length: u8) -> Ipv4Prefix {
        Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, last), length)
    }

    fn next_add(next_id: u32, treatment: TrafficTreatment, outcomes: &Arc<Outcomes>) -> NextObjective {
        NextObjective::builder()
            .from_app(app())
            .with_id(NextId(next_id))
            .with_type(NextType::Simple)
            .add_treatment(treatment)
            .with_context(outcomes.clone())
            .add()
            .expect("next objective should build")
    }

    fn route_add(next_id: u32, outcomes: &Arc<Outcomes>) -> ForwardingObjective {
        ForwardingObjective::builder()
            .from_app(app())
            .with_priority(120)
            .with_flag(ForwardingFlag::Specific)
            .with_selector(
                TrafficSelector::builder()
                    .match_eth_type(eth_type::IPV4)
                    .match_ipv4_dst(prefix(0, 24))
                    .build(),
            )
            .next_step(NextId(next_id))
            .with_context(outcomes.clone())
            .add()
            .expect("forwarding objective should build")
    }

    fn versatile(ether: u16, treatment: TrafficTreatment, outcomes: &Arc<Outcomes>) -> ForwardingObjective {
        ForwardingObjective::builder()
            .from_app(app())
            .with_priority(40000)
            .with_flag(ForwardingFlag::Versatile)
            .with_selector(TrafficSelector::builder().match_eth_type(ether).build())
            .with_treatment(treatment)
            .with_context(outcomes.clone())
            .add()
            .expect("forwarding objective should build")
    }

    fn group_rewrite() -> TrafficTreatment {
        TrafficTreatment::builder()
            .set_vlan_id(VlanId(20))
            .set_eth_src(MAC)
            .set_eth_dst(MacAddress([0, 0, 0, 0, 0, 0x0b]))
            .set_output(PortNumber(3))
            .build()
    }

    #[tokio::test]
    async fn init_is_idempotent_and_shutdown_detaches_the_listener() {
        let harness = harness(DriverKind::OvsCorsa);

        harness.pipeliner.init().await;
        let batches = harness.rules.batch_count();
        let fixed_rules = harness.rules.installed().len();
        harness.pipeliner.init().await;

        assert!(fixed_rules > 0);
        assert_eq!(harness.rules.batch_count(), batches);
        assert_eq!(harness.groups.listener_count(), 1);
        assert!(harness
            .rules
            .installed()
            .iter()
            .all(|rule| rule.permanent && rule.app_id.name() == super::DRIVER_APP));

        harness.pipeliner.shutdown().await;
        assert_eq!(harness.groups.listener_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_on_spawned_tasks() {
        let harness = harness(DriverKind::CorsaV3);
        let pipeliner = Arc::new(harness.pipeliner);

        let worker = pipeliner.clone();
        tokio::spawn(async move { worker.init().await })
            .await
            .expect("init task should finish");
        assert_eq!(harness.groups.listener_count(), 1);

        let worker = pipeliner.clone();
        tokio::spawn(async move { worker.shutdown().await })
            .await
            .expect("shutdown task should finish");
        assert!(harness.rules.batch_count() > 0);
        assert_eq!(harness.groups.listener_count(), 0);
    }

    #[tokio::test]
    async fn ovs_filter_installs_supported_conditions_and_flags_the_rest() {
        let harness = harness(DriverKind::OvsCorsa);
        let outcomes = Arc::new(Outcomes::default());
        let filter = FilteringObjective::builder()
            .from_app(app())
            .with_key(Criterion::InPort(PortNumber(1)))
            .add_condition(Criterion::EthDst(MAC))
            .add_condition(Criterion::VlanVid(VlanId(10)))
            .add_condition(Criterion::Ipv4Dst(prefix(1, 32)))
            .add_condition(Criterion::EthSrc(MAC))
            .permit()
            .with_context(outcomes.clone())
            .add()
            .expect("filter should build");

        harness.pipeliner.filter(filter).await;

        let installed = harness.rules.installed();
        let tables: Vec<TableId> = installed.iter().map(|rule| rule.table).collect();
        assert_eq!(tables, vec![TableId(0), TableId(2), TableId(6)]);
        assert!(installed.iter().all(|rule| rule.app_id == app() && rule.permanent));
        assert_eq!(installed[1].treatment.deferred(), &[Instruction::PopVlan]);
        assert_eq!(installed[1].selector.in_port(), Some(PortNumber(1)));
        assert_eq!(
            outcomes.results(),
            vec![Err(ObjectiveError::Unsupported)]
        );
    }

    #[tokio::test]
    async fn deny_filters_are_unsupported() {
        let harness = harness(DriverKind::CorsaV3);
        let outcomes = Arc::new(Outcomes::default());
        let filter = FilteringObjective::builder()
            .from_app(app())
            .with_key(Criterion::InPort(PortNumber(1)))
            .add_condition(Criterion::EthDst(MAC))
            .deny()
            .with_context(outcomes.clone())
            .add()
            .expect("filter should build");

        harness.pipeliner.filter(filter).await;

        assert_eq!(harness.rules.batch_count(), 0);
        assert_eq!(outcomes.results(), vec![Err(ObjectiveError::Unsupported)]);
    }

    #[tokio::test]
    async fn v3_partial_rewrite_is_inlined_into_routes() {
        let harness = harness(DriverKind::CorsaV3);
        let next_outcomes = Arc::new(Outcomes::default());
        let route_outcomes = Arc::new(Outcomes::default());
        let treatment = TrafficTreatment::builder()
            .set_eth_dst(MAC)
            .set_output(PortNumber(7))
            .build();

        harness
            .pipeliner
            .next(next_add(4, treatment.clone(), &next_outcomes))
            .await;
        harness.pipeliner.forward(route_add(4, &route_outcomes)).await;

        assert_eq!(next_outcomes.results(), vec![Ok(())]);
        assert!(harness.groups.submitted().is_empty());
        assert!(matches!(
            harness.store.handle(NextId(4)),
            Some(NextHandle::Actions { .. })
        ));
        let routes = harness.rules.installed();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].table, TableId(7));
        assert_eq!(routes[0].priority, 120);
        assert_eq!(routes[0].treatment, treatment);
        assert_eq!(route_outcomes.results(), vec![Ok(())]);
    }

    #[tokio::test]
    async fn group_confirmation_resolves_exactly_once_across_event_and_poll() {
        let harness = harness(DriverKind::OvsCorsa);
        let outcomes = Arc::new(Outcomes::default());
        harness.pipeliner.init().await;

        harness
            .pipeliner
            .next(next_add(5, group_rewrite(), &outcomes))
            .await;
        assert!(outcomes.results().is_empty());
        assert_eq!(harness.pipeliner.pending_next_ids().await, vec![NextId(5)]);

        let key = group_key_for(NextId(5));
        let group = harness.groups.materialize(&key);
        harness.groups.emit(GroupEventType::Added, group.clone()).await;
        harness.pipeliner.state.sweep().await;
        harness.groups.emit(GroupEventType::Added, group).await;

        assert_eq!(outcomes.results(), vec![Ok(())]);
        assert_eq!(
            harness.store.handle(NextId(5)),
            Some(NextHandle::Group { key })
        );
        assert!(harness.pipeliner.pending_next_ids().await.is_empty());
        harness.pipeliner.shutdown().await;
    }

    #[tokio::test]
    async fn polling_confirms_groups_whose_event_was_lost() {
        let harness = harness(DriverKind::CorsaV39);
        let outcomes = Arc::new(Outcomes::default());

        harness
            .pipeliner
            .next(next_add(6, group_rewrite(), &outcomes))
            .await;
        harness.groups.materialize(&group_key_for(NextId(6)));
        harness.pipeliner.state.sweep().await;

        assert_eq!(outcomes.results(), vec![Ok(())]);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_groups_expire() {
        let config = PipelinerConfig {
            pending_group_ttl_ms: 1_000,
            ..PipelinerConfig::default()
        };
        let harness = harness_with(DriverKind::OvsCorsa, config);
        let outcomes = Arc::new(Outcomes::default());

        harness
            .pipeliner
            .next(next_add(7, group_rewrite(), &outcomes))
            .await;
        tokio::time::advance(Duration::from_millis(999)).await;
        harness.pipeliner.state.sweep().await;
        assert!(outcomes.results().is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        harness.pipeliner.state.sweep().await;

        assert_eq!(
            outcomes.results(),
            vec![Err(ObjectiveError::GroupInstallationFailed)]
        );
        assert!(harness.store.handle(NextId(7)).is_none());
    }

    #[tokio::test]
    async fn a_superseded_pending_next_is_never_resolved() {
        let harness = harness(DriverKind::OvsCorsa);
        let first = Arc::new(Outcomes::default());
        let second = Arc::new(Outcomes::default());
        let other_rewrite = TrafficTreatment::builder().set_output(PortNumber(9)).build();

        harness.pipeliner.next(next_add(8, group_rewrite(), &first)).await;
        harness.pipeliner.next(next_add(8, other_rewrite, &second)).await;
        harness.groups.materialize(&group_key_for(NextId(8)));
        harness.pipeliner.state.sweep().await;

        assert!(first.results().is_empty());
        assert_eq!(second.results(), vec![Ok(())]);
    }

    #[tokio::test]
    async fn an_action_list_next_supersedes_a_pending_group() {
        let harness = harness(DriverKind::CorsaV3);
        let first = Arc::new(Outcomes::default());
        let second = Arc::new(Outcomes::default());
        let output_only = TrafficTreatment::builder().set_output(PortNumber(5)).build();
        let key = group_key_for(NextId(21));

        harness.pipeliner.next(next_add(21, group_rewrite(), &first)).await;
        assert_eq!(harness.pipeliner.pending_next_ids().await, vec![NextId(21)]);
        harness.pipeliner.next(next_add(21, output_only, &second)).await;

        assert!(harness.pipeliner.pending_next_ids().await.is_empty());
        assert_eq!(second.results(), vec![Ok(())]);

        let late = harness.groups.materialize(&key);
        harness
            .pipeliner
            .state
            .confirm_pending(&late, crate::observability::fields::CHANNEL_EVENT)
            .await;
        harness.pipeliner.state.sweep().await;

        assert!(first.results().is_empty());
        assert_eq!(second.results(), vec![Ok(())]);
        assert!(matches!(
            harness.store.handle(NextId(21)),
            Some(NextHandle::Actions { .. })
        ));
    }

    #[tokio::test]
    async fn refused_groups_fail_the_next() {
        let harness = harness(DriverKind::OvsCorsa);
        let outcomes = Arc::new(Outcomes::default());
        harness.pipeliner.init().await;

        harness
            .pipeliner
            .next(next_add(9, group_rewrite(), &outcomes))
            .await;
        let refused = harness.groups.group_for(&group_key_for(NextId(9)));
        harness.groups.emit(GroupEventType::AddFailed, refused).await;

        assert_eq!(
            outcomes.results(),
            vec![Err(ObjectiveError::GroupInstallationFailed)]
        );
        assert!(harness.pipeliner.pending_next_ids().await.is_empty());
        harness.pipeliner.shutdown().await;
    }

    #[tokio::test]
    async fn routes_to_a_vanished_group_report_group_missing() {
        let harness = harness(DriverKind::OvsCorsa);
        let next_outcomes = Arc::new(Outcomes::default());
        let route_outcomes = Arc::new(Outcomes::default());
        let key = group_key_for(NextId(10));

        harness
            .pipeliner
            .next(next_add(10, group_rewrite(), &next_outcomes))
            .await;
        harness.groups.materialize(&key);
        harness.pipeliner.state.sweep().await;
        harness.groups.vanish(&key);
        harness.pipeliner.forward(route_add(10, &route_outcomes)).await;

        assert_eq!(next_outcomes.results(), vec![Ok(())]);
        assert_eq!(
            route_outcomes.results(),
            vec![Err(ObjectiveError::GroupMissing)]
        );
        assert!(harness.rules.installed().is_empty());
    }

    #[tokio::test]
    async fn routes_through_a_live_group_point_at_it() {
        let harness = harness(DriverKind::OvsCorsa);
        let route_outcomes = Arc::new(Outcomes::default());
        let key = group_key_for(NextId(11));

        harness
            .pipeliner
            .next(next_add(11, group_rewrite(), &Arc::new(Outcomes::default())))
            .await;
        let group = harness.groups.materialize(&key);
        harness.pipeliner.state.sweep().await;
        harness.pipeliner.forward(route_add(11, &route_outcomes)).await;

        let routes = harness.rules.installed();
        assert_eq!(routes[0].table, TableId(6));
        assert_eq!(routes[0].treatment.immediate(), &[Instruction::Group(group.id)]);
        assert_eq!(route_outcomes.results(), vec![Ok(())]);
    }

    #[tokio::test]
    async fn removing_a_next_removes_its_group_and_mapping() {
        let harness = harness(DriverKind::OvsCorsa);
        let outcomes = Arc::new(Outcomes::default());
        let key = group_key_for(NextId(12));
        harness
            .pipeliner
            .next(next_add(12, group_rewrite(), &Arc::new(Outcomes::default())))
            .await;
        harness.groups.materialize(&key);
        harness.pipeliner.state.sweep().await;

        let removal = NextObjective::builder()
            .from_app(app())
            .with_id(NextId(12))
            .with_type(NextType::Simple)
            .add_treatment(group_rewrite())
            .with_context(outcomes.clone())
            .remove()
            .expect("next objective should build");
        harness.pipeliner.next(removal).await;

        assert_eq!(outcomes.results(), vec![Ok(())]);
        assert_eq!(*harness.groups.removed.lock().unwrap(), vec![key]);
        assert!(harness.store.handle(NextId(12)).is_none());
    }

    #[tokio::test]
    async fn v3_versatile_rules_drop_clear_deferred_transparently() {
        let harness = harness(DriverKind::CorsaV3);
        let outcomes = Arc::new(Outcomes::default());
        let treatment = TrafficTreatment::builder().punt().wipe_deferred().build();

        harness
            .pipeliner
            .forward(versatile(eth_type::ARP, treatment, &outcomes))
            .await;

        let acl = harness.rules.installed();
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].table, TableId(0));
        assert_eq!(acl[0].priority, 40000);
        assert!(!acl[0].treatment.clears_deferred());
        assert_eq!(outcomes.results(), vec![Ok(())]);
    }

    #[tokio::test]
    async fn ovs_versatile_relies_on_fixed_rules() {
        let harness = harness(DriverKind::OvsCorsa);
        let arp = Arc::new(Outcomes::default());
        let lldp = Arc::new(Outcomes::default());

        harness
            .pipeliner
            .forward(versatile(eth_type::ARP, TrafficTreatment::builder().punt().build(), &arp))
            .await;
        harness
            .pipeliner
            .forward(versatile(eth_type::LLDP, TrafficTreatment::builder().punt().build(), &lldp))
            .await;

        assert_eq!(harness.rules.batch_count(), 0);
        assert_eq!(arp.results(), vec![Ok(())]);
        assert_eq!(lldp.results(), vec![Err(ObjectiveError::Unsupported)]);
    }

    #[tokio::test]
    async fn install_default_submits_only_state_changes() {
        let harness = harness(DriverKind::CorsaV39);

        for _ in 0..2 {
            harness
                .pipeliner
                .install_default(TableId(8), TableMissAction::Drop, 0, true)
                .await;
        }
        assert_eq!(harness.rules.batch_count(), 1);

        for _ in 0..2 {
            harness
                .pipeliner
                .install_default(TableId(8), TableMissAction::Drop, 0, false)
                .await;
        }
        assert_eq!(harness.rules.batch_count(), 2);
        assert_eq!(harness.rules.removed().len(), 1);
    }

    #[tokio::test]
    async fn refused_default_rules_are_retried_by_the_next_call() {
        let harness = harness(DriverKind::CorsaV39);

        harness.rules.refuse_batches(true);
        harness
            .pipeliner
            .install_default(TableId(8), TableMissAction::Drop, 0, true)
            .await;
        harness.rules.refuse_batches(false);
        harness
            .pipeliner
            .install_default(TableId(8), TableMissAction::Drop, 0, true)
            .await;
        harness
            .pipeliner
            .install_default(TableId(8), TableMissAction::Drop, 0, true)
            .await;

        assert_eq!(harness.rules.batch_count(), 2);
        assert_eq!(harness.pipeliner.state.default_rules.len(), 1);
    }

    #[tokio::test]
    async fn purging_the_driver_app_allows_fixed_rules_again() {
        let harness = harness(DriverKind::OvsCorsa);
        harness.pipeliner.init().await;
        let batches = harness.rules.batch_count();

        harness
            .pipeliner
            .purge_all(&ApplicationId::new(super::DRIVER_APP))
            .await;
        harness.pipeliner.init().await;

        assert_eq!(harness.rules.purged.lock().unwrap().len(), 1);
        assert_eq!(harness.rules.batch_count(), batches * 2);
        harness.pipeliner.shutdown().await;
    }

    #[tokio::test]
    async fn next_mappings_describe_stored_handles() {
        let harness = harness(DriverKind::CorsaV3);
        let actions = NextHandle::Actions {
            key: group_key_for(NextId(13)),
            treatment: TrafficTreatment::builder().set_output(PortNumber(2)).build(),
        }
        .encode()
        .expect("handle should encode");
        let missing = NextHandle::Group {
            key: group_key_for(NextId(14)),
        }
        .encode()
        .expect("handle should encode");

        assert_eq!(
            harness.pipeliner.next_mappings(&actions).await,
            vec!["actions key=0x0000000d immediate=[OUTPUT:2], deferred=[]".to_string()]
        );
        assert_eq!(
            harness.pipeliner.next_mappings(&missing).await,
            vec!["group key=0x0000000e (not on device)".to_string()]
        );
        assert_eq!(
            harness
                .pipeliner
                .next_mappings(&NextGroup::new(vec![1, 2, 3]))
                .await,
            vec!["unrecognized next group (3 bytes)".to_string()]
        );
    }
}
