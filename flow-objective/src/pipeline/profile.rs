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


//! Per-variant table layouts, fixed rules and capabilities of the Corsa
//! driver family.

use super::treatment_policy::{
    AlwaysGroupPolicy, PopVlanCorrectingPolicy, RewriteGroupPolicy, TreatmentPolicy,
};
use crate::flow::{
    eth_type, MacAddress, TableId, TrafficSelector, TrafficTreatment, VlanId,
};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const CONTROLLER_PRIORITY: u16 = 255;
pub const DROP_PRIORITY: u16 = 0;
pub const HIGHEST_PRIORITY: u16 = 0xffff;

/// Which member of the driver family programs a device.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    OvsCorsa,
    CorsaV3,
    CorsaV39,
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::OvsCorsa => "ovs-corsa",
            DriverKind::CorsaV3 => "corsa-v3",
            DriverKind::CorsaV39 => "corsa-v39",
        }
    }
}

impl Display for DriverKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ovs-corsa" => Ok(DriverKind::OvsCorsa),
            "corsa-v3" => Ok(DriverKind::CorsaV3),
            "corsa-v39" => Ok(DriverKind::CorsaV39),
            other => Err(format!(
                "unknown driver '{other}', expected ovs-corsa, corsa-v3 or corsa-v39"
            )),
        }
    }
}

/// What a table does with traffic nothing else matched.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TableMissAction {
    Drop,
    GoTo(TableId),
    Punt,
}

impl TableMissAction {
    pub(crate) fn treatment(&self) -> TrafficTreatment {
        match self {
            TableMissAction::Drop => TrafficTreatment::builder().drop().build(),
            TableMissAction::GoTo(table) => TrafficTreatment::builder().transition(*table).build(),
            TableMissAction::Punt => TrafficTreatment::builder().punt().build(),
        }
    }
}

/// Where a filtering condition lands and where its rule sends traffic next.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FilterStage {
    pub(crate) table: TableId,
    pub(crate) goto: TableId,
    pub(crate) priority: u16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SwitchingMode {
    Unsupported,
    VlanCircuit(TableId),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum VersatileMode {
    /// Fixed behavior of the emulated pipeline: ARP and plain TCP are already
    /// handled by default rules, nothing else is accepted.
    DefaultsOnly,
    /// One ACL rule in the given table; clear-deferred is stripped first.
    Acl(TableId),
}

/// One fixed rule installed at init.
#[derive(Clone, Debug)]
pub(crate) struct DefaultRule {
    pub(crate) table: TableId,
    pub(crate) priority: u16,
    pub(crate) selector: TrafficSelector,
    pub(crate) action: TableMissAction,
}

impl DefaultRule {
    fn miss(table: TableId, action: TableMissAction) -> Self {
        Self {
            table,
            priority: DROP_PRIORITY,
            selector: TrafficSelector::empty(),
            action,
        }
    }

    fn matching(table: TableId, selector: TrafficSelector, action: TableMissAction) -> Self {
        Self {
            table,
            priority: CONTROLLER_PRIORITY,
            selector,
            action,
        }
    }
}

/// Rules for one table, submitted as one batch under `description`.
pub(crate) struct DefaultRuleSet {
    pub(crate) description: &'static str,
    pub(crate) rules: Vec<DefaultRule>,
}

pub(crate) struct DriverProfile {
    pub(crate) kind: DriverKind,
    pub(crate) mac_stage: FilterStage,
    pub(crate) vlan_stage: FilterStage,
    /// Pop the outer tag (deferred) when a VLAN filter admits a frame.
    pub(crate) vlan_filter_pops: bool,
    pub(crate) ip_stage: FilterStage,
    pub(crate) route_table: TableId,
    pub(crate) switching: SwitchingMode,
    pub(crate) versatile: VersatileMode,
    /// HASHED and BROADCAST next objectives map to SELECT and ALL groups.
    pub(crate) multi_bucket_groups: bool,
    pub(crate) policy: Box<dyn TreatmentPolicy>,
}

mod ovs {
    use crate::flow::TableId;

    pub(super) const MAC: TableId = TableId(0);
    pub(super) const VLAN_MPLS: TableId = TableId(1);
    pub(super) const VLAN: TableId = TableId(2);
    pub(super) const ETHER: TableId = TableId(4);
    pub(super) const COS_MAP: TableId = TableId(5);
    pub(super) const FIB: TableId = TableId(6);
    pub(super) const LOCAL: TableId = TableId(9);
}

mod v3 {
    use crate::flow::TableId;

    pub(super) const PORT_PROTO: TableId = TableId(0);
    pub(super) const VLAN_CHECK: TableId = TableId(1);
    pub(super) const VLAN_MAC_XLATE: TableId = TableId(2);
    pub(super) const VLAN_CIRCUIT: TableId = TableId(3);
    pub(super) const PRIORITY_MAP: TableId = TableId(4);
    pub(super) const L3_IF_MAC_DA: TableId = TableId(5);
    pub(super) const ETHER: TableId = TableId(6);
    pub(super) const FIB: TableId = TableId(7);
    pub(super) const LOCAL: TableId = TableId(9);
}

impl DriverProfile {
    pub(crate) fn for_kind(kind: DriverKind) -> Self {
        match kind {
            DriverKind::OvsCorsa => Self {
                kind,
                mac_stage: FilterStage {
                    table: ovs::MAC,
                    goto: ovs::VLAN_MPLS,
                    priority: CONTROLLER_PRIORITY,
                },
                vlan_stage: FilterStage {
                    table: ovs::VLAN,
                    goto: ovs::ETHER,
                    priority: CONTROLLER_PRIORITY,
                },
                vlan_filter_pops: true,
                ip_stage: FilterStage {
                    table: ovs::FIB,
                    goto: ovs::LOCAL,
                    priority: HIGHEST_PRIORITY,
                },
                route_table: ovs::FIB,
                switching: SwitchingMode::Unsupported,
                versatile: VersatileMode::DefaultsOnly,
                multi_bucket_groups: false,
                policy: Box::new(AlwaysGroupPolicy),
            },
            DriverKind::CorsaV3 | DriverKind::CorsaV39 => Self {
                kind,
                mac_stage: FilterStage {
                    table: v3::L3_IF_MAC_DA,
                    goto: v3::ETHER,
                    priority: CONTROLLER_PRIORITY,
                },
                vlan_stage: FilterStage {
                    table: v3::VLAN_CHECK,
                    goto: v3::VLAN_MAC_XLATE,
                    priority: CONTROLLER_PRIORITY,
                },
                vlan_filter_pops: false,
                ip_stage: FilterStage {
                    table: v3::FIB,
                    goto: v3::LOCAL,
                    priority: HIGHEST_PRIORITY,
                },
                route_table: v3::FIB,
                switching: SwitchingMode::VlanCircuit(v3::VLAN_CIRCUIT),
                versatile: VersatileMode::Acl(v3::PORT_PROTO),
                multi_bucket_groups: kind == DriverKind::CorsaV39,
                policy: if kind == DriverKind::CorsaV39 {
                    Box::new(PopVlanCorrectingPolicy)
                } else {
                    Box::new(RewriteGroupPolicy)
                },
            },
        }
    }

    pub(crate) fn default_rules(&self) -> Vec<DefaultRuleSet> {
        match self.kind {
            DriverKind::OvsCorsa => ovs_default_rules(),
            DriverKind::CorsaV3 | DriverKind::CorsaV39 => v3_default_rules(),
        }
    }
}

fn ovs_default_rules() -> Vec<DefaultRuleSet> {
    use TableMissAction::{Drop, GoTo, Punt};

    vec![
        DefaultRuleSet {
            description: "mac table",
            rules: vec![
                DefaultRule::matching(
                    ovs::MAC,
                    TrafficSelector::builder()
                        .match_eth_dst(MacAddress::BROADCAST)
                        .build(),
                    GoTo(ovs::VLAN_MPLS),
                ),
                DefaultRule::miss(ovs::MAC, Drop),
            ],
        },
        DefaultRuleSet {
            description: "vlan mpls table",
            rules: vec![DefaultRule::matching(
                ovs::VLAN_MPLS,
                TrafficSelector::builder().match_vlan_id(VlanId::ANY).build(),
                GoTo(ovs::VLAN),
            )],
        },
        DefaultRuleSet {
            description: "vlan table",
            rules: vec![DefaultRule::miss(ovs::VLAN, Drop)],
        },
        DefaultRuleSet {
            description: "ether table",
            rules: vec![
                DefaultRule::matching(
                    ovs::ETHER,
                    TrafficSelector::builder()
                        .match_eth_type(eth_type::ARP)
                        .build(),
                    Punt,
                ),
                DefaultRule::matching(
                    ovs::ETHER,
                    TrafficSelector::builder()
                        .match_eth_type(eth_type::IPV4)
                        .build(),
                    GoTo(ovs::COS_MAP),
                ),
                DefaultRule::miss(ovs::ETHER, Drop),
            ],
        },
        DefaultRuleSet {
            description: "cos map table",
            rules: vec![DefaultRule::miss(ovs::COS_MAP, GoTo(ovs::FIB))],
        },
        DefaultRuleSet {
            description: "fib table",
            rules: vec![DefaultRule::miss(ovs::FIB, Drop)],
        },
        DefaultRuleSet {
            description: "local table",
            rules: vec![DefaultRule::matching(
                ovs::LOCAL,
                TrafficSelector::empty(),
                Punt,
            )],
        },
    ]
}

fn v3_default_rules() -> Vec<DefaultRuleSet> {
    use TableMissAction::{Drop, GoTo, Punt};

    vec![
        DefaultRuleSet {
            description: "port based proto table",
            rules: vec![DefaultRule::miss(v3::PORT_PROTO, GoTo(v3::VLAN_CHECK))],
        },
        DefaultRuleSet {
            description: "vlan check table",
            rules: vec![DefaultRule::miss(v3::VLAN_CHECK, Drop)],
        },
        DefaultRuleSet {
            description: "vlan mac xlate table",
            rules: vec![DefaultRule::miss(
                v3::VLAN_MAC_XLATE,
                GoTo(v3::VLAN_CIRCUIT),
            )],
        },
        DefaultRuleSet {
            description: "vlan circuit table",
            rules: vec![DefaultRule::miss(v3::VLAN_CIRCUIT, GoTo(v3::PRIORITY_MAP))],
        },
        DefaultRuleSet {
            description: "priority map table",
            rules: vec![DefaultRule::miss(v3::PRIORITY_MAP, GoTo(v3::L3_IF_MAC_DA))],
        },
        DefaultRuleSet {
            description: "l3 interface mac table",
            rules: vec![DefaultRule::miss(v3::L3_IF_MAC_DA, Drop)],
        },
        DefaultRuleSet {
            description: "ether table",
            rules: vec![
                DefaultRule::matching(
                    v3::ETHER,
                    TrafficSelector::builder()
                        .match_eth_type(eth_type::ARP)
                        .build(),
                    Punt,
                ),
                DefaultRule::matching(
                    v3::ETHER,
                    TrafficSelector::builder()
                        .match_eth_type(eth_type::IPV4)
                        .build(),
                    GoTo(v3::FIB),
                ),
                DefaultRule::miss(v3::ETHER, Drop),
            ],
        },
        DefaultRuleSet {
            description: "fib table",
            rules: vec![DefaultRule::miss(v3::FIB, Drop)],
        },
        DefaultRuleSet {
            description: "local table",
            rules: vec![DefaultRule::matching(
                v3::LOCAL,
                TrafficSelector::empty(),
                Punt,
            )],
        },
    ]
}
