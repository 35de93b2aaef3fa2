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

//! Match criteria and the selector that groups them.

use super::{Ipv4Prefix, MacAddress, PortNumber, VlanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Match dimension of a [`Criterion`]. A selector holds at most one criterion per kind.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum CriterionKind {
    InPort,
    EthDst,
    EthSrc,
    EthType,
    VlanVid,
    Ipv4Src,
    Ipv4Dst,
    IpProto,
}

impl Display for CriterionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CriterionKind::InPort => "IN_PORT",
            CriterionKind::EthDst => "ETH_DST",
            CriterionKind::EthSrc => "ETH_SRC",
            CriterionKind::EthType => "ETH_TYPE",
            CriterionKind::VlanVid => "VLAN_VID",
            CriterionKind::Ipv4Src => "IPV4_SRC",
            CriterionKind::Ipv4Dst => "IPV4_DST",
            CriterionKind::IpProto => "IP_PROTO",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    InPort(PortNumber),
    EthDst(MacAddress),
    EthSrc(MacAddress),
    EthType(u16),
    VlanVid(VlanId),
    Ipv4Src(Ipv4Prefix),
    Ipv4Dst(Ipv4Prefix),
    IpProto(u8),
}

impl Criterion {
    pub fn kind(&self) -> CriterionKind {
        match self {
            Criterion::InPort(_) => CriterionKind::InPort,
            Criterion::EthDst(_) => CriterionKind::EthDst,
            Criterion::EthSrc(_) => CriterionKind::EthSrc,
            Criterion::EthType(_) => CriterionKind::EthType,
            Criterion::VlanVid(_) => CriterionKind::VlanVid,
            Criterion::Ipv4Src(_) => CriterionKind::Ipv4Src,
            Criterion::Ipv4Dst(_) => CriterionKind::Ipv4Dst,
            Criterion::IpProto(_) => CriterionKind::IpProto,
        }
    }
}

impl Display for Criterion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::InPort(port) => write!(f, "{}:{port}", self.kind()),
            Criterion::EthDst(mac) | Criterion::EthSrc(mac) => write!(f, "{}:{mac}", self.kind()),
            Criterion::EthType(eth_type) => write!(f, "{}:0x{eth_type:04x}", self.kind()),
            Criterion::VlanVid(vlan) => write!(f, "{}:{vlan}", self.kind()),
            Criterion::Ipv4Src(prefix) | Criterion::Ipv4Dst(prefix) => {
                write!(f, "{}:{prefix}", self.kind())
            }
            Criterion::IpProto(proto) => write!(f, "{}:{proto}", self.kind()),
        }
    }
}

/// Immutable set of match criteria, keyed by kind.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct TrafficSelector {
    criteria: BTreeMap<CriterionKind, Criterion>,
}

impl TrafficSelector {
    pub fn builder() -> TrafficSelectorBuilder {
        TrafficSelectorBuilder::default()
    }

    /// Selector that matches every packet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: CriterionKind) -> Option<&Criterion> {
        self.criteria.get(&kind)
    }

    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.values()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn eth_type(&self) -> Option<u16> {
        match self.get(CriterionKind::EthType) {
            Some(Criterion::EthType(eth_type)) => Some(*eth_type),
            _ => None,
        }
    }

    pub fn vlan_id(&self) -> Option<VlanId> {
        match self.get(CriterionKind::VlanVid) {
            Some(Criterion::VlanVid(vlan)) => Some(*vlan),
            _ => None,
        }
    }

    pub fn in_port(&self) -> Option<PortNumber> {
        match self.get(CriterionKind::InPort) {
            Some(Criterion::InPort(port)) => Some(*port),
            _ => None,
        }
    }

    pub fn ipv4_dst(&self) -> Option<Ipv4Prefix> {
        match self.get(CriterionKind::Ipv4Dst) {
            Some(Criterion::Ipv4Dst(prefix)) => Some(*prefix),
            _ => None,
        }
    }

    pub fn ip_proto(&self) -> Option<u8> {
        match self.get(CriterionKind::IpProto) {
            Some(Criterion::IpProto(proto)) => Some(*proto),
            _ => None,
        }
    }
}

impl Display for TrafficSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (index, criterion) in self.criteria().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{criterion}")?;
        }
        write!(f, "]")
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrafficSelectorBuilder {
    criteria: BTreeMap<CriterionKind, Criterion>,
}

impl TrafficSelectorBuilder {
    /// Adds a criterion, replacing any earlier criterion of the same kind.
    pub fn add(mut self, criterion: Criterion) -> Self {
        self.criteria.insert(criterion.kind(), criterion);
        self
    }

    pub fn match_in_port(self, port: PortNumber) -> Self {
        self.add(Criterion::InPort(port))
    }

    pub fn match_eth_dst(self, mac: MacAddress) -> Self {
        self.add(Criterion::EthDst(mac))
    }

    pub fn match_eth_src(self, mac: MacAddress) -> Self {
        self.add(Criterion::EthSrc(mac))
    }

    pub fn match_eth_type(self, eth_type: u16) -> Self {
        self.add(Criterion::EthType(eth_type))
    }

    pub fn match_vlan_id(self, vlan: VlanId) -> Self {
        self.add(Criterion::VlanVid(vlan))
    }

    pub fn match_ipv4_src(self, prefix: Ipv4Prefix) -> Self {
        self.add(Criterion::Ipv4Src(prefix))
    }

    pub fn match_ipv4_dst(self, prefix: Ipv4Prefix) -> Self {
        self.add(Criterion::Ipv4Dst(prefix))
    }

    pub fn match_ip_proto(self, proto: u8) -> Self {
        self.add(Criterion::IpProto(proto))
    }

    pub fn build(self) -> TrafficSelector {
        TrafficSelector {
            criteria: self.criteria,
        }
    }
}
