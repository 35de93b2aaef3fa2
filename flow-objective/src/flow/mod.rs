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

//! Match/action vocabulary shared by objectives, rules and groups.
//!
//! These are plain value types. Nothing here knows about a concrete device
//! pipeline; drivers interpret them when translating objectives.

mod criterion;
mod rule;
mod rule_service;
mod treatment;

pub use criterion::{Criterion, CriterionKind, TrafficSelector, TrafficSelectorBuilder};
pub use rule::{
    FlowRule, FlowRuleBuilder, FlowRuleOperation, FlowRuleOperations, FlowRuleOperationsBuilder,
    RuleOperationKind,
};
pub use rule_service::{FlowRuleOperationsContext, FlowRuleService};
pub use treatment::{Instruction, TrafficTreatment, TrafficTreatmentBuilder};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// Opaque, comparable handle for one device.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner tag carried by objectives and the rules/groups derived from them.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Match-action table index inside a device pipeline.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TableId(pub u8);

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PortNumber(pub u32);

impl PortNumber {
    /// Reserved port that sends the packet to the controller.
    pub const CONTROLLER: PortNumber = PortNumber(0xffff_fffd);
}

impl Display for PortNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == Self::CONTROLLER {
            write!(f, "CONTROLLER")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct VlanId(pub u16);

impl VlanId {
    /// Matches any tagged packet.
    pub const ANY: VlanId = VlanId(0x1000);
}

impl Display for VlanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == Self::ANY {
            write!(f, "ANY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Ipv4Prefix {
    pub address: Ipv4Addr,
    pub length: u8,
}

impl Ipv4Prefix {
    pub fn new(address: Ipv4Addr, length: u8) -> Self {
        Self {
            address,
            length: length.min(32),
        }
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.length)
    }
}

/// Ethernet type values the drivers dispatch on.
pub mod eth_type {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const LLDP: u16 = 0x88cc;
    pub const BSN: u16 = 0x8942;
}

#[cfg(test)]
mod tests {
    use super::{Ipv4Prefix, MacAddress, PortNumber, VlanId};
    use std::net::Ipv4Addr;

    #[test]
    fn display_formats_are_compact() {
        assert_eq!(
            MacAddress([0, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]).to_string(),
            "00:1b:2c:3d:4e:5f"
        );
        assert_eq!(PortNumber::CONTROLLER.to_string(), "CONTROLLER");
        assert_eq!(VlanId::ANY.to_string(), "ANY");
        assert_eq!(
            Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 40).to_string(),
            "10.0.0.0/32"
        );
    }
}
