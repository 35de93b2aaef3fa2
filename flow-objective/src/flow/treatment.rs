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

//! Action sets applied to matched traffic.

use super::{MacAddress, PortNumber, TableId, VlanId};
use crate::group::GroupId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Output(PortNumber),
    Drop,
    Group(GroupId),
    SetVlanId(VlanId),
    PopVlan,
    SetEthSrc(MacAddress),
    SetEthDst(MacAddress),
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Output(port) => write!(f, "OUTPUT:{port}"),
            Instruction::Drop => write!(f, "DROP"),
            Instruction::Group(id) => write!(f, "GROUP:{id}"),
            Instruction::SetVlanId(vlan) => write!(f, "VLAN_ID:{vlan}"),
            Instruction::PopVlan => write!(f, "VLAN_POP"),
            Instruction::SetEthSrc(mac) => write!(f, "ETH_SRC:{mac}"),
            Instruction::SetEthDst(mac) => write!(f, "ETH_DST:{mac}"),
        }
    }
}

/// Immediate and deferred instruction lists plus an optional table transition.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct TrafficTreatment {
    immediate: Vec<Instruction>,
    deferred: Vec<Instruction>,
    table_transition: Option<TableId>,
    clear_deferred: bool,
}

impl TrafficTreatment {
    pub fn builder() -> TrafficTreatmentBuilder {
        TrafficTreatmentBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn immediate(&self) -> &[Instruction] {
        &self.immediate
    }

    pub fn deferred(&self) -> &[Instruction] {
        &self.deferred
    }

    /// Immediate instructions followed by deferred ones.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.immediate.iter().chain(self.deferred.iter())
    }

    pub fn table_transition(&self) -> Option<TableId> {
        self.table_transition
    }

    /// Whether the treatment clears previously written deferred actions.
    pub fn clears_deferred(&self) -> bool {
        self.clear_deferred
    }

    /// Same instructions and transition, without the clear-deferred flag.
    pub fn without_clear_deferred(&self) -> Self {
        Self {
            clear_deferred: false,
            ..self.clone()
        }
    }

    /// Builder pre-populated with this treatment.
    pub fn to_builder(&self) -> TrafficTreatmentBuilder {
        TrafficTreatmentBuilder {
            immediate: self.immediate.clone(),
            deferred: self.deferred.clone(),
            table_transition: self.table_transition,
            clear_deferred: self.clear_deferred,
            writing_deferred: false,
        }
    }
}

impl Display for TrafficTreatment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let join = |instructions: &[Instruction]| {
            instructions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        write!(
            f,
            "immediate=[{}], deferred=[{}]",
            join(&self.immediate),
            join(&self.deferred)
        )?;
        if let Some(table) = self.table_transition {
            write!(f, ", transition={table}")?;
        }
        if self.clear_deferred {
            write!(f, ", cleared")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrafficTreatmentBuilder {
    immediate: Vec<Instruction>,
    deferred: Vec<Instruction>,
    table_transition: Option<TableId>,
    clear_deferred: bool,
    writing_deferred: bool,
}

impl TrafficTreatmentBuilder {
    /// Appends to whichever list is currently selected (immediate by default).
    pub fn add(mut self, instruction: Instruction) -> Self {
        if self.writing_deferred {
            self.deferred.push(instruction);
        } else {
            self.immediate.push(instruction);
        }
        self
    }

    /// Subsequent instructions go to the deferred list.
    pub fn deferred(mut self) -> Self {
        self.writing_deferred = true;
        self
    }

    /// Subsequent instructions go to the immediate list.
    pub fn immediate(mut self) -> Self {
        self.writing_deferred = false;
        self
    }

    pub fn set_output(self, port: PortNumber) -> Self {
        self.add(Instruction::Output(port))
    }

    /// Sends the packet to the controller.
    pub fn punt(self) -> Self {
        self.set_output(PortNumber::CONTROLLER)
    }

    pub fn drop(self) -> Self {
        self.add(Instruction::Drop)
    }

    pub fn group(self, id: GroupId) -> Self {
        self.add(Instruction::Group(id))
    }

    pub fn set_vlan_id(self, vlan: VlanId) -> Self {
        self.add(Instruction::SetVlanId(vlan))
    }

    pub fn pop_vlan(self) -> Self {
        self.add(Instruction::PopVlan)
    }

    pub fn set_eth_src(self, mac: MacAddress) -> Self {
        self.add(Instruction::SetEthSrc(mac))
    }

    pub fn set_eth_dst(self, mac: MacAddress) -> Self {
        self.add(Instruction::SetEthDst(mac))
    }

    pub fn transition(mut self, table: TableId) -> Self {
        self.table_transition = Some(table);
        self
    }

    pub fn wipe_deferred(mut self) -> Self {
        self.clear_deferred = true;
        self
    }

    pub fn build(self) -> TrafficTreatment {
        TrafficTreatment {
            immediate: self.immediate,
            deferred: self.deferred,
            table_transition: self.table_transition,
            clear_deferred: self.clear_deferred,
        }
    }
}
