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

//! Group-versus-actions decision for next-hop treatments.
//!
//! Each driver variant owns one policy instance. A policy is a pure function
//! of the instruction set: the same treatment always maps to the same
//! [`NextEncoding`], and every treatment maps to exactly one.

use crate::flow::{Instruction, TrafficTreatment};

/// How a next-hop treatment is realized on the device.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NextEncoding {
    /// A hardware group, confirmed asynchronously.
    Group,
    /// A flat action list inlined into every rule that references the next id.
    Actions,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedTreatment {
    pub encoding: NextEncoding,
    /// Treatment to install, possibly filtered or corrected by the policy.
    pub treatment: TrafficTreatment,
}

pub trait TreatmentPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, treatment: &TrafficTreatment) -> ClassifiedTreatment;
}

/// Every next hop becomes a group, treatment untouched.
pub struct AlwaysGroupPolicy;

impl TreatmentPolicy for AlwaysGroupPolicy {
    fn name(&self) -> &'static str {
        "always-group"
    }

    fn classify(&self, treatment: &TrafficTreatment) -> ClassifiedTreatment {
        ClassifiedTreatment {
            encoding: NextEncoding::Group,
            treatment: treatment.clone(),
        }
    }
}

/// Group only for a VLAN rewrite plus both MAC rewrites plus an output;
/// anything else is an action list.
pub struct RewriteGroupPolicy;

impl TreatmentPolicy for RewriteGroupPolicy {
    fn name(&self) -> &'static str {
        "rewrite-group"
    }

    fn classify(&self, treatment: &TrafficTreatment) -> ClassifiedTreatment {
        let filtered = filter_next_instructions(treatment);
        let shape = RewriteShape::of(&filtered);
        let encoding = if shape.is_full_rewrite() {
            NextEncoding::Group
        } else {
            NextEncoding::Actions
        };

        ClassifiedTreatment {
            encoding,
            treatment: into_treatment(filtered),
        }
    }
}

/// Like [`RewriteGroupPolicy`], but a MAC rewrite plus output without a VLAN
/// rewrite also goes through a group, with the outer tag popped first.
pub struct PopVlanCorrectingPolicy;

impl TreatmentPolicy for PopVlanCorrectingPolicy {
    fn name(&self) -> &'static str {
        "pop-vlan-correcting"
    }

    fn classify(&self, treatment: &TrafficTreatment) -> ClassifiedTreatment {
        let mut filtered = filter_next_instructions(treatment);
        let shape = RewriteShape::of(&filtered);

        let encoding = if shape.is_full_rewrite() {
            NextEncoding::Group
        } else if shape.is_untagged_rewrite() {
            if !shape.pop_vlan {
                filtered.insert(0, Instruction::PopVlan);
            }
            NextEncoding::Group
        } else {
            NextEncoding::Actions
        };

        ClassifiedTreatment {
            encoding,
            treatment: into_treatment(filtered),
        }
    }
}

#[derive(Default)]
struct RewriteShape {
    set_vlan: bool,
    pop_vlan: bool,
    set_eth_src: bool,
    set_eth_dst: bool,
    output: bool,
}

impl RewriteShape {
    fn of(instructions: &[Instruction]) -> Self {
        let mut shape = RewriteShape::default();
        for instruction in instructions {
            match instruction {
                Instruction::SetVlanId(_) => shape.set_vlan = true,
                Instruction::PopVlan => shape.pop_vlan = true,
                Instruction::SetEthSrc(_) => shape.set_eth_src = true,
                Instruction::SetEthDst(_) => shape.set_eth_dst = true,
                Instruction::Output(_) => shape.output = true,
                Instruction::Drop | Instruction::Group(_) => {}
            }
        }
        shape
    }

    fn is_full_rewrite(&self) -> bool {
        self.set_vlan && self.set_eth_src && self.set_eth_dst && self.output
    }

    fn is_untagged_rewrite(&self) -> bool {
        !self.set_vlan && (self.set_eth_src || self.set_eth_dst) && self.output
    }
}

/// Keeps only the instructions a next hop may carry, flattened in order.
fn filter_next_instructions(treatment: &TrafficTreatment) -> Vec<Instruction> {
    treatment
        .all_instructions()
        .filter(|instruction| {
            matches!(
                instruction,
                Instruction::SetVlanId(_)
                    | Instruction::PopVlan
                    | Instruction::SetEthSrc(_)
                    | Instruction::SetEthDst(_)
                    | Instruction::Output(_)
            )
        })
        .copied()
        .collect()
}

fn into_treatment(instructions: Vec<Instruction>) -> TrafficTreatment {
    instructions
        .into_iter()
        .fold(TrafficTreatment::builder(), |builder, instruction| {
            builder.add(instruction)
        })
        .build()
}
