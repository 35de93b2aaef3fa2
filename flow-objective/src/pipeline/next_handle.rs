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

//! The Corsa driver family's encoding of [`NextGroup`] payloads.

use crate::flow::TrafficTreatment;
use crate::group::GroupKey;
use crate::objective::NextId;
use crate::store::NextGroup;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Correlation key for the group realizing `next_id`. Deterministic, so a
/// second install for the same next id lands in the same pending slot.
pub fn group_key_for(next_id: NextId) -> GroupKey {
    GroupKey::new(next_id.0.to_be_bytes().to_vec())
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextHandle {
    /// Realized as a hardware group; resolve the key against live groups.
    Group { key: GroupKey },
    /// Realized as an inline action list.
    Actions {
        key: GroupKey,
        treatment: TrafficTreatment,
    },
}

impl NextHandle {
    pub fn key(&self) -> &GroupKey {
        match self {
            NextHandle::Group { key } | NextHandle::Actions { key, .. } => key,
        }
    }

    pub fn encode(&self) -> Result<NextGroup, serde_json::Error> {
        serde_json::to_vec(self).map(NextGroup::new)
    }

    pub fn decode(group: &NextGroup) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(group.data())
    }
}

impl Display for NextHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NextHandle::Group { key } => write!(f, "group key={key}"),
            NextHandle::Actions { key, treatment } => {
                write!(f, "actions key={key} {treatment}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{group_key_for, NextHandle};
    use crate::flow::{PortNumber, TrafficTreatment};
    use crate::objective::NextId;
    use crate::store::NextGroup;

    #[test]
    fn group_keys_are_stable_per_next_id() {
        assert_eq!(group_key_for(NextId(5)), group_key_for(NextId(5)));
        assert_ne!(group_key_for(NextId(5)), group_key_for(NextId(6)));
        assert_eq!(group_key_for(NextId(5)).to_string(), "0x00000005");
    }

    #[test]
    fn actions_handle_survives_the_store() {
        let handle = NextHandle::Actions {
            key: group_key_for(NextId(9)),
            treatment: TrafficTreatment::builder().set_output(PortNumber(2)).build(),
        };

        let stored = handle.encode().expect("handle should encode");

        assert_eq!(NextHandle::decode(&stored).expect("handle should decode"), handle);
    }

    #[test]
    fn foreign_payloads_are_rejected() {
        assert!(NextHandle::decode(&NextGroup::new(b"\x01\x02".to_vec())).is_err());
    }
}
