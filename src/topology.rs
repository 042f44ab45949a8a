// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rank-to-role assignment
//!
//! The hub's ranks are split into three disjoint groups. Receiver and Sender
//! ranks are configured explicitly; every remaining rank transforms. Each
//! group gets its own sub-communicator whose rank order follows the
//! configured list, so a role's root (the first listed rank) is always rank
//! 0 of its sub-communicator.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use crate::net::{IntraComm, Rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Receiver,
    Transformer,
    Sender,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Receiver => "RECEIVER",
            Role::Transformer => "TRANSFORMER",
            Role::Sender => "SENDER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub struct RoleTopology {
    world_size: i32,
    receiver_ranks: Vec<Rank>,
    transformer_ranks: Vec<Rank>,
    sender_ranks: Vec<Rank>,
    /// Sub-communicator of the calling rank's role, once built
    role_comm: Option<Arc<dyn IntraComm>>,
}

impl fmt::Debug for RoleTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleTopology")
            .field("world_size", &self.world_size)
            .field("receiver_ranks", &self.receiver_ranks)
            .field("transformer_ranks", &self.transformer_ranks)
            .field("sender_ranks", &self.sender_ranks)
            .field("has_role_comm", &self.role_comm.is_some())
            .finish()
    }
}

fn validate(world_size: i32, ranks: &[Rank], role: Role) -> HubResult<()> {
    for (i, &rank) in ranks.iter().enumerate() {
        if rank < 0 || rank >= world_size {
            return Err(HubError::Config(format!(
                "{} rank {} outside world of size {}",
                role, rank, world_size
            )));
        }
        if ranks[..i].contains(&rank) {
            return Err(HubError::Config(format!("{} rank {} listed twice", role, rank)));
        }
    }
    Ok(())
}

impl RoleTopology {
    /// Compute the three rank sets without creating any communicator
    pub fn partition(world_size: i32, receiver_ranks: &[Rank], sender_ranks: &[Rank]) -> HubResult<Self> {
        if receiver_ranks.is_empty() {
            return Err(HubError::Config("receiver ranks must not be empty".to_string()));
        }
        validate(world_size, receiver_ranks, Role::Receiver)?;
        validate(world_size, sender_ranks, Role::Sender)?;

        if let Some(rank) = receiver_ranks.iter().find(|r| sender_ranks.contains(r)) {
            return Err(HubError::Config(format!(
                "rank {} is configured as both receiver and sender",
                rank
            )));
        }

        let transformer_ranks: Vec<Rank> = (0..world_size)
            .filter(|r| !receiver_ranks.contains(r) && !sender_ranks.contains(r))
            .collect();
        if transformer_ranks.is_empty() {
            return Err(HubError::Config(format!(
                "no rank left for the transformer group in a world of size {}",
                world_size
            )));
        }

        Ok(Self {
            world_size,
            receiver_ranks: receiver_ranks.to_vec(),
            transformer_ranks,
            sender_ranks: sender_ranks.to_vec(),
            role_comm: None,
        })
    }

    /// Partition `world` and create one sub-communicator per non-empty role
    ///
    /// Collective over `world`.
    pub fn build(world: &dyn IntraComm, receiver_ranks: &[Rank], sender_ranks: &[Rank]) -> HubResult<Self> {
        let mut topology = Self::partition(world.get_world_size(), receiver_ranks, sender_ranks)?;

        for role in [Role::Receiver, Role::Transformer, Role::Sender] {
            let ranks = topology.ranks_of(role).to_vec();
            if ranks.is_empty() {
                continue;
            }
            if let Some(comm) = world.create_group(&ranks)? {
                topology.role_comm = Some(comm);
            }
        }
        Ok(topology)
    }

    pub fn world_size(&self) -> i32 {
        self.world_size
    }

    pub fn ranks_of(&self, role: Role) -> &[Rank] {
        match role {
            Role::Receiver => &self.receiver_ranks,
            Role::Transformer => &self.transformer_ranks,
            Role::Sender => &self.sender_ranks,
        }
    }

    pub fn role_of(&self, rank: Rank) -> Option<Role> {
        [Role::Receiver, Role::Transformer, Role::Sender]
            .into_iter()
            .find(|&role| self.ranks_of(role).contains(&rank))
    }

    /// World rank of the role's root; `None` for an empty role
    pub fn root_of(&self, role: Role) -> Option<Rank> {
        self.ranks_of(role).first().copied()
    }

    /// The root's rank inside the role's own sub-communicator
    pub fn translated_root_of(&self, role: Role) -> Option<Rank> {
        let root = self.root_of(role)?;
        self.ranks_of(role)
            .iter()
            .position(|&r| r == root)
            .map(|p| p as Rank)
    }

    /// Sub-communicator of the calling rank's role
    pub fn role_comm(&self) -> Option<&Arc<dyn IntraComm>> {
        self.role_comm.as_ref()
    }

    /// No Sender role: the Receiver reports the simulation status itself
    pub fn is_one_way(&self) -> bool {
        self.sender_ranks.is_empty()
    }
}
