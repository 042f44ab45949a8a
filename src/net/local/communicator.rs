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

//! In-process intra-communicator
//!
//! Every rank of a [`LocalWorld`] is a thread holding its own
//! [`LocalIntraComm`]. Collectives are built from point-to-point messages on
//! reserved negative tags, so they never match user traffic.

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};

use crate::error::{HubError, HubResult};
use crate::net::{CommType, IntraComm, Rank, Tag};

use super::mailbox::{Mailbox, Message, Payload};

const BROADCAST_TAG: Tag = -10;
const GATHER_TAG: Tag = -11;

/// Shared state of one in-process process group
pub struct LocalWorld {
    size: i32,
    mailbox: Mailbox,
    barrier: Barrier,
    groups: Mutex<HashMap<Vec<Rank>, Arc<LocalWorld>>>,
}

impl LocalWorld {
    fn new(size: usize) -> Self {
        Self {
            size: size as i32,
            mailbox: Mailbox::new(),
            barrier: Barrier::new(size),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Create a world of `size` ranks and return one communicator per rank
    pub fn create(size: usize) -> Vec<LocalIntraComm> {
        let world = Arc::new(Self::new(size));
        (0..size as Rank)
            .map(|rank| LocalIntraComm {
                world: world.clone(),
                rank,
            })
            .collect()
    }
}

/// One rank's view of a [`LocalWorld`]
#[derive(Clone)]
pub struct LocalIntraComm {
    world: Arc<LocalWorld>,
    rank: Rank,
}

impl LocalIntraComm {
    fn check_peer(&self, peer: Rank) -> HubResult<()> {
        if peer < 0 || peer >= self.world.size {
            return Err(HubError::Invalid(format!(
                "rank {} outside communicator of size {}",
                peer, self.world.size
            )));
        }
        Ok(())
    }

    fn post_bytes(&self, data: &[u8], dest: Rank, tag: Tag) -> HubResult<()> {
        self.check_peer(dest)?;
        self.world.mailbox.post(Message {
            source: self.rank,
            dest,
            tag,
            payload: Payload::Bytes(data.to_vec()),
        })
    }

    fn take_bytes(&self, source: Rank, tag: Tag) -> HubResult<Vec<u8>> {
        self.check_peer(source)?;
        let message = self.world.mailbox.take(self.rank, Some(source), Some(tag))?;
        match message.payload {
            Payload::Bytes(bytes) => Ok(bytes),
            _ => Err(message.type_error("bytes")),
        }
    }
}

impl IntraComm for LocalIntraComm {
    fn get_rank(&self) -> Rank {
        self.rank
    }

    fn get_world_size(&self) -> i32 {
        self.world.size
    }

    fn get_comm_type(&self) -> CommType {
        CommType::Local
    }

    fn barrier(&self) -> HubResult<()> {
        self.world.barrier.wait();
        Ok(())
    }

    fn send(&self, data: &[u8], dest: Rank, tag: Tag) -> HubResult<()> {
        self.post_bytes(data, dest, tag)
    }

    fn recv(&self, buffer: &mut Vec<u8>, source: Rank, tag: Tag) -> HubResult<()> {
        *buffer = self.take_bytes(source, tag)?;
        Ok(())
    }

    fn broadcast(&self, data: &mut Vec<u8>, root: Rank) -> HubResult<()> {
        self.check_peer(root)?;
        if self.rank == root {
            for dest in (0..self.world.size).filter(|&r| r != root) {
                self.post_bytes(data, dest, BROADCAST_TAG)?;
            }
        } else {
            *data = self.take_bytes(root, BROADCAST_TAG)?;
        }
        Ok(())
    }

    fn gather(&self, data: &[u8], root: Rank) -> HubResult<Vec<Vec<u8>>> {
        self.check_peer(root)?;
        if self.rank != root {
            self.post_bytes(data, root, GATHER_TAG)?;
            return Ok(Vec::new());
        }
        let mut gathered = Vec::with_capacity(self.world.size as usize);
        for source in 0..self.world.size {
            if source == root {
                gathered.push(data.to_vec());
            } else {
                gathered.push(self.take_bytes(source, GATHER_TAG)?);
            }
        }
        Ok(gathered)
    }

    fn create_group(&self, ranks: &[Rank]) -> HubResult<Option<Arc<dyn IntraComm>>> {
        if ranks.is_empty() {
            return Err(HubError::Config("cannot create an empty group".to_string()));
        }
        for (i, &rank) in ranks.iter().enumerate() {
            self.check_peer(rank)?;
            if ranks[..i].contains(&rank) {
                return Err(HubError::Config(format!("rank {} listed twice in group", rank)));
            }
        }

        let group_world = {
            let mut groups = self
                .world
                .groups
                .lock()
                .map_err(|_| HubError::Communication("group registry lock poisoned".to_string()))?;
            groups
                .entry(ranks.to_vec())
                .or_insert_with(|| Arc::new(LocalWorld::new(ranks.len())))
                .clone()
        };

        Ok(ranks.iter().position(|&r| r == self.rank).map(|position| {
            Arc::new(LocalIntraComm {
                world: group_world,
                rank: position as Rank,
            }) as Arc<dyn IntraComm>
        }))
    }
}
