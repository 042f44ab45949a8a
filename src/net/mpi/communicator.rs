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

//! MPI intra-communicator
//!
//! Built on rsmpi 0.8. The world communicator keeps the `Universe` alive;
//! sub-communicators share it, so MPI is finalized once the last of them is
//! dropped.

use std::sync::Arc;

use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::topology::{Rank as MpiRank, SimpleCommunicator};
use mpi::traits::*;

use crate::error::{HubError, HubResult};
use crate::net::{CommType, IntraComm, Rank, Tag};

struct UniverseGuard(#[allow(dead_code)] Universe);

// SAFETY: the universe is only held to finalize MPI on drop, never used
// concurrently.
unsafe impl Send for UniverseGuard {}
unsafe impl Sync for UniverseGuard {}

#[derive(Clone)]
pub struct MpiIntraComm {
    comm: Arc<SimpleCommunicator>,
    rank: Rank,
    size: i32,
    _universe: Arc<UniverseGuard>,
}

// SAFETY: each rank runs one role thread, so the communicator is never used
// from two threads at once; MPI handles are plain identifiers.
unsafe impl Send for MpiIntraComm {}
unsafe impl Sync for MpiIntraComm {}

impl MpiIntraComm {
    /// Initialize MPI and wrap `MPI_COMM_WORLD`
    pub fn init() -> HubResult<Self> {
        let universe = mpi::initialize().ok_or_else(|| {
            HubError::Communication("failed to initialize MPI (already initialized or library not found)".to_string())
        })?;
        let world = universe.world();
        let rank = world.rank();
        let size = world.size();
        if rank < 0 || size <= 0 || rank >= size {
            return Err(HubError::Communication(format!(
                "malformed rank {} or world size {}",
                rank, size
            )));
        }
        Ok(Self {
            comm: Arc::new(world),
            rank,
            size,
            _universe: Arc::new(UniverseGuard(universe)),
        })
    }

    pub fn raw(&self) -> mpi_sys::MPI_Comm {
        self.comm.as_raw()
    }

    fn check_peer(&self, peer: Rank) -> HubResult<()> {
        if peer < 0 || peer >= self.size {
            return Err(HubError::Invalid(format!(
                "rank {} outside communicator of size {}",
                peer, self.size
            )));
        }
        Ok(())
    }
}

impl IntraComm for MpiIntraComm {
    fn get_rank(&self) -> Rank {
        self.rank
    }

    fn get_world_size(&self) -> i32 {
        self.size
    }

    fn get_comm_type(&self) -> CommType {
        CommType::Mpi
    }

    fn barrier(&self) -> HubResult<()> {
        self.comm.barrier();
        Ok(())
    }

    fn send(&self, data: &[u8], dest: Rank, tag: Tag) -> HubResult<()> {
        self.check_peer(dest)?;
        self.comm.process_at_rank(dest).send_with_tag(data, tag);
        Ok(())
    }

    fn recv(&self, buffer: &mut Vec<u8>, source: Rank, tag: Tag) -> HubResult<()> {
        self.check_peer(source)?;
        let (msg, _status) = self
            .comm
            .process_at_rank(source)
            .receive_vec_with_tag::<u8>(tag);
        *buffer = msg;
        Ok(())
    }

    fn broadcast(&self, data: &mut Vec<u8>, root: Rank) -> HubResult<()> {
        self.check_peer(root)?;
        let root_process = self.comm.process_at_rank(root);
        let mut len = data.len() as u64;
        root_process.broadcast_into(&mut len);
        if self.rank != root {
            data.resize(len as usize, 0);
        }
        if len > 0 {
            root_process.broadcast_into(&mut data[..]);
        }
        Ok(())
    }

    fn gather(&self, data: &[u8], root: Rank) -> HubResult<Vec<Vec<u8>>> {
        self.check_peer(root)?;
        let root_process = self.comm.process_at_rank(root);
        let count = data.len() as MpiRank;

        if self.rank != root {
            root_process.gather_into(&count);
            root_process.gather_varcount_into(data);
            return Ok(Vec::new());
        }

        let mut counts = vec![0 as MpiRank; self.size as usize];
        root_process.gather_into_root(&count, &mut counts[..]);

        let displs: Vec<MpiRank> = counts
            .iter()
            .scan(0, |offset, &c| {
                let d = *offset;
                *offset += c;
                Some(d)
            })
            .collect();
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        let mut flat = vec![0u8; total];
        {
            let mut partition = PartitionMut::new(&mut flat[..], &counts[..], &displs[..]);
            root_process.gather_varcount_into_root(data, &mut partition);
        }

        Ok(counts
            .iter()
            .zip(displs.iter())
            .map(|(&c, &d)| flat[d as usize..(d + c) as usize].to_vec())
            .collect())
    }

    fn create_group(&self, ranks: &[Rank]) -> HubResult<Option<Arc<dyn IntraComm>>> {
        if ranks.is_empty() {
            return Err(HubError::Config("cannot create an empty group".to_string()));
        }
        for &rank in ranks {
            self.check_peer(rank)?;
        }
        let group = self.comm.group().include(ranks);
        Ok(self.comm.split_by_subgroup_collective(&group).map(|comm| {
            let rank = comm.rank();
            let size = comm.size();
            Arc::new(MpiIntraComm {
                comm: Arc::new(comm),
                rank,
                size,
                _universe: self._universe.clone(),
            }) as Arc<dyn IntraComm>
        }))
    }
}
