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

//! Per-rank hub context
//!
//! Bundles what a rank needs from its backend: the world communicator, the
//! endpoint toward the simulators and the allocator of the shared buffer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::buffer::{LocalRegionAllocator, RegionAllocator};
use crate::error::HubResult;
use crate::net::local::{LocalEndpoint, LocalWorld};
use crate::net::{CommType, ConnectionEndpoint, IntraComm, Rank};

pub struct HubContext {
    config: RwLock<HashMap<String, String>>,
    world: Arc<dyn IntraComm>,
    endpoint: Arc<dyn ConnectionEndpoint>,
    allocator: Arc<dyn RegionAllocator>,
}

impl HubContext {
    pub fn new(
        world: Arc<dyn IntraComm>,
        endpoint: Arc<dyn ConnectionEndpoint>,
        allocator: Arc<dyn RegionAllocator>,
    ) -> Self {
        Self {
            config: RwLock::new(HashMap::new()),
            world,
            endpoint,
            allocator,
        }
    }

    /// One context per rank of an in-process world of `size` ranks
    ///
    /// All contexts share `endpoint` and one region allocator, so every
    /// rank thread attaches to the same shared buffer.
    pub fn init_local(size: usize, endpoint: Arc<LocalEndpoint>) -> Vec<Arc<Self>> {
        let allocator: Arc<dyn RegionAllocator> = Arc::new(LocalRegionAllocator::new());
        LocalWorld::create(size)
            .into_iter()
            .map(|comm| {
                Arc::new(Self::new(
                    Arc::new(comm),
                    endpoint.clone(),
                    allocator.clone(),
                ))
            })
            .collect()
    }

    /// Context of the calling MPI rank; initializes MPI
    #[cfg(feature = "mpi")]
    pub fn init_mpi() -> HubResult<Arc<Self>> {
        use crate::net::mpi::{MpiEndpoint, MpiIntraComm, MpiRegionAllocator};

        let world = MpiIntraComm::init()?;
        let allocator = MpiRegionAllocator::new(world.clone());
        Ok(Arc::new(Self::new(
            Arc::new(world),
            Arc::new(MpiEndpoint::new()),
            Arc::new(allocator),
        )))
    }

    pub fn add_config(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut config) = self.config.write() {
            config.insert(key.into(), value.into());
        }
    }

    pub fn get_config(&self, key: &str, default: &str) -> String {
        self.config
            .read()
            .ok()
            .and_then(|config| config.get(key).cloned())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn world(&self) -> &Arc<dyn IntraComm> {
        &self.world
    }

    pub fn endpoint(&self) -> &Arc<dyn ConnectionEndpoint> {
        &self.endpoint
    }

    pub fn allocator(&self) -> &Arc<dyn RegionAllocator> {
        &self.allocator
    }

    pub fn get_rank(&self) -> Rank {
        self.world.get_rank()
    }

    pub fn get_world_size(&self) -> i32 {
        self.world.get_world_size()
    }

    pub fn get_comm_type(&self) -> CommType {
        self.world.get_comm_type()
    }

    pub fn barrier(&self) -> HubResult<()> {
        self.world.barrier()
    }
}
