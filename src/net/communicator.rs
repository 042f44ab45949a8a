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

//! Intra-communicator trait
//!
//! Byte-level operations among the hub's own ranks. Structured values
//! (status flags, translated payloads) are encoded by `net::serialize`
//! before they reach this layer.

use std::sync::Arc;

use crate::error::HubResult;

use super::{CommType, Rank, Tag};

/// Communicator among the ranks of one process group
pub trait IntraComm: Send + Sync {
    fn get_rank(&self) -> Rank;
    fn get_world_size(&self) -> i32;
    fn get_comm_type(&self) -> CommType;

    fn barrier(&self) -> HubResult<()>;

    /// Blocking send to `dest`
    fn send(&self, data: &[u8], dest: Rank, tag: Tag) -> HubResult<()>;

    /// Blocking receive from `source`, replacing the contents of `buffer`
    fn recv(&self, buffer: &mut Vec<u8>, source: Rank, tag: Tag) -> HubResult<()>;

    /// Broadcast data from root to all processes
    ///
    /// # Arguments
    /// * `data` - Data buffer (input on root, output on other processes)
    /// * `root` - The rank of the root process, relative to this communicator
    fn broadcast(&self, data: &mut Vec<u8>, root: Rank) -> HubResult<()>;

    /// Gather variable-sized data from all processes to root
    ///
    /// # Returns
    /// On the root, one entry per rank in rank order. Elsewhere, an empty vector.
    fn gather(&self, data: &[u8], root: Rank) -> HubResult<Vec<Vec<u8>>>;

    /// Create a sub-communicator holding exactly `ranks`, ordered as listed
    ///
    /// Collective over this communicator: every member must call it with the
    /// same list. Returns `None` on ranks that are not part of the group; such
    /// ranks must never issue collectives on the group.
    fn create_group(&self, ranks: &[Rank]) -> HubResult<Option<Arc<dyn IntraComm>>>;
}
