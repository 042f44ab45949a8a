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

//! Inter-communicator trait
//!
//! Typed point-to-point messaging between the hub and the ranks of one
//! external simulator. The element types are the ones fixed by the
//! simulators' wire protocols: 1-byte booleans for handshakes, `int32`
//! sizes and ids, and `float64` payloads.

use crate::error::HubResult;

use super::{Rank, Tag};

/// Matching information of a completed receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    /// Number of elements actually received
    pub count: usize,
}

/// Communicator toward an external simulator
///
/// `source: None` matches any remote rank and `tag: None` any tag.
pub trait InterComm: Send {
    /// Number of ranks in the remote group
    fn remote_size(&self) -> i32;

    /// Receive a 1-byte "ready" flag and report who sent it with which tag
    fn recv_signal(&self, source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope>;

    /// Send a 1-byte `true` flag
    fn send_signal(&self, dest: Rank, tag: Tag) -> HubResult<()>;

    /// Receive up to `buf.len()` int32 values; a longer message is an error
    fn recv_i32s(&self, buf: &mut [i32], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope>;

    /// Receive up to `buf.len()` float64 values; a longer message is an error
    fn recv_f64s(&self, buf: &mut [f64], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope>;

    fn send_i32s(&self, data: &[i32], dest: Rank, tag: Tag) -> HubResult<()>;

    fn send_f64s(&self, data: &[f64], dest: Rank, tag: Tag) -> HubResult<()>;

    /// Tear the link down; further calls are errors
    fn disconnect(&mut self) -> HubResult<()>;
}
