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

//! Role state machines
//!
//! Each hub rank runs exactly one of these loops for the lifetime of the
//! process. Receiver and Sender talk to a simulator over an
//! [`InterComm`](crate::net::InterComm); the Transformer only talks to the
//! other roles through the shared buffer and the world communicator.
//!
//! Handoffs on the world communicator all use [`HANDOFF_TAG`]:
//!
//! ```text
//! status root  --bool-->  transformer root   (is the simulation running)
//! transformer root  --payload-->  sender root
//! ```

pub mod receiver;
pub mod sender;
pub mod transformer;

use log::debug;

use crate::error::{HubError, HubResult};
use crate::net::serialize::encode_status;
use crate::net::{InterComm, IntraComm, Rank, Tag, HANDOFF_TAG};

pub use receiver::{IngestProtocol, ReceiverCommunicator};
pub use sender::{DeliveryProtocol, SenderCommunicator};
pub use transformer::{TransformerCommunicator, TransformerPeers};

/// Tell the transformer root whether the simulation is still running
pub(crate) fn forward_status(world: &dyn IntraComm, transformer_root: Rank, is_running: bool) -> HubResult<()> {
    debug!(
        "rank {}: forwarding is_running={} to transformer root {}",
        world.get_rank(),
        is_running,
        transformer_root
    );
    world.send(&encode_status(is_running), transformer_root, HANDOFF_TAG)
}

/// Receive one ready probe from every remote rank, in rank order
///
/// Returns the common status tag. Ranks that disagree with rank 0 fail the
/// step with [`HubError::AbnormalState`]; the remaining probes of the step
/// are not drained.
pub(crate) fn await_probes(inter: &dyn InterComm, step: u64) -> HubResult<Tag> {
    let first = inter.recv_signal(Some(0), None)?;
    for rank in 1..inter.remote_size() {
        let probe = inter.recv_signal(Some(rank), None)?;
        if probe.tag != first.tag {
            return Err(HubError::AbnormalState {
                step,
                rank,
                tag: probe.tag,
                expected: first.tag,
            });
        }
    }
    Ok(first.tag)
}
