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

//! Transform loop: shared buffer -> translation -> Sender root
//!
//! Run by every rank of the transformer group. One step:
//!
//! 1. the group root receives the simulation status and broadcasts it
//! 2. all ranks wait for `READY_TO_TRANSFORM` and copy `[0, length)`
//! 3. barrier: every rank holds its copy
//! 4. the group root hands the buffer back with `READY_TO_RECEIVE`
//! 5. all ranks translate, the result is gathered to the group root
//! 6. the group root sends the result to the Sender root
//! 7. barrier
//!
//! Step 4 must never move ahead of the barrier in step 3.

use std::fmt;
use std::time::Duration;

use log::{debug, error};

use crate::buffer::{BufferState, SharedBuffer};
use crate::error::{HubError, HubResult};
use crate::net::serialize::{decode_status, encode};
use crate::net::{IntraComm, Rank, HANDOFF_TAG};
use crate::translation::{TranslatedPayload, TranslationFunction};
use crate::util::wait_for_state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerState {
    BroadcastStatus,
    RunStep,
    Terminate,
}

impl fmt::Display for TransformerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransformerState::BroadcastStatus => "BROADCAST_STATUS",
            TransformerState::RunStep => "RUN_STEP",
            TransformerState::Terminate => "TERMINATE",
        })
    }
}

/// World ranks the transformer group exchanges handoffs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerPeers {
    /// Root of the role adjacent to the simulator that reports the status
    pub status_source: Rank,
    /// `None` on a one-way pipeline
    pub sender_root: Option<Rank>,
}

pub struct TransformerCommunicator<'a> {
    world: &'a dyn IntraComm,
    group: &'a dyn IntraComm,
    buffer: &'a SharedBuffer,
    translator: &'a dyn TranslationFunction,
    peers: TransformerPeers,
    translated_root: Rank,
    poll_interval: Duration,
    state: TransformerState,
    step: u64,
    last_result: Option<TranslatedPayload>,
}

impl<'a> TransformerCommunicator<'a> {
    pub fn new(
        world: &'a dyn IntraComm,
        group: &'a dyn IntraComm,
        buffer: &'a SharedBuffer,
        translator: &'a dyn TranslationFunction,
        peers: TransformerPeers,
        translated_root: Rank,
        poll_interval: Duration,
    ) -> Self {
        Self {
            world,
            group,
            buffer,
            translator,
            peers,
            translated_root,
            poll_interval,
            state: TransformerState::BroadcastStatus,
            step: 0,
            last_result: None,
        }
    }

    pub fn state(&self) -> TransformerState {
        self.state
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Result of the last step kept on the group root of a one-way pipeline
    pub fn last_result(&self) -> Option<&TranslatedPayload> {
        self.last_result.as_ref()
    }

    fn is_root(&self) -> bool {
        self.group.get_rank() == self.translated_root
    }

    pub fn run(&mut self) -> HubResult<()> {
        crate::hub_info!(self.group.get_rank(), "transformer: start transformation");
        let result = self.transform_loop();
        if let Err(e) = &result {
            error!(
                "transformer rank {} failed in state {} at step {}: {}",
                self.group.get_rank(),
                self.state,
                self.step,
                e
            );
        }
        result
    }

    fn transform_loop(&mut self) -> HubResult<()> {
        loop {
            self.state = TransformerState::BroadcastStatus;
            if !self.broadcast_status()? {
                self.state = TransformerState::Terminate;
                crate::hub_info!(
                    self.group.get_rank(),
                    "transformer: concluding transformation after {} steps",
                    self.step
                );
                return Ok(());
            }
            self.state = TransformerState::RunStep;
            self.run_step()?;
            self.step += 1;
        }
    }

    fn broadcast_status(&mut self) -> HubResult<bool> {
        let mut status = Vec::new();
        if self.is_root() {
            self.world
                .recv(&mut status, self.peers.status_source, HANDOFF_TAG)?;
        }
        self.group.broadcast(&mut status, self.translated_root)?;
        decode_status(&status)
    }

    fn run_step(&mut self) -> HubResult<()> {
        debug!("transformer: step {} waiting for data", self.step);
        wait_for_state(self.buffer, BufferState::ReadyToTransform, self.poll_interval);

        // SAFETY: READY_TO_TRANSFORM grants read access to every transformer;
        // the Receiver writes again only after the flip below, which waits
        // for every rank to finish this copy.
        let raw = unsafe { self.buffer.view(0, self.buffer.length())?.to_vec() };

        self.group.barrier()?;
        if self.is_root()
            && !self
                .buffer
                .compare_and_set_state(BufferState::ReadyToTransform, BufferState::ReadyToReceive)
        {
            debug!(
                "transformer: buffer left {:?} at step {}, not handed back",
                self.buffer.state(),
                self.step
            );
        }

        let translated = self
            .translator
            .translate(self.step, &raw, self.group, self.translated_root)?;

        if self.is_root() {
            let payload = translated.ok_or_else(|| {
                HubError::Invalid(format!("translation produced no result on the root at step {}", self.step))
            })?;
            match self.peers.sender_root {
                Some(sender_root) => {
                    self.world.send(&encode(&payload)?, sender_root, HANDOFF_TAG)?;
                }
                None => self.last_result = Some(payload),
            }
        }

        crate::hub_debug!(
            self.group.get_rank(),
            "transformer: step {} waiting for the root to hand off",
            self.step
        );
        self.group.barrier()
    }
}
