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

//! Receive loop: upstream simulator -> shared buffer
//!
//! ```text
//! AWAIT_HANDSHAKE -> CHECK_STATUS -> FILL_BUFFER -> AWAIT_HANDSHAKE
//!                                 -> SKIP        -> AWAIT_HANDSHAKE
//!                                 -> TERMINATE
//! ```

use std::fmt;
use std::time::Duration;

use log::{debug, error, info};

use crate::buffer::{BufferState, SharedBuffer};
use crate::error::{HubError, HubResult};
use crate::net::{InterComm, IntraComm, Rank, SimulationStatus, Tag};
use crate::translation::RATE_WINDOW_LEN;
use crate::util::wait_for_state;

use super::{await_probes, forward_status};

/// Wire protocol spoken by the upstream simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProtocol {
    /// NEST: probe per rank, then size and `(detector, neuron, time)` triples per rank
    Spikes,
    /// TVB: ready flag to every rank, step window carrying the status, size, rates
    Rates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitHandshake,
    CheckStatus,
    FillBuffer,
    Skip,
    Terminate,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReceiverState::AwaitHandshake => "AWAIT_HANDSHAKE",
            ReceiverState::CheckStatus => "CHECK_STATUS",
            ReceiverState::FillBuffer => "FILL_BUFFER",
            ReceiverState::Skip => "SKIP",
            ReceiverState::Terminate => "TERMINATE",
        })
    }
}

pub struct ReceiverCommunicator<'a> {
    inter: &'a dyn InterComm,
    world: &'a dyn IntraComm,
    buffer: &'a SharedBuffer,
    protocol: IngestProtocol,
    transformer_root: Rank,
    one_way: bool,
    poll_interval: Duration,
    state: ReceiverState,
    step: u64,
    last_tag: Option<Tag>,
    last_source: Option<Rank>,
    /// Step window of the TVB message being received
    window: [f64; RATE_WINDOW_LEN],
}

impl<'a> ReceiverCommunicator<'a> {
    /// `one_way` is set when no Sender role exists, in which case the
    /// Receiver reports the simulation status to `transformer_root`
    pub fn new(
        inter: &'a dyn InterComm,
        world: &'a dyn IntraComm,
        buffer: &'a SharedBuffer,
        protocol: IngestProtocol,
        transformer_root: Rank,
        one_way: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inter,
            world,
            buffer,
            protocol,
            transformer_root,
            one_way,
            poll_interval,
            state: ReceiverState::AwaitHandshake,
            step: 0,
            last_tag: None,
            last_source: None,
            window: [0.0; RATE_WINDOW_LEN],
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Steps whose payload reached the buffer
    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn run(&mut self) -> HubResult<()> {
        info!("receiver: start receiving with {:?} protocol", self.protocol);
        let result = self.receive_loop();
        if let Err(e) = &result {
            error!(
                "receiver failed in state {} at step {} (tag {:?}, remote rank {:?}): {}",
                self.state, self.step, self.last_tag, self.last_source, e
            );
        }
        result
    }

    fn receive_loop(&mut self) -> HubResult<()> {
        loop {
            self.state = ReceiverState::AwaitHandshake;
            let tag = match self.protocol {
                IngestProtocol::Spikes => {
                    self.last_source = None;
                    let tag = await_probes(self.inter, self.step)?;
                    self.last_source = Some(0);
                    tag
                }
                IngestProtocol::Rates => self.await_window()?,
            };
            self.last_tag = Some(tag);

            self.state = ReceiverState::CheckStatus;
            match SimulationStatus::from_tag(tag) {
                Some(SimulationStatus::Data) => {
                    if self.one_way {
                        forward_status(self.world, self.transformer_root, true)?;
                    }
                    self.state = ReceiverState::FillBuffer;
                    wait_for_state(self.buffer, BufferState::ReadyToReceive, self.poll_interval);
                    let length = match self.protocol {
                        IngestProtocol::Spikes => self.fill_spikes()?,
                        IngestProtocol::Rates => self.fill_rates()?,
                    };
                    self.buffer.set_length(length)?;
                    self.buffer.set_state(BufferState::ReadyToTransform);
                    debug!("receiver: step {} buffered {} values", self.step, length);
                    self.step += 1;
                }
                Some(SimulationStatus::NoData) => {
                    self.state = ReceiverState::Skip;
                }
                Some(SimulationStatus::End) => {
                    if self.one_way {
                        forward_status(self.world, self.transformer_root, false)?;
                    }
                    self.state = ReceiverState::Terminate;
                    info!("receiver: end of simulation after {} steps", self.step);
                    return Ok(());
                }
                None => {
                    if self.one_way {
                        forward_status(self.world, self.transformer_root, false)?;
                    }
                    self.state = ReceiverState::Terminate;
                    return Err(HubError::BadTag {
                        step: self.step,
                        rank: self.last_source.unwrap_or(0),
                        tag,
                    });
                }
            }
        }
    }

    /// Announce readiness to every TVB rank and receive the step window
    fn await_window(&mut self) -> HubResult<Tag> {
        for rank in 0..self.inter.remote_size() {
            self.inter.send_signal(rank, SimulationStatus::DATA_TAG)?;
        }
        let envelope = self.inter.recv_f64s(&mut self.window, Some(0), None)?;
        self.last_source = Some(envelope.source);
        if SimulationStatus::from_tag(envelope.tag) == Some(SimulationStatus::Data) && envelope.count != RATE_WINDOW_LEN {
            return Err(HubError::Communication(format!(
                "step window of {} values from rank {}",
                envelope.count, envelope.source
            )));
        }
        Ok(envelope.tag)
    }

    fn recv_size(&mut self, source: Rank) -> HubResult<usize> {
        let mut size = [0i32; 1];
        self.inter
            .recv_i32s(&mut size, Some(source), Some(SimulationStatus::DATA_TAG))?;
        usize::try_from(size[0])
            .map_err(|_| HubError::Communication(format!("negative package size {} from rank {}", size[0], source)))
    }

    fn check_room(&self, offset: usize, size: usize) -> HubResult<()> {
        if offset + size > self.buffer.capacity() {
            return Err(HubError::Capacity(format!(
                "package of {} values at offset {} overflows buffer capacity {}",
                size,
                offset,
                self.buffer.capacity()
            )));
        }
        Ok(())
    }

    fn recv_payload(&mut self, source: Rank, offset: usize, size: usize) -> HubResult<()> {
        // SAFETY: the buffer is READY_TO_RECEIVE, so no transformer reads it
        // and this rank is the only writer until it publishes the next state.
        let slice = unsafe { self.buffer.view_mut(offset, offset + size)? };
        let envelope = self
            .inter
            .recv_f64s(slice, Some(source), Some(SimulationStatus::DATA_TAG))?;
        if envelope.count != size {
            return Err(HubError::Communication(format!(
                "announced {} values, rank {} sent {}",
                size, source, envelope.count
            )));
        }
        Ok(())
    }

    fn fill_spikes(&mut self) -> HubResult<usize> {
        let mut offset = 0;
        for source in 0..self.inter.remote_size() {
            self.last_source = Some(source);
            self.inter.send_signal(source, SimulationStatus::DATA_TAG)?;
            let size = self.recv_size(source)?;
            self.check_room(offset, size)?;
            self.recv_payload(source, offset, size)?;
            offset += size;
        }
        Ok(offset)
    }

    fn fill_rates(&mut self) -> HubResult<usize> {
        let source = self.last_source.unwrap_or(0);
        let size = self.recv_size(source)?;
        self.check_room(RATE_WINDOW_LEN, size)?;
        self.recv_payload(source, RATE_WINDOW_LEN, size)?;

        // SAFETY: as in `recv_payload`
        let head = unsafe { self.buffer.view_mut(0, RATE_WINDOW_LEN)? };
        head.copy_from_slice(&self.window);
        Ok(RATE_WINDOW_LEN + size)
    }
}
