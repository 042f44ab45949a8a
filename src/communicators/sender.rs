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

//! Send loop: Transformer root -> downstream simulator
//!
//! The downstream simulator drives the pace: every ready request it sends
//! is forwarded to the Transformer as the simulation status, and answered
//! with the translated payload of one step.

use std::fmt;

use log::{debug, error, info};

use crate::error::{HubError, HubResult};
use crate::net::serialize::decode;
use crate::net::{InterComm, IntraComm, Rank, SimulationStatus, Tag, HANDOFF_TAG};
use crate::translation::TranslatedPayload;

use super::{await_probes, forward_status};

/// Wire protocol spoken by the downstream simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryProtocol {
    /// TVB: step window, size, rates to the requesting rank
    Rates,
    /// NEST: per rank, generator ids in, shape and spike times out
    Spikes { first_generator_id: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    AwaitReadyRequest,
    CheckStatus,
    Deliver,
    Skip,
    Terminate,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SenderState::AwaitReadyRequest => "AWAIT_READY_REQUEST",
            SenderState::CheckStatus => "CHECK_STATUS",
            SenderState::Deliver => "DELIVER",
            SenderState::Skip => "SKIP",
            SenderState::Terminate => "TERMINATE",
        })
    }
}

pub struct SenderCommunicator<'a> {
    inter: &'a dyn InterComm,
    world: &'a dyn IntraComm,
    protocol: DeliveryProtocol,
    transformer_root: Rank,
    state: SenderState,
    step: u64,
    last_tag: Option<Tag>,
    last_source: Option<Rank>,
}

impl<'a> SenderCommunicator<'a> {
    pub fn new(
        inter: &'a dyn InterComm,
        world: &'a dyn IntraComm,
        protocol: DeliveryProtocol,
        transformer_root: Rank,
    ) -> Self {
        Self {
            inter,
            world,
            protocol,
            transformer_root,
            state: SenderState::AwaitReadyRequest,
            step: 0,
            last_tag: None,
            last_source: None,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Steps delivered downstream
    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn run(&mut self) -> HubResult<()> {
        info!("sender: start sending with {:?} protocol", self.protocol);
        let result = self.send_loop();
        if let Err(e) = &result {
            error!(
                "sender failed in state {} at step {} (tag {:?}, remote rank {:?}): {}",
                self.state, self.step, self.last_tag, self.last_source, e
            );
        }
        result
    }

    fn await_request(&mut self) -> HubResult<Tag> {
        match self.protocol {
            DeliveryProtocol::Rates => {
                let envelope = self.inter.recv_signal(None, None)?;
                self.last_source = Some(envelope.source);
                Ok(envelope.tag)
            }
            DeliveryProtocol::Spikes { .. } => {
                self.last_source = None;
                let tag = await_probes(self.inter, self.step)?;
                self.last_source = Some(0);
                Ok(tag)
            }
        }
    }

    fn send_loop(&mut self) -> HubResult<()> {
        loop {
            self.state = SenderState::AwaitReadyRequest;
            let tag = self.await_request()?;
            self.last_tag = Some(tag);

            self.state = SenderState::CheckStatus;
            match SimulationStatus::from_tag(tag) {
                Some(SimulationStatus::Data) => {
                    forward_status(self.world, self.transformer_root, true)?;
                    self.state = SenderState::Deliver;
                    let payload = self.recv_translated()?;
                    match self.protocol {
                        DeliveryProtocol::Rates => self.deliver_rates(payload)?,
                        DeliveryProtocol::Spikes { first_generator_id } => {
                            self.deliver_spikes(payload, first_generator_id)?
                        }
                    }
                    debug!("sender: step {} delivered", self.step);
                    self.step += 1;
                }
                Some(SimulationStatus::NoData) => {
                    self.state = SenderState::Skip;
                }
                Some(SimulationStatus::End) => {
                    forward_status(self.world, self.transformer_root, false)?;
                    self.state = SenderState::Terminate;
                    info!("sender: end of simulation after {} steps", self.step);
                    return Ok(());
                }
                None => {
                    forward_status(self.world, self.transformer_root, false)?;
                    self.state = SenderState::Terminate;
                    return Err(HubError::BadTag {
                        step: self.step,
                        rank: self.last_source.unwrap_or(0),
                        tag,
                    });
                }
            }
        }
    }

    fn recv_translated(&self) -> HubResult<TranslatedPayload> {
        let mut bytes = Vec::new();
        self.world.recv(&mut bytes, self.transformer_root, HANDOFF_TAG)?;
        decode(&bytes)
    }

    fn deliver_rates(&mut self, payload: TranslatedPayload) -> HubResult<()> {
        let (times, rates) = match payload {
            TranslatedPayload::Rate { times, rates } => (times, rates),
            other => {
                return Err(HubError::Invalid(format!(
                    "rate delivery got a non-rate payload: {:?}",
                    other
                )))
            }
        };
        let dest = self.last_source.unwrap_or(0);
        let size = i32::try_from(rates.len())
            .map_err(|_| HubError::Capacity(format!("{} rates exceed an int32 size", rates.len())))?;

        self.inter.send_f64s(&times, dest, SimulationStatus::DATA_TAG)?;
        self.inter.send_i32s(&[size], dest, SimulationStatus::DATA_TAG)?;
        self.inter.send_f64s(&rates, dest, SimulationStatus::DATA_TAG)
    }

    fn deliver_spikes(&mut self, payload: TranslatedPayload, first_generator_id: i32) -> HubResult<()> {
        let trains = match payload {
            TranslatedPayload::SpikeTrains(trains) => trains,
            other => {
                return Err(HubError::Invalid(format!(
                    "spike delivery got a non-spike payload: {:?}",
                    other
                )))
            }
        };

        for rank in 0..self.inter.remote_size() {
            self.last_source = Some(rank);
            let mut count = [0i32; 1];
            self.inter
                .recv_i32s(&mut count, Some(rank), Some(SimulationStatus::DATA_TAG))?;
            if count[0] <= 0 {
                continue;
            }
            let count = count[0] as usize;
            if count > trains.len() {
                return Err(HubError::Communication(format!(
                    "rank {} requested {} spike generators, only {} trains available",
                    rank,
                    count,
                    trains.len()
                )));
            }

            let mut ids = vec![0i32; count];
            let envelope = self
                .inter
                .recv_i32s(&mut ids, Some(rank), Some(SimulationStatus::DATA_TAG))?;
            ids.truncate(envelope.count);
            let (shape, spikes) = pack_spike_trains(&trains, &ids, first_generator_id)?;

            let tag = ids[0];
            self.inter.send_i32s(&shape, rank, tag)?;
            self.inter.send_f64s(&spikes, rank, tag)?;
        }
        Ok(())
    }
}

/// Build `[total, count per id...]` and the concatenated spike times
///
/// `ids` are spike generator ids; train `i` belongs to generator
/// `first_generator_id + i`.
pub fn pack_spike_trains(
    trains: &[Vec<f64>],
    ids: &[i32],
    first_generator_id: i32,
) -> HubResult<(Vec<i32>, Vec<f64>)> {
    if ids.is_empty() {
        return Err(HubError::Communication("empty spike generator id list".to_string()));
    }
    let mut shape = Vec::with_capacity(ids.len() + 1);
    shape.push(0);
    let mut spikes = Vec::new();
    for &id in ids {
        let train = usize::try_from(i64::from(id) - i64::from(first_generator_id))
            .ok()
            .and_then(|index| trains.get(index))
            .ok_or_else(|| {
                HubError::Invalid(format!(
                    "spike generator id {} outside [{}, {})",
                    id,
                    first_generator_id,
                    first_generator_id as i64 + trains.len() as i64
                ))
            })?;
        shape.push(train.len() as i32);
        spikes.extend_from_slice(train);
    }
    shape[0] = spikes.len() as i32;
    Ok((shape, spikes))
}
