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

//! Translation between spiking and rate representations
//!
//! The Transformer hands the raw payload of one step to a
//! [`TranslationFunction`] together with its group communicator. Every
//! transformer rank calls `translate`; the function shards its work across
//! the group and gathers the combined result to `root`. Only the root gets
//! `Some(payload)`.

pub mod spike_rate;

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use crate::net::serialize::{decode, encode};
use crate::net::{IntraComm, Rank};
use crate::util::chunks::chunk_of;

pub use spike_rate::KernelRateConverter;

/// Values per spike event in the NEST payload: detector id, neuron id, time
pub const SPIKE_EVENT_WIDTH: usize = 3;

/// Leading slots of a rate payload holding the step window
pub const RATE_WINDOW_LEN: usize = 2;

/// Result of one translation, as handed to the Sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranslatedPayload {
    /// Step window and one rate per region
    Rate { times: [f64; 2], rates: Vec<f64> },
    /// One spike-time train per neuron (or spike generator)
    SpikeTrains(Vec<Vec<f64>>),
}

pub trait TranslationFunction: Send + Sync {
    fn translate(
        &self,
        step: u64,
        raw: &[f64],
        group: &dyn IntraComm,
        root: Rank,
    ) -> HubResult<Option<TranslatedPayload>>;
}

impl<F> TranslationFunction for F
where
    F: Fn(u64, &[f64], &dyn IntraComm, Rank) -> HubResult<Option<TranslatedPayload>> + Send + Sync,
{
    fn translate(
        &self,
        step: u64,
        raw: &[f64],
        group: &dyn IntraComm,
        root: Rank,
    ) -> HubResult<Option<TranslatedPayload>> {
        self(step, raw, group, root)
    }
}

/// The two science calls behind the default translators
pub trait SpikeRateConversion: Send + Sync {
    /// Instantaneous population rate of `spike_trains` over step `step`
    fn spikes_to_rate(&self, step: u64, spike_trains: &[Vec<f64>]) -> HubResult<([f64; 2], Vec<f64>)>;

    /// Generate one spike train per neuron index in `neurons`, driven by
    /// `rates` over `window`
    fn rate_to_spikes(&self, window: [f64; 2], rates: &[f64], neurons: Range<usize>) -> HubResult<Vec<Vec<f64>>>;
}

/// Spike times grouped per neuron
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeEvents {
    first_neuron_id: i64,
    per_neuron: Vec<Vec<f64>>,
}

impl SpikeEvents {
    /// Reshape `(detector_id, neuron_id, spike_time)` triples
    pub fn from_raw(raw: &[f64], first_neuron_id: i64, nb_neurons: usize) -> HubResult<Self> {
        if raw.len() % SPIKE_EVENT_WIDTH != 0 {
            return Err(HubError::Invalid(format!(
                "spike payload of {} values is not a sequence of triples",
                raw.len()
            )));
        }
        let mut per_neuron = vec![Vec::new(); nb_neurons];
        for event in raw.chunks_exact(SPIKE_EVENT_WIDTH) {
            let neuron_id = event[1] as i64;
            let index = neuron_id - first_neuron_id;
            if index < 0 || index as usize >= nb_neurons {
                return Err(HubError::Invalid(format!(
                    "neuron id {} outside [{}, {})",
                    neuron_id,
                    first_neuron_id,
                    first_neuron_id + nb_neurons as i64
                )));
            }
            per_neuron[index as usize].push(event[2]);
        }
        Ok(Self {
            first_neuron_id,
            per_neuron,
        })
    }

    pub fn first_neuron_id(&self) -> i64 {
        self.first_neuron_id
    }

    pub fn nb_neurons(&self) -> usize {
        self.per_neuron.len()
    }

    pub fn event_count(&self) -> usize {
        self.per_neuron.iter().map(Vec::len).sum()
    }

    pub fn per_neuron(&self) -> &[Vec<f64>] {
        &self.per_neuron
    }

    /// Trains of the neurons in `range`, each sorted by time
    pub fn trains(&self, range: Range<usize>) -> Vec<Vec<f64>> {
        self.per_neuron[range]
            .iter()
            .map(|times| {
                let mut train = times.clone();
                train.sort_by(f64::total_cmp);
                train
            })
            .collect()
    }
}

/// Neuron indices handled by the calling rank of `group`
pub fn local_chunk(nb_neurons: usize, group: &dyn IntraComm) -> Range<usize> {
    chunk_of(
        nb_neurons,
        group.get_world_size() as usize,
        group.get_rank() as usize,
    )
}

/// Gather partial trains to `root`, concatenated in group rank order
pub fn gather_trains(partial: &[Vec<f64>], group: &dyn IntraComm, root: Rank) -> HubResult<Option<Vec<Vec<f64>>>> {
    let gathered = group.gather(&encode(&partial)?, root)?;
    if group.get_rank() != root {
        return Ok(None);
    }
    let mut trains = Vec::new();
    for bytes in gathered {
        let part: Vec<Vec<f64>> = decode(&bytes)?;
        trains.extend(part);
    }
    Ok(Some(trains))
}

/// NEST spikes to TVB rates
pub struct SpikesToRateTranslator {
    converter: Arc<dyn SpikeRateConversion>,
    first_neuron_id: i64,
    nb_neurons: usize,
}

impl SpikesToRateTranslator {
    pub fn new(converter: Arc<dyn SpikeRateConversion>, first_neuron_id: i64, nb_neurons: usize) -> Self {
        Self {
            converter,
            first_neuron_id,
            nb_neurons,
        }
    }
}

impl TranslationFunction for SpikesToRateTranslator {
    fn translate(
        &self,
        step: u64,
        raw: &[f64],
        group: &dyn IntraComm,
        root: Rank,
    ) -> HubResult<Option<TranslatedPayload>> {
        let events = SpikeEvents::from_raw(raw, self.first_neuron_id, self.nb_neurons)?;
        let partial = events.trains(local_chunk(self.nb_neurons, group));

        match gather_trains(&partial, group, root)? {
            Some(trains) => {
                let (times, rates) = self.converter.spikes_to_rate(step, &trains)?;
                Ok(Some(TranslatedPayload::Rate { times, rates }))
            }
            None => Ok(None),
        }
    }
}

/// TVB rates to NEST spike trains, one train per spike generator
pub struct RateToSpikesTranslator {
    converter: Arc<dyn SpikeRateConversion>,
    nb_neurons: usize,
}

impl RateToSpikesTranslator {
    pub fn new(converter: Arc<dyn SpikeRateConversion>, nb_neurons: usize) -> Self {
        Self { converter, nb_neurons }
    }
}

impl TranslationFunction for RateToSpikesTranslator {
    fn translate(
        &self,
        _step: u64,
        raw: &[f64],
        group: &dyn IntraComm,
        root: Rank,
    ) -> HubResult<Option<TranslatedPayload>> {
        if raw.len() < RATE_WINDOW_LEN {
            return Err(HubError::Invalid(format!(
                "rate payload of {} values has no step window",
                raw.len()
            )));
        }
        let window = [raw[0], raw[1]];
        let rates = &raw[RATE_WINDOW_LEN..];

        let chunk = local_chunk(self.nb_neurons, group);
        let partial = self.converter.rate_to_spikes(window, rates, chunk)?;

        Ok(gather_trains(&partial, group, root)?.map(TranslatedPayload::SpikeTrains))
    }
}

/// Per-neuron spike trains without further conversion
pub struct SpikeTrainTranslator {
    first_neuron_id: i64,
    nb_neurons: usize,
}

impl SpikeTrainTranslator {
    pub fn new(first_neuron_id: i64, nb_neurons: usize) -> Self {
        Self {
            first_neuron_id,
            nb_neurons,
        }
    }
}

impl TranslationFunction for SpikeTrainTranslator {
    fn translate(
        &self,
        _step: u64,
        raw: &[f64],
        group: &dyn IntraComm,
        root: Rank,
    ) -> HubResult<Option<TranslatedPayload>> {
        let events = SpikeEvents::from_raw(raw, self.first_neuron_id, self.nb_neurons)?;
        let partial = events.trains(local_chunk(self.nb_neurons, group));
        Ok(gather_trains(&partial, group, root)?.map(TranslatedPayload::SpikeTrains))
    }
}
