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

//! Hub parameters
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! `{}`) is valid.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use crate::net::{DataExchangeDirection, Rank};
use crate::translation::{RATE_WINDOW_LEN, SPIKE_EVENT_WIDTH};
use crate::util::DEFAULT_POLL_INTERVAL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubParameters {
    /// Upper bound on events (or rate values) exchanged per step
    pub max_events: usize,
    /// Doubles per spike event in the NEST payload
    pub nest_buffer_size_factor: usize,
    /// Extra slots ahead of the TVB rates (the step window)
    pub tvb_buffer_size_factor: usize,
    pub first_neuron_id: i64,
    pub nb_neurons: usize,
    /// Synchronization interval between the simulators, in ms
    pub time_synchronization: f64,
    /// Integration step, in ms
    pub dt: f64,
    pub nb_brain_synapses: u32,
    pub first_spike_generator_id: i32,
    pub receiver_ranks: Option<Vec<Rank>>,
    pub sender_ranks: Option<Vec<Rank>>,
    pub poll_interval_us: u64,
    /// Seed of the Poisson generator; entropy when absent
    pub seed: Option<u64>,
}

impl Default for HubParameters {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            nest_buffer_size_factor: SPIKE_EVENT_WIDTH,
            tvb_buffer_size_factor: RATE_WINDOW_LEN,
            first_neuron_id: 0,
            nb_neurons: 20,
            time_synchronization: 100.0,
            dt: 0.1,
            nb_brain_synapses: 1,
            first_spike_generator_id: 0,
            receiver_ranks: None,
            sender_ranks: None,
            poll_interval_us: DEFAULT_POLL_INTERVAL.as_micros() as u64,
            seed: None,
        }
    }
}

impl HubParameters {
    pub fn from_file(path: impl AsRef<Path>) -> HubResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.max_events == 0 {
            return Err(HubError::Config("max_events must be positive".to_string()));
        }
        if self.nest_buffer_size_factor < SPIKE_EVENT_WIDTH {
            return Err(HubError::Config(format!(
                "nest_buffer_size_factor {} cannot hold a spike event of {} values",
                self.nest_buffer_size_factor, SPIKE_EVENT_WIDTH
            )));
        }
        if self.tvb_buffer_size_factor < RATE_WINDOW_LEN {
            return Err(HubError::Config(format!(
                "tvb_buffer_size_factor {} cannot hold the step window",
                self.tvb_buffer_size_factor
            )));
        }
        if self.time_synchronization <= 0.0 || self.dt <= 0.0 {
            return Err(HubError::Config(
                "time_synchronization and dt must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Payload capacity of the input buffer, in doubles
    pub fn buffer_capacity(&self, direction: DataExchangeDirection) -> usize {
        match direction {
            DataExchangeDirection::NestToTvb | DataExchangeDirection::NestToLfpy => {
                self.max_events * self.nest_buffer_size_factor
            }
            DataExchangeDirection::TvbToNest => self.max_events + self.tvb_buffer_size_factor,
        }
    }

    /// Receiver and sender ranks, overrides first
    pub fn role_ranks(&self, direction: DataExchangeDirection) -> (Vec<Rank>, Vec<Rank>) {
        let (receiver, sender) = match direction {
            DataExchangeDirection::NestToTvb => (vec![0], vec![1]),
            DataExchangeDirection::TvbToNest => (vec![1], vec![0]),
            DataExchangeDirection::NestToLfpy => (vec![0], vec![]),
        };
        (
            self.receiver_ranks.clone().unwrap_or(receiver),
            self.sender_ranks.clone().unwrap_or(sender),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}
