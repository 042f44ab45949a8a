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

//! Default spike/rate conversion kernels
//!
//! Rates are estimated with a rectangular kernel of 1 ms standard deviation
//! sampled every `dt`, averaged over all trains and scaled by 1/10 for the
//! TVB model. Spikes are drawn from an inhomogeneous Poisson process whose
//! rate is piecewise constant over the bins of the step window. Every shard
//! of the neuron population draws from its own random stream, keyed by the
//! first neuron of the shard, so ranks sharing one seed still produce
//! independent trains.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{HubError, HubResult};
use crate::params::HubParameters;

use super::SpikeRateConversion;

/// Standard deviation of the rectangular rate kernel, in ms
const KERNEL_SIGMA_MS: f64 = 1.0;

/// Scaling applied to the mean rate before it is handed to TVB
const TVB_RATE_SCALE: f64 = 0.1;

/// Floor added to generator rates so no bin is silent by construction
const MIN_GENERATOR_RATE: f64 = 1e-12;

/// Offset of the first generated spike bin after the window start, in ms
const GENERATION_DELAY_MS: f64 = 0.1;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub struct KernelRateConverter {
    time_synchronization: f64,
    dt: f64,
    nb_brain_synapses: f64,
    seed: Option<u64>,
    streams: Mutex<HashMap<usize, StdRng>>,
}

impl KernelRateConverter {
    pub fn new(time_synchronization: f64, dt: f64, nb_brain_synapses: f64, seed: Option<u64>) -> HubResult<Self> {
        if time_synchronization <= 0.0 || dt <= 0.0 {
            return Err(HubError::Config(format!(
                "time synchronization ({}) and dt ({}) must be positive",
                time_synchronization, dt
            )));
        }
        Ok(Self {
            time_synchronization,
            dt,
            nb_brain_synapses,
            seed,
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_params(params: &HubParameters) -> HubResult<Self> {
        Self::new(
            params.time_synchronization,
            params.dt,
            params.nb_brain_synapses as f64,
            params.seed,
        )
    }

    /// Random stream of the shard starting at neuron `first_neuron`
    fn new_stream(&self, first_neuron: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(first_neuron as u64)),
            None => StdRng::from_entropy(),
        }
    }

    fn window(&self, step: u64) -> (f64, f64) {
        let step = step as f64;
        (
            round_to(step * self.time_synchronization, 2),
            round_to((step + 1.0) * self.time_synchronization, 2),
        )
    }
}

impl SpikeRateConversion for KernelRateConverter {
    fn spikes_to_rate(&self, step: u64, spike_trains: &[Vec<f64>]) -> HubResult<([f64; 2], Vec<f64>)> {
        let (t_start, t_stop) = self.window(step);
        let bins = (((t_stop - t_start) / self.dt).round() as usize).max(1);

        let half_width = 3f64.sqrt() * KERNEL_SIGMA_MS;
        let width_s = 2.0 * half_width / 1000.0;

        let mut rates = vec![0.0; bins];
        if !spike_trains.is_empty() {
            for (bin, rate) in rates.iter_mut().enumerate() {
                let t = t_start + bin as f64 * self.dt;
                let total: f64 = spike_trains
                    .iter()
                    .map(|train| train.iter().filter(|&&s| (s - t).abs() <= half_width).count() as f64 / width_s)
                    .sum();
                *rate = total / spike_trains.len() as f64 * TVB_RATE_SCALE;
            }
        }
        trace!("step {}: {} rate bins from {} trains", step, bins, spike_trains.len());

        let times = [
            step as f64 * self.time_synchronization,
            (step + 1) as f64 * self.time_synchronization,
        ];
        Ok((times, rates))
    }

    fn rate_to_spikes(&self, window: [f64; 2], rates: &[f64], neurons: Range<usize>) -> HubResult<Vec<Vec<f64>>> {
        let count = neurons.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        if rates.is_empty() {
            return Ok(vec![Vec::new(); count]);
        }
        if window[1] <= window[0] {
            return Err(HubError::Invalid(format!(
                "empty step window [{}, {}]",
                window[0], window[1]
            )));
        }

        // Hz -> spikes per ms
        let generator_rates: Vec<f64> = rates
            .iter()
            .map(|r| (r * self.nb_brain_synapses + MIN_GENERATOR_RATE).abs() / 1000.0)
            .collect();
        let bin_width = (window[1] - window[0]) / rates.len() as f64;
        let start = window[0] + GENERATION_DELAY_MS;

        let mut streams = self
            .streams
            .lock()
            .map_err(|_| HubError::Communication("random generator lock poisoned".to_string()))?;
        let rng = streams
            .entry(neurons.start)
            .or_insert_with(|| self.new_stream(neurons.start));

        let mut trains = Vec::with_capacity(count);
        for _ in neurons {
            let mut train = Vec::new();
            for (bin, &lambda) in generator_rates.iter().enumerate() {
                let bin_start = start + bin as f64 * bin_width;
                let bin_end = bin_start + bin_width;
                let mut t = bin_start;
                loop {
                    let u: f64 = rng.gen();
                    t += -(1.0 - u).ln() / lambda;
                    if t >= bin_end {
                        break;
                    }
                    train.push(round_to(t, 1));
                }
            }
            train.sort_by(f64::total_cmp);
            trains.push(train);
        }
        Ok(trains)
    }
}
