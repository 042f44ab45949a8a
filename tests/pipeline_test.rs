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

//! End-to-end pipelines on an in-process world with simulator mocks

use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use interscale_hub::error::HubResult;
use interscale_hub::net::local::{LocalEndpoint, LocalInterComm, SimulatorHandoff};
use interscale_hub::net::{DataExchangeDirection, InterComm, SimulationStatus};
use interscale_hub::translation::TranslatedPayload;
use interscale_hub::util::logging::init_test_logging;
use interscale_hub::{HubContext, HubManager, HubParameters, Role};

const STEPS: usize = 3;

struct HubOutcome {
    role: Role,
    result: HubResult<()>,
    last_result: Option<TranslatedPayload>,
}

fn test_params() -> HubParameters {
    HubParameters {
        max_events: 100,
        first_neuron_id: 10,
        nb_neurons: 4,
        time_synchronization: 1.0,
        dt: 0.1,
        first_spike_generator_id: 100,
        poll_interval_us: 50,
        seed: Some(11),
        ..HubParameters::default()
    }
}

fn spawn_hub(
    size: usize,
    endpoint: Arc<LocalEndpoint>,
    direction: DataExchangeDirection,
    params: HubParameters,
) -> Vec<JoinHandle<HubOutcome>> {
    HubContext::init_local(size, endpoint)
        .into_iter()
        .map(|ctx| {
            let params = params.clone();
            thread::spawn(move || {
                let mut manager = HubManager::new(ctx, direction, params).unwrap();
                let result = manager.start();
                manager.stop().unwrap();
                HubOutcome {
                    role: manager.role(),
                    result,
                    last_result: manager.last_result().cloned(),
                }
            })
        })
        .collect()
}

fn collect_handoffs(launcher: &Receiver<SimulatorHandoff>, count: usize) -> HashMap<Role, Vec<LocalInterComm>> {
    (0..count)
        .map(|_| {
            let handoff = launcher.recv().unwrap();
            (handoff.descriptor.role, handoff.ranks)
        })
        .collect()
}

/// NEST spike detectors: `ranks.len()` ranks, one event per rank per step
fn nest_detectors(ranks: Vec<LocalInterComm>) -> JoinHandle<()> {
    thread::spawn(move || {
        for step in 0..STEPS {
            for rank in &ranks {
                rank.send_signal(0, SimulationStatus::DATA_TAG).unwrap();
            }
            for (i, rank) in ranks.iter().enumerate() {
                let ready = rank.recv_signal(Some(0), None).unwrap();
                assert_eq!(ready.tag, SimulationStatus::DATA_TAG);
                let event = [1.0, 10.0 + i as f64, step as f64 + 0.5];
                rank.send_i32s(&[event.len() as i32], 0, 0).unwrap();
                rank.send_f64s(&event, 0, 0).unwrap();
            }
        }
        for rank in &ranks {
            rank.send_signal(0, SimulationStatus::END_TAG).unwrap();
        }
    })
}

fn join_hub(handles: Vec<JoinHandle<HubOutcome>>) -> Vec<HubOutcome> {
    let outcomes: Vec<HubOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            panic!("{} failed: {}", outcome.role, e);
        }
    }
    outcomes
}

#[test]
fn test_nest_to_tvb_pipeline() {
    init_test_logging();
    let (endpoint, launcher) = LocalEndpoint::new();
    let endpoint = Arc::new(endpoint.with_remote_size(Role::Receiver, 2));
    let hub = spawn_hub(3, endpoint.clone(), DataExchangeDirection::NestToTvb, test_params());

    let mut simulators = collect_handoffs(&launcher, 2);
    let nest = nest_detectors(simulators.remove(&Role::Receiver).unwrap());
    let tvb_ranks = simulators.remove(&Role::Sender).unwrap();
    let tvb = thread::spawn(move || {
        let tvb = &tvb_ranks[0];
        let mut received = Vec::new();
        for _ in 0..STEPS {
            tvb.send_signal(0, SimulationStatus::DATA_TAG).unwrap();
            let mut times = [0.0; 2];
            tvb.recv_f64s(&mut times, Some(0), Some(0)).unwrap();
            let mut size = [0i32; 1];
            tvb.recv_i32s(&mut size, Some(0), Some(0)).unwrap();
            let mut rates = vec![0.0; size[0] as usize];
            tvb.recv_f64s(&mut rates, Some(0), Some(0)).unwrap();
            received.push((times, rates));
        }
        tvb.send_signal(0, SimulationStatus::END_TAG).unwrap();
        received
    });

    nest.join().unwrap();
    let received = tvb.join().unwrap();
    let outcomes = join_hub(hub);

    assert_eq!(received.len(), STEPS);
    for (step, (times, rates)) in received.iter().enumerate() {
        assert_eq!(*times, [step as f64, step as f64 + 1.0]);
        assert_eq!(rates.len(), 10);
        assert!(rates.iter().all(|&r| r > 0.0));
    }
    assert_eq!(outcomes.iter().filter(|o| o.role == Role::Transformer).count(), 1);
    assert_eq!(endpoint.open_ports(), 0);
}

#[test]
fn test_tvb_to_nest_pipeline() {
    init_test_logging();
    let (endpoint, launcher) = LocalEndpoint::new();
    let endpoint = Arc::new(endpoint.with_remote_size(Role::Sender, 2));
    let hub = spawn_hub(4, endpoint.clone(), DataExchangeDirection::TvbToNest, test_params());

    let mut simulators = collect_handoffs(&launcher, 2);
    let tvb_ranks = simulators.remove(&Role::Receiver).unwrap();
    let generator_ranks = simulators.remove(&Role::Sender).unwrap();

    let tvb = thread::spawn(move || {
        let tvb = &tvb_ranks[0];
        for step in 0..STEPS {
            let ready = tvb.recv_signal(Some(0), None).unwrap();
            assert_eq!(ready.tag, SimulationStatus::DATA_TAG);
            let window = [step as f64, step as f64 + 1.0];
            tvb.send_f64s(&window, 0, SimulationStatus::DATA_TAG).unwrap();
            tvb.send_i32s(&[2], 0, 0).unwrap();
            tvb.send_f64s(&[500.0, 800.0], 0, 0).unwrap();
        }
        tvb.recv_signal(Some(0), None).unwrap();
        tvb.send_f64s(&[0.0, 0.0], 0, SimulationStatus::END_TAG).unwrap();
    });

    let nest = thread::spawn(move || {
        let ids: [[i32; 2]; 2] = [[100, 101], [102, 103]];
        let mut received = Vec::new();
        for _ in 0..STEPS {
            for rank in &generator_ranks {
                rank.send_signal(0, SimulationStatus::DATA_TAG).unwrap();
            }
            for (rank, ids) in generator_ranks.iter().zip(ids.iter()) {
                rank.send_i32s(&[ids.len() as i32], 0, 0).unwrap();
                rank.send_i32s(ids, 0, 0).unwrap();
            }
            let mut step_trains = Vec::new();
            for (rank, ids) in generator_ranks.iter().zip(ids.iter()) {
                let mut shape = [0i32; 3];
                let envelope = rank.recv_i32s(&mut shape, Some(0), None).unwrap();
                assert_eq!(envelope.tag, ids[0]);
                let mut spikes = vec![0.0; shape[0] as usize];
                rank.recv_f64s(&mut spikes, Some(0), Some(ids[0])).unwrap();
                assert_eq!(shape[1] + shape[2], shape[0]);
                let (first, second) = spikes.split_at(shape[1] as usize);
                step_trains.push(first.to_vec());
                step_trains.push(second.to_vec());
            }
            received.push(step_trains);
        }
        for rank in &generator_ranks {
            rank.send_signal(0, SimulationStatus::END_TAG).unwrap();
        }
        received
    });

    tvb.join().unwrap();
    let received = nest.join().unwrap();
    let outcomes = join_hub(hub);

    assert_eq!(received.len(), STEPS);
    for (step, trains) in received.iter().enumerate() {
        assert_eq!(trains.len(), 4);
        for train in trains {
            assert!(train.windows(2).all(|w| w[0] <= w[1]));
            for &t in train {
                let (low, high) = (step as f64 + 0.1, step as f64 + 1.1);
                assert!(t >= low - 1e-9 && t <= high + 1e-9, "step {}: {}", step, t);
            }
        }
    }
    assert_eq!(outcomes.iter().filter(|o| o.role == Role::Transformer).count(), 2);
    assert_eq!(endpoint.open_ports(), 0);
}

#[test]
fn test_nest_to_lfpy_keeps_the_last_translation() {
    init_test_logging();
    let (endpoint, launcher) = LocalEndpoint::new();
    let endpoint = Arc::new(endpoint);
    let hub = spawn_hub(2, endpoint.clone(), DataExchangeDirection::NestToLfpy, test_params());

    let mut simulators = collect_handoffs(&launcher, 1);
    let nest = nest_detectors(simulators.remove(&Role::Receiver).unwrap());

    nest.join().unwrap();
    let outcomes = join_hub(hub);

    let transformer = outcomes
        .iter()
        .find(|o| o.role == Role::Transformer)
        .unwrap();
    assert_eq!(
        transformer.last_result,
        Some(TranslatedPayload::SpikeTrains(vec![
            vec![STEPS as f64 - 0.5],
            vec![],
            vec![],
            vec![],
        ]))
    );
    assert_eq!(endpoint.open_ports(), 0);
}
