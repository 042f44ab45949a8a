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

//! Tests for spike reshaping and the default spike/rate kernels

use std::thread;

use interscale_hub::error::Code;
use interscale_hub::net::local::LocalWorld;
use interscale_hub::net::IntraComm;
use interscale_hub::translation::{
    gather_trains, local_chunk, KernelRateConverter, RateToSpikesTranslator, SpikeEvents, SpikeRateConversion,
    SpikeTrainTranslator, TranslatedPayload, TranslationFunction,
};
use interscale_hub::util::chunks::split_even;
use std::sync::Arc;

#[test]
fn test_spike_events_grouped_per_neuron() {
    let raw = [5.0, 3.0, 0.7, 5.0, 1.0, 0.2, 5.0, 3.0, 0.1];
    let events = SpikeEvents::from_raw(&raw, 1, 3).unwrap();
    assert_eq!(events.first_neuron_id(), 1);
    assert_eq!(events.nb_neurons(), 3);
    assert_eq!(events.event_count(), 3);
    assert_eq!(events.per_neuron(), &[vec![0.2], vec![], vec![0.7, 0.1]]);
    assert_eq!(events.trains(2..3), vec![vec![0.1, 0.7]]);
}

#[test]
fn test_spike_events_reject_malformed_payloads() {
    assert_eq!(SpikeEvents::from_raw(&[1.0, 2.0], 0, 4).unwrap_err().code(), Code::Invalid);
    assert_eq!(
        SpikeEvents::from_raw(&[1.0, 9.0, 0.5], 0, 4).unwrap_err().code(),
        Code::Invalid
    );
    let empty = SpikeEvents::from_raw(&[], 0, 2).unwrap();
    assert_eq!(empty.event_count(), 0);
}

#[test]
fn test_split_even() {
    assert_eq!(split_even(10, 3), vec![0..4, 4..7, 7..10]);
    assert_eq!(split_even(2, 4), vec![0..1, 1..2, 2..2, 2..2]);
    assert!(split_even(5, 0).is_empty());
}

#[test]
fn test_spikes_to_rate_window_and_scale() {
    let converter = KernelRateConverter::new(10.0, 1.0, 1.0, Some(1)).unwrap();
    let (times, rates) = converter.spikes_to_rate(2, &[vec![25.0], vec![]]).unwrap();
    assert_eq!(times, [20.0, 30.0]);
    assert_eq!(rates.len(), 10);

    // kernel of half width sqrt(3) ms around bins at 24, 25, 26 ms
    let width_s = 2.0 * 3f64.sqrt() / 1000.0;
    let expected = 1.0 / width_s / 2.0 * 0.1;
    for bin in [4, 5, 6] {
        assert!((rates[bin] - expected).abs() < 1e-9, "bin {}: {}", bin, rates[bin]);
    }
    assert_eq!(rates[0], 0.0);
    assert_eq!(rates[9], 0.0);
}

#[test]
fn test_spikes_to_rate_without_trains_is_silent() {
    let converter = KernelRateConverter::new(1.0, 0.1, 1.0, Some(1)).unwrap();
    let (_, rates) = converter.spikes_to_rate(0, &[]).unwrap();
    assert!(rates.iter().all(|&r| r == 0.0));
}

#[test]
fn test_rate_to_spikes_stays_in_window() {
    let converter = KernelRateConverter::new(100.0, 0.1, 10.0, Some(42)).unwrap();
    let trains = converter.rate_to_spikes([0.0, 100.0], &[20.0, 40.0, 5.0, 80.0], 0..6).unwrap();
    assert_eq!(trains.len(), 6);

    let total: usize = trains.iter().map(Vec::len).sum();
    assert!(total > 0);
    for train in &trains {
        assert!(train.windows(2).all(|w| w[0] <= w[1]));
        for &t in train {
            assert!((0.1..=100.1).contains(&t), "spike at {}", t);
            assert!(((t * 10.0).round() - t * 10.0).abs() < 1e-9);
        }
    }
}

#[test]
fn test_rate_to_spikes_is_reproducible_with_a_seed() {
    let first = KernelRateConverter::new(100.0, 0.1, 1.0, Some(7)).unwrap();
    let second = KernelRateConverter::new(100.0, 0.1, 1.0, Some(7)).unwrap();
    let rates = [30.0, 60.0];
    assert_eq!(
        first.rate_to_spikes([0.0, 100.0], &rates, 0..3).unwrap(),
        second.rate_to_spikes([0.0, 100.0], &rates, 0..3).unwrap()
    );
}

#[test]
fn test_rate_to_spikes_streams_differ_per_shard() {
    let converter = KernelRateConverter::new(100.0, 0.1, 1.0, Some(11)).unwrap();
    let rates = [30.0, 60.0];
    let low = converter.rate_to_spikes([0.0, 100.0], &rates, 0..2).unwrap();
    let high = converter.rate_to_spikes([0.0, 100.0], &rates, 2..4).unwrap();
    assert_ne!(low, high);

    // a shard keeps drawing from its own stream on the next step
    let next = converter.rate_to_spikes([0.0, 100.0], &rates, 0..2).unwrap();
    assert_ne!(low, next);
}

#[test]
fn test_rate_to_spikes_translator_ranks_sharing_a_seed_draw_independent_trains() {
    let comms = LocalWorld::create(2);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                // every rank builds its own converter from the same seed
                let converter = Arc::new(KernelRateConverter::new(100.0, 0.1, 1.0, Some(11)).unwrap());
                let translator = RateToSpikesTranslator::new(converter, 4);
                translator
                    .translate(0, &[0.0, 100.0, 50.0, 50.0], &comm, 0)
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    match &results[0] {
        Some(TranslatedPayload::SpikeTrains(trains)) => {
            assert_eq!(trains.len(), 4);
            assert!(trains.iter().any(|t| !t.is_empty()));
            assert_ne!(trains[0], trains[2]);
            assert_ne!(trains[1], trains[3]);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn test_converter_rejects_bad_parameters() {
    assert_eq!(
        KernelRateConverter::new(0.0, 0.1, 1.0, None).err().map(|e| e.code()),
        Some(Code::ConfigError)
    );
    assert!(KernelRateConverter::new(1.0, -0.1, 1.0, None).is_err());
}

#[test]
fn test_rate_to_spikes_translator_gathers_every_generator() {
    let comms = LocalWorld::create(3);
    let converter = Arc::new(KernelRateConverter::new(100.0, 0.1, 1.0, Some(3)).unwrap());
    let translator = Arc::new(RateToSpikesTranslator::new(converter, 7));

    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let translator = translator.clone();
            thread::spawn(move || {
                assert_eq!(local_chunk(7, &comm).len(), if comm.get_rank() == 0 { 3 } else { 2 });
                translator
                    .translate(0, &[0.0, 100.0, 50.0, 50.0], &comm, 0)
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results[1].is_none());
    assert!(results[2].is_none());
    match &results[0] {
        Some(TranslatedPayload::SpikeTrains(trains)) => assert_eq!(trains.len(), 7),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn test_spike_train_translator_on_two_ranks() {
    let comms = LocalWorld::create(2);
    let translator = Arc::new(SpikeTrainTranslator::new(0, 3));
    let raw = vec![1.0, 2.0, 0.9, 1.0, 0.0, 0.3, 1.0, 2.0, 0.4];

    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let translator = translator.clone();
            let raw = raw.clone();
            thread::spawn(move || translator.translate(5, &raw, &comm, 1).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results[0].is_none());
    assert_eq!(
        results[1],
        Some(TranslatedPayload::SpikeTrains(vec![vec![0.3], vec![], vec![0.4, 0.9]]))
    );
}

#[test]
fn test_gather_trains_single_rank() {
    let comm = LocalWorld::create(1).remove(0);
    let gathered = gather_trains(&[vec![1.0], vec![2.0]], &comm, 0).unwrap();
    assert_eq!(gathered, Some(vec![vec![1.0], vec![2.0]]));
}
