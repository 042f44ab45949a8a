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

//! Tests for the in-process connection endpoint

use std::str::FromStr;

use interscale_hub::net::local::LocalEndpoint;
use interscale_hub::net::{ConnectionEndpoint, DataExchangeDirection, EndpointDescriptor, InterComm};
use interscale_hub::topology::Role;

#[test]
fn test_open_close_cycles_release_every_port() {
    let (endpoint, launcher) = LocalEndpoint::new();
    let endpoint = endpoint.with_remote_size(Role::Receiver, 4);

    for _ in 0..5 {
        let connection = endpoint
            .open_and_accept(DataExchangeDirection::NestToTvb, Role::Receiver)
            .unwrap();
        assert_eq!(endpoint.open_ports(), 1);
        assert_eq!(connection.inter_comm.remote_size(), 4);

        let handoff = launcher.recv().unwrap();
        assert_eq!(handoff.descriptor, connection.descriptor);
        assert_eq!(handoff.ranks.len(), 4);

        endpoint.close(connection).unwrap();
        assert_eq!(endpoint.open_ports(), 0);
    }
}

#[test]
fn test_ports_are_unique() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let first = endpoint
        .open_and_accept(DataExchangeDirection::TvbToNest, Role::Receiver)
        .unwrap();
    let second = endpoint
        .open_and_accept(DataExchangeDirection::TvbToNest, Role::Sender)
        .unwrap();
    assert_ne!(first.descriptor.port, second.descriptor.port);
    assert_eq!(first.inter_comm.remote_size(), 1);
    assert_eq!(endpoint.open_ports(), 2);

    endpoint.close(first).unwrap();
    endpoint.close(second).unwrap();
    assert_eq!(endpoint.open_ports(), 0);
}

#[test]
fn test_closed_link_refuses_traffic() {
    let (endpoint, launcher) = LocalEndpoint::new();
    let connection = endpoint
        .open_and_accept(DataExchangeDirection::NestToLfpy, Role::Receiver)
        .unwrap();
    let handoff = launcher.recv().unwrap();

    handoff.ranks[0].send_signal(0, 0).unwrap();
    endpoint.close(connection).unwrap();
    assert!(handoff.ranks[0].send_signal(0, 0).is_err());
    assert!(handoff.ranks[0].recv_signal(None, None).is_err());
}

#[test]
fn test_endpoint_without_launcher() {
    let (endpoint, launcher) = LocalEndpoint::new();
    drop(launcher);
    let connection = endpoint
        .open_and_accept(DataExchangeDirection::NestToTvb, Role::Sender)
        .unwrap();
    endpoint.close(connection).unwrap();
}

#[test]
fn test_invalid_remote_size() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let endpoint = endpoint.with_remote_size(Role::Sender, 0);
    assert!(endpoint
        .open_and_accept(DataExchangeDirection::NestToTvb, Role::Sender)
        .is_err());
    assert_eq!(endpoint.open_ports(), 0);
}

#[test]
fn test_descriptor_record() {
    let descriptor = EndpointDescriptor::new(DataExchangeDirection::TvbToNest, Role::Sender, "tag#0$port#1");
    let record = descriptor.to_record().unwrap();
    let value: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert_eq!(value["DIRECTION"], "TVB_TO_NEST");
    assert_eq!(value["ROLE"], "SENDER");
    assert_eq!(value["MPI_CONNECTION_INFO"], "tag#0$port#1");
    assert_eq!(value["PID"], std::process::id());

    let parsed: EndpointDescriptor = serde_json::from_str(&record).unwrap();
    assert_eq!(parsed, descriptor);
}

#[test]
fn test_direction_names() {
    assert_eq!(
        DataExchangeDirection::from_str("nest-to-tvb").unwrap(),
        DataExchangeDirection::NestToTvb
    );
    assert_eq!(
        DataExchangeDirection::from_str("TVB_TO_NEST").unwrap(),
        DataExchangeDirection::TvbToNest
    );
    assert!(DataExchangeDirection::from_str("LFPY_TO_NEST").is_err());
    assert!(!DataExchangeDirection::NestToLfpy.has_sender());
    assert_eq!(DataExchangeDirection::NestToLfpy.to_string(), "NEST_TO_LFPY");
}
