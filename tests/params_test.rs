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

//! Tests for hub parameter loading

use std::io::Write;

use interscale_hub::error::Code;
use interscale_hub::net::DataExchangeDirection;
use interscale_hub::params::HubParameters;
use tempfile::NamedTempFile;

fn write_params(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_defaults() {
    let params = HubParameters::default();
    params.validate().unwrap();
    assert_eq!(params.buffer_capacity(DataExchangeDirection::NestToTvb), 3_000_000);
    assert_eq!(params.buffer_capacity(DataExchangeDirection::TvbToNest), 1_000_002);
    assert_eq!(
        params.role_ranks(DataExchangeDirection::NestToTvb),
        (vec![0], vec![1])
    );
    assert_eq!(
        params.role_ranks(DataExchangeDirection::TvbToNest),
        (vec![1], vec![0])
    );
    assert_eq!(
        params.role_ranks(DataExchangeDirection::NestToLfpy),
        (vec![0], vec![])
    );
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_params(r#"{ "max_events": 10, "nb_neurons": 4, "seed": 9, "sender_ranks": [3, 4] }"#);
    let params = HubParameters::from_file(file.path()).unwrap();
    assert_eq!(params.max_events, 10);
    assert_eq!(params.nb_neurons, 4);
    assert_eq!(params.seed, Some(9));
    assert_eq!(params.dt, 0.1);
    assert_eq!(params.buffer_capacity(DataExchangeDirection::NestToLfpy), 30);
    assert_eq!(
        params.role_ranks(DataExchangeDirection::NestToTvb),
        (vec![0], vec![3, 4])
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_params(r#"{ "max_events": 0 }"#);
    assert_eq!(HubParameters::from_file(file.path()).unwrap_err().code(), Code::ConfigError);

    let file = write_params(r#"{ "nest_buffer_size_factor": 2 }"#);
    assert_eq!(HubParameters::from_file(file.path()).unwrap_err().code(), Code::ConfigError);

    let file = write_params(r#"{ "dt": -1.0 }"#);
    assert!(HubParameters::from_file(file.path()).is_err());
}

#[test]
fn test_malformed_file() {
    let file = write_params("{ not json");
    assert_eq!(
        HubParameters::from_file(file.path()).unwrap_err().code(),
        Code::SerializationError
    );
    assert_eq!(
        HubParameters::from_file("/nonexistent/hub.json").unwrap_err().code(),
        Code::IoError
    );
}
