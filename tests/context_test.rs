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

//! Tests for HubContext on the in-process backend

use std::sync::Arc;
use std::thread;

use interscale_hub::net::local::LocalEndpoint;
use interscale_hub::net::CommType;
use interscale_hub::{Code, DataExchangeDirection, HubContext, HubError, HubManager, HubParameters, HubResult, Status};

#[test]
fn test_local_context() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let contexts = HubContext::init_local(3, Arc::new(endpoint));
    assert_eq!(contexts.len(), 3);

    let handles: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            thread::spawn(move || {
                assert_eq!(ctx.get_world_size(), 3);
                assert_eq!(ctx.get_comm_type(), CommType::Local);
                ctx.barrier().unwrap();
                ctx.get_rank()
            })
        })
        .collect();
    let mut ranks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ranks.sort();
    assert_eq!(ranks, vec![0, 1, 2]);
}

#[test]
fn test_config_map() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let ctx = HubContext::init_local(1, Arc::new(endpoint)).remove(0);
    assert_eq!(ctx.get_config("launcher", "none"), "none");
    ctx.add_config("launcher", "mpirun");
    assert_eq!(ctx.get_config("launcher", "none"), "mpirun");
}

#[test]
fn test_manager_rejects_world_without_transformers() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let contexts = HubContext::init_local(2, Arc::new(endpoint));
    let handles: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            thread::spawn(move || {
                let result = HubManager::new(ctx, DataExchangeDirection::NestToTvb, HubParameters::default());
                Status::from(result.map(|_| ()))
            })
        })
        .collect();
    for handle in handles {
        let status = handle.join().unwrap();
        assert!(!status.is_ok());
        assert_eq!(status.exit_code(), 1);
    }
}

#[test]
fn test_one_way_direction_takes_no_sender() {
    let (endpoint, _launcher) = LocalEndpoint::new();
    let ctx = HubContext::init_local(1, Arc::new(endpoint)).remove(0);
    let params = HubParameters {
        sender_ranks: Some(vec![1]),
        ..HubParameters::default()
    };
    let status = Status::from(HubManager::new(ctx, DataExchangeDirection::NestToLfpy, params).map(|_| ()));
    assert!(!status.is_ok());
}

#[test]
fn test_status_carries_the_error_kind() {
    let ok = Status::from(HubResult::<()>::Ok(()));
    assert!(ok.is_ok());
    assert_eq!(ok.get_code(), Code::Ok);
    assert_eq!(ok.exit_code(), 0);

    let failed = Status::from(HubError::BadTag {
        step: 3,
        rank: 1,
        tag: 7,
    });
    assert_eq!(failed.get_code(), Code::BadTag);
    assert!(failed.get_msg().contains("tag 7"));
    assert_eq!(failed.exit_code(), 1);

    let mismatch = Status::from(HubError::BufferSizeMismatch { expected: 8, actual: 4 });
    assert_eq!(mismatch.get_code(), Code::BufferSizeMismatch);
}
