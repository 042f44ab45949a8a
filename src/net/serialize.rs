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

//! Encoding of hub-internal messages
//!
//! Values crossing an [`IntraComm`](super::IntraComm) travel as bincode
//! bytes: the simulation-status flag forwarded to the transformer root, the
//! partial results gathered inside the transformer group, and the translated
//! payload handed to the sender root.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{HubError, HubResult};

pub fn encode<T: Serialize>(value: &T) -> HubResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| HubError::Serialization(format!("Failed to encode message: {}", e)))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> HubResult<T> {
    bincode::deserialize(data).map_err(|e| HubError::Serialization(format!("Failed to decode message: {}", e)))
}

/// Encode the "is the simulation still running" flag
pub fn encode_status(is_running: bool) -> Vec<u8> {
    vec![is_running as u8]
}

pub fn decode_status(data: &[u8]) -> HubResult<bool> {
    match data {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(HubError::Serialization(format!(
            "malformed simulation status message of {} bytes",
            data.len()
        ))),
    }
}
