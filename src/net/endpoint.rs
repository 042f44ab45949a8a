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

//! Connection endpoints toward external simulators
//!
//! An endpoint opens a dynamic connection point, publishes its address so a
//! launcher can hand it to the simulator, blocks until the simulator
//! connects, and yields the resulting inter-communicator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use crate::topology::Role;

use super::InterComm;

/// Direction of one co-simulation pipeline leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataExchangeDirection {
    /// Spikes from NEST, rates to TVB
    NestToTvb,
    /// Rates from TVB, spikes to NEST
    TvbToNest,
    /// Spikes from NEST into a local consumer, no downstream simulator
    NestToLfpy,
}

impl DataExchangeDirection {
    pub fn name(&self) -> &'static str {
        match self {
            DataExchangeDirection::NestToTvb => "NEST_TO_TVB",
            DataExchangeDirection::TvbToNest => "TVB_TO_NEST",
            DataExchangeDirection::NestToLfpy => "NEST_TO_LFPY",
        }
    }

    /// Whether this leg forwards its translated data to a downstream simulator
    pub fn has_sender(&self) -> bool {
        !matches!(self, DataExchangeDirection::NestToLfpy)
    }
}

impl fmt::Display for DataExchangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataExchangeDirection {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NEST_TO_TVB" => Ok(DataExchangeDirection::NestToTvb),
            "TVB_TO_NEST" => Ok(DataExchangeDirection::TvbToNest),
            "NEST_TO_LFPY" => Ok(DataExchangeDirection::NestToLfpy),
            other => Err(HubError::Config(format!("unknown data exchange direction: {}", other))),
        }
    }
}

/// Record handed to the launcher so it can relay the port to the simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    #[serde(rename = "PID")]
    pub pid: u32,
    #[serde(rename = "DIRECTION")]
    pub direction: DataExchangeDirection,
    #[serde(rename = "ROLE")]
    pub role: Role,
    #[serde(rename = "MPI_CONNECTION_INFO")]
    pub port: String,
}

impl EndpointDescriptor {
    pub fn new(direction: DataExchangeDirection, role: Role, port: impl Into<String>) -> Self {
        Self {
            pid: std::process::id(),
            direction,
            role,
            port: port.into(),
        }
    }

    /// Single-line JSON form printed for the launcher
    pub fn to_record(&self) -> HubResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An accepted link to one external simulator
///
/// Owned by the role that uses it and consumed by
/// [`ConnectionEndpoint::close`], so it can only be closed once.
pub struct Connection {
    pub inter_comm: Box<dyn InterComm>,
    pub descriptor: EndpointDescriptor,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor)
            .field("remote_size", &self.inter_comm.remote_size())
            .finish()
    }
}

/// Opens and closes connections toward external simulators
pub trait ConnectionEndpoint: Send + Sync {
    /// Open a connection point, publish it, and block until the simulator connects
    fn open_and_accept(&self, direction: DataExchangeDirection, role: Role) -> HubResult<Connection>;

    /// Disconnect and release the connection point
    fn close(&self, connection: Connection) -> HubResult<()>;
}
