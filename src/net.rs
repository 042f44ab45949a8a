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

//! Networking and communication components
//!
//! Two communicator flavours meet in the hub:
//! - [`IntraComm`]: among the hub's own ranks (the world, or one role's sub-group)
//! - [`InterComm`]: between the hub and one external simulator
//!
//! Both are implemented by the in-process `local` backend and, behind the
//! `mpi` feature, by MPI.

pub mod communicator;
pub mod endpoint;
pub mod intercomm;
pub mod local;
pub mod serialize;

#[cfg(feature = "mpi")]
pub mod mpi;

pub use communicator::IntraComm;
pub use endpoint::{Connection, ConnectionEndpoint, DataExchangeDirection, EndpointDescriptor};
pub use intercomm::{Envelope, InterComm};

/// Rank of a process inside a communicator
pub type Rank = i32;

/// MPI message tag
pub type Tag = i32;

/// Tag used for every hub-internal point-to-point handoff
pub const HANDOFF_TAG: Tag = 0;

/// Communication type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommType {
    Local,
    #[cfg(feature = "mpi")]
    Mpi,
}

/// Per-step simulation status, carried by the tag of a handshake message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    /// Payload follows
    Data,
    /// Heartbeat, nothing to exchange this step
    NoData,
    /// Simulator finished
    End,
}

impl SimulationStatus {
    pub const DATA_TAG: Tag = 0;
    pub const NO_DATA_TAG: Tag = 1;
    pub const END_TAG: Tag = 2;

    /// Decode a handshake tag; `None` for any undefined tag
    pub fn from_tag(tag: Tag) -> Option<Self> {
        match tag {
            Self::DATA_TAG => Some(SimulationStatus::Data),
            Self::NO_DATA_TAG => Some(SimulationStatus::NoData),
            Self::END_TAG => Some(SimulationStatus::End),
            _ => None,
        }
    }

    pub fn tag(self) -> Tag {
        match self {
            SimulationStatus::Data => Self::DATA_TAG,
            SimulationStatus::NoData => Self::NO_DATA_TAG,
            SimulationStatus::End => Self::END_TAG,
        }
    }
}
