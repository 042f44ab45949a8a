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

//! InterscaleHub: data exchange middleware between co-simulated brain models
//!
//! The hub sits between a spiking network simulator (NEST) and a mean-field
//! simulator (TVB) or an LFP post-processor (LFPy). Its ranks are split into
//! receivers, transformers and senders that share one buffer per node: the
//! receiver fills it from the source simulator, the transformers translate
//! spikes to rates (or back) and the sender delivers the result to the
//! target simulator.

pub mod buffer;
pub mod communicators;
pub mod ctx;
pub mod error;
pub mod manager;
pub mod net;
pub mod params;
pub mod topology;
pub mod translation;
pub mod util;

// Re-export commonly used types
pub use crate::buffer::{BufferState, BufferType, SharedBuffer};
pub use crate::ctx::HubContext;
pub use crate::error::{Code, HubError, HubResult, Status};
pub use crate::manager::HubManager;
pub use crate::net::{DataExchangeDirection, SimulationStatus};
pub use crate::params::HubParameters;
pub use crate::topology::{Role, RoleTopology};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
