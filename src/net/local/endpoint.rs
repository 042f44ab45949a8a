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

//! In-process connection endpoint
//!
//! `open_and_accept` creates a [`LocalLink`], publishes the simulator ends
//! through a channel (the in-process stand-in for the launcher) and returns
//! the hub end immediately, which matches a simulator that is already
//! waiting to connect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use log::{debug, info};

use crate::error::{HubError, HubResult};
use crate::net::{Connection, ConnectionEndpoint, DataExchangeDirection, EndpointDescriptor};
use crate::topology::Role;

use super::intercomm::{LocalInterComm, LocalLink};

/// What a simulator mock receives once the hub opened a port for it
pub struct SimulatorHandoff {
    pub descriptor: EndpointDescriptor,
    /// One inter-communicator end per simulator rank
    pub ranks: Vec<LocalInterComm>,
}

pub struct LocalEndpoint {
    remote_sizes: HashMap<Role, i32>,
    next_port: AtomicU64,
    open_ports: AtomicUsize,
    launcher: Mutex<Sender<SimulatorHandoff>>,
}

impl LocalEndpoint {
    /// Create an endpoint together with the launcher side of the handoff channel
    pub fn new() -> (Self, Receiver<SimulatorHandoff>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                remote_sizes: HashMap::new(),
                next_port: AtomicU64::new(0),
                open_ports: AtomicUsize::new(0),
                launcher: Mutex::new(tx),
            },
            rx,
        )
    }

    /// Number of simulator ranks connecting to `role`; defaults to one
    pub fn with_remote_size(mut self, role: Role, size: i32) -> Self {
        self.remote_sizes.insert(role, size);
        self
    }

    /// Ports opened and not yet closed
    pub fn open_ports(&self) -> usize {
        self.open_ports.load(Ordering::SeqCst)
    }
}

impl ConnectionEndpoint for LocalEndpoint {
    fn open_and_accept(&self, direction: DataExchangeDirection, role: Role) -> HubResult<Connection> {
        let remote_size = self.remote_sizes.get(&role).copied().unwrap_or(1);
        if remote_size < 1 {
            return Err(HubError::Config(format!(
                "{} endpoint needs at least one simulator rank, got {}",
                role, remote_size
            )));
        }

        let port = format!("local-port-{}", self.next_port.fetch_add(1, Ordering::SeqCst));
        let descriptor = EndpointDescriptor::new(direction, role, port);
        let (hub, simulator) = LocalLink::pair(remote_size);

        self.open_ports.fetch_add(1, Ordering::SeqCst);
        info!("{}", descriptor.to_record()?);

        let handoff = SimulatorHandoff {
            descriptor: descriptor.clone(),
            ranks: simulator,
        };
        let sent = self
            .launcher
            .lock()
            .map_err(|_| HubError::Communication("launcher channel lock poisoned".to_string()))?
            .send(handoff);
        if sent.is_err() {
            // no launcher is listening; the simulator ends are dropped
            debug!("no launcher attached for port {}", descriptor.port);
        }

        Ok(Connection {
            inter_comm: Box::new(hub),
            descriptor,
        })
    }

    fn close(&self, mut connection: Connection) -> HubResult<()> {
        connection.inter_comm.disconnect()?;
        self.open_ports.fetch_sub(1, Ordering::SeqCst);
        debug!("closed port {}", connection.descriptor.port);
        Ok(())
    }
}
