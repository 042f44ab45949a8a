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

//! MPI port endpoint
//!
//! Opens a port, prints the endpoint record on stdout for the launcher and
//! accepts the simulator on `MPI_COMM_SELF`, so only the calling rank joins
//! the inter-communicator.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use log::{debug, info};
use mpi_sys::MPI_Comm;

use crate::error::{HubError, HubResult};
use crate::net::{Connection, ConnectionEndpoint, DataExchangeDirection, EndpointDescriptor};
use crate::topology::Role;

use super::MpiInterComm;

/// Port buffer size, at least `MPI_MAX_PORT_NAME` on common implementations
const PORT_NAME_LEN: usize = 1024;

fn check(rc: c_int, call: &str) -> HubResult<()> {
    if rc != mpi_sys::MPI_SUCCESS as c_int {
        return Err(HubError::Communication(format!("{} failed with code {}", call, rc)));
    }
    Ok(())
}

#[derive(Default)]
pub struct MpiEndpoint;

impl MpiEndpoint {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionEndpoint for MpiEndpoint {
    fn open_and_accept(&self, direction: DataExchangeDirection, role: Role) -> HubResult<Connection> {
        let mut port = vec![0 as c_char; PORT_NAME_LEN];
        // SAFETY: port is writable for PORT_NAME_LEN bytes
        unsafe {
            check(
                mpi_sys::MPI_Open_port(mpi_sys::RSMPI_INFO_NULL, port.as_mut_ptr()),
                "MPI_Open_port",
            )?;
        }
        // SAFETY: MPI_Open_port wrote a NUL-terminated name into port
        let port_name = unsafe { CStr::from_ptr(port.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let descriptor = EndpointDescriptor::new(direction, role, port_name);
        let record = descriptor.to_record()?;
        println!("{}", record);
        info!("{} {} waiting for the simulator on port {}", direction, role, descriptor.port);

        let mut inter: MPI_Comm = unsafe { std::mem::zeroed() };
        // SAFETY: port holds the opened name, inter is a valid out-pointer
        unsafe {
            check(
                mpi_sys::MPI_Comm_accept(
                    port.as_ptr(),
                    mpi_sys::RSMPI_INFO_NULL,
                    0,
                    mpi_sys::RSMPI_COMM_SELF,
                    &mut inter,
                ),
                "MPI_Comm_accept",
            )?;
        }
        debug!("{} {} connected", direction, role);

        // SAFETY: inter is the fresh inter-communicator returned by accept
        let inter_comm = unsafe { MpiInterComm::from_raw(inter)? };
        Ok(Connection {
            inter_comm: Box::new(inter_comm),
            descriptor,
        })
    }

    fn close(&self, mut connection: Connection) -> HubResult<()> {
        connection.inter_comm.disconnect()?;
        let port = CString::new(connection.descriptor.port.clone())
            .map_err(|e| HubError::Invalid(format!("port name with interior NUL: {}", e)))?;
        // SAFETY: port is the NUL-terminated name returned by MPI_Open_port
        unsafe {
            check(mpi_sys::MPI_Close_port(port.as_ptr()), "MPI_Close_port")?;
        }
        info!("closed port {}", connection.descriptor.port);
        Ok(())
    }
}
