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

//! Inter-communicator toward an external simulator
//!
//! rsmpi has no wrapper for communicators obtained from `MPI_Comm_accept`,
//! so this module drives the raw handle through mpi-sys, checking every
//! return code.

use std::os::raw::{c_int, c_void};

use mpi::datatype::Equivalence;
use mpi::raw::AsRaw;
use mpi_sys::{MPI_Comm, MPI_Datatype, MPI_Status};

use crate::error::{HubError, HubResult};
use crate::net::{Envelope, InterComm, Rank, Tag};

fn datatype_of<T: Equivalence>() -> MPI_Datatype {
    T::equivalent_datatype().as_raw()
}

fn check(rc: c_int, call: &str) -> HubResult<()> {
    if rc != mpi_sys::MPI_SUCCESS as c_int {
        return Err(HubError::Communication(format!("{} failed with code {}", call, rc)));
    }
    Ok(())
}

pub struct MpiInterComm {
    comm: MPI_Comm,
    remote_size: i32,
    connected: bool,
}

// SAFETY: the handle is owned by exactly one role thread; MPI handles are
// plain identifiers.
unsafe impl Send for MpiInterComm {}

impl MpiInterComm {
    /// Take ownership of an inter-communicator handle
    ///
    /// # Safety
    ///
    /// `comm` must be a valid inter-communicator not owned elsewhere.
    pub unsafe fn from_raw(comm: MPI_Comm) -> HubResult<Self> {
        let mut remote_size: c_int = 0;
        check(
            mpi_sys::MPI_Comm_remote_size(comm, &mut remote_size),
            "MPI_Comm_remote_size",
        )?;
        Ok(Self {
            comm,
            remote_size,
            connected: true,
        })
    }

    fn ensure_connected(&self) -> HubResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(HubError::Communication("inter-communicator already disconnected".to_string()))
        }
    }

    fn recv_raw<T: Equivalence>(&self, buf: &mut [T], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        self.ensure_connected()?;
        let mut status: MPI_Status = unsafe { std::mem::zeroed() };
        let mut count: c_int = 0;
        // SAFETY: buf is valid for buf.len() elements of T, the datatype
        // matches T, and the communicator is connected.
        unsafe {
            let source = source.unwrap_or(mpi_sys::RSMPI_ANY_SOURCE);
            let tag = tag.unwrap_or(mpi_sys::RSMPI_ANY_TAG);
            check(
                mpi_sys::MPI_Recv(
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as c_int,
                    datatype_of::<T>(),
                    source,
                    tag,
                    self.comm,
                    &mut status,
                ),
                "MPI_Recv",
            )?;
            check(
                mpi_sys::MPI_Get_count(&status, datatype_of::<T>(), &mut count),
                "MPI_Get_count",
            )?;
        }
        Ok(Envelope {
            source: status.MPI_SOURCE,
            tag: status.MPI_TAG,
            count: count.max(0) as usize,
        })
    }

    fn send_raw<T: Equivalence>(&self, data: &[T], dest: Rank, tag: Tag) -> HubResult<()> {
        self.ensure_connected()?;
        if dest < 0 || dest >= self.remote_size {
            return Err(HubError::Invalid(format!(
                "remote rank {} outside remote group of size {}",
                dest, self.remote_size
            )));
        }
        // SAFETY: data is valid for data.len() elements of T and the
        // datatype matches T.
        unsafe {
            check(
                mpi_sys::MPI_Send(
                    data.as_ptr() as *const c_void,
                    data.len() as c_int,
                    datatype_of::<T>(),
                    dest,
                    tag,
                    self.comm,
                ),
                "MPI_Send",
            )
        }
    }
}

impl InterComm for MpiInterComm {
    fn remote_size(&self) -> i32 {
        self.remote_size
    }

    fn recv_signal(&self, source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        let mut flag = [0u8; 1];
        self.recv_raw(&mut flag, source, tag)
    }

    fn send_signal(&self, dest: Rank, tag: Tag) -> HubResult<()> {
        self.send_raw(&[1u8], dest, tag)
    }

    fn recv_i32s(&self, buf: &mut [i32], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        self.recv_raw(buf, source, tag)
    }

    fn recv_f64s(&self, buf: &mut [f64], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        self.recv_raw(buf, source, tag)
    }

    fn send_i32s(&self, data: &[i32], dest: Rank, tag: Tag) -> HubResult<()> {
        self.send_raw(data, dest, tag)
    }

    fn send_f64s(&self, data: &[f64], dest: Rank, tag: Tag) -> HubResult<()> {
        self.send_raw(data, dest, tag)
    }

    fn disconnect(&mut self) -> HubResult<()> {
        self.ensure_connected()?;
        // SAFETY: the handle is valid and owned; MPI resets it to MPI_COMM_NULL.
        unsafe {
            check(mpi_sys::MPI_Comm_disconnect(&mut self.comm), "MPI_Comm_disconnect")?;
        }
        self.connected = false;
        Ok(())
    }
}
