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

//! Shared-memory window backing the hub buffer
//!
//! Rank 0 allocates the whole window with `MPI_Win_allocate_shared`, every
//! other rank allocates nothing and maps rank 0's segment through
//! `MPI_Win_shared_query`.

use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::Arc;

use log::debug;
use mpi_sys::{MPI_Aint, MPI_Win};

use crate::buffer::{check_element_size, BufferType, RegionAllocator, SharedRegion, ELEMENT_SIZE};
use crate::error::{HubError, HubResult};
use crate::net::IntraComm;

use super::MpiIntraComm;

fn check(rc: c_int, call: &str) -> HubResult<()> {
    if rc != mpi_sys::MPI_SUCCESS as c_int {
        return Err(HubError::Communication(format!("{} failed with code {}", call, rc)));
    }
    Ok(())
}

pub struct MpiSharedWindow {
    win: MPI_Win,
    base: *mut f64,
    len: usize,
}

// SAFETY: the window is valid until drop and `base` points into memory
// mapped for the whole process group.
unsafe impl Send for MpiSharedWindow {}
unsafe impl Sync for MpiSharedWindow {}

impl MpiSharedWindow {
    /// Collective over `comm`
    pub fn allocate(comm: &MpiIntraComm, elements: usize) -> HubResult<Self> {
        let local_bytes = if comm.get_rank() == 0 {
            (elements * ELEMENT_SIZE) as MPI_Aint
        } else {
            0
        };

        let mut win: MPI_Win = unsafe { std::mem::zeroed() };
        let mut local_base: *mut c_void = ptr::null_mut();
        let mut size: MPI_Aint = 0;
        let mut disp_unit: c_int = 0;
        let mut base: *mut c_void = ptr::null_mut();

        // SAFETY: all out-pointers are valid locals; the call is collective
        // and every rank passes the same communicator.
        unsafe {
            check(
                mpi_sys::MPI_Win_allocate_shared(
                    local_bytes,
                    ELEMENT_SIZE as c_int,
                    mpi_sys::RSMPI_INFO_NULL,
                    comm.raw(),
                    &mut local_base as *mut *mut c_void as *mut c_void,
                    &mut win,
                ),
                "MPI_Win_allocate_shared",
            )?;
            check(
                mpi_sys::MPI_Win_shared_query(
                    win,
                    0,
                    &mut size,
                    &mut disp_unit,
                    &mut base as *mut *mut c_void as *mut c_void,
                ),
                "MPI_Win_shared_query",
            )?;
        }

        let window = Self {
            win,
            base: base as *mut f64,
            len: elements,
        };
        check_element_size(disp_unit as usize)?;
        if (size as usize) < elements * ELEMENT_SIZE {
            return Err(HubError::Capacity(format!(
                "shared window of {} bytes cannot hold {} elements",
                size, elements
            )));
        }

        if comm.get_rank() == 0 {
            // SAFETY: rank 0 owns the segment and nobody reads it before the
            // barrier below.
            unsafe { ptr::write_bytes(window.base, 0, elements) };
        }
        comm.barrier()?;
        debug!("rank {}: attached shared window of {} elements", comm.get_rank(), elements);
        Ok(window)
    }
}

unsafe impl SharedRegion for MpiSharedWindow {
    fn as_ptr(&self) -> *mut f64 {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MpiSharedWindow {
    fn drop(&mut self) {
        // SAFETY: the window was created by MPI_Win_allocate_shared and is
        // freed once.
        let rc = unsafe { mpi_sys::MPI_Win_free(&mut self.win) };
        if rc != mpi_sys::MPI_SUCCESS as c_int {
            log::warn!("MPI_Win_free failed with code {}", rc);
        }
    }
}

/// Allocates one shared window per [`BufferType`] over the world
pub struct MpiRegionAllocator {
    world: MpiIntraComm,
}

impl MpiRegionAllocator {
    pub fn new(world: MpiIntraComm) -> Self {
        Self { world }
    }
}

impl RegionAllocator for MpiRegionAllocator {
    fn allocate(&self, buffer_type: BufferType, elements: usize) -> HubResult<Arc<dyn SharedRegion>> {
        debug!("allocating {:?} shared window", buffer_type);
        Ok(Arc::new(MpiSharedWindow::allocate(&self.world, elements)?))
    }
}
