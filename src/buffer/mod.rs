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

//! Shared data buffer
//!
//! A fixed block of `capacity + 2` doubles shared by every rank of the hub.
//! The payload occupies `[0, capacity)`; the two trailing slots hold the
//! valid payload length and the buffer state:
//!
//! ```text
//! | payload ............................ | length | state |
//!   0                          capacity-1   cap      cap+1
//! ```
//!
//! The trailer is read and written atomically (the `f64` bit pattern is
//! stored through an `AtomicU64`), so a state flip published with release
//! ordering makes the payload written before it visible to a rank that
//! observes the new state with acquire ordering. The payload itself carries
//! no locking: callers follow the state machine
//!
//! ```text
//! READY_TO_RECEIVE -> READY_TO_TRANSFORM -> READY_TO_RECEIVE -> ...
//! ```
//!
//! where only the Receiver writes in `READY_TO_RECEIVE` and only the
//! Transformer reads in `READY_TO_TRANSFORM`.

pub mod heap;

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{HubError, HubResult};

pub use heap::{HeapRegion, LocalRegionAllocator};

/// Number of trailing metadata slots
pub const TRAILER_LEN: usize = 2;

/// Size in bytes of one buffer element
pub const ELEMENT_SIZE: usize = mem::size_of::<f64>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    ReadyToReceive = 1,
    ReadyToTransform = 2,
    /// Reserved
    ReadyToSend = 3,
    Wait = 4,
    Terminate = 5,
}

impl BufferState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: f64) -> Option<Self> {
        match code as i64 {
            1 => Some(BufferState::ReadyToReceive),
            2 => Some(BufferState::ReadyToTransform),
            3 => Some(BufferState::ReadyToSend),
            4 => Some(BufferState::Wait),
            5 => Some(BufferState::Terminate),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferState::ReadyToReceive => "READY_TO_RECEIVE",
            BufferState::ReadyToTransform => "READY_TO_TRANSFORM",
            BufferState::ReadyToSend => "READY_TO_SEND",
            BufferState::Wait => "WAIT",
            BufferState::Terminate => "TERMINATE",
        }
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical buffer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Input,
    Output,
}

/// A block of `f64` elements mapped into every rank of the hub
///
/// # Safety
///
/// `as_ptr` must point to `len()` contiguous, 8-byte aligned `f64` slots that
/// stay valid and at the same address for the lifetime of the region, and
/// every rank sharing the region must observe the same memory.
pub unsafe trait SharedRegion: Send + Sync {
    fn as_ptr(&self) -> *mut f64;

    /// Number of `f64` elements, trailer included
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allocates a region on the first rank and attaches it everywhere else
pub trait RegionAllocator: Send + Sync {
    /// Collective: every rank of the hub calls it with the same arguments
    fn allocate(&self, buffer_type: BufferType, elements: usize) -> HubResult<Arc<dyn SharedRegion>>;
}

/// Fail when the shared window reports an element width other than `f64`
pub fn check_element_size(actual: usize) -> HubResult<()> {
    if actual != ELEMENT_SIZE {
        return Err(HubError::BufferSizeMismatch {
            expected: ELEMENT_SIZE,
            actual,
        });
    }
    Ok(())
}

/// Handle to the shared buffer of one [`BufferType`]
#[derive(Clone)]
pub struct SharedBuffer {
    region: Arc<dyn SharedRegion>,
    capacity: usize,
    buffer_type: BufferType,
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("buffer_type", &self.buffer_type)
            .field("capacity", &self.capacity)
            .field("length", &self.length())
            .field("state", &self.state())
            .finish()
    }
}

impl SharedBuffer {
    /// Allocate (or attach to) a buffer holding `capacity` payload elements
    pub fn create(capacity: usize, buffer_type: BufferType, allocator: &dyn RegionAllocator) -> HubResult<Self> {
        let region = allocator.allocate(buffer_type, capacity + TRAILER_LEN)?;
        Self::from_region(region, buffer_type)
    }

    pub fn from_region(region: Arc<dyn SharedRegion>, buffer_type: BufferType) -> HubResult<Self> {
        if region.len() < TRAILER_LEN {
            return Err(HubError::Invalid(format!(
                "shared region of {} elements cannot hold the buffer trailer",
                region.len()
            )));
        }
        let capacity = region.len() - TRAILER_LEN;
        Ok(Self {
            region,
            capacity,
            buffer_type,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    fn slot(&self, index: usize) -> &AtomicU64 {
        debug_assert!(index < self.region.len());
        // SAFETY: index is inside the region, the region is 8-byte aligned
        // and outlives `self`, and trailer slots are only ever accessed
        // through this atomic view.
        unsafe { &*(self.region.as_ptr().add(index) as *const AtomicU64) }
    }

    fn length_slot(&self) -> &AtomicU64 {
        self.slot(self.capacity)
    }

    fn state_slot(&self) -> &AtomicU64 {
        self.slot(self.capacity + 1)
    }

    /// Current state; `None` before any state was written
    pub fn state(&self) -> Option<BufferState> {
        BufferState::from_code(f64::from_bits(self.state_slot().load(Ordering::Acquire)))
    }

    pub fn set_state(&self, state: BufferState) {
        self.state_slot()
            .store((state.code() as f64).to_bits(), Ordering::Release);
    }

    /// Flip to `new` only if the buffer is still in `current`
    pub fn compare_and_set_state(&self, current: BufferState, new: BufferState) -> bool {
        self.state_slot()
            .compare_exchange(
                (current.code() as f64).to_bits(),
                (new.code() as f64).to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Number of valid leading payload elements
    pub fn length(&self) -> usize {
        f64::from_bits(self.length_slot().load(Ordering::Acquire)) as usize
    }

    pub fn set_length(&self, length: usize) -> HubResult<()> {
        if length > self.capacity {
            return Err(HubError::Capacity(format!(
                "payload length {} exceeds buffer capacity {}",
                length, self.capacity
            )));
        }
        self.length_slot()
            .store((length as f64).to_bits(), Ordering::Release);
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> HubResult<()> {
        if start > end || end > self.capacity {
            return Err(HubError::Capacity(format!(
                "view [{}, {}) outside payload of capacity {}",
                start, end, self.capacity
            )));
        }
        Ok(())
    }

    /// Read-only view of payload elements `[start, end)`
    ///
    /// # Safety
    ///
    /// No rank may write the range while the returned slice is alive. The
    /// buffer state must grant the caller read access.
    pub unsafe fn view(&self, start: usize, end: usize) -> HubResult<&[f64]> {
        self.check_range(start, end)?;
        Ok(std::slice::from_raw_parts(self.region.as_ptr().add(start), end - start))
    }

    /// Writable view of payload elements `[start, end)`
    ///
    /// # Safety
    ///
    /// The caller must be the only rank touching the range while the
    /// returned slice is alive. The buffer state must grant the caller write
    /// access.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn view_mut(&self, start: usize, end: usize) -> HubResult<&mut [f64]> {
        self.check_range(start, end)?;
        Ok(std::slice::from_raw_parts_mut(self.region.as_ptr().add(start), end - start))
    }
}
