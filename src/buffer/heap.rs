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

//! Heap-backed shared region for the in-process backend

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{HubError, HubResult};

use super::{BufferType, RegionAllocator, SharedRegion};

/// Zero-initialised block of `f64` slots living on the heap
pub struct HeapRegion {
    slots: Box<[AtomicU64]>,
}

impl HeapRegion {
    pub fn new(elements: usize) -> Self {
        Self {
            slots: (0..elements).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

// SAFETY: `AtomicU64` has the size and alignment of `f64`, the boxed slice
// never moves, and all threads share the same allocation.
unsafe impl SharedRegion for HeapRegion {
    fn as_ptr(&self) -> *mut f64 {
        self.slots.as_ptr() as *mut f64
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Hands every rank thread the same region per [`BufferType`]
///
/// The first call for a type allocates, later calls attach.
#[derive(Default)]
pub struct LocalRegionAllocator {
    regions: Mutex<HashMap<BufferType, Arc<HeapRegion>>>,
}

impl LocalRegionAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionAllocator for LocalRegionAllocator {
    fn allocate(&self, buffer_type: BufferType, elements: usize) -> HubResult<Arc<dyn SharedRegion>> {
        let mut regions = self
            .regions
            .lock()
            .map_err(|_| HubError::Communication("region registry lock poisoned".to_string()))?;

        if let Some(region) = regions.get(&buffer_type) {
            if region.len() != elements {
                return Err(HubError::Invalid(format!(
                    "{:?} buffer already allocated with {} elements, requested {}",
                    buffer_type,
                    region.len(),
                    elements
                )));
            }
            debug!("attached to {:?} buffer of {} elements", buffer_type, elements);
            return Ok(region.clone());
        }

        let region = Arc::new(HeapRegion::new(elements));
        regions.insert(buffer_type, region.clone());
        debug!("allocated {:?} buffer of {} elements", buffer_type, elements);
        Ok(region)
    }
}
