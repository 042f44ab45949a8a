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

//! Tests for the shared buffer state machine

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use interscale_hub::buffer::{
    check_element_size, BufferState, BufferType, LocalRegionAllocator, RegionAllocator, SharedBuffer,
    TRAILER_LEN,
};
use interscale_hub::error::{Code, HubError};
use interscale_hub::util::wait_for_state;

fn create_buffer(capacity: usize) -> SharedBuffer {
    let allocator = LocalRegionAllocator::new();
    SharedBuffer::create(capacity, BufferType::Input, &allocator).unwrap()
}

#[test]
fn test_fresh_buffer_has_no_state() {
    let buffer = create_buffer(16);
    assert_eq!(buffer.capacity(), 16);
    assert_eq!(buffer.buffer_type(), BufferType::Input);
    assert_eq!(buffer.state(), None);
    assert_eq!(buffer.length(), 0);
}

#[test]
fn test_state_codes() {
    assert_eq!(BufferState::ReadyToReceive.code(), 1);
    assert_eq!(BufferState::ReadyToTransform.code(), 2);
    assert_eq!(BufferState::ReadyToSend.code(), 3);
    assert_eq!(BufferState::Wait.code(), 4);
    assert_eq!(BufferState::Terminate.code(), 5);
    assert_eq!(BufferState::from_code(2.0), Some(BufferState::ReadyToTransform));
    assert_eq!(BufferState::from_code(0.0), None);
    assert_eq!(BufferState::from_code(9.0), None);
    assert_eq!(BufferState::ReadyToReceive.to_string(), "READY_TO_RECEIVE");
}

#[test]
fn test_state_and_length_round_trip() {
    let buffer = create_buffer(8);
    buffer.set_state(BufferState::ReadyToReceive);
    buffer.set_length(5).unwrap();
    assert_eq!(buffer.state(), Some(BufferState::ReadyToReceive));
    assert_eq!(buffer.length(), 5);

    buffer.set_length(8).unwrap();
    assert_eq!(buffer.length(), 8);
}

#[test]
fn test_length_beyond_capacity_is_rejected() {
    let buffer = create_buffer(8);
    buffer.set_length(3).unwrap();
    let err = buffer.set_length(9).unwrap_err();
    assert_eq!(err.code(), Code::CapacityError);
    assert_eq!(buffer.length(), 3);
}

#[test]
fn test_compare_and_set_only_from_expected_state() {
    let buffer = create_buffer(4);
    buffer.set_state(BufferState::Terminate);
    assert!(!buffer.compare_and_set_state(BufferState::ReadyToTransform, BufferState::ReadyToReceive));
    assert_eq!(buffer.state(), Some(BufferState::Terminate));

    buffer.set_state(BufferState::ReadyToTransform);
    assert!(buffer.compare_and_set_state(BufferState::ReadyToTransform, BufferState::ReadyToReceive));
    assert_eq!(buffer.state(), Some(BufferState::ReadyToReceive));
}

#[test]
fn test_payload_does_not_touch_trailer() {
    let buffer = create_buffer(4);
    buffer.set_state(BufferState::ReadyToReceive);
    buffer.set_length(0).unwrap();

    unsafe {
        buffer.view_mut(0, 4).unwrap().copy_from_slice(&[1.5, 2.5, 3.5, 4.5]);
    }
    buffer.set_length(4).unwrap();

    assert_eq!(buffer.state(), Some(BufferState::ReadyToReceive));
    let data = unsafe { buffer.view(0, buffer.length()).unwrap().to_vec() };
    assert_eq!(data, vec![1.5, 2.5, 3.5, 4.5]);
}

#[test]
fn test_view_outside_payload_is_rejected() {
    let buffer = create_buffer(4);
    assert!(unsafe { buffer.view(0, 5) }.is_err());
    assert!(unsafe { buffer.view(3, 2) }.is_err());
    assert!(unsafe { buffer.view_mut(0, 4) }.is_ok());
}

#[test]
fn test_allocator_attaches_to_the_same_region() {
    let allocator = LocalRegionAllocator::new();
    let first = SharedBuffer::create(10, BufferType::Input, &allocator).unwrap();
    let second = SharedBuffer::create(10, BufferType::Input, &allocator).unwrap();

    first.set_length(7).unwrap();
    first.set_state(BufferState::ReadyToTransform);
    assert_eq!(second.length(), 7);
    assert_eq!(second.state(), Some(BufferState::ReadyToTransform));

    let region = allocator.allocate(BufferType::Input, 10 + TRAILER_LEN).unwrap();
    assert_eq!(region.len(), 10 + TRAILER_LEN);
}

#[test]
fn test_allocator_rejects_resized_attach() {
    let allocator = LocalRegionAllocator::new();
    SharedBuffer::create(10, BufferType::Input, &allocator).unwrap();
    assert!(SharedBuffer::create(11, BufferType::Input, &allocator).is_err());
    // another buffer type gets its own region
    let output = SharedBuffer::create(11, BufferType::Output, &allocator).unwrap();
    assert_eq!(output.capacity(), 11);
}

#[test]
fn test_element_size_mismatch() {
    assert!(check_element_size(8).is_ok());
    match check_element_size(4) {
        Err(HubError::BufferSizeMismatch { expected, actual }) => {
            assert_eq!(expected, 8);
            assert_eq!(actual, 4);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_state_published_across_threads() {
    let allocator = Arc::new(LocalRegionAllocator::new());
    let buffer = SharedBuffer::create(3, BufferType::Input, allocator.as_ref()).unwrap();
    buffer.set_state(BufferState::ReadyToReceive);

    let writer = {
        let allocator = allocator.clone();
        thread::spawn(move || {
            let buffer = SharedBuffer::create(3, BufferType::Input, allocator.as_ref()).unwrap();
            wait_for_state(&buffer, BufferState::ReadyToReceive, Duration::from_micros(100));
            unsafe {
                buffer.view_mut(0, 3).unwrap().copy_from_slice(&[7.0, 8.0, 9.0]);
            }
            buffer.set_length(3).unwrap();
            buffer.set_state(BufferState::ReadyToTransform);
        })
    };

    wait_for_state(&buffer, BufferState::ReadyToTransform, Duration::from_micros(100));
    let data = unsafe { buffer.view(0, buffer.length()).unwrap().to_vec() };
    assert_eq!(data, vec![7.0, 8.0, 9.0]);
    writer.join().unwrap();
}
