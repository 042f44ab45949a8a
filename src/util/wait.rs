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

//! Sleep-poll waiting on shared state

use std::thread;
use std::time::Duration;

use crate::buffer::{BufferState, SharedBuffer};

/// Default pause between two polls of the buffer state
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Block until `predicate` holds, sleeping `poll_interval` between checks
///
/// There is no timeout.
pub fn wait_until<F>(mut predicate: F, poll_interval: Duration)
where
    F: FnMut() -> bool,
{
    while !predicate() {
        thread::sleep(poll_interval);
    }
}

/// Block until the buffer reaches `state`
pub fn wait_for_state(buffer: &SharedBuffer, state: BufferState, poll_interval: Duration) {
    wait_until(|| buffer.state() == Some(state), poll_interval)
}
