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

pub mod logging;
pub mod wait;

pub use self::wait::{wait_for_state, wait_until, DEFAULT_POLL_INTERVAL};

pub mod chunks {
    use std::ops::Range;

    /// Split `0..len` into `parts` contiguous ranges whose sizes differ by at
    /// most one, larger ranges first
    pub fn split_even(len: usize, parts: usize) -> Vec<Range<usize>> {
        if parts == 0 {
            return Vec::new();
        }
        let base = len / parts;
        let extra = len % parts;
        let mut start = 0;
        (0..parts)
            .map(|i| {
                let size = base + usize::from(i < extra);
                let range = start..start + size;
                start += size;
                range
            })
            .collect()
    }

    /// The chunk of `0..len` owned by `index` out of `parts`
    pub fn chunk_of(len: usize, parts: usize, index: usize) -> Range<usize> {
        split_even(len, parts)
            .into_iter()
            .nth(index)
            .unwrap_or(len..len)
    }
}
