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

//! Blocking message queue shared by the in-process communicators
//!
//! Matching follows MPI rules: a receive takes the oldest message addressed
//! to it that matches the requested source and tag, so messages from one
//! source are never overtaken.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{HubError, HubResult};
use crate::net::{Rank, Tag};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Bytes(Vec<u8>),
    Signal(bool),
    I32(Vec<i32>),
    F64(Vec<f64>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Signal(_) => "signal",
            Payload::I32(_) => "int32",
            Payload::F64(_) => "float64",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Message {
    pub source: Rank,
    pub dest: Rank,
    pub tag: Tag,
    pub payload: Payload,
}

impl Message {
    pub fn type_error(&self, expected: &str) -> HubError {
        HubError::Communication(format!(
            "expected {} message from rank {} with tag {}, got {}",
            expected,
            self.source,
            self.tag,
            self.payload.kind()
        ))
    }
}

#[derive(Default)]
struct Queue {
    messages: VecDeque<Message>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct Mailbox {
    queue: Mutex<Queue>,
    arrived: Condvar,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> HubResult<MutexGuard<'_, Queue>> {
        self.queue
            .lock()
            .map_err(|_| HubError::Communication("mailbox lock poisoned".to_string()))
    }

    pub fn post(&self, message: Message) -> HubResult<()> {
        let mut queue = self.lock()?;
        if queue.closed {
            return Err(HubError::Communication(format!(
                "send to rank {} on a closed link",
                message.dest
            )));
        }
        queue.messages.push_back(message);
        self.arrived.notify_all();
        Ok(())
    }

    /// Block until a matching message arrives
    pub fn take(&self, dest: Rank, source: Option<Rank>, tag: Option<Tag>) -> HubResult<Message> {
        let mut queue = self.lock()?;
        loop {
            let position = queue.messages.iter().position(|m| {
                m.dest == dest
                    && source.map_or(true, |s| m.source == s)
                    && tag.map_or(true, |t| m.tag == t)
            });
            if let Some(index) = position {
                if let Some(message) = queue.messages.remove(index) {
                    return Ok(message);
                }
            }
            if queue.closed {
                return Err(HubError::Communication(format!(
                    "link closed while rank {} waited for a message",
                    dest
                )));
            }
            queue = self
                .arrived
                .wait(queue)
                .map_err(|_| HubError::Communication("mailbox lock poisoned".to_string()))?;
        }
    }

    /// Wake every blocked receiver and refuse further traffic
    pub fn close(&self) -> HubResult<()> {
        let mut queue = self.lock()?;
        queue.closed = true;
        self.arrived.notify_all();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.messages.len()).unwrap_or(0)
    }
}
