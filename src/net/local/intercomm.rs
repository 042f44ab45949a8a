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

//! In-process inter-communicator
//!
//! A [`LocalLink`] joins a single-rank hub side to an `n`-rank simulator
//! side. Both sides implement [`InterComm`], so simulator mocks speak the
//! same API the hub does.

use std::sync::Arc;

use crate::error::{HubError, HubResult};
use crate::net::{Envelope, InterComm, Rank, Tag};

use super::mailbox::{Mailbox, Message, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Hub,
    Simulator,
}

/// Both directions of one hub <-> simulator link
pub struct LocalLink {
    to_hub: Mailbox,
    to_simulator: Mailbox,
    simulator_size: i32,
}

impl LocalLink {
    /// Create a link and return the hub end plus one end per simulator rank
    pub fn pair(simulator_size: i32) -> (LocalInterComm, Vec<LocalInterComm>) {
        let link = Arc::new(LocalLink {
            to_hub: Mailbox::new(),
            to_simulator: Mailbox::new(),
            simulator_size,
        });
        let hub = LocalInterComm {
            link: link.clone(),
            side: Side::Hub,
            rank: 0,
            connected: true,
        };
        let simulator = (0..simulator_size)
            .map(|rank| LocalInterComm {
                link: link.clone(),
                side: Side::Simulator,
                rank,
                connected: true,
            })
            .collect();
        (hub, simulator)
    }

    /// Messages posted toward the hub and not yet received
    pub fn pending_to_hub(&self) -> usize {
        self.to_hub.pending()
    }
}

/// One end of a [`LocalLink`]
pub struct LocalInterComm {
    link: Arc<LocalLink>,
    side: Side,
    rank: Rank,
    connected: bool,
}

impl LocalInterComm {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn link(&self) -> Arc<LocalLink> {
        self.link.clone()
    }

    fn inbox(&self) -> &Mailbox {
        match self.side {
            Side::Hub => &self.link.to_hub,
            Side::Simulator => &self.link.to_simulator,
        }
    }

    fn outbox(&self) -> &Mailbox {
        match self.side {
            Side::Hub => &self.link.to_simulator,
            Side::Simulator => &self.link.to_hub,
        }
    }

    fn ensure_connected(&self) -> HubResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(HubError::Communication("inter-communicator already disconnected".to_string()))
        }
    }

    fn post(&self, payload: Payload, dest: Rank, tag: Tag) -> HubResult<()> {
        self.ensure_connected()?;
        if dest < 0 || dest >= self.remote_size() {
            return Err(HubError::Invalid(format!(
                "remote rank {} outside remote group of size {}",
                dest,
                self.remote_size()
            )));
        }
        self.outbox().post(Message {
            source: self.rank,
            dest,
            tag,
            payload,
        })
    }

    fn take(&self, source: Option<Rank>, tag: Option<Tag>) -> HubResult<Message> {
        self.ensure_connected()?;
        self.inbox().take(self.rank, source, tag)
    }
}

fn copy_into<T: Copy>(buf: &mut [T], values: &[T], message: &Message) -> HubResult<Envelope> {
    if values.len() > buf.len() {
        return Err(HubError::Communication(format!(
            "message truncated: {} elements from rank {} into a buffer of {}",
            values.len(),
            message.source,
            buf.len()
        )));
    }
    buf[..values.len()].copy_from_slice(values);
    Ok(Envelope {
        source: message.source,
        tag: message.tag,
        count: values.len(),
    })
}

impl InterComm for LocalInterComm {
    fn remote_size(&self) -> i32 {
        match self.side {
            Side::Hub => self.link.simulator_size,
            Side::Simulator => 1,
        }
    }

    fn recv_signal(&self, source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        let message = self.take(source, tag)?;
        match message.payload {
            Payload::Signal(_) => Ok(Envelope {
                source: message.source,
                tag: message.tag,
                count: 1,
            }),
            _ => Err(message.type_error("signal")),
        }
    }

    fn send_signal(&self, dest: Rank, tag: Tag) -> HubResult<()> {
        self.post(Payload::Signal(true), dest, tag)
    }

    fn recv_i32s(&self, buf: &mut [i32], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        let message = self.take(source, tag)?;
        match &message.payload {
            Payload::I32(values) => copy_into(buf, values, &message),
            _ => Err(message.type_error("int32")),
        }
    }

    fn recv_f64s(&self, buf: &mut [f64], source: Option<Rank>, tag: Option<Tag>) -> HubResult<Envelope> {
        let message = self.take(source, tag)?;
        match &message.payload {
            Payload::F64(values) => copy_into(buf, values, &message),
            _ => Err(message.type_error("float64")),
        }
    }

    fn send_i32s(&self, data: &[i32], dest: Rank, tag: Tag) -> HubResult<()> {
        self.post(Payload::I32(data.to_vec()), dest, tag)
    }

    fn send_f64s(&self, data: &[f64], dest: Rank, tag: Tag) -> HubResult<()> {
        self.post(Payload::F64(data.to_vec()), dest, tag)
    }

    fn disconnect(&mut self) -> HubResult<()> {
        self.ensure_connected()?;
        self.connected = false;
        if self.side == Side::Hub {
            self.link.to_hub.close()?;
            self.link.to_simulator.close()?;
        }
        Ok(())
    }
}
