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

//! Hub lifecycle for one rank
//!
//! `new` sets the pipeline up (collective over the world), `start` runs the
//! calling rank's role until the simulation ends, `stop` releases the
//! simulator connection.

use std::sync::Arc;

use log::{debug, info};

use crate::buffer::{BufferState, BufferType, SharedBuffer};
use crate::communicators::{
    DeliveryProtocol, IngestProtocol, ReceiverCommunicator, SenderCommunicator, TransformerCommunicator,
    TransformerPeers,
};
use crate::ctx::HubContext;
use crate::error::{HubError, HubResult};
use crate::net::{Connection, DataExchangeDirection, Rank};
use crate::params::HubParameters;
use crate::topology::{Role, RoleTopology};
use crate::translation::{
    KernelRateConverter, RateToSpikesTranslator, SpikeTrainTranslator, SpikesToRateTranslator, TranslatedPayload,
    TranslationFunction,
};

pub struct HubManager {
    ctx: Arc<HubContext>,
    direction: DataExchangeDirection,
    params: HubParameters,
    topology: RoleTopology,
    buffer: SharedBuffer,
    role: Role,
    translator: Option<Arc<dyn TranslationFunction>>,
    connection: Option<Connection>,
    last_result: Option<TranslatedPayload>,
}

fn default_translator(
    direction: DataExchangeDirection,
    params: &HubParameters,
) -> HubResult<Arc<dyn TranslationFunction>> {
    Ok(match direction {
        DataExchangeDirection::NestToTvb => Arc::new(SpikesToRateTranslator::new(
            Arc::new(KernelRateConverter::from_params(params)?),
            params.first_neuron_id,
            params.nb_neurons,
        )),
        DataExchangeDirection::TvbToNest => Arc::new(RateToSpikesTranslator::new(
            Arc::new(KernelRateConverter::from_params(params)?),
            params.nb_neurons,
        )),
        DataExchangeDirection::NestToLfpy => {
            Arc::new(SpikeTrainTranslator::new(params.first_neuron_id, params.nb_neurons))
        }
    })
}

impl HubManager {
    /// Set the pipeline up with the default translation of `direction`
    pub fn new(ctx: Arc<HubContext>, direction: DataExchangeDirection, params: HubParameters) -> HubResult<Self> {
        Self::with_translator(ctx, direction, params, None)
    }

    /// Set the pipeline up, translating with `translator` when given
    ///
    /// Collective over the world communicator of `ctx`.
    pub fn with_translator(
        ctx: Arc<HubContext>,
        direction: DataExchangeDirection,
        params: HubParameters,
        translator: Option<Arc<dyn TranslationFunction>>,
    ) -> HubResult<Self> {
        params.validate()?;
        let rank = ctx.get_rank();

        let (receiver_ranks, sender_ranks) = params.role_ranks(direction);
        if direction.has_sender() && sender_ranks.is_empty() {
            return Err(HubError::Config(format!("{} needs at least one sender rank", direction)));
        }
        if !direction.has_sender() && !sender_ranks.is_empty() {
            return Err(HubError::Config(format!("{} is one-way and takes no sender ranks", direction)));
        }

        let topology = RoleTopology::build(ctx.world().as_ref(), &receiver_ranks, &sender_ranks)?;
        let role = topology
            .role_of(rank)
            .ok_or_else(|| HubError::Config(format!("rank {} has no role", rank)))?;
        crate::hub_info!(rank, "{} topology: {:?}", direction, topology);

        let buffer = SharedBuffer::create(
            params.buffer_capacity(direction),
            BufferType::Input,
            ctx.allocator().as_ref(),
        )?;
        if Some(rank) == topology.root_of(Role::Receiver) {
            buffer.set_length(0)?;
            buffer.set_state(BufferState::ReadyToReceive);
        }
        ctx.barrier()?;

        let translator = match (role, translator) {
            (Role::Transformer, Some(translator)) => Some(translator),
            (Role::Transformer, None) => Some(default_translator(direction, &params)?),
            _ => None,
        };

        let connection = if Some(rank) == topology.root_of(role) && role != Role::Transformer {
            Some(ctx.endpoint().open_and_accept(direction, role)?)
        } else {
            None
        };
        debug!("rank {}: set up as {}", rank, role);

        Ok(Self {
            ctx,
            direction,
            params,
            topology,
            buffer,
            role,
            translator,
            connection,
            last_result: None,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn direction(&self) -> DataExchangeDirection {
        self.direction
    }

    pub fn topology(&self) -> &RoleTopology {
        &self.topology
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Last translation kept by the transformer root of a one-way pipeline
    pub fn last_result(&self) -> Option<&TranslatedPayload> {
        self.last_result.as_ref()
    }

    fn root(&self, role: Role) -> HubResult<Rank> {
        self.topology
            .root_of(role)
            .ok_or_else(|| HubError::Config(format!("no {} rank configured", role)))
    }

    /// Run the calling rank's role until the simulation ends
    pub fn start(&mut self) -> HubResult<()> {
        let rank = self.ctx.get_rank();
        crate::hub_info!(rank, "starting the {} pipeline", self.direction);
        match self.role {
            Role::Receiver => self.run_receiver(),
            Role::Transformer => self.run_transformer(),
            Role::Sender => self.run_sender(),
        }
    }

    fn run_receiver(&mut self) -> HubResult<()> {
        let connection = match &self.connection {
            Some(connection) => connection,
            None => {
                debug!("rank {}: receiver rank without a connection, idle", self.ctx.get_rank());
                return Ok(());
            }
        };
        let protocol = match self.direction {
            DataExchangeDirection::TvbToNest => IngestProtocol::Rates,
            DataExchangeDirection::NestToTvb | DataExchangeDirection::NestToLfpy => IngestProtocol::Spikes,
        };
        ReceiverCommunicator::new(
            connection.inter_comm.as_ref(),
            self.ctx.world().as_ref(),
            &self.buffer,
            protocol,
            self.root(Role::Transformer)?,
            self.topology.is_one_way(),
            self.params.poll_interval(),
        )
        .run()
    }

    fn run_transformer(&mut self) -> HubResult<()> {
        let group = self
            .topology
            .role_comm()
            .cloned()
            .ok_or_else(|| HubError::Invalid("transformer rank without a group communicator".to_string()))?;
        let translator = self
            .translator
            .clone()
            .ok_or_else(|| HubError::Invalid("transformer rank without a translation function".to_string()))?;
        let translated_root = self
            .topology
            .translated_root_of(Role::Transformer)
            .ok_or_else(|| HubError::Config("no transformer rank configured".to_string()))?;

        let status_source = if self.topology.is_one_way() {
            self.root(Role::Receiver)?
        } else {
            self.root(Role::Sender)?
        };
        let peers = TransformerPeers {
            status_source,
            sender_root: self.topology.root_of(Role::Sender),
        };

        let mut transformer = TransformerCommunicator::new(
            self.ctx.world().as_ref(),
            group.as_ref(),
            &self.buffer,
            translator.as_ref(),
            peers,
            translated_root,
            self.params.poll_interval(),
        );
        let result = transformer.run();
        self.last_result = transformer.last_result().cloned();
        result
    }

    fn run_sender(&mut self) -> HubResult<()> {
        let connection = match &self.connection {
            Some(connection) => connection,
            None => {
                debug!("rank {}: sender rank without a connection, idle", self.ctx.get_rank());
                return Ok(());
            }
        };
        let protocol = match self.direction {
            DataExchangeDirection::NestToTvb => DeliveryProtocol::Rates,
            DataExchangeDirection::TvbToNest => DeliveryProtocol::Spikes {
                first_generator_id: self.params.first_spike_generator_id,
            },
            DataExchangeDirection::NestToLfpy => {
                return Err(HubError::Config(format!("{} has no sender", self.direction)))
            }
        };
        SenderCommunicator::new(
            connection.inter_comm.as_ref(),
            self.ctx.world().as_ref(),
            protocol,
            self.root(Role::Transformer)?,
        )
        .run()
    }

    /// Close the simulator connection held by this rank, if any
    pub fn stop(&mut self) -> HubResult<()> {
        match self.connection.take() {
            Some(connection) => {
                info!("rank {}: closing {} connection", self.ctx.get_rank(), self.role);
                self.ctx.endpoint().close(connection)
            }
            None => {
                debug!("rank {}: nothing to close", self.ctx.get_rank());
                Ok(())
            }
        }
    }
}
