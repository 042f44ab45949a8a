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

//! InterscaleHub launcher
//!
//! Started under `mpirun` with one process per hub rank. Every role root
//! prints its endpoint record on stdout before accepting the simulator.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info, LevelFilter};

use interscale_hub::util::logging::init_logging_with_level;
use interscale_hub::{DataExchangeDirection, HubContext, HubManager, HubParameters, HubResult, Status};

#[derive(Parser, Debug)]
#[command(name = "interscale-hub")]
#[command(about = "Co-simulation hub between spiking and rate-based simulators", long_about = None)]
struct Args {
    /// Exchange direction: NEST_TO_TVB, TVB_TO_NEST or NEST_TO_LFPY
    #[arg(short, long)]
    direction: DataExchangeDirection,

    /// JSON parameter file; built-in defaults when omitted
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,
}

fn run(args: &Args) -> HubResult<()> {
    let params = match &args.params {
        Some(path) => HubParameters::from_file(path)?,
        None => HubParameters::default(),
    };

    let ctx = HubContext::init_mpi()?;
    let rank = ctx.get_rank();
    info!("rank {} of {}: {} hub", rank, ctx.get_world_size(), args.direction);

    let mut manager = HubManager::new(ctx.clone(), args.direction, params)?;
    let result = manager.start();
    let stopped = manager.stop();
    result?;
    stopped?;
    // Reached on clean shutdown only. Ranks still running when another rank
    // failed block here until the launcher tears the job down.
    ctx.barrier()
}

fn main() {
    let args = Args::parse();
    init_logging_with_level(args.log_level);

    let status = Status::from(run(&args));
    if !status.is_ok() {
        error!("hub failed: {} ({})", status.get_msg(), status.get_code());
    }
    process::exit(status.exit_code());
}
