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

//! Logging utilities
//!
//! Uses the `log` facade with `env_logger` as the backend. Every hub rank
//! logs; the rank-gated helpers keep the output of large runs readable by
//! letting rank 0 speak for the group.

use log::{debug, info};

use crate::net::Rank;

/// Initialize logging with default configuration, honouring `RUST_LOG`
pub fn init_logging() {
    env_logger::init();
}

/// Initialize logging with specific level
pub fn init_logging_with_level(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

/// Logger for test binaries; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `info` on rank 0, `debug` elsewhere
pub fn info_log_message(rank: Rank, msg: &str) {
    if rank == 0 {
        info!("{}", msg);
    } else {
        debug!("rank {}: {}", rank, msg);
    }
}

/// `debug` on rank 0 only
pub fn debug_log_message(rank: Rank, msg: &str) {
    if rank == 0 {
        debug!("{}", msg);
    }
}

/// Log macros mirroring the helpers above, with format arguments
#[macro_export]
macro_rules! hub_info {
    ($rank:expr, $($arg:tt)*) => {
        $crate::util::logging::info_log_message($rank, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! hub_debug {
    ($rank:expr, $($arg:tt)*) => {
        $crate::util::logging::debug_log_message($rank, &format!($($arg)*))
    };
}
