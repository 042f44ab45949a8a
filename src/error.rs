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

//! Error handling for hub operations
//!
//! Every role loop returns a [`HubResult`]. Protocol failures are never
//! retried; the caller observes the error and decides whether to halt the
//! whole process group.

use std::fmt;

/// Numeric error codes reported through [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Invalid = 4,
    IoError = 5,
    CapacityError = 6,
    SerializationError = 11,
    AbnormalState = 20,
    BadTag = 21,
    BufferSizeMismatch = 22,
    ConfigError = 23,
    ExecutionError = 42,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Ok => write!(f, "OK"),
            Code::Invalid => write!(f, "Invalid"),
            Code::IoError => write!(f, "IO error"),
            Code::CapacityError => write!(f, "Capacity error"),
            Code::SerializationError => write!(f, "Serialization error"),
            Code::AbnormalState => write!(f, "Abnormal state"),
            Code::BadTag => write!(f, "Bad tag"),
            Code::BufferSizeMismatch => write!(f, "Buffer size mismatch"),
            Code::ConfigError => write!(f, "Configuration error"),
            Code::ExecutionError => write!(f, "Execution error"),
        }
    }
}

/// Main error type for hub operations
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    /// Remote ranks of one inter-communicator disagree on the status tag
    #[error("Abnormal state at step {step}: remote rank {rank} reported tag {tag}, rank 0 reported {expected}")]
    AbnormalState {
        step: u64,
        rank: i32,
        tag: i32,
        expected: i32,
    },

    #[error("Bad MPI tag {tag} received from rank {rank} at step {step}")]
    BadTag { step: u64, rank: i32, tag: i32 },

    #[error("Buffer size mismatch: expected element size {expected}, shared window reports {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid operation: {0}")]
    Invalid(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Communication error: {0}")]
    Communication(String),
}

impl HubError {
    /// Get the error code
    pub fn code(&self) -> Code {
        match self {
            HubError::AbnormalState { .. } => Code::AbnormalState,
            HubError::BadTag { .. } => Code::BadTag,
            HubError::BufferSizeMismatch { .. } => Code::BufferSizeMismatch,
            HubError::Config(_) => Code::ConfigError,
            HubError::Io(_) => Code::IoError,
            HubError::Json(_) => Code::SerializationError,
            HubError::Serialization(_) => Code::SerializationError,
            HubError::Invalid(_) => Code::Invalid,
            HubError::Capacity(_) => Code::CapacityError,
            HubError::Communication(_) => Code::ExecutionError,
        }
    }
}

impl From<bincode::Error> for HubError {
    fn from(error: bincode::Error) -> Self {
        HubError::Serialization(error.to_string())
    }
}

/// Type alias for Results using HubError
pub type HubResult<T> = Result<T, HubError>;

/// Outcome of a role, as reported to the launcher
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    pub fn get_code(&self) -> Code {
        self.code
    }

    pub fn get_msg(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Process exit code for the launcher: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_ok() {
            0
        } else {
            1
        }
    }
}

impl From<HubError> for Status {
    fn from(error: HubError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl From<HubResult<()>> for Status {
    fn from(result: HubResult<()>) -> Self {
        match result {
            Ok(()) => Status::ok(),
            Err(e) => e.into(),
        }
    }
}
