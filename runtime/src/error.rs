// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use akira_shared::error::ErrorNumber;

/// Result type for lifecycle operations surfaced to the supervisor.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by lifecycle operations.
///
/// Native calls never produce one of these across the guest boundary; they
/// reduce to sentinels (see [`akira_shared::error::ErrorNumber::sentinel`]).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("runtime not initialized")]
    NotInitialized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("permission denied: {0}")]
    Forbidden(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("not supported: {0}")]
    Unsupported(String),
}

impl RuntimeError {
    /// The taxonomy number this error reduces to.
    pub fn number(&self) -> ErrorNumber {
        match self {
            RuntimeError::IllegalArgument(_) => ErrorNumber::IllegalArgument,
            RuntimeError::NotInitialized => ErrorNumber::NotInitialized,
            RuntimeError::NotFound(_) => ErrorNumber::NotFound,
            RuntimeError::OutOfMemory(_) => ErrorNumber::OutOfMemory,
            RuntimeError::Io(_) => ErrorNumber::Io,
            RuntimeError::Forbidden(_) => ErrorNumber::Forbidden,
            RuntimeError::QuotaExceeded(_) => ErrorNumber::QuotaExceeded,
            RuntimeError::Unsupported(_) => ErrorNumber::Unsupported,
        }
    }
}
