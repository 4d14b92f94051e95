// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Error plumbing for native calls.
//!
//! Nothing here ever crosses the guest boundary as a trap: the binding layer
//! in [`super`] reduces every `ExecutionError` to the function's designated
//! sentinel. `Fatal` marks host-side faults that shouldn't happen (they are
//! logged at error level); `Syscall` is the ordinary failure path.

use std::fmt::Display;

use akira_shared::error::ErrorNumber;

pub(crate) type Result<T> = std::result::Result<T, ExecutionError>;

/// A failed native call: human-readable cause plus the taxonomy number the
/// sentinel derives from.
#[derive(Debug, Clone, thiserror::Error)]
#[error("syscall error: {0} ({1})")]
pub(crate) struct SyscallError(pub String, pub ErrorNumber);

impl SyscallError {
    /// A host-subsystem failure surfaced through the bridge.
    pub fn host(op: &'static str, number: ErrorNumber) -> Self {
        SyscallError(format!("{} failed", op), number)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExecutionError {
    #[error("{0}")]
    Syscall(#[from] SyscallError),
    #[error("fatal error: {0:#}")]
    Fatal(anyhow::Error),
}

impl ExecutionError {
    /// The sentinel the calling guest sees for this failure.
    pub fn sentinel(&self) -> i32 {
        match self {
            ExecutionError::Syscall(SyscallError(_, number)) => number.sentinel(),
            ExecutionError::Fatal(_) => ErrorNumber::Io.sentinel(),
        }
    }
}

/// Constructs a [`SyscallError`] from an [`ErrorNumber`] variant name and a
/// format string.
macro_rules! syscall_error {
    ($number:ident; $msg:literal $(, $ex:expr)*) => {
        $crate::syscalls::error::SyscallError(
            format!($msg $(, $ex)*),
            akira_shared::error::ErrorNumber::$number,
        )
    };
}
pub(crate) use syscall_error;

/// Extension trait classifying ordinary errors into syscall or fatal errors.
pub(crate) trait ClassifyResult: Sized {
    type Value;

    fn or_error(self, number: ErrorNumber) -> Result<Self::Value>;
    fn or_fatal(self) -> Result<Self::Value>;

    fn or_illegal_argument(self) -> Result<Self::Value> {
        self.or_error(ErrorNumber::IllegalArgument)
    }
}

impl<T, E: Display> ClassifyResult for std::result::Result<T, E> {
    type Value = T;

    fn or_error(self, number: ErrorNumber) -> Result<T> {
        self.map_err(|e| SyscallError(e.to_string(), number).into())
    }

    fn or_fatal(self) -> Result<T> {
        self.map_err(|e| ExecutionError::Fatal(anyhow::anyhow!("{}", e)))
    }
}
