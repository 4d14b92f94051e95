// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use std::fmt::{self, Display, Formatter};

use num_derive::FromPrimitive;

/// The numbers a failed runtime operation or native call reduces to at the
/// guest boundary.
///
/// Numeric native calls report failure as `-(number as i32)` unless the import
/// table designates a different sentinel. The discriminants are ABI: guests
/// compiled against one runtime version must be able to interpret the
/// sentinels of another.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, FromPrimitive)]
pub enum ErrorNumber {
    /// A method parameter is invalid: null pointer, malformed input,
    /// out-of-range index.
    IllegalArgument = 1,
    /// The runtime has not been initialized yet.
    NotInitialized = 2,
    /// A requested resource does not exist: slot index, manifest section,
    /// entry point.
    NotFound = 3,
    /// An arena or engine allocation failed, or the slot table is full.
    OutOfMemory = 4,
    /// The engine failed to parse, validate, or instantiate a module, or a
    /// storage operation failed.
    Io = 5,
    /// A native call lacks the required capability.
    Forbidden = 6,
    /// An allocation would take `memory_used` past `memory_quota`.
    QuotaExceeded = 7,
    /// The requested feature is compiled out.
    Unsupported = 8,
}

impl ErrorNumber {
    /// The sentinel value numeric native calls return for this error.
    #[inline]
    pub const fn sentinel(self) -> i32 {
        -(self as i32)
    }
}

impl Display for ErrorNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorNumber::IllegalArgument => "illegal argument",
            ErrorNumber::NotInitialized => "not initialized",
            ErrorNumber::NotFound => "not found",
            ErrorNumber::OutOfMemory => "out of memory",
            ErrorNumber::Io => "i/o failure",
            ErrorNumber::Forbidden => "permission denied",
            ErrorNumber::QuotaExceeded => "quota exceeded",
            ErrorNumber::Unsupported => "not supported",
        })
    }
}

impl std::error::Error for ErrorNumber {}
