//! Per-call context: the invocation data split from the guest's linear
//! memory so both can be borrowed at once, plus bounds-checked address
//! translation.

use wasmtime::Caller;

use crate::externs::Externs;
use crate::syscalls::error::{ClassifyResult as _, Result};
use crate::syscalls::InvocationData;

pub(crate) struct Context<'a, E: Externs> {
    pub data: &'a mut InvocationData<E>,
    pub memory: Memory<'a>,
}

/// Runs `f` with the caller's context. Fails (fatally) when the module
/// exports no memory; instantiation requires one, so this only trips for
/// calls made before the instance is fully set up.
pub(crate) fn with_context<E: Externs, R>(
    caller: &mut Caller<'_, InvocationData<E>>,
    f: impl FnOnce(Context<'_, E>) -> Result<R>,
) -> Result<R> {
    let (memory, data) = caller
        .get_export("memory")
        .and_then(|m| m.into_memory())
        .ok_or("no exported guest memory")
        .or_fatal()?
        .data_and_store_mut(caller);
    f(Context {
        data,
        memory: Memory { memory },
    })
}

/// The guest's linear memory. All pointer arguments are offsets into this
/// and must be translated through here; a range that is not entirely inside
/// the guest's memory refuses the call.
pub(crate) struct Memory<'a> {
    memory: &'a mut [u8],
}

impl<'a> Memory<'a> {
    pub fn try_slice(&self, offset: u32, len: u32) -> Result<&[u8]> {
        self.memory
            .get(offset as usize..)
            .and_then(|data| data.get(..len as usize))
            .ok_or_else(|| format!("buffer {} (length {}) out of bounds", offset, len))
            .or_illegal_argument()
    }

    pub fn try_slice_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8]> {
        self.memory
            .get_mut(offset as usize..)
            .and_then(|data| data.get_mut(..len as usize))
            .ok_or_else(|| format!("buffer {} (length {}) out of bounds", offset, len))
            .or_illegal_argument()
    }

    /// Reads a NUL-terminated UTF-8 string starting at `offset`. The
    /// terminator must lie inside the guest's memory.
    pub fn read_cstr(&self, offset: u32) -> Result<&str> {
        let tail = self
            .memory
            .get(offset as usize..)
            .ok_or_else(|| format!("string pointer {} out of bounds", offset))
            .or_illegal_argument()?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or("unterminated string reaches end of guest memory")
            .or_illegal_argument()?;
        std::str::from_utf8(&tail[..end]).or_illegal_argument()
    }
}
