// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Chunked module loading.
//!
//! The engine needs the whole binary in memory to parse it, but on target
//! hardware the supervisor's buffer may sit in internal SRAM that native
//! services are competing for. When an external pool exists and the binary
//! is larger than one staging chunk, the binary is relocated into a
//! whole-size external buffer, copied one fixed-size chunk at a time, and
//! the engine parses from there; peak internal-RAM usage stays bounded by
//! the chunk size. Small binaries, or boards without external RAM, parse
//! straight from the supplied buffer.

use crate::arena::{MemoryArena, PoolSource};
use crate::engine::{Engine, Module};
use crate::error::{Result, RuntimeError};
use crate::lifecycle::RuntimeConfig;
use crate::manifest::WASM_MAGIC;

pub(crate) fn load(
    engine: &Engine,
    arena: &MemoryArena,
    config: &RuntimeConfig,
    bytes: &[u8],
) -> Result<Module> {
    if bytes.len() < 8 {
        return Err(RuntimeError::IllegalArgument(
            "module shorter than the wasm header".to_owned(),
        ));
    }
    if bytes[..4] != WASM_MAGIC {
        return Err(RuntimeError::IllegalArgument(
            "missing wasm magic".to_owned(),
        ));
    }

    let chunk_bytes = config.chunk_bytes;
    if bytes.len() <= chunk_bytes || !arena.has_external() {
        return engine.load(bytes);
    }

    let mut chunk = arena
        .alloc_preferring_external(chunk_bytes)
        .ok_or_else(|| RuntimeError::OutOfMemory("staging chunk".to_owned()))?;
    if chunk.source() == PoolSource::Internal {
        // External pool exists but is too full to stage through; relocating
        // buys nothing, so parse from the supplied buffer.
        drop(chunk);
        return engine.load(bytes);
    }

    let mut staged = arena
        .alloc_external(bytes.len())
        .ok_or_else(|| RuntimeError::OutOfMemory("whole-binary staging buffer".to_owned()))?;
    for (i, piece) in bytes.chunks(chunk_bytes).enumerate() {
        chunk[..piece.len()].copy_from_slice(piece);
        let offset = i * chunk_bytes;
        staged[offset..offset + piece.len()].copy_from_slice(&chunk[..piece.len()]);
    }

    let module = engine.load(&staged);
    // The chunk goes back to the pool as soon as the engine's load returns;
    // the staged buffer follows now that the engine holds its own copy.
    drop(chunk);
    drop(staged);
    module
}
