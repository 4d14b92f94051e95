// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Capability-guarded WebAssembly application runtime for AkiraOS.
//!
//! Guests are WASM modules installed into a fixed table of slots. Each
//! declares its capabilities and memory quota in an embedded manifest (or a
//! JSON sidecar); every host function it imports is gated on the resulting
//! capability mask and every dynamic allocation is counted against the
//! quota. A guest that misbehaves gets error sentinels and log lines, never
//! a host crash.
//!
//! ## Logging
//!
//! This package emits logs using the log façade. Configure the logging
//! backend of your choice during the initialization of the consuming
//! application. Guest `log()` output is emitted under the `guest` target.

pub use apps::{SlotId, TableView};
pub use error::{Result, RuntimeError};
pub use lifecycle::{Runtime, RuntimeConfig};
pub use manifest::{Manifest, ManifestError, MANIFEST_SECTION};

pub mod arena;
pub mod error;
pub mod externs;
pub mod lifecycle;
pub mod manifest;

mod alloc;
mod apps;
mod engine;
mod loader;
mod syscalls;
