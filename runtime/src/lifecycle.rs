// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The lifecycle controller: an explicit [`Runtime`] value owned by the
//! supervisor, orchestrating install → instantiate → start → stop → destroy
//! for every slot.
//!
//! Per-slot states move `EMPTY → LOADED → RUNNING → LOADED → EMPTY`, with
//! `LOADED ↔ RUNNING` free to cycle. Lifecycle operations are expected from a
//! supervisor thread (they take `&mut self`); native calls made by running
//! guests never touch the `Runtime`, only the lock-free table view captured
//! in their execution store.

use std::sync::Arc;

use akira_shared::capability;
use wasmtime::StoreLimitsBuilder;

use crate::apps::{AppTable, SlotEntry, SlotId};
use crate::arena::MemoryArena;
use crate::engine::{Engine, GuestSession};
use crate::error::{Result, RuntimeError};
use crate::externs::Externs;
use crate::loader;
use crate::manifest::{self, ManifestError};
use crate::syscalls::{self, InvocationData};

/// Init-time configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Size of the app table.
    ///
    /// DEFAULT: 8
    pub max_slots: usize,

    /// Ceiling on each instance's linear memory, enforced engine-side.
    ///
    /// DEFAULT: 4 MiB
    pub engine_heap_bytes: usize,

    /// Guest heap grown past each instance's data, served by `mem_alloc`.
    ///
    /// DEFAULT: 64 KiB
    pub instance_heap_bytes: usize,

    /// Stack size per guest instance.
    ///
    /// DEFAULT: 512 KiB
    pub instance_stack_bytes: usize,

    /// Staging buffer size for the chunked loader.
    ///
    /// DEFAULT: 16 KiB
    pub chunk_bytes: usize,

    /// Directory sidecar manifests are persisted under.
    ///
    /// DEFAULT: `/apps`
    pub apps_root: String,

    /// Whether the arena biases plain allocations toward external RAM.
    ///
    /// DEFAULT: `true`
    pub prefer_external_ram: bool,

    /// Budget of the external arena pool; `None` models a board without
    /// external RAM.
    ///
    /// DEFAULT: 2 MiB
    pub external_pool_bytes: Option<usize>,

    /// Budget of the internal fallback pool.
    ///
    /// DEFAULT: 192 KiB
    pub internal_pool_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_slots: 8,
            engine_heap_bytes: 4 * (1 << 20),
            instance_heap_bytes: 64 * 1024,
            instance_stack_bytes: 512 * 1024,
            chunk_bytes: 16 * 1024,
            apps_root: "/apps".to_owned(),
            prefer_external_ram: true,
            external_pool_bytes: Some(2 * (1 << 20)),
            internal_pool_bytes: 192 * 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The runtime: engine, arena, app table, and the host-subsystem boundary,
/// owned as one explicit value.
pub struct Runtime<E: Externs> {
    config: RuntimeConfig,
    engine: Engine,
    linker: wasmtime::Linker<InvocationData<E>>,
    arena: Arc<MemoryArena>,
    externs: Arc<E>,
    table: AppTable<E>,
    next_instance: u64,
}

impl<E: Externs> Runtime<E> {
    pub fn new(config: RuntimeConfig, externs: E) -> Result<Self> {
        let engine = Engine::new(&config)?;
        let mut linker = wasmtime::Linker::new(engine.raw());
        syscalls::link_syscalls(&mut linker)
            .map_err(|e| RuntimeError::Io(format!("linker setup failed: {:#}", e)))?;

        let arena = Arc::new(MemoryArena::new(
            config.internal_pool_bytes,
            config.external_pool_bytes,
            config.prefer_external_ram,
        ));

        let externs = Arc::new(externs);
        if let Err(e) = externs.make_dir(&config.apps_root) {
            log::warn!("could not create apps root {:?}: {}", config.apps_root, e);
        }

        let table = AppTable::new(config.max_slots);
        Ok(Runtime {
            config,
            engine,
            linker,
            arena,
            externs,
            table,
            next_instance: 1,
        })
    }

    /// Installs a module: reserves a slot, resolves its manifest (embedded,
    /// then sidecar), stages and validates the binary, and populates the
    /// slot. The slot stays free on any failure.
    pub fn install(&mut self, bytes: &[u8], sidecar: Option<&[u8]>) -> Result<SlotId> {
        let slot = self
            .table
            .find_free_slot()
            .ok_or_else(|| RuntimeError::OutOfMemory("no free application slots".to_owned()))?;

        let embedded = match manifest::parse(bytes) {
            Ok(m) => Some(m),
            Err(ManifestError::NotFound) => None,
            Err(e @ ManifestError::Malformed(_)) => {
                return Err(RuntimeError::IllegalArgument(e.to_string()))
            }
        };
        let side = sidecar.and_then(|json| match manifest::parse_json(json) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("ignoring unusable sidecar manifest: {}", e);
                None
            }
        });

        let mut resolved = embedded.clone().or_else(|| side.clone()).unwrap_or_default();
        if embedded.is_some() {
            if let Some(side) = &side {
                // Sidecar grants union into the embedded mask; a non-zero
                // sidecar quota wins outright.
                if side.capability_mask != 0 {
                    resolved.capability_mask |= side.capability_mask;
                }
                if side.memory_quota != 0 {
                    resolved.memory_quota = side.memory_quota;
                }
            }
        }
        if !resolved.valid {
            log::info!(
                "module carries no manifest; installing slot {} with defaults",
                slot
            );
        }

        let module = loader::load(&self.engine, &self.arena, &self.config, bytes)?;

        let name = resolved
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("app{}", slot));

        let entry = self.table.entry_mut(slot).expect("reserved slot vanished");
        entry.used = true;
        entry.running = false;
        entry.name = name.clone();
        entry.version = resolved.version.clone();
        entry.module = Some(module);
        entry.shared.set_name(&name);
        entry.shared.set_mask(resolved.capability_mask);
        entry.shared.set_quota(resolved.memory_quota);

        if side.is_some() {
            if let Some(json) = sidecar {
                let path = self.sidecar_path(&name);
                if let Err(e) = self.externs.write(&path, json) {
                    log::warn!("failed to persist sidecar manifest at {:?}: {}", path, e);
                }
            }
        }

        log::info!(
            "installed {:?} in slot {} (mask {:#x}, quota {})",
            name,
            slot,
            resolved.capability_mask,
            resolved.memory_quota,
        );
        Ok(slot)
    }

    /// Instantiates the slot's module and invokes its entry export. When the
    /// entry raises, the instance is retained so the supervisor can still
    /// stop and destroy cleanly; `running` stays false.
    pub fn start(&mut self, slot: SlotId) -> Result<()> {
        if !self.table.is_valid(slot) {
            return Err(RuntimeError::NotFound(format!("slot {} is empty", slot)));
        }
        let view = self.table.view();
        let token = self.next_instance;
        self.next_instance += 1;

        let entry = self.table.entry_mut(slot).expect("validated slot vanished");
        if entry.running {
            return Err(RuntimeError::IllegalArgument(format!(
                "slot {} is already running",
                slot
            )));
        }
        // Drop any instance retained from a previous failed start.
        drop_session(entry);

        let module = entry
            .module
            .as_ref()
            .ok_or_else(|| RuntimeError::NotFound(format!("slot {} has no module", slot)))?;

        let data = InvocationData {
            token,
            table: view,
            externs: self.externs.clone(),
            arena: self.arena.clone(),
            heap: None,
            limits: StoreLimitsBuilder::new()
                .memory_size(self.config.engine_heap_bytes)
                .build(),
        };
        let session =
            GuestSession::instantiate(&self.engine, &self.linker, module, data, &self.config)?;
        entry.session = Some(session);
        entry.shared.bind_instance(token);

        let name = entry.name.clone();
        match entry
            .session
            .as_mut()
            .expect("session just installed")
            .call_entry()
        {
            Ok(()) => {
                entry.running = true;
                log::info!("started {:?} in slot {}", name, slot);
                Ok(())
            }
            Err(e @ RuntimeError::NotFound(_)) => {
                drop_session(entry);
                Err(e)
            }
            Err(e) => {
                log::error!("guest {:?} raised during entry: {}", name, e);
                Err(e)
            }
        }
    }

    /// Stops the slot's instance. Idempotent: stopping a slot with no live
    /// instance is ok.
    pub fn stop(&mut self, slot: SlotId) -> Result<()> {
        if !self.table.is_valid(slot) {
            return Err(RuntimeError::NotFound(format!("slot {} is empty", slot)));
        }
        let entry = self.table.entry_mut(slot).expect("validated slot vanished");
        if entry.session.is_some() {
            log::info!("stopped {:?} in slot {}", entry.name, slot);
        }
        drop_session(entry);
        Ok(())
    }

    /// Stops the slot, unloads its module, and frees the slot for reuse.
    /// `memory_used` returns to zero here.
    pub fn destroy(&mut self, slot: SlotId) -> Result<()> {
        if !self.table.is_valid(slot) {
            return Err(RuntimeError::NotFound(format!("slot {} is empty", slot)));
        }
        let entry = self.table.entry_mut(slot).expect("validated slot vanished");
        drop_session(entry);
        let name = std::mem::take(&mut entry.name);
        entry.clear();
        log::info!("destroyed {:?}, slot {} free", name, slot);
        Ok(())
    }

    /// Stop + destroy, removing any persisted sidecar artifact on the way.
    pub fn uninstall(&mut self, slot: SlotId) -> Result<()> {
        if !self.table.is_valid(slot) {
            return Err(RuntimeError::NotFound(format!("slot {} is empty", slot)));
        }
        let name = self
            .table
            .entry(slot)
            .expect("validated slot vanished")
            .name
            .clone();
        let path = self.sidecar_path(&name);
        if let Err(e) = self.externs.remove(&path) {
            log::debug!("no sidecar artifact removed at {:?}: {}", path, e);
        }
        self.destroy(slot)
    }

    /// Widens a guest's effective capability mask beyond its manifest, the
    /// supervisor-side half of "manifest mask ∪ external overrides".
    pub fn grant_capability(&mut self, slot: SlotId, name: &str) -> Result<()> {
        let bit = capability::bit_of(name);
        if bit == 0 {
            return Err(RuntimeError::IllegalArgument(format!(
                "unknown capability {:?}",
                name
            )));
        }
        self.valid_entry(slot)?.shared.grant(bit);
        Ok(())
    }

    /// The host-subsystem boundary this runtime dispatches into.
    pub fn externs(&self) -> &E {
        &self.externs
    }

    pub fn slot_count(&self) -> usize {
        self.table.len()
    }

    pub fn slots_in_use(&self) -> usize {
        self.table.in_use()
    }

    pub fn is_running(&self, slot: SlotId) -> bool {
        self.table.entry(slot).map_or(false, |e| e.running)
    }

    pub fn name_of(&self, slot: SlotId) -> Result<String> {
        self.valid_entry(slot).map(|e| e.name.clone())
    }

    pub fn version_of(&self, slot: SlotId) -> Result<String> {
        self.valid_entry(slot).map(|e| e.version.clone())
    }

    pub fn capability_mask(&self, slot: SlotId) -> Result<u32> {
        self.valid_entry(slot).map(|e| e.shared.mask())
    }

    pub fn memory_quota(&self, slot: SlotId) -> Result<u32> {
        self.valid_entry(slot).map(|e| e.shared.quota())
    }

    pub fn memory_used(&self, slot: SlotId) -> Result<u64> {
        self.valid_entry(slot).map(|e| e.shared.used())
    }

    /// Copy of the guest's linear memory, for tests that need to observe
    /// what guest code wrote.
    #[cfg(any(feature = "testing", test))]
    pub fn memory_snapshot(&mut self, slot: SlotId) -> Result<Vec<u8>> {
        if !self.table.is_valid(slot) {
            return Err(RuntimeError::NotFound(format!("slot {} is empty", slot)));
        }
        let entry = self.table.entry_mut(slot).expect("validated slot vanished");
        let session = entry
            .session
            .as_mut()
            .ok_or_else(|| RuntimeError::NotFound(format!("slot {} has no instance", slot)))?;
        Ok(session.memory_snapshot())
    }

    fn valid_entry(&self, slot: SlotId) -> Result<&SlotEntry<E>> {
        self.table
            .entry(slot)
            .filter(|e| e.used)
            .ok_or_else(|| RuntimeError::NotFound(format!("slot {} is empty", slot)))
    }

    fn sidecar_path(&self, name: &str) -> String {
        format!(
            "{}/{}.manifest.json",
            self.config.apps_root.trim_end_matches('/'),
            name
        )
    }
}

/// Tears down a slot's live session, if any: releases the guest heap's quota
/// accounting, clears the instance binding, and leaves `running` false.
/// Host-side allocations stay charged; destroy resets them with the slot.
fn drop_session<E: Externs>(entry: &mut SlotEntry<E>) {
    if let Some(session) = entry.session.take() {
        let live = session.data().heap.as_ref().map_or(0, |h| h.live_bytes());
        if live > 0 {
            entry.shared.release(live);
        }
    }
    entry.shared.clear_instance();
    entry.running = false;
}
