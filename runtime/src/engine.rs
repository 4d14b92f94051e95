// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Thin wrapper over the WASM engine.
//!
//! The rest of the runtime only assumes the surface modeled here:
//! load-from-bytes, instantiate, entry-export lookup and call, address
//! translation (done in the syscall layer via the exported memory), and
//! exception-message retrieval. Everything wasmtime-specific stays behind
//! these types.

use wasmtime::Val;

use crate::error::{Result, RuntimeError};
use crate::externs::Externs;
use crate::lifecycle::RuntimeConfig;
use crate::syscalls::InvocationData;

/// Bytes per WASM linear-memory page.
pub(crate) const WASM_PAGE: u64 = 64 * 1024;

/// Entry exports tried in order when starting a guest.
const ENTRY_EXPORTS: &[&str] = &["_start", "main"];

/// The process-wide engine. Cheap to share; compiles and validates modules.
pub(crate) struct Engine {
    inner: wasmtime::Engine,
}

impl Engine {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let mut cfg = wasmtime::Config::new();
        cfg.max_wasm_stack(config.instance_stack_bytes);
        let inner = wasmtime::Engine::new(&cfg)
            .map_err(|e| RuntimeError::Io(format!("engine init failed: {:#}", e)))?;
        Ok(Engine { inner })
    }

    /// Parse and validate a module from a staged byte buffer. The engine
    /// keeps its own copy; the buffer may be freed once this returns.
    pub fn load(&self, bytes: &[u8]) -> Result<Module> {
        wasmtime::Module::new(&self.inner, bytes)
            .map(Module)
            .map_err(|e| RuntimeError::Io(format!("engine rejected module: {:#}", e)))
    }

    pub fn raw(&self) -> &wasmtime::Engine {
        &self.inner
    }
}

/// A loaded, validated module. Owned by its slot until destroy.
#[derive(Debug)]
pub(crate) struct Module(wasmtime::Module);

/// A live instance together with its execution store. Instance and execution
/// environment are one value here, so they exist and die together.
pub(crate) struct GuestSession<E: Externs> {
    store: wasmtime::Store<InvocationData<E>>,
    instance: wasmtime::Instance,
    memory: wasmtime::Memory,
}

impl<E: Externs> GuestSession<E> {
    /// Instantiates `module` with its own linear memory and grows a guest
    /// heap region of `instance_heap_bytes` past the module's data, managed
    /// by the quota-aware allocator.
    pub fn instantiate(
        engine: &Engine,
        linker: &wasmtime::Linker<InvocationData<E>>,
        module: &Module,
        data: InvocationData<E>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let mut store = wasmtime::Store::new(engine.raw(), data);
        store.limiter(|data| &mut data.limits);

        let instance = linker
            .instantiate(&mut store, &module.0)
            .map_err(|e| RuntimeError::Io(format!("instantiation failed: {:#}", e)))?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| RuntimeError::Io("module has no exported memory".to_owned()))?;

        let heap_bytes = u32::try_from(config.instance_heap_bytes)
            .map_err(|_| RuntimeError::IllegalArgument("instance heap too large".to_owned()))?;
        let heap_pages = u64::from(heap_bytes).div_ceil(WASM_PAGE);
        let base_pages = memory
            .grow(&mut store, heap_pages)
            .map_err(|e| RuntimeError::OutOfMemory(format!("guest heap reservation: {:#}", e)))?;
        let heap_base = u32::try_from(base_pages * WASM_PAGE)
            .map_err(|_| RuntimeError::OutOfMemory("guest memory exceeds 4 GiB".to_owned()))?;
        store.data_mut().install_heap(heap_base, heap_bytes);

        Ok(GuestSession {
            store,
            instance,
            memory,
        })
    }

    /// Looks up the entry export and invokes it with an empty argument
    /// vector. `NotFound` when the module exports neither entry name; `Io`
    /// carrying the engine's diagnostic when the guest raises.
    pub fn call_entry(&mut self) -> Result<()> {
        let func = ENTRY_EXPORTS
            .iter()
            .find_map(|name| self.instance.get_func(&mut self.store, name))
            .ok_or_else(|| {
                RuntimeError::NotFound("module exports neither _start nor main".to_owned())
            })?;

        // The entry's return value, if any, is ignored.
        let result_arity = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_arity];
        func.call(&mut self.store, &[], &mut results)
            .map_err(|e| RuntimeError::Io(format!("guest raised: {:#}", e)))
    }

    pub fn data(&self) -> &InvocationData<E> {
        self.store.data()
    }

    /// Copy of the guest's linear memory, for test inspection.
    #[cfg(any(feature = "testing", test))]
    pub fn memory_snapshot(&mut self) -> Vec<u8> {
        self.memory.data(&self.store).to_vec()
    }
}
