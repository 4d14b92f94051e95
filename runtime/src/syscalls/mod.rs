// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The native bridge: the host functions guests import, and the checked
//! dispatch in front of them.
//!
//! Every import follows the same discipline: resolve the calling guest from
//! the execution store, look its slot up in the app table, test the required
//! capability bit, translate and validate pointer arguments, then call the
//! host subsystem. Failures reduce to the function's designated sentinel —
//! never a trap, never a host panic.

use std::sync::Arc;

use akira_shared::capability;
use wasmtime::Caller;

use crate::alloc::heap::GuestHeap;
use crate::apps::{InstanceToken, SlotId, SlotShared, TableView};
use crate::arena::MemoryArena;
use crate::externs::Externs;

pub(crate) mod context;
pub(crate) mod error;

mod debug;
mod display;
mod input;
mod memory;
mod rf;
mod sensor;

use context::{with_context, Context};
use error::{syscall_error, ClassifyResult as _, ExecutionError, Result};

/// Data attached to a guest's execution store, available to every native
/// call the guest makes.
pub(crate) struct InvocationData<E: Externs> {
    /// Token binding this instance to its slot in the app table.
    pub token: InstanceToken,
    /// Read side of the app table.
    pub table: Arc<TableView>,
    /// Host subsystems behind the bridge.
    pub externs: Arc<E>,
    /// Arena for quota-counted host-side staging.
    pub arena: Arc<MemoryArena>,
    /// Allocator over the guest-heap region; installed at instantiation.
    pub heap: Option<GuestHeap>,
    /// Engine-side linear-memory ceiling for this instance.
    pub limits: wasmtime::StoreLimits,
}

impl<E: Externs> InvocationData<E> {
    pub fn install_heap(&mut self, base: u32, size: u32) {
        self.heap = Some(GuestHeap::new(base, size));
    }

    /// Resolves the calling instance to its slot. Failing this is fatal: an
    /// instance that is not in the table has no business executing.
    pub fn slot(&self) -> Result<(SlotId, Arc<SlotShared>)> {
        let slot = self
            .table
            .slot_for_instance(self.token)
            .ok_or("calling instance not present in the app table")
            .or_fatal()?;
        let shared = self
            .table
            .shared(slot)
            .cloned()
            .ok_or("slot index out of range")
            .or_fatal()?;
        Ok((slot, shared))
    }

    /// The capability gate. Denials are logged with the guest's name and the
    /// capability it asked for.
    pub fn require(&self, bit: u32, name: &str) -> Result<()> {
        let (_, shared) = self.slot()?;
        if capability::check(shared.mask(), bit) {
            return Ok(());
        }
        log::warn!(
            "guest {:?} denied native call requiring {}",
            shared.name(),
            name,
        );
        Err(syscall_error!(Forbidden; "missing capability {}", name).into())
    }

    pub fn guest_name(&self) -> String {
        self.table
            .name_for(self.token)
            .unwrap_or_else(|| "<unknown>".to_owned())
    }
}

/// Registers every host import under the `env` namespace.
pub(crate) fn link_syscalls<E: Externs>(
    linker: &mut wasmtime::Linker<InvocationData<E>>,
) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "log",
        |mut caller: Caller<'_, InvocationData<E>>, level: i32, msg: i32| -> i32 {
            dispatch(&mut caller, "log", |ctx| debug::log(ctx, level, msg))
        },
    )?;
    linker.func_wrap(
        "env",
        "display_clear",
        |mut caller: Caller<'_, InvocationData<E>>, color: i32| -> i32 {
            dispatch(&mut caller, "display_clear", |ctx| {
                display::clear(ctx, color)
            })
        },
    )?;
    linker.func_wrap(
        "env",
        "display_pixel",
        |mut caller: Caller<'_, InvocationData<E>>, x: i32, y: i32, color: i32| -> i32 {
            dispatch(&mut caller, "display_pixel", |ctx| {
                display::pixel(ctx, x, y, color)
            })
        },
    )?;
    linker.func_wrap(
        "env",
        "input_read_buttons",
        |mut caller: Caller<'_, InvocationData<E>>| -> i32 {
            dispatch_zero(&mut caller, "input_read_buttons", input::read_buttons)
        },
    )?;
    linker.func_wrap(
        "env",
        "rf_send",
        |mut caller: Caller<'_, InvocationData<E>>, ptr: i32, len: i32| -> i32 {
            dispatch(&mut caller, "rf_send", |ctx| rf::send(ctx, ptr, len))
        },
    )?;
    linker.func_wrap(
        "env",
        "sensor_read",
        |mut caller: Caller<'_, InvocationData<E>>, kind: i32| -> i32 {
            dispatch(&mut caller, "sensor_read", |ctx| sensor::read(ctx, kind))
        },
    )?;
    linker.func_wrap(
        "env",
        "mem_alloc",
        |mut caller: Caller<'_, InvocationData<E>>, size: i32| -> i32 {
            dispatch_zero(&mut caller, "mem_alloc", |ctx| memory::alloc(ctx, size))
        },
    )?;
    linker.func_wrap(
        "env",
        "mem_free",
        |mut caller: Caller<'_, InvocationData<E>>, ptr: i32| {
            dispatch_void(&mut caller, "mem_free", |ctx| memory::free(ctx, ptr))
        },
    )?;
    Ok(())
}

/// Runs a numeric syscall; errors reduce to the taxonomy sentinel.
fn dispatch<E: Externs>(
    caller: &mut Caller<'_, InvocationData<E>>,
    name: &'static str,
    f: impl FnOnce(Context<'_, E>) -> Result<i32>,
) -> i32 {
    with_context(caller, f).unwrap_or_else(|e| fail(name, e))
}

/// Runs a syscall whose designated failure sentinel is `0`
/// (`input_read_buttons`, `mem_alloc`).
fn dispatch_zero<E: Externs>(
    caller: &mut Caller<'_, InvocationData<E>>,
    name: &'static str,
    f: impl FnOnce(Context<'_, E>) -> Result<i32>,
) -> i32 {
    with_context(caller, f).unwrap_or_else(|e| {
        fail(name, e);
        0
    })
}

/// Runs a void syscall; failures log and return without action.
fn dispatch_void<E: Externs>(
    caller: &mut Caller<'_, InvocationData<E>>,
    name: &'static str,
    f: impl FnOnce(Context<'_, E>) -> Result<()>,
) {
    if let Err(e) = with_context(caller, f) {
        fail(name, e);
    }
}

fn fail(name: &'static str, e: ExecutionError) -> i32 {
    match &e {
        ExecutionError::Fatal(err) => {
            log::error!("native call {} failed fatally: {:#}", name, err)
        }
        ExecutionError::Syscall(err) => log::debug!("native call {} failed: {}", name, err),
    }
    e.sentinel()
}
