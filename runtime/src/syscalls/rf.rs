// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use akira_shared::capability;

use crate::alloc::{host_alloc, host_free};
use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::{Result, SyscallError};

/// Transmit a frame from guest memory. The payload is staged through a
/// quota-counted host buffer before it reaches the radio, so a guest cannot
/// pin more host memory than its quota allows.
pub(crate) fn send<E: Externs>(ctx: Context<'_, E>, ptr: i32, len: i32) -> Result<i32> {
    ctx.data.require(capability::RF_TRANSCEIVE, "rf.transceive")?;
    let frame = ctx.memory.try_slice(ptr as u32, len as u32)?;

    if frame.is_empty() {
        ctx.data
            .externs
            .rf_send(&[])
            .map_err(|n| SyscallError::host("rf_send", n))?;
        return Ok(0);
    }

    let (slot, shared) = ctx.data.slot()?;
    let mut staging = host_alloc(&ctx.data.arena, &shared, slot, frame.len() as u32)
        .map_err(|n| SyscallError::host("rf staging allocation", n))?;
    staging.bytes_mut().copy_from_slice(frame);

    let sent = ctx.data.externs.rf_send(staging.bytes());
    if let Err(n) = host_free(&mut staging, &shared) {
        log::error!("rf staging buffer leaked: {}", n);
    }
    sent.map_err(|n| SyscallError::host("rf_send", n))?;
    Ok(0)
}
