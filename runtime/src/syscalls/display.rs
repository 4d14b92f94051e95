// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use akira_shared::capability;

use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::{Result, SyscallError};

pub(crate) fn clear<E: Externs>(ctx: Context<'_, E>, color: i32) -> Result<i32> {
    ctx.data.require(capability::DISPLAY_WRITE, "display.write")?;
    ctx.data
        .externs
        .display_clear(color as u32)
        .map_err(|n| SyscallError::host("display_clear", n))?;
    Ok(0)
}

pub(crate) fn pixel<E: Externs>(ctx: Context<'_, E>, x: i32, y: i32, color: i32) -> Result<i32> {
    ctx.data.require(capability::DISPLAY_WRITE, "display.write")?;
    ctx.data
        .externs
        .display_pixel(x, y, color as u32)
        .map_err(|n| SyscallError::host("display_pixel", n))?;
    Ok(0)
}
