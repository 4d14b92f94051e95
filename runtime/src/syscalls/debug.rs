// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use log::Level;

use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::Result;

/// Guest logging. Requires no capability; the message pointer is still
/// validated like any other.
pub(crate) fn log<E: Externs>(ctx: Context<'_, E>, level: i32, msg: i32) -> Result<i32> {
    let text = ctx.memory.read_cstr(msg as u32)?;
    let level = match level {
        i32::MIN..=0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        _ => Level::Debug,
    };
    let guest = ctx.data.guest_name();
    log::log!(target: "guest", level, "[{}] {}", guest, text);
    Ok(0)
}
