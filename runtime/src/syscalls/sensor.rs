// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use akira_shared::capability;

use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::{Result, SyscallError};

pub(crate) fn read<E: Externs>(ctx: Context<'_, E>, kind: i32) -> Result<i32> {
    ctx.data.require(capability::SENSOR_READ, "sensor.read")?;
    let value = ctx
        .data
        .externs
        .sensor_read(kind)
        .map_err(|n| SyscallError::host("sensor_read", n))?;
    Ok(value)
}
