use akira_shared::capability;

use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::Result;

pub(crate) fn read_buttons<E: Externs>(ctx: Context<'_, E>) -> Result<i32> {
    ctx.data.require(capability::INPUT_READ, "input.read")?;
    Ok(ctx.data.externs.read_buttons() as i32)
}
