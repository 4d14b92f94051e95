//! The `mem_alloc`/`mem_free` imports: dynamic guest-accessible memory,
//! pre-checked against the slot's quota before the heap is touched.

use crate::alloc::ALLOC_SANITY_LIMIT;
use crate::externs::Externs;
use crate::syscalls::context::Context;
use crate::syscalls::error::{ClassifyResult as _, Result};

pub(crate) fn alloc<E: Externs>(ctx: Context<'_, E>, size: i32) -> Result<i32> {
    let size = size as u32;
    if size == 0 || size > ALLOC_SANITY_LIMIT {
        return Ok(0);
    }

    let (_, shared) = ctx.data.slot()?;
    // Charge before carving so a racing allocation on another guest thread
    // cannot slip past the quota.
    if !shared.charge(u64::from(size)) {
        log::warn!(
            "guest {:?} denied allocation of {} bytes (used {} of quota {})",
            shared.name(),
            size,
            shared.used(),
            shared.quota(),
        );
        return Ok(0);
    }

    let heap = ctx
        .data
        .heap
        .as_mut()
        .ok_or("guest heap not initialized")
        .or_fatal();
    let heap = match heap {
        Ok(heap) => heap,
        Err(e) => {
            shared.release(u64::from(size));
            return Err(e);
        }
    };

    match heap.alloc(size) {
        Some(ptr) => Ok(ptr as i32),
        None => {
            shared.release(u64::from(size));
            log::warn!(
                "guest {:?} denied allocation of {} bytes: heap exhausted",
                shared.name(),
                size,
            );
            Ok(0)
        }
    }
}

/// Idempotent on a zero pointer; a pointer the heap does not own is ignored
/// with a warning rather than corrupting the accounting.
pub(crate) fn free<E: Externs>(ctx: Context<'_, E>, ptr: i32) -> Result<()> {
    if ptr == 0 {
        return Ok(());
    }
    let (_, shared) = ctx.data.slot()?;
    let heap = ctx
        .data
        .heap
        .as_mut()
        .ok_or("guest heap not initialized")
        .or_fatal()?;
    match heap.free(ptr as u32) {
        Some(size) => {
            shared.release(u64::from(size));
            Ok(())
        }
        None => {
            log::warn!(
                "guest {:?} freed pointer {:#x} it does not own, ignoring",
                shared.name(),
                ptr,
            );
            Ok(())
        }
    }
}
