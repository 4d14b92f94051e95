// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Quota-counted allocation on the guest's behalf.
//!
//! Two strategies exist. Guest-accessible buffers live inside the instance's
//! linear memory and go through [`heap::GuestHeap`]; the syscall layer
//! pre-checks the quota before delegating. Host-side buffers used by bridge
//! logic (radio staging and the like) come from the arena and carry a header
//! equivalent — magic, size, owning slot — so corruption and double-frees are
//! caught instead of corrupting the accounting.

pub(crate) mod heap;

use akira_shared::error::ErrorNumber;

use crate::apps::{SlotId, SlotShared};
use crate::arena::{ArenaBuf, MemoryArena};

/// Sentinel marking a live host-side allocation ("AKMB").
pub(crate) const ALLOC_MAGIC: u32 = 0x414B_4D42;

/// Accounting overhead per host-side allocation, mirroring the on-device
/// header layout (magic + size + owner).
pub(crate) const HEADER_BYTES: u64 = 12;

/// Upper bound on a single quota-counted allocation.
pub(crate) const ALLOC_SANITY_LIMIT: u32 = 16 * 1024 * 1024;

/// A host-side allocation charged against a guest's quota. Freeing consumes
/// the buffer and zeroes the magic, so a second free is detected rather than
/// double-credited.
#[derive(Debug)]
pub(crate) struct HostAllocation {
    magic: u32,
    size: u32,
    owner: SlotId,
    buf: Option<ArenaBuf>,
}

impl HostAllocation {
    pub fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn corrupt_magic(&mut self) {
        self.magic = 0;
    }
}

/// Allocates `size` bytes from the arena, charging `size + HEADER_BYTES`
/// against the slot.
pub(crate) fn host_alloc(
    arena: &MemoryArena,
    shared: &SlotShared,
    owner: SlotId,
    size: u32,
) -> Result<HostAllocation, ErrorNumber> {
    if size == 0 || size > ALLOC_SANITY_LIMIT {
        return Err(ErrorNumber::IllegalArgument);
    }
    let charged = u64::from(size) + HEADER_BYTES;
    if !shared.charge(charged) {
        log::warn!(
            "guest {:?} denied host allocation of {} bytes (used {} of quota {})",
            shared.name(),
            size,
            shared.used(),
            shared.quota(),
        );
        return Err(ErrorNumber::QuotaExceeded);
    }
    let Some(buf) = arena.alloc(size as usize) else {
        shared.release(charged);
        return Err(ErrorNumber::OutOfMemory);
    };
    Ok(HostAllocation {
        magic: ALLOC_MAGIC,
        size,
        owner,
        buf: Some(buf),
    })
}

/// Validates the header, returns the block to the arena, and credits the
/// slot. A mismatched magic — corruption or a repeated free — is refused and
/// leaves the accounting untouched.
pub(crate) fn host_free(
    allocation: &mut HostAllocation,
    shared: &SlotShared,
) -> Result<(), ErrorNumber> {
    if allocation.magic != ALLOC_MAGIC {
        log::warn!(
            "refusing free of host allocation with bad magic {:#010x} (slot {})",
            allocation.magic,
            allocation.owner,
        );
        return Err(ErrorNumber::IllegalArgument);
    }
    allocation.magic = 0;
    allocation.buf = None;
    shared.release(u64::from(allocation.size) + HEADER_BYTES);
    Ok(())
}
