// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The two-pool allocation front end shared by the runtime and the
//! quota-counted guest helpers.
//!
//! Target boards carry a small internal SRAM and, usually, a much larger
//! external RAM. The arena models each as a budgeted pool and biases
//! allocations toward the external one so that internal RAM stays free for
//! native services. Blocks return their budget when dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Which pool satisfied an allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolSource {
    External,
    Internal,
}

#[derive(Debug)]
struct Pool {
    capacity: usize,
    used: AtomicUsize,
}

impl Pool {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Pool {
            capacity,
            used: AtomicUsize::new(0),
        })
    }

    fn reserve(&self, size: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let total = used.checked_add(size)?;
                (total <= self.capacity).then_some(total)
            })
            .is_ok()
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }

    fn available(&self) -> usize {
        self.capacity
            .saturating_sub(self.used.load(Ordering::Acquire))
    }
}

/// A block handed out by the arena. Dereferences to its bytes; returns its
/// budget to the originating pool on drop.
#[derive(Debug)]
pub struct ArenaBuf {
    bytes: Box<[u8]>,
    source: PoolSource,
    pool: Arc<Pool>,
}

impl ArenaBuf {
    /// The pool this block was carved from.
    pub fn source(&self) -> PoolSource {
        self.source
    }
}

impl Deref for ArenaBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for ArenaBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for ArenaBuf {
    fn drop(&mut self) {
        self.pool.release(self.bytes.len());
    }
}

/// The unified allocation surface over the internal and (optional) external
/// pools.
pub struct MemoryArena {
    external: Option<Arc<Pool>>,
    internal: Arc<Pool>,
    prefer_external: bool,
}

impl MemoryArena {
    /// Builds an arena with the given pool budgets. `external_bytes = None`
    /// models a board without external RAM; every allocation then competes
    /// for the internal pool.
    pub fn new(internal_bytes: usize, external_bytes: Option<usize>, prefer_external: bool) -> Self {
        MemoryArena {
            external: external_bytes.map(Pool::new),
            internal: Pool::new(internal_bytes),
            prefer_external,
        }
    }

    /// Allocates a zeroed block of exactly `size` bytes, or `None` when
    /// neither pool can satisfy the request. Never partially succeeds.
    pub fn alloc(&self, size: usize) -> Option<ArenaBuf> {
        if self.prefer_external {
            self.alloc_preferring_external(size)
        } else {
            self.alloc_internal(size)
                .or_else(|| self.alloc_external(size))
        }
    }

    /// Allocates from the external pool when present, falling back to the
    /// internal one. The chunked loader uses this spelling to make the
    /// staging preference explicit.
    pub fn alloc_preferring_external(&self, size: usize) -> Option<ArenaBuf> {
        self.alloc_external(size)
            .or_else(|| self.alloc_internal(size))
    }

    /// Allocates strictly from the external pool.
    pub fn alloc_external(&self, size: usize) -> Option<ArenaBuf> {
        let pool = self.external.as_ref()?;
        Self::carve(pool, PoolSource::External, size)
    }

    fn alloc_internal(&self, size: usize) -> Option<ArenaBuf> {
        Self::carve(&self.internal, PoolSource::Internal, size)
    }

    fn carve(pool: &Arc<Pool>, source: PoolSource, size: usize) -> Option<ArenaBuf> {
        if !pool.reserve(size) {
            return None;
        }
        Some(ArenaBuf {
            bytes: vec![0u8; size].into_boxed_slice(),
            source,
            pool: pool.clone(),
        })
    }

    /// Whether an external pool exists at all.
    pub fn has_external(&self) -> bool {
        self.external.is_some()
    }

    /// Bytes still unreserved in the given pool.
    pub fn available(&self, source: PoolSource) -> usize {
        match source {
            PoolSource::External => self.external.as_ref().map_or(0, |p| p.available()),
            PoolSource::Internal => self.internal.available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryArena, PoolSource};

    #[test]
    fn prefers_external_and_falls_back() {
        let arena = MemoryArena::new(64, Some(128), true);

        let a = arena.alloc(100).unwrap();
        assert_eq!(a.source(), PoolSource::External);

        // External has 28 bytes left; a 40-byte request falls back.
        let b = arena.alloc(40).unwrap();
        assert_eq!(b.source(), PoolSource::Internal);

        // Neither pool can take 100 more.
        assert!(arena.alloc(100).is_none());

        drop(a);
        assert_eq!(arena.available(PoolSource::External), 128);
        let c = arena.alloc(100).unwrap();
        assert_eq!(c.source(), PoolSource::External);
    }

    #[test]
    fn internal_only_when_external_absent() {
        let arena = MemoryArena::new(64, None, true);
        assert!(!arena.has_external());
        assert_eq!(arena.alloc(32).unwrap().source(), PoolSource::Internal);
        assert!(arena.alloc_external(1).is_none());
    }

    #[test]
    fn internal_bias_when_not_preferring_external() {
        let arena = MemoryArena::new(64, Some(64), false);
        assert_eq!(arena.alloc(32).unwrap().source(), PoolSource::Internal);
        // Internal exhausted, spills to external.
        assert_eq!(arena.alloc(48).unwrap().source(), PoolSource::External);
    }

    #[test]
    fn never_partially_succeeds() {
        let arena = MemoryArena::new(8, Some(8), true);
        assert!(arena.alloc(9).is_none());
        assert_eq!(arena.available(PoolSource::External), 8);
        assert_eq!(arena.available(PoolSource::Internal), 8);
    }

    #[test]
    fn blocks_are_zeroed_and_sized() {
        let arena = MemoryArena::new(16, None, false);
        let buf = arena.alloc(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
