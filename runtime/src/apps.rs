// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The fixed-size application table.
//!
//! Each guest occupies one slot from install until destroy. Lifecycle state
//! (module, live session, running flag) is owned by the [`Runtime`] and only
//! touched from the supervisor; the fields native calls need — capability
//! mask, quota accounting, instance binding — live in a [`SlotShared`] that
//! the [`TableView`] exposes lock-free to guest threads.
//!
//! [`Runtime`]: crate::lifecycle::Runtime

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::engine::{GuestSession, Module};
use crate::externs::Externs;

/// Stable identity of a guest: its index in the table.
pub type SlotId = u32;

/// Token binding a live instance to its slot. Zero means "no instance".
pub(crate) type InstanceToken = u64;

/// The per-slot state shared between the lifecycle controller and the slot's
/// own native calls.
///
/// `mask` and `quota` are written by the lifecycle controller (and the
/// supervisor's capability grants) and read without locking from native
/// calls; a reader seeing a stale mask can only under-grant, never
/// over-grant. `used` moves by atomic read-modify-write so concurrent guest
/// threads cannot overdraw the quota between check and commit.
pub(crate) struct SlotShared {
    name: RwLock<String>,
    mask: AtomicU32,
    quota: AtomicU32,
    used: AtomicU64,
    instance: AtomicU64,
}

impl SlotShared {
    pub(crate) fn new() -> Self {
        SlotShared {
            name: RwLock::new(String::new()),
            mask: AtomicU32::new(0),
            quota: AtomicU32::new(0),
            used: AtomicU64::new(0),
            instance: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().expect("slot name lock poisoned").clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write().expect("slot name lock poisoned") = name.to_owned();
    }

    pub fn mask(&self) -> u32 {
        self.mask.load(Ordering::Acquire)
    }

    pub fn set_mask(&self, mask: u32) {
        self.mask.store(mask, Ordering::Release);
    }

    pub fn grant(&self, bit: u32) {
        self.mask.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn quota(&self) -> u32 {
        self.quota.load(Ordering::Acquire)
    }

    pub fn set_quota(&self, quota: u32) {
        self.quota.store(quota, Ordering::Release);
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Adds `bytes` to the slot's accounted memory if the quota allows it.
    /// Arithmetic overflow counts as a violation.
    pub fn charge(&self, bytes: u64) -> bool {
        let quota = self.quota();
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let total = used.checked_add(bytes)?;
                if quota != 0 && total > u64::from(quota) {
                    return None;
                }
                Some(total)
            })
            .is_ok()
    }

    /// Returns `bytes` to the slot's accounting.
    pub fn release(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub fn instance(&self) -> InstanceToken {
        self.instance.load(Ordering::Acquire)
    }

    pub fn bind_instance(&self, token: InstanceToken) {
        self.instance.store(token, Ordering::Release);
    }

    pub fn clear_instance(&self) {
        self.instance.store(0, Ordering::Release);
    }

    /// Returns the slot to its empty state at destroy.
    pub fn reset(&self) {
        self.set_name("");
        self.set_mask(0);
        self.set_quota(0);
        self.used.store(0, Ordering::Release);
        self.clear_instance();
    }
}

/// Lifecycle-side state of one slot. The session holds both the instance and
/// its execution store, so the two are present or absent together.
pub(crate) struct SlotEntry<E: Externs> {
    pub used: bool,
    pub running: bool,
    pub name: String,
    pub version: String,
    pub module: Option<Module>,
    pub session: Option<GuestSession<E>>,
    pub shared: Arc<SlotShared>,
}

impl<E: Externs> SlotEntry<E> {
    fn empty() -> Self {
        SlotEntry {
            used: false,
            running: false,
            name: String::new(),
            version: String::new(),
            module: None,
            session: None,
            shared: Arc::new(SlotShared::new()),
        }
    }

    /// Clears every lifecycle field and the shared state, freeing the slot.
    pub fn clear(&mut self) {
        self.used = false;
        self.running = false;
        self.name.clear();
        self.version.clear();
        self.module = None;
        self.session = None;
        self.shared.reset();
    }
}

/// The read side of the table handed to native calls: resolves the engine's
/// instance token back to a slot and answers pure mask/name lookups. Nothing
/// in here refers back to the bridge.
pub struct TableView {
    slots: Box<[Arc<SlotShared>]>,
}

impl TableView {
    /// Resolves an instance token to its slot. This runs on every native
    /// call; it is a tight linear scan over a small fixed array.
    pub(crate) fn slot_for_instance(&self, token: InstanceToken) -> Option<SlotId> {
        if token == 0 {
            return None;
        }
        self.slots
            .iter()
            .position(|s| s.instance() == token)
            .map(|i| i as SlotId)
    }

    /// The effective capability mask of the guest behind `token`.
    pub fn mask_for(&self, token: InstanceToken) -> Option<u32> {
        self.slot_for_instance(token)
            .map(|slot| self.slots[slot as usize].mask())
    }

    /// The name of the guest behind `token`.
    pub fn name_for(&self, token: InstanceToken) -> Option<String> {
        self.slot_for_instance(token)
            .map(|slot| self.slots[slot as usize].name())
    }

    pub(crate) fn shared(&self, slot: SlotId) -> Option<&Arc<SlotShared>> {
        self.slots.get(slot as usize)
    }
}

/// The table proper: a fixed array of slots plus the shared view.
pub(crate) struct AppTable<E: Externs> {
    entries: Vec<SlotEntry<E>>,
    view: Arc<TableView>,
}

impl<E: Externs> AppTable<E> {
    pub fn new(max_slots: usize) -> Self {
        let entries: Vec<_> = (0..max_slots).map(|_| SlotEntry::empty()).collect();
        let view = Arc::new(TableView {
            slots: entries.iter().map(|e| e.shared.clone()).collect(),
        });
        AppTable { entries, view }
    }

    /// Lowest unused slot index, if any.
    pub fn find_free_slot(&self) -> Option<SlotId> {
        self.entries
            .iter()
            .position(|e| !e.used)
            .map(|i| i as SlotId)
    }

    pub fn is_valid(&self, slot: SlotId) -> bool {
        self.entries
            .get(slot as usize)
            .map_or(false, |e| e.used)
    }

    pub fn entry(&self, slot: SlotId) -> Option<&SlotEntry<E>> {
        self.entries.get(slot as usize)
    }

    pub fn entry_mut(&mut self, slot: SlotId) -> Option<&mut SlotEntry<E>> {
        self.entries.get_mut(slot as usize)
    }

    pub fn view(&self) -> Arc<TableView> {
        self.view.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn in_use(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }
}
