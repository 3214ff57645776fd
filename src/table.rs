// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Storage of sessions addressed by opaque 64-bit handles.
//!
//! Managed code can only keep plain integers, so sessions are stored in a [`SessionTable`] and
//! referred to by a [`SessionHandle`]. The low 32 bits of a handle are the index of its slot, the
//! high 32 bits the generation of the slot at insertion time. Removing a session bumps the
//! generation of its slot, so handles to closed sessions never resolve to a session created
//! later in the same slot. Generations start at 1, hence `0` is never a valid handle.

use std::num::NonZeroU64;

/// Opaque reference to an entry of a [`SessionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(NonZeroU64);

impl SessionHandle {
    fn new(index: u32, generation: u32) -> Self {
        let raw = (u64::from(generation) << 32) | u64::from(index);
        // Generations are never zero, so neither is `raw`.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MAX))
    }

    /// Interpret `raw` as a handle. Returns `None` for `0`.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn into_raw(self) -> u64 {
        self.0.get()
    }

    fn index(&self) -> usize {
        (self.0.get() & 0xffff_ffff) as usize
    }

    fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Generation-checked arena of sessions.
pub struct SessionTable<T> {
    slots: Vec<Slot<T>>,
    /// Indices of empty slots, reused before growing `slots`.
    free: Vec<u32>,
}

impl<T> Default for SessionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionTable<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store `entry` and return the handle to access it.
    ///
    /// Returns `entry` back if the table cannot address more slots.
    pub fn insert(&mut self, entry: T) -> Result<SessionHandle, T> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let Ok(index) = u32::try_from(self.slots.len()) else {
                    return Err(entry);
                };
                self.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);

        Ok(SessionHandle::new(index, slot.generation))
    }

    fn slot(&self, handle: SessionHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
    }

    fn slot_mut(&mut self, handle: SessionHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
    }

    pub fn get(&self, handle: SessionHandle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut T> {
        self.slot_mut(handle).and_then(|slot| slot.entry.as_mut())
    }

    /// Remove the entry referenced by `handle` and return it.
    ///
    /// Returns `None` if `handle` is stale, so removing twice is harmless.
    pub fn remove(&mut self, handle: SessionHandle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.take()?;

        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        self.free.push(handle.index() as u32);

        Some(entry)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
