//! Process-wide storage behind the opaque handles.
//!
//! A handle id packs a slot index (low 32 bits) with the slot's generation (high 32 bits).
//! Releasing a value bumps the generation on the next reuse of its slot, so an id that outlived
//! its value is detected instead of silently reaching the new occupant. Generation 0 is never
//! handed out, which makes a zeroed handle invalid.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{FfiError, Result};

#[cfg(test)]
mod arena_test;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub(crate) struct Arena<T> {
    name: &'static str,
    slots: Mutex<Vec<Slot<T>>>,
}

fn pack(index: u32, generation: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

#[allow(clippy::cast_possible_truncation)]
fn unpack(id: u64) -> (usize, u32) {
    let index = (id & 0xffff_ffff) as usize;
    let generation = (id >> 32) as u32;
    (index, generation)
}

impl<T> Arena<T> {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, value: T) -> Result<u64> {
        let mut slots = self.lock();

        if let Some(index) = slots.iter().position(|slot| slot.value.is_none()) {
            let id = u32::try_from(index).map_err(|_| FfiError::ArenaFull(self.name))?;
            let slot = &mut slots[index];
            slot.generation = slot.generation.checked_add(1).unwrap_or(1);
            slot.value = Some(value);
            return Ok(pack(id, slot.generation));
        }

        let id = u32::try_from(slots.len()).map_err(|_| FfiError::ArenaFull(self.name))?;
        slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Ok(pack(id, 1))
    }

    /// Runs `f` on the live value behind `id` while the arena is locked.
    pub(crate) fn with<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let (index, generation) = unpack(id);
        let mut slots = self.lock();
        match slots.get_mut(index) {
            Some(Slot {
                generation: live,
                value: Some(value),
            }) if *live == generation => Ok(f(value)),
            _ => Err(FfiError::StaleHandle(self.name)),
        }
    }

    pub(crate) fn get(&self, id: u64) -> Result<T>
    where
        T: Clone,
    {
        self.with(id, |value| value.clone())
    }

    pub(crate) fn remove(&self, id: u64) -> Result<T> {
        let (index, generation) = unpack(id);
        let mut slots = self.lock();
        match slots.get_mut(index) {
            Some(slot) if slot.generation == generation && slot.value.is_some() => {
                slot.value.take().ok_or(FfiError::StaleHandle(self.name))
            }
            _ => Err(FfiError::StaleHandle(self.name)),
        }
    }
}
