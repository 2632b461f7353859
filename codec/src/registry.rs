//! Session registry: generation-checked handles for owned sessions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Identifies a value stored in a [`Registry`].
///
/// A handle stays invalid once its value is removed, even after the slot is
/// reused: every reuse bumps the slot's generation.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Rebuilds a handle from its raw parts, e.g. after a round trip
    /// through a host representation.
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the handle into one integer (generation in the high half).
    pub fn to_u64(&self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_u64(raw: u64) -> Self {
        Self::from_raw(raw as u32, (raw >> 32) as u32)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Arena of shared values addressed by [`Handle`].
///
/// Lookups hand out an `Arc` clone, so the registry lock is only held for
/// the lookup itself, never for the work done on the value.
pub struct Registry<T> {
    inner: RwLock<Slots<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&self, value: T) -> Handle<T> {
        let mut inner = self.inner.write();
        inner.live += 1;
        let value = Some(Arc::new(value));

        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = value;
            return Handle::from_raw(index, slot.generation);
        }

        let index = inner.slots.len() as u32;
        inner.slots.push(Slot {
            generation: 0,
            value,
        });
        Handle::from_raw(index, 0)
    }

    /// Returns the value behind `handle`.
    pub fn get(&self, handle: Handle<T>) -> Result<Arc<T>> {
        let inner = self.inner.read();
        match inner.slots.get(handle.index as usize) {
            Some(Slot {
                generation,
                value: Some(value),
            }) if *generation == handle.generation => Ok(Arc::clone(value)),
            _ => Err(Error::InvalidState),
        }
    }

    /// Removes the value behind `handle`; the handle is dead afterwards.
    pub fn remove(&self, handle: Handle<T>) -> Result<Arc<T>> {
        let mut inner = self.inner.write();
        let slot = match inner.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation => slot,
            _ => return Err(Error::InvalidState),
        };
        let value = slot.value.take().ok_or(Error::InvalidState)?;
        inner.free.push(handle.index);
        inner.live -= 1;
        Ok(value)
    }

    /// Returns the number of live values.
    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
