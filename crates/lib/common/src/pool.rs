// Copyright (C) 2025 sable project

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{fmt::Display, hash::Hash, marker::PhantomData};

const DEFAULT_SPACE: usize = 256;
const GENERATION_BITS: u32 = 14;
const INDEX_BITS: u32 = 32 - GENERATION_BITS;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = u32::MAX - INDEX_MASK;
const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;
const MAX_GENERATION: u32 = 1 << GENERATION_BITS;

/// Typed handle into a [`Pool`]. Index and generation packed in one u32,
/// so a handle to a removed slot stops resolving once the slot is reused.
#[derive(Debug)]
pub struct Handle<T> {
    data: u32,
    _phantom: PhantomData<T>,
}

unsafe impl<T> Send for Handle<T> {}
unsafe impl<T> Sync for Handle<T> {}

#[allow(clippy::non_canonical_clone_impl)]
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            _phantom: PhantomData,
        }
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl<T> Handle<T> {
    pub fn new(index: u32, generation: u32) -> Self {
        assert!(index < MAX_INDEX);
        assert!(generation < MAX_GENERATION);
        Self {
            data: (generation << INDEX_BITS) | index,
            _phantom: PhantomData,
        }
    }

    pub fn invalid() -> Self {
        Self {
            data: u32::MAX,
            _phantom: PhantomData,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.data != u32::MAX
    }

    pub fn index(&self) -> u32 {
        self.data & INDEX_MASK
    }

    pub fn generation(&self) -> u32 {
        (self.data & GENERATION_MASK) >> INDEX_BITS
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> Display for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(idx: {} gen: {})", self.index(), self.generation())
    }
}

impl<T> From<Handle<T>> for u32 {
    fn from(value: Handle<T>) -> Self {
        value.data
    }
}

/// Generational arena. Slots are recycled, generations are not: removing an
/// entry bumps the slot generation so every outstanding handle to it goes
/// stale instead of silently aliasing the next occupant.
#[derive(Debug)]
pub struct Pool<T> {
    data: Vec<Option<T>>,
    generations: Vec<u32>,
    empty: Vec<u32>,
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(DEFAULT_SPACE),
            generations: Vec::with_capacity(DEFAULT_SPACE),
            empty: Vec::with_capacity(DEFAULT_SPACE),
        }
    }

    pub fn push(&mut self, value: T) -> Handle<T> {
        if let Some(slot) = self.empty.pop() {
            self.data[slot as usize] = Some(value);
            Handle::new(slot, self.generations[slot as usize])
        } else {
            let index = self.generations.len();
            if index >= MAX_INDEX as usize {
                panic!("Too many items in Pool.");
            }
            self.generations.push(0);
            self.data.push(Some(value));
            Handle::new(index as u32, 0)
        }
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if self.is_handle_valid(&handle) {
            self.data[handle.index() as usize].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if self.is_handle_valid(&handle) {
            self.data[handle.index() as usize].as_mut()
        } else {
            None
        }
    }

    pub fn replace(&mut self, handle: Handle<T>, value: T) -> Option<T> {
        if self.is_handle_valid(&handle) {
            self.data[handle.index() as usize].replace(value)
        } else {
            None
        }
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        if self.is_handle_valid(&handle) {
            let index = handle.index() as usize;
            self.generations[index] = self.generations[index].wrapping_add(1) % MAX_GENERATION;
            self.empty.push(index as _);
            return self.data[index].take();
        }

        None
    }

    pub fn is_handle_valid(&self, handle: &Handle<T>) -> bool {
        let index = handle.index() as usize;
        handle.is_valid()
            && index < self.generations.len()
            && self.generations[index] == handle.generation()
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.empty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn enumerate(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
            .map(|(index, value)| (Handle::new(index as u32, self.generations[index]), value))
    }

    /// Empties the pool, returning every live entry. Every live slot's
    /// generation is bumped, so outstanding handles all go stale even if
    /// the slot is reoccupied later. Used for one-pass teardown.
    pub fn drain(&mut self) -> impl Iterator<Item = T> {
        let mut drained = Vec::with_capacity(self.len());
        for (index, slot) in self.data.iter_mut().enumerate() {
            if let Some(value) = slot.take() {
                self.generations[index] =
                    self.generations[index].wrapping_add(1) % MAX_GENERATION;
                self.empty.push(index as _);
                drained.push(value);
            }
        }

        drained.into_iter()
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
