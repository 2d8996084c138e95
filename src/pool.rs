// Copyright 2017 Matthew Plant. This file is part of collgraph.
//
// collgraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// collgraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with collgraph. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Index, IndexMut};
use std::vec::Vec;

/// A stable reference to an item stored in a Pool.
///
/// Handles carry the generation of the slot they were issued for. Once the
/// item is removed the slot's generation is bumped, so an old handle can never
/// alias a newer item that happens to reuse the same slot.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Handle {
            index: index as u32,
            generation,
            marker: PhantomData,
        }
    }

    /// Index of the slot this handle points to.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot at the time the handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

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
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// Internal storage type used by Pool.
enum PoolEntry<T> {
    FreeListEnd,
    FreeListPtr {
        next_free: usize,
    },
    Occupied(T)
}

struct Slot<T> {
    generation: u32,
    entry: PoolEntry<T>,
}

/// Growable array type that allows items to be removed and inserted without
/// changing the handles of other entries.
pub struct Pool<T> {
    len: usize,
    free_list: Option<usize>,
    slots: Vec<Slot<T>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Pool<T> {
    /// Create an empty Pool.
    pub fn new() -> Self {
        Pool {
            len: 0,
            free_list: None,
            slots: Vec::new(),
        }
    }

    /// Determines if the Pool is empty.
    pub fn empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Push a new item to the Pool. Attempts to use spots left empty from
    /// removed items before performing a heap allocation.
    pub fn push(&mut self, item: T) -> Handle<T> {
        self.len += 1;
        if let Some(free_item) = self.free_list {
            let slot = &mut self.slots[free_item];
            self.free_list = match slot.entry {
                PoolEntry::FreeListPtr{ next_free } => Some(next_free),
                _ => None,
            };
            slot.entry = PoolEntry::Occupied(item);
            Handle::new(free_item, slot.generation)
        } else {
            let i = self.slots.len();
            self.slots.push(Slot { generation: 0, entry: PoolEntry::Occupied(item) });
            Handle::new(i, 0)
        }
    }

    /// Removes the item the handle refers to and adds its slot to the free
    /// list. Returns None if the handle is stale.
    pub fn remove(&mut self, h: Handle<T>) -> Option<T> {
        if !self.contains(h) {
            return None;
        }
        let i = h.index();
        let new_entry = if let Some(free_item) = self.free_list {
            PoolEntry::FreeListPtr{ next_free: free_item }
        } else {
            PoolEntry::FreeListEnd
        };
        let slot = &mut self.slots[i];
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list = Some(i);
        if let PoolEntry::Occupied(item) = mem::replace(&mut slot.entry, new_entry) {
            self.len -= 1;
            Some(item)
        } else {
            None
        }
    }

    /// Returns true if the handle refers to a live item.
    pub fn contains(&self, h: Handle<T>) -> bool {
        self.get(h).is_some()
    }

    pub fn get(&self, h: Handle<T>) -> Option<&T> {
        match self.slots.get(h.index()) {
            Some(Slot { generation, entry: PoolEntry::Occupied(item) })
                if *generation == h.generation => Some(item),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, h: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(h.index()) {
            Some(Slot { generation, entry: PoolEntry::Occupied(item) })
                if *generation == h.generation => Some(item),
            _ => None,
        }
    }

    /// Removes every item. Outstanding handles become stale.
    pub fn clear(&mut self) {
        let handles: Vec<Handle<T>> = self.handles().collect();
        for h in handles {
            self.remove(h);
        }
    }

    /// Iterate over the handles of all live items in slot order.
    pub fn handles<'a>(&'a self) -> impl Iterator<Item = Handle<T>> + 'a {
        self.iter().map(|(h, _)| h)
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (Handle<T>, &'a T)> + 'a {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            if let PoolEntry::Occupied(ref item) = slot.entry {
                Some((Handle::new(i, slot.generation), item))
            } else {
                None
            }
        })
    }

    pub fn iter_mut<'a>(&'a mut self) -> impl Iterator<Item = (Handle<T>, &'a mut T)> + 'a {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            if let PoolEntry::Occupied(ref mut item) = slot.entry {
                Some((Handle::new(i, generation), item))
            } else {
                None
            }
        })
    }
}

impl<T> Index<Handle<T>> for Pool<T> {
    type Output = T;

    fn index(&self, h: Handle<T>) -> &T {
        match self.get(h) {
            Some(item) => item,
            None => panic!("handle {:?} is not occupied", h),
        }
    }
}

impl<T> IndexMut<Handle<T>> for Pool<T> {
    fn index_mut(&mut self, h: Handle<T>) -> &mut T {
        match self.get_mut(h) {
            Some(item) => item,
            None => panic!("handle {:?} is not occupied", h),
        }
    }
}

#[cfg(test)]
mod tests {
    mod pool {
        use crate::pool::*;

        #[test]
        fn test_manual_code() {
            let mut pool: Pool<usize> = Pool::new();

            let id0 = pool.push(0);
            let id1 = pool.push(1);
            let id2 = pool.push(2);
            let id3 = pool.push(3);

            assert_eq!(id0.index(), 0);
            assert_eq!(id3.index(), 3);

            assert_eq!(pool.remove(id1), Some(1));
            assert_eq!(pool.remove(id2), Some(2));

            assert_eq!(pool[id0], 0);
            assert_eq!(pool[id3], 3);
            assert_eq!(pool.len(), 2);

            assert_eq!(pool.iter().map(|(_, &u)| u).collect::<Vec<usize>>(), vec![0, 3]);
        }

        #[test]
        fn test_stale_handles() {
            let mut pool: Pool<&'static str> = Pool::new();
            let a = pool.push("a");
            pool.remove(a);

            // The slot is reused, but the old handle must not see the new item.
            let b = pool.push("b");
            assert_eq!(a.index(), b.index());
            assert_ne!(a, b);
            assert!(pool.get(a).is_none());
            assert_eq!(pool.remove(a), None);
            assert_eq!(pool.get(b), Some(&"b"));
        }

        #[test]
        fn test_pool() {
            let mut pool: Pool<usize> = Pool::new();
            let handles: Vec<_> = (0..16).map(|i| pool.push(i)).collect();
            for i in 0..8 {
                pool.remove(handles[i * 2]);
            }
            let ids = [ 1, 3, 5, 7, 9, 11, 13, 15 ];
            for (i, (_, item)) in pool.iter().enumerate() {
                assert_eq!(*item, ids[i]);
            }

            // Freed slots are reused before the pool grows.
            let h = pool.push(100);
            assert!(h.index() < 16);
            assert_eq!(pool.len(), 9);

            pool.clear();
            assert!(pool.empty());
            assert!(handles.iter().all(|&h| pool.get(h).is_none()));
        }
    }
}
