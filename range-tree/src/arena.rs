//! Generational arena backing every node in the tree.
//!
//! The maple tree this crate is modeled on addresses nodes through tagged
//! pointers into a kernel-managed slab, and relies on an RCU grace period to
//! know when a freed node can safely be reused. We have no slab allocator and
//! no RCU here: nodes are plain values owned by a `Vec`, and the tree as a
//! whole is guarded by a single `RwLock` (see `crate::RangeTree`), so a freed
//! node can be recycled the instant its replacement is installed -- no reader
//! can be concurrently dereferencing it, because no reader can run at all
//! while the writer holds the lock.
//!
//! What remains from the original design is the *shape* of the safety net:
//! every [`NodeId`] carries a generation counter, checked on every
//! dereference, so that a stale id computed before a mutation and wrongly
//! reused afterward panics instead of silently aliasing an unrelated node.

use core::fmt;

use crate::error::{Error, Result};

/// A generation-checked reference to a node living in an [`Arena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}#{})", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: Option<u32> },
}

/// A `Vec`-backed slab of `T`, addressed by generation-checked [`NodeId`]s.
///
/// This is the realization of the spec's "node-pool memory allocator"
/// external collaborator: in this crate it is not external at all, just an
/// ordinary owned arena.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of live nodes currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserve capacity for `additional` more nodes without allocating on
    /// the fallible insertion path.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.slots
            .try_reserve(additional)
            .map_err(|_| Error::OutOfMemory)
    }

    /// Insert a value, returning its id. Reuses a freed slot if one exists.
    pub fn insert(&mut self, value: T) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let (generation, next_free) = match slot {
                Slot::Free {
                    generation,
                    next_free,
                } => (*generation, *next_free),
                Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { generation, value };
            NodeId { index, generation }
        } else {
            let index = u32::try_from(self.slots.len()).expect("arena exceeded u32::MAX nodes");
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Remove the node at `id`, returning its value.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a live node in this arena (stale id,
    /// or an id from a different arena).
    pub fn remove(&mut self, id: NodeId) -> T {
        let slot = &mut self.slots[id.index as usize];
        let Slot::Occupied { generation, .. } = slot else {
            panic!("double-free or use-after-free of {id:?}");
        };
        assert_eq!(
            *generation, id.generation,
            "stale NodeId {id:?} (arena slot is now generation {generation})"
        );
        let next_generation = generation.wrapping_add(1);
        let Slot::Occupied { value, .. } = core::mem::replace(
            slot,
            Slot::Free {
                generation: next_generation,
                next_free: self.free_head,
            },
        ) else {
            unreachable!()
        };
        self.free_head = Some(id.index);
        self.len -= 1;
        value
    }

    pub fn get(&self, id: NodeId) -> &T {
        match &self.slots[id.index as usize] {
            Slot::Occupied { generation, value } if *generation == id.generation => value,
            Slot::Occupied { generation, .. } => {
                panic!("stale NodeId {id:?} (arena slot is now generation {generation})")
            }
            Slot::Free { .. } => panic!("use of freed NodeId {id:?}"),
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        match &mut self.slots[id.index as usize] {
            Slot::Occupied { generation, value } if *generation == id.generation => value,
            Slot::Occupied { generation, .. } => {
                panic!("stale NodeId {id:?} (arena slot is now generation {generation})")
            }
            Slot::Free { .. } => panic!("use of freed NodeId {id:?}"),
        }
    }

    /// Remove every node, dropping their values.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(*arena.get(a), 1);
        assert_eq!(*arena.get(b), 2);
        assert_eq!(arena.remove(a), 1);
        assert_eq!(arena.len(), 1);

        let c = arena.insert(3);
        assert_eq!(*arena.get(c), 3);
        assert_eq!(*arena.get(b), 2);
    }

    #[test]
    #[should_panic(expected = "stale NodeId")]
    fn stale_id_panics() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let _ = arena.insert(2);
        arena.get(a);
    }
}
