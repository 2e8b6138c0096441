//! Fixed-capacity id allocator keyed by an owner identity.
//!
//! Ids live in `[0, capacity)` so GPU tables indexed by them can be sized
//! once at startup. Released ids go to the back of a FIFO, which keeps a
//! just-freed slot out of circulation for as long as possible.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

pub struct SlotAllocator<K> {
    capacity: u32,
    free: VecDeque<u32>,
    slots: FxHashMap<K, u32>,
}

impl<K: Eq + Hash + Clone + Debug> SlotAllocator<K> {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: (0..capacity).collect(),
            slots: FxHashMap::default(),
        }
    }

    /// Binds `key` to a free id. Returns `None` when every id is taken.
    ///
    /// Panics if `key` already holds an id.
    pub fn allocate(&mut self, key: K) -> Option<u32> {
        assert!(
            !self.slots.contains_key(&key),
            "slot already allocated for {:?}",
            key
        );
        let Some(id) = self.free.pop_front() else {
            tracing::warn!(capacity = self.capacity, "Slot allocator exhausted");
            return None;
        };
        self.slots.insert(key, id);
        Some(id)
    }

    /// Unbinds `key` and recycles its id.
    ///
    /// Panics if `key` was never allocated.
    pub fn release(&mut self, key: &K) -> u32 {
        let Some(id) = self.slots.remove(key) else {
            panic!("releasing unallocated slot key {:?}", key);
        };
        self.free.push_back(id);
        id
    }

    pub fn find(&self, key: &K) -> Option<u32> {
        self.slots.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.slots.iter().map(|(k, id)| (k, *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_until_full() {
        let mut slots = SlotAllocator::new(4);
        for key in 0..4u64 {
            assert!(slots.allocate(key).is_some());
        }
        assert!(slots.is_full());
        assert_eq!(slots.allocate(99), None);
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn test_release_recycles_in_fifo_order() {
        let mut slots = SlotAllocator::new(3);
        assert_eq!(slots.allocate("a"), Some(0));
        assert_eq!(slots.allocate("b"), Some(1));
        assert_eq!(slots.release(&"a"), 0);
        // id 2 was never used and sits ahead of the recycled 0
        assert_eq!(slots.allocate("c"), Some(2));
        assert_eq!(slots.allocate("d"), Some(0));
        assert_eq!(slots.find(&"b"), Some(1));
        assert_eq!(slots.find(&"a"), None);
    }

    #[test]
    #[should_panic(expected = "releasing unallocated slot key")]
    fn test_release_unknown_key_panics() {
        let mut slots: SlotAllocator<u32> = SlotAllocator::new(2);
        slots.release(&7);
    }

    #[test]
    #[should_panic(expected = "slot already allocated")]
    fn test_double_allocate_panics() {
        let mut slots = SlotAllocator::new(2);
        slots.allocate(1u32);
        slots.allocate(1u32);
    }

    #[test]
    fn test_random_sequence_keeps_ids_unique_and_in_range() {
        let capacity = 32;
        let mut slots = SlotAllocator::new(capacity);
        let mut live: Vec<u64> = Vec::new();
        let mut rng = StdRng::seed_from_u64(0x5107);
        let mut next_key = 0u64;

        for _ in 0..2000 {
            let grow = live.is_empty() || rng.random_range(0..3) != 0;
            if grow {
                let result = slots.allocate(next_key);
                if live.len() == capacity as usize {
                    assert_eq!(result, None);
                } else {
                    assert!(result.is_some());
                    live.push(next_key);
                    next_key += 1;
                }
                if result.is_none() {
                    next_key += 1;
                }
            } else {
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                slots.release(&victim);
            }

            let ids: Vec<u32> = slots.iter().map(|(_, id)| id).collect();
            let unique: HashSet<u32> = ids.iter().copied().collect();
            assert_eq!(unique.len(), ids.len());
            assert!(ids.iter().all(|&id| id < capacity));
            assert_eq!(ids.len(), live.len());
        }
    }
}
