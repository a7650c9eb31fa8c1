//! Generational storage behind the registry handles.
//!
//! A slot is reused after removal, but every insertion draws a fresh generation from a counter
//! that never resets, so an [`Index`] that outlived its value can never resolve again.

/// Weak reference into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Index {
    slot: usize,
    generation: u64,
}

#[derive(Debug)]
struct Entry<T> {
    generation: u64,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    next_generation: u64,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            next_generation: 0,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> Index {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.len += 1;

        let entry = Entry {
            generation,
            value: Some(value),
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = entry;
                slot
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        Index { slot, generation }
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        self.entries
            .get(index.slot)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        self.entries
            .get_mut(index.slot)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    /// Remove and return the value. Once the arena is empty its storage is released.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self
            .entries
            .get_mut(index.slot)
            .filter(|entry| entry.generation == index.generation)?;
        let value = entry.value.take()?;
        self.free.push(index.slot);
        self.len -= 1;
        if self.len == 0 {
            self.entries = Vec::new();
            self.free = Vec::new();
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.entries.iter().enumerate().filter_map(|(slot, entry)| {
            entry.value.as_ref().map(|value| {
                (
                    Index {
                        slot,
                        generation: entry.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|entry| entry.value.as_ref())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(|entry| entry.value.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_index_after_slot_reuse() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let _b = arena.insert("b");
        assert_eq!(arena.remove(a), Some("a"));
        let c = arena.insert("c");

        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn stale_index_after_emptying() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        assert!(arena.is_empty());

        let b = arena.insert(2);
        assert_ne!(a, b);
        assert!(!arena.contains(a));
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![2]);
    }
}
