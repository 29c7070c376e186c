//! Generational arena for task and scope records.
//!
//! Records are addressed by [`ArenaIndex`], a slot number paired with a
//! generation counter. Removing a record bumps the slot's generation, so a
//! stale index held by a handle never aliases a newer record that reused the
//! slot.

use core::fmt;
use core::hash::{Hash, Hasher};

/// Slot number plus generation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaIndex {
    slot: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates an index from raw parts.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the slot number.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.slot, self.generation)
    }
}

impl Hash for ArenaIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64((u64::from(self.slot) << 32) | u64::from(self.generation));
    }
}

#[derive(Debug)]
enum Entry<T> {
    Live { value: T, generation: u32 },
    Free { next: Option<u32>, generation: u32 },
}

/// Arena with a free list and generation-checked lookups.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: None,
            len: 0,
        }
    }

    /// Number of live records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no record is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a record built from its own index.
    ///
    /// Records embed their id, so the constructor receives the index the
    /// record is about to occupy.
    pub fn insert_with(&mut self, build: impl FnOnce(ArenaIndex) -> T) -> ArenaIndex {
        self.len += 1;
        if let Some(slot) = self.free {
            let entry = &mut self.entries[slot as usize];
            let (next, generation) = match entry {
                Entry::Free { next, generation } => (*next, *generation),
                Entry::Live { .. } => unreachable!("free list points at a live entry"),
            };
            let index = ArenaIndex::new(slot, generation);
            self.free = next;
            *entry = Entry::Live {
                value: build(index),
                generation,
            };
            return index;
        }

        let slot = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        let index = ArenaIndex::new(slot, 0);
        self.entries.push(Entry::Live {
            value: build(index),
            generation: 0,
        });
        index
    }

    /// Index the next insertion will occupy.
    ///
    /// Lets a caller build records that reference each other before any of
    /// them is inserted. Only valid until the next insert or remove.
    #[must_use]
    pub fn next_index(&self) -> ArenaIndex {
        match self.free {
            Some(slot) => match &self.entries[slot as usize] {
                Entry::Free { generation, .. } => ArenaIndex::new(slot, *generation),
                Entry::Live { .. } => unreachable!("free list points at a live entry"),
            },
            None => ArenaIndex::new(u32::try_from(self.entries.len()).unwrap_or(u32::MAX), 0),
        }
    }

    /// Inserts a record.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Returns the record at `index` if it is still live.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.entries.get(index.slot as usize)? {
            Entry::Live { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.entries.get_mut(index.slot as usize)? {
            Entry::Live { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Removes and returns the record at `index`.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        match entry {
            Entry::Live { generation, .. } if *generation == index.generation => {}
            _ => return None,
        }
        let freed = Entry::Free {
            next: self.free,
            generation: index.generation.wrapping_add(1),
        };
        let Entry::Live { value, .. } = std::mem::replace(entry, freed) else {
            return None;
        };
        self.free = Some(index.slot);
        self.len -= 1;
        Some(value)
    }

    /// Iterates over live records.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Entry::Live { value, generation } => Some((
                    ArenaIndex::new(u32::try_from(slot).unwrap_or(u32::MAX), *generation),
                    value,
                )),
                Entry::Free { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.insert_with(|_| "a");
        let b = arena.insert_with(|_| "b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn reused_slot_rejects_stale_index() {
        let mut arena = Arena::new();
        let old = arena.insert_with(|_| 1);
        arena.remove(old);
        let new = arena.insert_with(|_| 2);
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old.generation(), new.generation());
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
        assert_eq!(arena.remove(old), None);
    }

    #[test]
    fn insert_with_sees_own_index() {
        let mut arena = Arena::new();
        let idx = arena.insert_with(|idx| idx);
        assert_eq!(arena.get(idx), Some(&idx));
    }

    #[test]
    fn next_index_predicts_insert() {
        let mut arena = Arena::new();
        let predicted = arena.next_index();
        assert_eq!(arena.insert(10), predicted);
        let a = arena.insert(11);
        arena.remove(a);
        let predicted = arena.next_index();
        assert_eq!(predicted.slot(), a.slot());
        assert_eq!(arena.insert(12), predicted);
    }

    #[test]
    fn iter_skips_free_entries() {
        let mut arena = Arena::new();
        let a = arena.insert_with(|_| 'a');
        let _b = arena.insert_with(|_| 'b');
        arena.remove(a);
        let live: Vec<char> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec!['b']);
        assert!(!arena.is_empty());
    }
}
