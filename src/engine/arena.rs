use std::fmt;

/// Generational index into an [`Arena`].
/// Allows safe reuse of slots with use-after-free detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub index: u32,
    pub generation: u32,
}

impl SlotId {
    pub const INVALID: Self = Self { index: u32::MAX, generation: 0 };

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({}v{})", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Arena allocator for model records (classes, attributes, bindings).
///
/// All cross-references in the model graph are [`SlotId`]s resolved through
/// an arena, never embedded references, so back-pointers between blocks
/// cannot form ownership cycles.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
        }
    }

    /// Insert a value, returning its slot id.
    /// Freed slots are reused with a bumped generation.
    pub fn insert(&mut self, value: T) -> SlotId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(value);
            SlotId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, entry: Some(value) });
            SlotId { index, generation: 0 }
        }
    }

    /// Remove a value, making the slot available for reuse.
    /// Returns the removed value, or `None` for a stale id.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        let slot = &mut self.slots[id.index as usize];
        // Bump generation immediately to invalidate outstanding ids
        slot.generation += 1;
        self.free_list.push(id.index);
        slot.entry.take()
    }

    /// Check whether an id is still live (correct generation).
    pub fn contains(&self, id: SlotId) -> bool {
        (id.index as usize) < self.slots.len()
            && self.slots[id.index as usize].generation == id.generation
            && self.slots[id.index as usize].entry.is_some()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        if self.contains(id) {
            self.slots[id.index as usize].entry.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        if self.contains(id) {
            self.slots[id.index as usize].entry.as_mut()
        } else {
            None
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate live entries in slot-index order (deterministic).
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (SlotId { index: index as u32, generation: slot.generation }, entry)
            })
        })
    }

    /// Live slot ids in index order.
    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_insert_and_remove() {
        let mut arena = Arena::new();

        let a = arena.insert("a");
        let b = arena.insert("b");

        assert!(arena.contains(a));
        assert!(arena.contains(b));
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a), Some("a"));
        assert!(!arena.contains(a));
        assert_eq!(arena.len(), 1);

        // Reuse freed slot with a new generation
        let c = arena.insert("c");
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
    }

    #[test]
    fn arena_stale_id_is_rejected() {
        let mut arena = Arena::new();

        let a = arena.insert(1);
        arena.remove(a);
        let b = arena.insert(2);

        // Old id points at the reused slot but the generation differs
        assert!(!arena.contains(a));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn arena_iter_is_index_ordered() {
        let mut arena = Arena::new();
        let a = arena.insert(10);
        let b = arena.insert(20);
        arena.insert(30);
        arena.remove(b);

        let ids: Vec<SlotId> = arena.ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], a);
        assert!(ids[0].index < ids[1].index);
    }
}
