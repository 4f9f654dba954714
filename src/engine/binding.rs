use indexmap::IndexMap;
use smallvec::SmallVec;

use super::arena::{Arena, SlotId};
use super::attribute::Operator;

/// An operator block: at most one target attribute plus the ordered set of
/// source connections feeding it.
///
/// A detached block keeps its connections; they re-apply to the target's
/// input list when the block is attached again.
#[derive(Debug, Clone)]
pub struct InputBinding {
    /// Attribute this block is attached to, if any.
    pub target: Option<SlotId>,
    /// Operation shown on the block. Mirror copies adopt the attribute's
    /// stored operator on attach instead of pushing their own.
    pub operator: Option<Operator>,
    /// Ordered source attributes (connection order == sequence order).
    pub connections: SmallVec<[SlotId; 4]>,
}

impl InputBinding {
    pub fn new() -> Self {
        Self {
            target: None,
            operator: None,
            connections: SmallVec::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }
}

impl Default for InputBinding {
    fn default() -> Self {
        Self::new()
    }
}

/// Relation table for input bindings.
///
/// Lookups go by id in both directions: attribute-id → binding-id and
/// binding-id → record. A target attribute holds at most one attached
/// binding at a time (adjacency exclusivity is enforced by the caller).
#[derive(Debug, Default)]
pub struct Bindings {
    records: Arena<InputBinding>,
    /// target attribute -> binding (only attached bindings appear here)
    by_target: IndexMap<SlotId, SlotId>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> SlotId {
        self.records.insert(InputBinding::new())
    }

    pub fn get(&self, binding: SlotId) -> Option<&InputBinding> {
        self.records.get(binding)
    }

    pub fn get_mut(&mut self, binding: SlotId) -> Option<&mut InputBinding> {
        self.records.get_mut(binding)
    }

    /// Binding currently attached to an attribute, if any.
    pub fn attached_to(&self, attribute: SlotId) -> Option<SlotId> {
        self.by_target.get(&attribute).copied()
    }

    pub fn record_attach(&mut self, binding: SlotId, attribute: SlotId) {
        if let Some(record) = self.records.get_mut(binding) {
            record.target = Some(attribute);
            self.by_target.insert(attribute, binding);
        }
    }

    pub fn record_detach(&mut self, binding: SlotId) {
        if let Some(record) = self.records.get_mut(binding) {
            if let Some(target) = record.target.take() {
                self.by_target.shift_remove(&target);
            }
        }
    }

    /// Delete a binding record entirely (block removed from the canvas).
    pub fn delete(&mut self, binding: SlotId) {
        self.record_detach(binding);
        self.records.remove(binding);
    }

    /// Live binding ids in deterministic order.
    pub fn ids(&self) -> Vec<SlotId> {
        self.records.ids()
    }

    /// Drop every connection referencing a removed source attribute.
    pub fn purge_source(&mut self, source: SlotId) {
        for id in self.records.ids() {
            if let Some(record) = self.records.get_mut(id) {
                record.connections.retain(|s| *s != source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_detach_round_trip() {
        let mut bindings = Bindings::new();
        let attr = SlotId { index: 7, generation: 0 };

        let binding = bindings.create();
        assert!(!bindings.get(binding).unwrap().is_attached());
        assert_eq!(bindings.attached_to(attr), None);

        bindings.record_attach(binding, attr);
        assert_eq!(bindings.attached_to(attr), Some(binding));

        bindings.record_detach(binding);
        assert_eq!(bindings.attached_to(attr), None);
        // Connections survive a detach
        assert!(bindings.get(binding).is_some());
    }

    #[test]
    fn purge_source_drops_connections() {
        let mut bindings = Bindings::new();
        let src = SlotId { index: 3, generation: 0 };
        let other = SlotId { index: 4, generation: 0 };

        let binding = bindings.create();
        let record = bindings.get_mut(binding).unwrap();
        record.connections.push(src);
        record.connections.push(other);

        bindings.purge_source(src);
        assert_eq!(bindings.get(binding).unwrap().connections.as_slice(), &[other]);
    }
}
