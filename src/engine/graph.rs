use std::sync::Arc;

use log::{debug, warn};

use super::arena::{Arena, SlotId};
use super::attribute::{Attribute, InputRef, Operator};
use super::binding::Bindings;
use super::class::{Class, ClassKind};
use super::error::EngineError;
use super::linked::{LinkedGroups, MemberRole};

/// The block-model graph: every class, attribute and binding, plus the two
/// linked-group registries.
///
/// All structural mutation goes through this type so that edits propagate
/// to every linked copy before the call returns. Single-threaded and
/// synchronous: each operation runs to completion on the calling thread.
pub struct Graph {
    pub classes: Arena<Class>,
    pub attributes: Arena<Attribute>,
    pub bindings: Bindings,
    configuration_groups: LinkedGroups,
    setup_groups: LinkedGroups,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            classes: Arena::new(),
            attributes: Arena::new(),
            bindings: Bindings::new(),
            configuration_groups: LinkedGroups::new(),
            setup_groups: LinkedGroups::new(),
        }
    }

    // ---- classes and attributes ----

    pub fn create_class(&mut self, name: impl Into<Arc<str>>, kind: ClassKind) -> SlotId {
        self.classes.insert(Class::new(name, kind))
    }

    /// Append an attribute to a class at the next free slot.
    pub fn add_attribute(
        &mut self,
        class_id: SlotId,
        name: impl Into<Arc<str>>,
        base: f64,
    ) -> SlotId {
        let slot = self
            .classes
            .get(class_id)
            .map(|class| class.slot_count())
            .unwrap_or(0);
        let mut attribute = Attribute::new(name, slot, class_id);
        attribute.base = base;
        attribute.value = base;
        let id = self.attributes.insert(attribute);
        if let Some(class) = self.classes.get_mut(class_id) {
            class.attributes.push(id);
        }
        id
    }

    pub fn class_kind(&self, class_id: SlotId) -> Option<ClassKind> {
        self.classes.get(class_id).map(|class| class.kind)
    }

    fn registry(&self, kind: ClassKind) -> &LinkedGroups {
        match kind {
            ClassKind::Configuration => &self.configuration_groups,
            ClassKind::Setup => &self.setup_groups,
        }
    }

    pub fn groups(&self, kind: ClassKind) -> &LinkedGroups {
        self.registry(kind)
    }

    // ---- linked groups ----

    /// All other members of a class's linked group.
    pub fn linked_classes(&self, class_id: SlotId) -> Vec<SlotId> {
        match self.class_kind(class_id) {
            Some(kind) => self.registry(kind).linked(class_id, &self.classes),
            None => Vec::new(),
        }
    }

    /// The attribute at the same slot in every linked copy of the owner
    /// class. Empty when the owner is ungrouped.
    pub fn linked_attributes(&self, attribute: SlotId) -> Vec<SlotId> {
        let Some(attr) = self.attributes.get(attribute) else {
            return Vec::new();
        };
        let slot = attr.slot;
        self.linked_classes(attr.owner)
            .into_iter()
            .filter_map(|class_id| self.classes.get(class_id)?.attribute_at(slot))
            .collect()
    }

    pub fn member_role(&self, class_id: SlotId) -> Option<MemberRole> {
        let kind = self.class_kind(class_id)?;
        self.registry(kind).role(class_id, &self.classes)
    }

    /// Duplicate a class as a linked copy, creating the group lazily on the
    /// first duplication. The copy mirrors structure (names, slots,
    /// operators, scalars, bases and connections), not computed values.
    /// Internal connections remap to the copy's own attributes; external
    /// connections keep their original sources.
    pub fn create_linked_copy(&mut self, source_class: SlotId) -> Option<SlotId> {
        let (name, kind, configuration, source_attrs) = {
            let class = self.classes.get(source_class)?;
            (
                class.name.clone(),
                class.kind,
                class.configuration,
                class.attributes.clone(),
            )
        };

        let group = match kind {
            ClassKind::Configuration => {
                self.configuration_groups.create_group(source_class, &mut self.classes)
            }
            ClassKind::Setup => self.setup_groups.create_group(source_class, &mut self.classes),
        };

        let copy_id = self.classes.insert(Class {
            name,
            kind,
            attributes: Vec::new(),
            linked_group: None,
            configuration,
        });

        // Duplicate attributes slot by slot
        let mut copied_attrs = Vec::with_capacity(source_attrs.len());
        for attr_id in &source_attrs {
            let template = match self.attributes.get(*attr_id) {
                Some(attr) => attr.clone(),
                None => continue,
            };
            let mut copy = Attribute::new(template.name.clone(), template.slot, copy_id);
            copy.operator = template.operator;
            copy.scalar = template.scalar;
            copy.base = template.base;
            copy.value = template.base;
            copied_attrs.push((copy, template.inputs));
        }

        let mut copy_attr_ids = Vec::with_capacity(copied_attrs.len());
        for (copy, _) in &copied_attrs {
            copy_attr_ids.push(self.attributes.insert(copy.clone()));
        }
        if let Some(class) = self.classes.get_mut(copy_id) {
            class.attributes = copy_attr_ids.clone();
        }

        // Remap connections: internal sources point into the copy itself
        for (index, (_, inputs)) in copied_attrs.iter().enumerate() {
            let target_id = copy_attr_ids[index];
            for input in inputs {
                let source = if input.internal {
                    let slot = self
                        .attributes
                        .get(input.source)
                        .map(|attr| attr.slot as usize);
                    match slot.and_then(|slot| copy_attr_ids.get(slot)) {
                        Some(id) => *id,
                        None => continue,
                    }
                } else {
                    input.source
                };
                if let Some(attr) = self.attributes.get_mut(target_id) {
                    attr.inputs.push(InputRef { source, internal: input.internal });
                }
            }
        }

        match kind {
            ClassKind::Configuration => {
                self.configuration_groups.add_to_group(copy_id, group, &mut self.classes)
            }
            ClassKind::Setup => self.setup_groups.add_to_group(copy_id, group, &mut self.classes),
        }
        debug!("created linked copy of {source_class:?} in group {group}");
        Some(copy_id)
    }

    /// Re-register a linked group from persisted membership (restore path).
    /// Groups must be restored in ascending saved-id order so the dense ids
    /// come out identical to the ones that were saved.
    pub fn restore_group(&mut self, kind: ClassKind, members: &[SlotId]) {
        let Some((first, rest)) = members.split_first() else {
            return;
        };
        let group = match kind {
            ClassKind::Configuration => {
                self.configuration_groups.create_group(*first, &mut self.classes)
            }
            ClassKind::Setup => self.setup_groups.create_group(*first, &mut self.classes),
        };
        for &member in rest {
            match kind {
                ClassKind::Configuration => {
                    self.configuration_groups.add_to_group(member, group, &mut self.classes)
                }
                ClassKind::Setup => self.setup_groups.add_to_group(member, group, &mut self.classes),
            }
        }
    }

    /// Remove a class and everything referencing it: its attributes, any
    /// bindings attached to them, connections feeding from them, and its
    /// linked-group membership (dissolving/renumbering as needed).
    pub fn remove_class(&mut self, class_id: SlotId) {
        let Some(class) = self.classes.get(class_id) else {
            return;
        };
        let kind = class.kind;
        let attrs = class.attributes.clone();

        // Detach bindings targeting the removed attributes
        for attr_id in &attrs {
            if let Some(binding) = self.bindings.attached_to(*attr_id) {
                self.detach_binding(binding);
                self.bindings.delete(binding);
            }
        }

        // Drop connections sourced from the removed attributes
        for attr_id in &attrs {
            self.bindings.purge_source(*attr_id);
            for other in self.attributes.ids() {
                if let Some(attr) = self.attributes.get_mut(other) {
                    attr.remove_input(*attr_id);
                }
            }
        }

        match kind {
            ClassKind::Configuration => {
                self.configuration_groups.remove_from_group(class_id, &mut self.classes)
            }
            ClassKind::Setup => self.setup_groups.remove_from_group(class_id, &mut self.classes),
        }

        for attr_id in attrs {
            self.attributes.remove(attr_id);
        }
        self.classes.remove(class_id);
    }

    // ---- bindings ----

    pub fn create_binding(&mut self) -> SlotId {
        self.bindings.create()
    }

    /// Attach an operator block to an attribute.
    ///
    /// A target already holding a binding is left untouched (the GUI
    /// enforces adjacency exclusivity; a second attach is a logged no-op).
    /// When the target's class is a linked mirror and the attribute already
    /// carries an operator, the block adopts that operator passively;
    /// otherwise the block's operator is written through and propagated.
    pub fn attach_binding(&mut self, binding: SlotId, attribute: SlotId) {
        if self.bindings.attached_to(attribute).is_some() {
            warn!("attach ignored: attribute {attribute:?} already has a binding");
            return;
        }
        let Some(record) = self.bindings.get(binding) else {
            warn!("attach ignored: unknown binding {binding:?}");
            return;
        };
        let connections: Vec<SlotId> = record.connections.to_vec();
        let block_operator = record.operator;

        let Some(attr) = self.attributes.get(attribute) else {
            warn!("attach ignored: unknown attribute {attribute:?}");
            return;
        };
        let owner = attr.owner;
        let stored_operator = attr.operator;
        let owner_is_linked = self
            .classes
            .get(owner)
            .is_some_and(|class| class.is_linked());

        self.bindings.record_attach(binding, attribute);

        if owner_is_linked && stored_operator.is_some() {
            // Mirror copy: the attribute's stored operator wins
            if let Some(record) = self.bindings.get_mut(binding) {
                record.operator = stored_operator;
            }
        } else {
            self.apply_operator(attribute, block_operator);
        }

        for source in connections {
            self.apply_connection(attribute, source, true);
        }
    }

    /// Detach an operator block from its attribute. No-op when the block is
    /// not attached.
    ///
    /// The block keeps its connection list. If no linked copy of the target
    /// retains a binding afterwards, the target's operator and scalar reset
    /// to their unset defaults across the whole group.
    pub fn detach_binding(&mut self, binding: SlotId) {
        let Some(record) = self.bindings.get(binding) else {
            return;
        };
        let Some(attribute) = record.target else {
            return;
        };
        let connections: Vec<SlotId> = record.connections.to_vec();

        self.bindings.record_detach(binding);

        for source in connections {
            self.apply_connection(attribute, source, false);
        }

        // Count linked copies still holding a binding. An ungrouped class
        // has no linked copies, so the count covers exactly this one copy.
        let still_bound = self
            .linked_attributes(attribute)
            .into_iter()
            .filter(|linked| self.bindings.attached_to(*linked).is_some())
            .count();

        if still_bound == 0 {
            for id in self.attribute_and_linked(attribute) {
                if let Some(attr) = self.attributes.get_mut(id) {
                    attr.reset_to_defaults();
                }
            }
            debug!("reset operator and scalar for {attribute:?} and linked copies");
        }
    }

    /// Add an ordered connection to a block. Applied to the target's input
    /// list (and every linked copy) when the block is attached.
    pub fn connect_source(&mut self, binding: SlotId, source: SlotId) {
        let target = {
            let Some(record) = self.bindings.get_mut(binding) else {
                return;
            };
            record.connections.push(source);
            record.target
        };
        if let Some(target) = target {
            self.apply_connection(target, source, true);
        }
    }

    /// Remove a connection from a block. No-op when absent.
    pub fn disconnect_source(&mut self, binding: SlotId, source: SlotId) {
        let target = {
            let Some(record) = self.bindings.get_mut(binding) else {
                return;
            };
            let before = record.connections.len();
            record.connections.retain(|s| *s != source);
            if record.connections.len() == before {
                return;
            }
            record.target
        };
        if let Some(target) = target {
            self.apply_connection(target, source, false);
        }
    }

    /// Set the operation of a block. Written through to the attached
    /// attribute and all linked copies.
    pub fn set_operator(&mut self, binding: SlotId, operator: Option<Operator>) {
        let target = {
            let Some(record) = self.bindings.get_mut(binding) else {
                return;
            };
            record.operator = operator;
            record.target
        };
        if let Some(target) = target {
            self.apply_operator(target, operator);
        }
    }

    /// Set an attribute's input scalar, propagating to linked copies.
    /// `None` restores the unset sentinel (factor 1.0, no indicator).
    pub fn set_scalar(&mut self, attribute: SlotId, scalar: Option<f64>) {
        for id in self.attribute_and_linked(attribute) {
            if let Some(attr) = self.attributes.get_mut(id) {
                attr.scalar = scalar;
            }
        }
    }

    /// Parse scalar text and apply it. Validation happens before any state
    /// mutation: a parse failure leaves every copy untouched.
    pub fn set_scalar_text(&mut self, attribute: SlotId, text: &str) -> Result<(), EngineError> {
        let scalar: f64 = text
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidScalar(text.to_string()))?;
        self.set_scalar(attribute, Some(scalar));
        Ok(())
    }

    // ---- outbound display state ----

    /// Operator symbol to paint on the block, or `None` for the unset
    /// placeholder.
    pub fn operator_symbol(&self, attribute: SlotId) -> Option<&'static str> {
        self.attributes
            .get(attribute)
            .and_then(|attr| attr.operator)
            .map(|op| op.symbol())
    }

    pub fn scalar(&self, attribute: SlotId) -> Option<f64> {
        self.attributes.get(attribute).and_then(|attr| attr.scalar)
    }

    pub fn value(&self, attribute: SlotId) -> Option<f64> {
        self.attributes.get(attribute).map(|attr| attr.value)
    }

    /// Per-connection sequence numbers of a block, 1-based for
    /// order-sensitive operators, `None` per connection otherwise.
    pub fn sequence_numbers(&self, binding: SlotId) -> Vec<Option<u32>> {
        let Some(record) = self.bindings.get(binding) else {
            return Vec::new();
        };
        let ordered = record.operator.is_some_and(|op| op.is_order_sensitive());
        (0..record.connections.len())
            .map(|i| if ordered { Some(i as u32 + 1) } else { None })
            .collect()
    }

    // ---- propagation helpers ----

    /// The attribute itself plus its counterpart in every linked copy.
    fn attribute_and_linked(&self, attribute: SlotId) -> Vec<SlotId> {
        let mut ids = vec![attribute];
        ids.extend(self.linked_attributes(attribute));
        ids
    }

    fn apply_operator(&mut self, attribute: SlotId, operator: Option<Operator>) {
        for id in self.attribute_and_linked(attribute) {
            if let Some(attr) = self.attributes.get_mut(id) {
                attr.operator = operator;
            }
        }
    }

    /// Add or remove one connection on the target attribute and mirror the
    /// change to every linked copy. Internal sources remap to each copy's
    /// own attribute at the source's slot; external sources are shared.
    fn apply_connection(&mut self, target: SlotId, source: SlotId, add: bool) {
        let Some(target_attr) = self.attributes.get(target) else {
            warn!("connection ignored: unknown attribute {target:?}");
            return;
        };
        let target_owner = target_attr.owner;
        let target_slot = target_attr.slot;

        let Some(source_attr) = self.attributes.get(source) else {
            warn!("connection ignored: unknown source {source:?}");
            return;
        };
        let internal = source_attr.owner == target_owner;
        let source_slot = source_attr.slot;

        let mut edits: Vec<(SlotId, SlotId)> = vec![(target, source)];
        for class_id in self.linked_classes(target_owner) {
            let Some(class) = self.classes.get(class_id) else { continue };
            let Some(mirror_target) = class.attribute_at(target_slot) else { continue };
            let mirror_source = if internal {
                match class.attribute_at(source_slot) {
                    Some(id) => id,
                    None => continue,
                }
            } else {
                source
            };
            edits.push((mirror_target, mirror_source));
        }

        for (edit_target, edit_source) in edits {
            if let Some(attr) = self.attributes.get_mut(edit_target) {
                if add {
                    attr.add_input(edit_source, internal);
                } else {
                    attr.remove_input(edit_source);
                }
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_attr_class(graph: &mut Graph, name: &str, kind: ClassKind) -> (SlotId, SlotId, SlotId) {
        let class = graph.create_class(name, kind);
        let a = graph.add_attribute(class, "a", 0.0);
        let b = graph.add_attribute(class, "b", 0.0);
        (class, a, b)
    }

    #[test]
    fn operator_propagates_to_linked_copies() {
        let mut graph = Graph::new();
        let (class, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();
        let copy_a = graph.classes.get(copy).unwrap().attribute_at(0).unwrap();

        let binding = graph.create_binding();
        graph.set_operator(binding, Some(Operator::Sum));
        graph.attach_binding(binding, a);

        assert_eq!(graph.operator_symbol(a), Some("+"));
        assert_eq!(graph.operator_symbol(copy_a), Some("+"));
    }

    #[test]
    fn mirror_attach_adopts_stored_operator() {
        let mut graph = Graph::new();
        let (class, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();
        let copy_a = graph.classes.get(copy).unwrap().attribute_at(0).unwrap();

        let owner_block = graph.create_binding();
        graph.set_operator(owner_block, Some(Operator::Product));
        graph.attach_binding(owner_block, a);

        // A block attaching on the mirror copy picks up the group's
        // operator instead of pushing its own.
        let mirror_block = graph.create_binding();
        graph.set_operator(mirror_block, Some(Operator::Sum));
        graph.attach_binding(mirror_block, copy_a);

        assert_eq!(graph.bindings.get(mirror_block).unwrap().operator, Some(Operator::Product));
        assert_eq!(graph.operator_symbol(copy_a), Some("*"));
    }

    #[test]
    fn internal_connections_remap_in_copies() {
        let mut graph = Graph::new();
        let (class, a, b) = two_attr_class(&mut graph, "C", ClassKind::Configuration);

        let binding = graph.create_binding();
        graph.set_operator(binding, Some(Operator::Sum));
        graph.attach_binding(binding, a);
        graph.connect_source(binding, b);

        let copy = graph.create_linked_copy(class).unwrap();
        let copy_class = graph.classes.get(copy).unwrap();
        let copy_a = copy_class.attribute_at(0).unwrap();
        let copy_b = copy_class.attribute_at(1).unwrap();

        let inputs = &graph.attributes.get(copy_a).unwrap().inputs;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source, copy_b);
        assert!(inputs[0].internal);
    }

    #[test]
    fn connect_after_copy_mirrors_to_all_members() {
        let mut graph = Graph::new();
        let (class, a, b) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();

        let binding = graph.create_binding();
        graph.set_operator(binding, Some(Operator::Sum));
        graph.attach_binding(binding, a);
        graph.connect_source(binding, b);

        let copy_class = graph.classes.get(copy).unwrap();
        let copy_a = copy_class.attribute_at(0).unwrap();
        let copy_b = copy_class.attribute_at(1).unwrap();
        let inputs = &graph.attributes.get(copy_a).unwrap().inputs;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source, copy_b);
    }

    #[test]
    fn detach_last_binding_resets_whole_group() {
        let mut graph = Graph::new();
        let (class, a, b) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();
        let copy_a = graph.classes.get(copy).unwrap().attribute_at(0).unwrap();

        let binding = graph.create_binding();
        graph.set_operator(binding, Some(Operator::Difference));
        graph.attach_binding(binding, a);
        graph.connect_source(binding, b);
        graph.set_scalar(a, Some(2.5));

        assert_eq!(graph.scalar(copy_a), Some(2.5));

        graph.detach_binding(binding);

        for id in [a, copy_a] {
            assert_eq!(graph.operator_symbol(id), None);
            assert_eq!(graph.scalar(id), None);
            assert!(graph.attributes.get(id).unwrap().inputs.is_empty());
        }
        // The detached block keeps its connections for a later re-attach
        assert_eq!(graph.bindings.get(binding).unwrap().connections.len(), 1);
    }

    #[test]
    fn reattach_reapplies_retained_connections() {
        let mut graph = Graph::new();
        let (class, a, b) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();
        let copy_class = graph.classes.get(copy).unwrap();
        let copy_a = copy_class.attribute_at(0).unwrap();
        let copy_b = copy_class.attribute_at(1).unwrap();

        let binding = graph.create_binding();
        graph.set_operator(binding, Some(Operator::Sum));
        graph.attach_binding(binding, a);
        graph.connect_source(binding, b);

        graph.detach_binding(binding);
        assert!(graph.attributes.get(a).unwrap().inputs.is_empty());
        assert!(graph.attributes.get(copy_a).unwrap().inputs.is_empty());

        graph.attach_binding(binding, a);

        // The block's retained connection list rebuilds the target's inputs
        let inputs = &graph.attributes.get(a).unwrap().inputs;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source, b);
        assert_eq!(graph.operator_symbol(a), Some("+"));

        // Mirror copies rebuild too, remapped to their own attributes
        let copy_inputs = &graph.attributes.get(copy_a).unwrap().inputs;
        assert_eq!(copy_inputs.len(), 1);
        assert_eq!(copy_inputs[0].source, copy_b);
        assert_eq!(graph.operator_symbol(copy_a), Some("+"));
    }

    #[test]
    fn detach_keeps_operator_while_another_copy_is_bound() {
        let mut graph = Graph::new();
        let (class, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();
        let copy_a = graph.classes.get(copy).unwrap().attribute_at(0).unwrap();

        let block_a = graph.create_binding();
        graph.set_operator(block_a, Some(Operator::Sum));
        graph.attach_binding(block_a, a);

        let block_copy = graph.create_binding();
        graph.attach_binding(block_copy, copy_a);

        graph.detach_binding(block_a);

        // The mirror copy is still bound, so the operator survives
        assert_eq!(graph.operator_symbol(a), Some("+"));
        assert_eq!(graph.operator_symbol(copy_a), Some("+"));
    }

    #[test]
    fn second_attach_to_same_target_is_noop() {
        let mut graph = Graph::new();
        let (_, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);

        let first = graph.create_binding();
        graph.attach_binding(first, a);
        let second = graph.create_binding();
        graph.attach_binding(second, a);

        assert_eq!(graph.bindings.attached_to(a), Some(first));
        assert!(!graph.bindings.get(second).unwrap().is_attached());
    }

    #[test]
    fn scalar_text_validation_precedes_mutation() {
        let mut graph = Graph::new();
        let (_, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);

        graph.set_scalar_text(a, "2.5").unwrap();
        assert_eq!(graph.scalar(a), Some(2.5));

        let err = graph.set_scalar_text(a, "two").unwrap_err();
        assert!(matches!(err, EngineError::InvalidScalar(_)));
        assert_eq!(graph.scalar(a), Some(2.5));
    }

    #[test]
    fn remove_class_cleans_references_and_renumbers() {
        let mut graph = Graph::new();
        let (class, a, _) = two_attr_class(&mut graph, "C", ClassKind::Configuration);
        let copy = graph.create_linked_copy(class).unwrap();

        let (other_class, other_a, _) = two_attr_class(&mut graph, "D", ClassKind::Configuration);
        let binding = graph.create_binding();
        graph.attach_binding(binding, other_a);
        graph.connect_source(binding, a);
        assert_eq!(graph.attributes.get(other_a).unwrap().inputs.len(), 1);

        graph.remove_class(class);

        // Group of two dissolved, copy unstamped, connection dropped
        assert_eq!(graph.groups(ClassKind::Configuration).group_count(), 0);
        assert_eq!(graph.classes.get(copy).unwrap().linked_group, None);
        assert!(graph.attributes.get(other_a).unwrap().inputs.is_empty());
        assert!(graph.bindings.get(binding).unwrap().connections.is_empty());
        let _ = other_class;
    }
}
