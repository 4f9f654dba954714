use std::collections::HashMap;

use log::{debug, warn};

use super::arena::SlotId;
use super::class::ClassKind;
use super::error::EngineError;
use super::graph::Graph;

impl Graph {
    /// Recompute every setup attribute's value.
    ///
    /// Reset phase first: each value falls back to its manual `base`
    /// component. Then a topological pass (Kahn) resolves attributes in
    /// dependency order; inputs owned by configuration classes read as
    /// constants. The pass is a pure function of the current structure and
    /// manual values, so back-to-back calls yield identical results.
    ///
    /// Cycle policy: everything outside a cycle still resolves; if any
    /// attribute is left unresolved the call returns
    /// [`EngineError::DependencyCycle`] naming one of them.
    pub fn calculate_all(&mut self) -> Result<(), EngineError> {
        let setup_attrs: Vec<SlotId> = self
            .attributes
            .iter()
            .filter(|(_, attr)| self.class_kind(attr.owner) == Some(ClassKind::Setup))
            .map(|(id, _)| id)
            .collect();

        // Reset phase: clear computed values back to the manual component
        for &id in &setup_attrs {
            if let Some(attr) = self.attributes.get_mut(id) {
                attr.value = attr.base;
            }
        }

        // Dependency edges between setup attributes. Configuration-owned
        // sources contribute values but never ordering constraints.
        let mut indegree: HashMap<SlotId, usize> = HashMap::new();
        let mut dependents: HashMap<SlotId, Vec<SlotId>> = HashMap::new();
        for &id in &setup_attrs {
            indegree.entry(id).or_insert(0);
            let Some(attr) = self.attributes.get(id) else { continue };
            for input in &attr.inputs {
                if !self.attributes.contains(input.source) {
                    warn!("attribute {id:?} has a stale input {:?}", input.source);
                    continue;
                }
                let source_is_setup = self
                    .attributes
                    .get(input.source)
                    .is_some_and(|src| self.class_kind(src.owner) == Some(ClassKind::Setup));
                if source_is_setup {
                    *indegree.entry(id).or_insert(0) += 1;
                    dependents.entry(input.source).or_default().push(id);
                }
            }
        }

        // Kahn's algorithm; the ready queue starts in slot-index order so
        // the pass is deterministic.
        let mut ready: Vec<SlotId> = setup_attrs
            .iter()
            .copied()
            .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
            .collect();
        let mut resolved = 0usize;
        let mut cursor = 0usize;

        while cursor < ready.len() {
            let id = ready[cursor];
            cursor += 1;
            resolved += 1;

            self.evaluate_attribute(id);

            if let Some(targets) = dependents.get(&id) {
                for &target in targets {
                    let count = indegree.entry(target).or_insert(0);
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push(target);
                    }
                }
            }
        }

        if resolved < setup_attrs.len() {
            // Whatever is left sits on a cycle; report the first by slot order
            let unresolved = setup_attrs
                .iter()
                .copied()
                .find(|id| indegree.get(id).copied().unwrap_or(0) > 0);
            if let Some(attribute) = unresolved {
                let name = self
                    .attributes
                    .get(attribute)
                    .map(|attr| attr.name.to_string())
                    .unwrap_or_default();
                warn!("dependency cycle detected at {attribute:?} ({name})");
                return Err(EngineError::DependencyCycle { attribute, name });
            }
        }

        debug!("calculated {resolved} setup attributes");
        Ok(())
    }

    /// Resolve one attribute from its already-resolved inputs.
    /// Without an operator or without inputs the value stays at `base`.
    fn evaluate_attribute(&mut self, id: SlotId) {
        let Some(attr) = self.attributes.get(id) else { return };
        let Some(operator) = attr.operator else { return };
        if attr.inputs.is_empty() {
            return;
        }

        // Inputs evaluate in stored order: ascending sequence number for
        // order-sensitive operators, insertion order otherwise.
        let mut values = Vec::with_capacity(attr.inputs.len());
        for input in &attr.inputs {
            let Some(source) = self.attributes.get(input.source) else {
                continue;
            };
            let value = match self.class_kind(source.owner) {
                Some(ClassKind::Setup) => source.value,
                _ => source.base,
            };
            values.push(value);
        }
        if values.is_empty() {
            return;
        }

        let combined = operator.apply(&values);
        let scalar = attr.scalar.unwrap_or(1.0);
        let base = attr.base;
        if let Some(attr) = self.attributes.get_mut(id) {
            attr.value = scalar * combined + base;
        }
    }
}
