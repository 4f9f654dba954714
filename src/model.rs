//! View/model orchestration: ordered view collections, class placement,
//! and save/restore coordination.
//!
//! Views own classes; the [`Graph`] owns everything else. Configuration
//! views save (and restore) before setup views because setup classes
//! reference configuration classes.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::engine::{ClassKind, EngineError, Graph, Operator, SlotId};
use crate::snapshot::{
    AttributeState, ClassState, IndexEntry, InputState, SaveIndex, ViewSnapshot,
};

/// Name of the index file inside a save directory.
pub const INDEX_FILE: &str = "index.json";

/// One canvas of classes, either configuration or setup.
#[derive(Debug)]
pub struct View {
    pub name: String,
    pub kind: ClassKind,
    /// Classes placed on this view, in creation order.
    pub classes: Vec<SlotId>,
}

/// The whole editor model: the block graph plus ordered view collections.
pub struct Model {
    pub graph: Graph,
    configuration_views: Vec<View>,
    setup_views: Vec<View>,
}

impl Model {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            configuration_views: Vec::new(),
            setup_views: Vec::new(),
        }
    }

    /// Fresh save layout: one configuration view and three setup views.
    pub fn with_default_views() -> Self {
        let mut model = Self::new();
        model.create_view(ClassKind::Configuration, "Configuration");
        for i in 1..=3 {
            model.create_view(ClassKind::Setup, format!("Setup {i}"));
        }
        model
    }

    pub fn configuration_views(&self) -> &[View] {
        &self.configuration_views
    }

    pub fn setup_views(&self) -> &[View] {
        &self.setup_views
    }

    fn views_mut(&mut self, kind: ClassKind) -> &mut Vec<View> {
        match kind {
            ClassKind::Configuration => &mut self.configuration_views,
            ClassKind::Setup => &mut self.setup_views,
        }
    }

    fn views(&self, kind: ClassKind) -> &[View] {
        match kind {
            ClassKind::Configuration => &self.configuration_views,
            ClassKind::Setup => &self.setup_views,
        }
    }

    /// Append a view, returning its index within its kind.
    pub fn create_view(&mut self, kind: ClassKind, name: impl Into<String>) -> usize {
        let views = self.views_mut(kind);
        views.push(View { name: name.into(), kind, classes: Vec::new() });
        views.len() - 1
    }

    /// Delete a view and every class placed on it.
    pub fn delete_view(&mut self, kind: ClassKind, index: usize) {
        let views = self.views_mut(kind);
        if index >= views.len() {
            warn!("delete_view ignored: no {kind:?} view at index {index}");
            return;
        }
        let view = views.remove(index);
        for class_id in view.classes {
            self.graph.remove_class(class_id);
        }
    }

    /// Create a class on a view.
    pub fn create_class(
        &mut self,
        kind: ClassKind,
        view_index: usize,
        name: impl Into<Arc<str>>,
    ) -> Option<SlotId> {
        if view_index >= self.views(kind).len() {
            return None;
        }
        let class_id = self.graph.create_class(name, kind);
        self.views_mut(kind)[view_index].classes.push(class_id);
        Some(class_id)
    }

    /// Remove a class from wherever it is placed, cleaning the graph.
    pub fn remove_class(&mut self, class_id: SlotId) {
        for view in self
            .configuration_views
            .iter_mut()
            .chain(self.setup_views.iter_mut())
        {
            view.classes.retain(|id| *id != class_id);
        }
        self.graph.remove_class(class_id);
    }

    /// Duplicate a class as a linked copy onto another view of the same
    /// kind. The group is created lazily on first duplication.
    pub fn create_linked_copy(
        &mut self,
        source_class: SlotId,
        target_view: usize,
    ) -> Option<SlotId> {
        let kind = self.graph.class_kind(source_class)?;
        if target_view >= self.views(kind).len() {
            return None;
        }
        let copy = self.graph.create_linked_copy(source_class)?;
        self.views_mut(kind)[target_view].classes.push(copy);
        Some(copy)
    }

    /// Recompute every setup attribute. Invoked after a structural load or
    /// a script-driven change.
    pub fn calculate_values(&mut self) -> Result<(), EngineError> {
        self.graph.calculate_all()
    }

    // ---- persistence ----

    /// Save every view into `dir`: one JSON file per view plus an index
    /// listing the files in restore order (configuration before setup).
    pub fn save(&mut self, dir: &Path) -> Result<(), EngineError> {
        fs::create_dir_all(dir)?;

        self.dedupe_view_names();
        let ordinals = self.class_ordinals();

        let mut index = SaveIndex::new();
        let views = self
            .configuration_views
            .iter()
            .chain(self.setup_views.iter());
        for (position, view) in views.enumerate() {
            let snapshot = self.capture_view(view, &ordinals);
            let file_name = match view.kind {
                ClassKind::Configuration => format!("configuration-{position}.json"),
                ClassKind::Setup => format!("setup-{position}.json"),
            };
            fs::write(dir.join(&file_name), snapshot.to_json()?)?;
            index.entries.push(IndexEntry { kind: view.kind, path: file_name });
        }
        fs::write(dir.join(INDEX_FILE), index.to_json()?)?;
        info!("saved {} views to {}", index.entries.len(), dir.display());
        Ok(())
    }

    /// Restore a model from a save directory and run a full calculation
    /// pass over the restored structure.
    pub fn load(dir: &Path) -> Result<Self, EngineError> {
        let index = SaveIndex::from_json(&fs::read_to_string(dir.join(INDEX_FILE))?)?;
        let mut model = Model::new();

        // First pass: views, classes, attributes. Source connections wait
        // until every class ordinal can resolve.
        let mut classes_by_ordinal: Vec<SlotId> = Vec::new();
        let mut pending: Vec<(usize, ViewSnapshot)> = Vec::new();
        let mut groups: HashMap<(ClassKind, u32), Vec<SlotId>> = HashMap::new();

        for entry in &index.entries {
            let snapshot = ViewSnapshot::from_json(&fs::read_to_string(dir.join(&entry.path))?)?;
            let view_index = model.create_view(snapshot.kind, snapshot.name.clone());
            for class_state in &snapshot.classes {
                let class_id = model
                    .create_class(snapshot.kind, view_index, class_state.name.clone())
                    .unwrap_or(SlotId::INVALID);
                if let Some(group) = class_state.linked_group {
                    groups.entry((snapshot.kind, group)).or_default().push(class_id);
                }
                for attr_state in &class_state.attributes {
                    let attr_id = model.graph.add_attribute(
                        class_id,
                        attr_state.name.clone(),
                        attr_state.base,
                    );
                    if let Some(attr) = model.graph.attributes.get_mut(attr_id) {
                        attr.operator = match &attr_state.operator {
                            Some(symbol) => Some(
                                Operator::from_symbol(symbol)
                                    .ok_or_else(|| EngineError::UnknownOperator(symbol.clone()))?,
                            ),
                            None => None,
                        };
                        attr.scalar = attr_state.scalar;
                    }
                }
                classes_by_ordinal.push(class_id);
            }
            pending.push((classes_by_ordinal.len() - snapshot.classes.len(), snapshot));
        }

        // Rebuild registries in ascending saved-id order so dense ids match
        let mut group_keys: Vec<(ClassKind, u32)> = groups.keys().copied().collect();
        group_keys.sort_by_key(|(kind, id)| (*kind == ClassKind::Setup, *id));
        for key in group_keys {
            model.graph.restore_group(key.0, &groups[&key]);
        }

        // Second pass: resolve configuration references and connections
        for (first_ordinal, snapshot) in &pending {
            for (offset, class_state) in snapshot.classes.iter().enumerate() {
                let class_id = classes_by_ordinal[first_ordinal + offset];
                if let Some(config_ordinal) = class_state.configuration {
                    let config = resolve_class(&classes_by_ordinal, config_ordinal)?;
                    if let Some(class) = model.graph.classes.get_mut(class_id) {
                        class.configuration = Some(config);
                    }
                }
                for (slot, attr_state) in class_state.attributes.iter().enumerate() {
                    let attr_id = model
                        .graph
                        .classes
                        .get(class_id)
                        .and_then(|class| class.attribute_at(slot as u32));
                    let Some(attr_id) = attr_id else { continue };
                    for input in &attr_state.inputs {
                        let source = resolve_input(&model.graph, &classes_by_ordinal, input)?;
                        if let Some(attr) = model.graph.attributes.get_mut(attr_id) {
                            attr.add_input(source, input.internal);
                        }
                    }
                }
            }
        }

        info!("restored {} views from {}", index.entries.len(), dir.display());
        model.calculate_values()?;
        Ok(model)
    }

    /// Snapshot one view against a global class-ordinal map.
    fn capture_view(&self, view: &View, ordinals: &HashMap<SlotId, usize>) -> ViewSnapshot {
        let mut snapshot = ViewSnapshot::new(view.name.clone(), view.kind);
        for &class_id in &view.classes {
            let Some(class) = self.graph.classes.get(class_id) else {
                continue;
            };
            let mut state = ClassState {
                name: class.name.to_string(),
                linked_group: class.linked_group,
                configuration: class.configuration.and_then(|id| ordinals.get(&id).copied()),
                attributes: Vec::new(),
            };
            for &attr_id in &class.attributes {
                let Some(attr) = self.graph.attributes.get(attr_id) else {
                    continue;
                };
                let inputs = attr
                    .inputs
                    .iter()
                    .filter_map(|input| {
                        let source = self.graph.attributes.get(input.source)?;
                        let class = ordinals.get(&source.owner)?;
                        Some(InputState {
                            class: *class,
                            slot: source.slot,
                            internal: input.internal,
                        })
                    })
                    .collect();
                state.attributes.push(AttributeState {
                    name: attr.name.to_string(),
                    operator: attr.operator.map(|op| op.symbol().to_string()),
                    scalar: attr.scalar,
                    base: attr.base,
                    inputs,
                });
            }
            snapshot.classes.push(state);
        }
        snapshot
    }

    /// Global save-order ordinal of every class (configuration views first).
    fn class_ordinals(&self) -> HashMap<SlotId, usize> {
        self.configuration_views
            .iter()
            .chain(self.setup_views.iter())
            .flat_map(|view| view.classes.iter().copied())
            .enumerate()
            .map(|(ordinal, class_id)| (class_id, ordinal))
            .collect()
    }

    /// Suffix duplicate view names with a counter so saved names stay
    /// unique within each kind.
    fn dedupe_view_names(&mut self) {
        for kind in [ClassKind::Configuration, ClassKind::Setup] {
            let mut seen: HashSet<String> = HashSet::new();
            for view in self.views_mut(kind).iter_mut() {
                let mut candidate = view.name.clone();
                let mut counter = 1;
                while seen.contains(&candidate) {
                    candidate = format!("{} ({counter})", view.name);
                    counter += 1;
                }
                view.name = candidate.clone();
                seen.insert(candidate);
            }
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_class(classes_by_ordinal: &[SlotId], ordinal: usize) -> Result<SlotId, EngineError> {
    classes_by_ordinal
        .get(ordinal)
        .copied()
        .ok_or(EngineError::DanglingReference { class: ordinal, slot: 0 })
}

fn resolve_input(
    graph: &Graph,
    classes_by_ordinal: &[SlotId],
    input: &InputState,
) -> Result<SlotId, EngineError> {
    let class_id = resolve_class(classes_by_ordinal, input.class)?;
    graph
        .classes
        .get(class_id)
        .and_then(|class| class.attribute_at(input.slot))
        .ok_or(EngineError::DanglingReference { class: input.class, slot: input.slot })
}
