//! Snapshot types for save/restore.
//!
//! Each view serializes independently; a [`SaveIndex`] lists the view files
//! in save order, configuration views first, so setup classes can resolve
//! their configuration references on restore. Source references are
//! (global class ordinal, attribute slot) pairs, where ordinals count
//! classes across all views in save order.

use serde::{Deserialize, Serialize};

use crate::engine::ClassKind;

/// A serializable snapshot of one view's classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSnapshot {
    /// Version for migration support
    pub version: u32,
    pub name: String,
    pub kind: ClassKind,
    pub classes: Vec<ClassState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassState {
    pub name: String,
    pub linked_group: Option<u32>,
    /// Global ordinal of the configuration class a setup class instantiates.
    pub configuration: Option<usize>,
    pub attributes: Vec<AttributeState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeState {
    pub name: String,
    /// Operator symbol, `None` when unset.
    pub operator: Option<String>,
    pub scalar: Option<f64>,
    pub base: f64,
    /// Ordered source references.
    pub inputs: Vec<InputState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputState {
    /// Global class ordinal in save order.
    pub class: usize,
    /// Attribute slot within that class.
    pub slot: u32,
    pub internal: bool,
}

impl ViewSnapshot {
    /// Current snapshot version.
    pub const VERSION: u32 = 1;

    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            version: Self::VERSION,
            name: name.into(),
            kind,
            classes: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Index of saved view files, in restore order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveIndex {
    pub version: u32,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: ClassKind,
    /// File name relative to the save directory.
    pub path: String,
}

impl SaveIndex {
    pub fn new() -> Self {
        Self { version: ViewSnapshot::VERSION, entries: Vec::new() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for SaveIndex {
    fn default() -> Self {
        Self::new()
    }
}
