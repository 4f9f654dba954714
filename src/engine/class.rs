use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arena::SlotId;

/// Which editor side a class (and its view) belongs to.
///
/// Configuration classes are templates defining attribute structure and
/// default operators; setup classes are instantiated copies whose
/// attributes carry concrete computed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Configuration,
    Setup,
}

/// An ordered collection of attributes.
///
/// Attribute order is stable and meaningful: the position doubles as the
/// slot index that pairs attributes across linked copies of the class.
#[derive(Debug, Clone)]
pub struct Class {
    pub name: Arc<str>,
    pub kind: ClassKind,
    /// Ordered attribute ids; position == attribute slot.
    pub attributes: Vec<SlotId>,
    /// Dense group id when this class is a linked copy, `None` if standalone.
    pub linked_group: Option<u32>,
    /// For setup classes, the configuration class they instantiate.
    pub configuration: Option<SlotId>,
}

impl Class {
    pub fn new(name: impl Into<Arc<str>>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: Vec::new(),
            linked_group: None,
            configuration: None,
        }
    }

    pub fn attribute_at(&self, slot: u32) -> Option<SlotId> {
        self.attributes.get(slot as usize).copied()
    }

    pub fn slot_count(&self) -> u32 {
        self.attributes.len() as u32
    }

    pub fn is_linked(&self) -> bool {
        self.linked_group.is_some()
    }
}
