//! Core of a block-based visual modeling editor.
//!
//! Users place and connect blocks that define configuration (template)
//! classes and setup (instance) classes. This crate owns everything below
//! the canvas: the block graph, linked-group synchronization, input
//! bindings, the attribute calculation engine, and save/restore. Rendering
//! and gesture handling live in the GUI layer on top.

pub mod engine;
pub mod model;
pub mod snapshot;

pub use engine::{
    Attribute, Class, ClassKind, EngineError, Graph, InputRef, Operator, SlotId,
};
pub use model::{Model, View};
pub use snapshot::{SaveIndex, ViewSnapshot};
