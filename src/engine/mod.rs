//! Arena-based block-model engine: classes, attributes, linked groups,
//! input bindings and the calculation pass.

pub mod arena;
pub mod attribute;
pub mod class;
pub mod linked;
pub mod binding;
pub mod graph;
pub mod calc;
pub mod error;

pub use arena::{Arena, SlotId};
pub use attribute::{Attribute, InputRef, Operator};
pub use binding::{Bindings, InputBinding};
pub use class::{Class, ClassKind};
pub use error::EngineError;
pub use graph::Graph;
pub use linked::{GroupMember, LinkedGroups, MemberRole};
