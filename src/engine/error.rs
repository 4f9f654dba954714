use thiserror::Error;

use super::arena::SlotId;

/// Errors surfaced by the model core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The dependency graph contains a cycle; calculation resolved what it
    /// could and reports one attribute inside the cycle.
    #[error("dependency cycle involving attribute `{name}` ({attribute:?})")]
    DependencyCycle { attribute: SlotId, name: String },

    /// Scalar text did not parse as a number. Raised before any state is
    /// mutated.
    #[error("invalid scalar `{0}`: not a number")]
    InvalidScalar(String),

    /// A persisted operator symbol is not in the enumerated set.
    #[error("unknown operator symbol `{0}`")]
    UnknownOperator(String),

    /// A persisted source reference points outside the restored graph.
    #[error("save data references class {class} slot {slot}, which does not exist")]
    DanglingReference { class: usize, slot: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
