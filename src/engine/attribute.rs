use std::sync::Arc;

use smallvec::SmallVec;

use super::arena::SlotId;

/// Mathematical operation applied to an attribute's connected inputs.
///
/// The symbol set is fixed; a subset of operators is order-sensitive, in
/// which case connections carry 1-based sequence numbers. Persistence goes
/// through [`symbol`](Self::symbol)/[`from_symbol`](Self::from_symbol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Sum,
    Product,
    Difference,
    Division,
    Mean,
    Min,
    Max,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Sum,
        Operator::Product,
        Operator::Difference,
        Operator::Division,
        Operator::Mean,
        Operator::Min,
        Operator::Max,
    ];

    /// Display symbol painted on the operator block.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Sum => "+",
            Operator::Product => "*",
            Operator::Difference => "-",
            Operator::Division => "/",
            Operator::Mean => "avg",
            Operator::Min => "min",
            Operator::Max => "max",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }

    /// Whether input order affects the result. Connections feeding an
    /// order-sensitive operator carry explicit sequence numbers.
    pub fn is_order_sensitive(&self) -> bool {
        matches!(self, Operator::Difference | Operator::Division)
    }

    /// Combine input values. `values` is never empty when called from the
    /// calculation engine; an attribute without inputs keeps its base value.
    pub fn apply(&self, values: &[f64]) -> f64 {
        let mut iter = values.iter().copied();
        let first = match iter.next() {
            Some(v) => v,
            None => return 0.0,
        };
        match self {
            Operator::Sum => first + iter.sum::<f64>(),
            Operator::Product => iter.fold(first, |acc, v| acc * v),
            Operator::Difference => iter.fold(first, |acc, v| acc - v),
            Operator::Division => iter.fold(first, |acc, v| acc / v),
            Operator::Mean => (first + iter.sum::<f64>()) / values.len() as f64,
            Operator::Min => iter.fold(first, f64::min),
            Operator::Max => iter.fold(first, f64::max),
        }
    }
}

/// One ordered connection feeding an attribute.
///
/// `internal` records whether the source lives in the same class as the
/// target, which matters when dependencies are resolved across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRef {
    pub source: SlotId,
    pub internal: bool,
}

/// A single attribute block: a named value slot within a class.
///
/// An attribute with no inputs holds a manually set `base` value. With an
/// operator and inputs attached it recomputes
/// `value = scalar * operator(inputs…) + base`, where an unset scalar means
/// a factor of 1.0.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: Arc<str>,
    /// Stable position within the owning class. Matching slots are the
    /// correspondence key across linked copies.
    pub slot: u32,
    /// Owning class.
    pub owner: SlotId,
    pub operator: Option<Operator>,
    /// Ordered source connections. Order is significant for
    /// order-sensitive operators.
    pub inputs: SmallVec<[InputRef; 4]>,
    /// Multiplier for the combined input result. `None` is the unset
    /// sentinel: no scaling indicator is shown and the factor is 1.0.
    pub scalar: Option<f64>,
    /// Manual component, always added to the computed contribution.
    pub base: f64,
    /// Last computed value. Equals `base` after a reset pass.
    pub value: f64,
}

impl Attribute {
    pub fn new(name: impl Into<Arc<str>>, slot: u32, owner: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            owner,
            operator: None,
            inputs: SmallVec::new(),
            scalar: None,
            base: 0.0,
            value: 0.0,
        }
    }

    /// Append a source connection. Duplicate attaches are caller-prevented.
    pub fn add_input(&mut self, source: SlotId, internal: bool) {
        self.inputs.push(InputRef { source, internal });
    }

    /// Remove a source connection. No-op when the source is absent.
    pub fn remove_input(&mut self, source: SlotId) {
        self.inputs.retain(|input| input.source != source);
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    /// 1-based sequence number of each connection, or `None` per connection
    /// when the current operator is order-insensitive (or unset).
    pub fn sequence_numbers(&self) -> Vec<Option<u32>> {
        let ordered = self.operator.is_some_and(|op| op.is_order_sensitive());
        (0..self.inputs.len())
            .map(|i| if ordered { Some(i as u32 + 1) } else { None })
            .collect()
    }

    /// Clear operator and scalar back to their unset sentinels. Called when
    /// the last linked copy of this attribute loses its binding.
    pub fn reset_to_defaults(&mut self) {
        self.operator = None;
        self.scalar = None;
    }
}
