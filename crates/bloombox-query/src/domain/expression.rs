//! Boolean expression trees and their prepared form
//!
//! An `Expression` is the caller-facing tree: leaves name (attribute, value)
//! combinations, inner nodes combine with AND / OR / NOT. Preparation turns
//! it into a `PreparedExpression` in which every leaf carries its k bit
//! positions (resolved once per distinct data point, never per row) and every
//! node carries a stable content-derived 64-bit identity. Identical
//! sub-expressions get identical identities, so per-row evaluation results
//! can be shared across queries through a cache keyed by identity.

use std::collections::HashMap;

use bloombox_filter::{derive_positions, DataPoint, FilterSizing, HashGenerator};
use sha2::{Digest, Sha256};

use crate::error::QueryError;

/// Caller-facing boolean expression over data points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    /// Constant truth value; matches every record or none.
    Literal(bool),
    /// Membership test for one (attribute, value) combination.
    Match { attribute: String, value: String },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn matches(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Expression::Match {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn and(children: Vec<Expression>) -> Self {
        Expression::And(children)
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Self {
        Expression::Not(Box::new(child))
    }

    /// Statically detectable constant value of the whole tree, if any.
    ///
    /// Used to warn about queries that count everything or nothing
    /// regardless of the data (a contradiction like `x AND NOT x` is NOT
    /// detected here; only literal propagation is).
    pub fn constant_value(&self) -> Option<bool> {
        match self {
            Expression::Literal(value) => Some(*value),
            Expression::Match { .. } => None,
            Expression::And(children) => {
                let mut all_true = true;
                for child in children {
                    match child.constant_value() {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => all_true = false,
                    }
                }
                if all_true {
                    Some(true)
                } else {
                    None
                }
            }
            Expression::Or(children) => {
                let mut all_false = true;
                for child in children {
                    match child.constant_value() {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => all_false = false,
                    }
                }
                if all_false {
                    Some(false)
                } else {
                    None
                }
            }
            Expression::Not(child) => child.constant_value().map(|value| !value),
        }
    }
}

/// Prepared node payload.
#[derive(Clone, Debug)]
pub enum PreparedKind {
    Literal(bool),
    Match {
        point: DataPoint,
        positions: Vec<usize>,
    },
    And(Vec<PreparedExpression>),
    Or(Vec<PreparedExpression>),
    Not(Box<PreparedExpression>),
}

/// An expression ready for row-by-row evaluation.
#[derive(Clone, Debug)]
pub struct PreparedExpression {
    id: u64,
    kind: PreparedKind,
}

impl PreparedExpression {
    /// Stable content-derived identity: first 8 bytes of SHA-256 over the
    /// canonical node encoding. Structurally identical sub-trees share it,
    /// within a query and across queries.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &PreparedKind {
        &self.kind
    }

    /// Build a synthetic AND over already-prepared children.
    ///
    /// The identity comes out the same as preparing `And` over the matching
    /// raw children, so synthetic and user-written nodes deduplicate.
    pub fn and_of(children: Vec<PreparedExpression>) -> PreparedExpression {
        let kind = PreparedKind::And(children);
        PreparedExpression {
            id: identity(&kind),
            kind,
        }
    }

    /// Collect every Match leaf (one entry per structural occurrence).
    pub fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a PreparedExpression>) {
        match &self.kind {
            PreparedKind::Literal(_) => {}
            PreparedKind::Match { .. } => out.push(self),
            PreparedKind::And(children) | PreparedKind::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            PreparedKind::Not(child) => child.collect_leaves(out),
        }
    }
}

/// Shared preparation state for a bundle of queries.
///
/// The position cache guarantees each distinct (attribute, value) is hashed
/// exactly once per bundle, no matter how many queries reference it.
pub struct PreparationContext {
    sizing: FilterSizing,
    hasher: HashGenerator,
    positions: HashMap<DataPoint, Vec<usize>>,
}

impl PreparationContext {
    pub fn new(sizing: FilterSizing, hasher: HashGenerator) -> Self {
        Self {
            sizing,
            hasher,
            positions: HashMap::new(),
        }
    }

    pub fn sizing(&self) -> &FilterSizing {
        &self.sizing
    }

    /// Prepare an expression tree. Fails on empty AND / OR combinators.
    pub fn prepare(&mut self, expression: &Expression) -> Result<PreparedExpression, QueryError> {
        let kind = match expression {
            Expression::Literal(value) => PreparedKind::Literal(*value),
            Expression::Match { attribute, value } => {
                let point = DataPoint::new(attribute.clone(), value.clone());
                let positions = self
                    .positions
                    .entry(point.clone())
                    .or_insert_with(|| {
                        derive_positions(&self.sizing, &self.hasher, &point.parts())
                    })
                    .clone();
                PreparedKind::Match { point, positions }
            }
            Expression::And(children) => {
                if children.is_empty() {
                    return Err(QueryError::EmptyCombinator { combinator: "AND" });
                }
                PreparedKind::And(self.prepare_children(children)?)
            }
            Expression::Or(children) => {
                if children.is_empty() {
                    return Err(QueryError::EmptyCombinator { combinator: "OR" });
                }
                PreparedKind::Or(self.prepare_children(children)?)
            }
            Expression::Not(child) => PreparedKind::Not(Box::new(self.prepare(child)?)),
        };
        Ok(PreparedExpression {
            id: identity(&kind),
            kind,
        })
    }

    fn prepare_children(
        &mut self,
        children: &[Expression],
    ) -> Result<Vec<PreparedExpression>, QueryError> {
        children.iter().map(|child| self.prepare(child)).collect()
    }
}

/// Canonical node encoding hashed into the identity: a tag byte string, then
/// length-prefixed leaf content or the child identities in order.
fn identity(kind: &PreparedKind) -> u64 {
    let mut hasher = Sha256::new();
    match kind {
        PreparedKind::Literal(value) => {
            hasher.update(b"lit");
            hasher.update([*value as u8]);
        }
        PreparedKind::Match { point, .. } => {
            hasher.update(b"match");
            hasher.update((point.attribute.len() as u32).to_be_bytes());
            hasher.update(point.attribute.as_bytes());
            hasher.update((point.value.len() as u32).to_be_bytes());
            hasher.update(point.value.as_bytes());
        }
        PreparedKind::And(children) => {
            hasher.update(b"and");
            for child in children {
                hasher.update(child.id.to_be_bytes());
            }
        }
        PreparedKind::Or(children) => {
            hasher.update(b"or");
            for child in children {
                hasher.update(child.id.to_be_bytes());
            }
        }
        PreparedKind::Not(child) => {
            hasher.update(b"not");
            hasher.update(child.id.to_be_bytes());
        }
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}
