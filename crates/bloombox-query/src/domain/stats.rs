//! Preparation stats: per-expression raw counts collected during a scan
//!
//! Upscaling needs the raw sample count of every node in every query tree,
//! plus counts the trees never asked for directly: for each AND node, the
//! count of that AND with one child removed (the "remainder"), used to cap
//! how far the removed child's factor can push the conjunction. Those
//! remainder expressions are synthesized at registration time and counted
//! alongside everything else in the same scan.

use std::collections::{HashMap, HashSet};

use crate::domain::expression::{PreparedExpression, PreparedKind};
use crate::error::QueryError;

/// A synthesized remainder: `and_id` minus the child `child_id`.
#[derive(Clone, Debug)]
pub struct Correction {
    pub child_id: u64,
    pub remainder: PreparedExpression,
}

/// Counts and correction index produced by one scan.
#[derive(Clone, Debug, Default)]
pub struct PreparationStats {
    counts: HashMap<u64, u64>,
    corrections: HashMap<u64, Vec<Correction>>,
}

impl PreparationStats {
    pub fn new(counts: HashMap<u64, u64>, corrections: HashMap<u64, Vec<Correction>>) -> Self {
        Self {
            counts,
            corrections,
        }
    }

    /// Raw sample count of an expression. Missing entries are a hard error:
    /// scaling must never silently guess a count.
    pub fn count(&self, id: u64) -> Result<u64, QueryError> {
        self.counts
            .get(&id)
            .copied()
            .ok_or(QueryError::MissingStats { id })
    }

    /// The remainder expression for `and_id` with `child_id` removed, when
    /// one was synthesized.
    pub fn correction(&self, and_id: u64, child_id: u64) -> Option<&PreparedExpression> {
        self.corrections.get(&and_id).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.child_id == child_id)
                .map(|entry| &entry.remainder)
        })
    }
}

/// Registry of every expression whose count one scan must produce.
///
/// Deduplicates by identity, walks trees recursively, and synthesizes the
/// AND-remainder expressions.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    expressions: Vec<PreparedExpression>,
    seen: HashSet<u64>,
    corrections: HashMap<u64, Vec<Correction>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree: the node itself, all descendants, and for each AND
    /// node of two or more children, the per-child remainders.
    pub fn register(&mut self, expression: &PreparedExpression) {
        match expression.kind() {
            PreparedKind::Literal(_) | PreparedKind::Match { .. } => {}
            PreparedKind::Not(child) => self.register(child),
            PreparedKind::Or(children) => {
                for child in children {
                    self.register(child);
                }
            }
            PreparedKind::And(children) => {
                for child in children {
                    self.register(child);
                }
                if children.len() >= 2 && !self.corrections.contains_key(&expression.id()) {
                    let entries: Vec<Correction> = children
                        .iter()
                        .enumerate()
                        .map(|(index, child)| {
                            let rest: Vec<PreparedExpression> = children
                                .iter()
                                .enumerate()
                                .filter(|(other, _)| *other != index)
                                .map(|(_, node)| node.clone())
                                .collect();
                            let remainder = if rest.len() == 1 {
                                rest.into_iter().next().unwrap()
                            } else {
                                PreparedExpression::and_of(rest)
                            };
                            self.track(&remainder);
                            Correction {
                                child_id: child.id(),
                                remainder,
                            }
                        })
                        .collect();
                    self.corrections.insert(expression.id(), entries);
                }
            }
        }
        self.track(expression);
    }

    fn track(&mut self, expression: &PreparedExpression) {
        if self.seen.insert(expression.id()) {
            self.expressions.push(expression.clone());
        }
    }

    /// Unique expressions to evaluate per row, in registration order.
    pub fn expressions(&self) -> &[PreparedExpression] {
        &self.expressions
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// Freeze the registry into stats, pairing the correction index with the
    /// counts measured by the scan.
    pub fn into_stats(self, counts: HashMap<u64, u64>) -> PreparationStats {
        PreparationStats::new(counts, self.corrections)
    }
}
