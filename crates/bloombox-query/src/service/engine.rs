//! Query execution engine
//!
//! One engine instance runs one bundle of queries through one store scan.
//! Queries are prepared up front (leaf positions, identities, per-query
//! validation), the store's dispatch protocol hands every fed row to the
//! engine exactly once, and each row is evaluated against every query with
//! sub-expression results shared through a per-row cache keyed by
//! expression identity.
//!
//! Failures are isolated per query: a query that cannot be prepared, or
//! that fails during evaluation, carries its error in its own result slot
//! while the rest of the bundle completes normally.

use std::collections::{HashMap, HashSet};

use bloombox_filter::test_bits;
use bloombox_store::{ProbabilityProvider, RecordStore, RowDelegate};

use crate::domain::expression::{
    Expression, PreparationContext, PreparedExpression, PreparedKind,
};
use crate::domain::stats::StatsRegistry;
use crate::error::QueryError;
use crate::service::upscaler::UpscalingEngine;

/// One counting query: a named base expression plus labeled sub-clauses,
/// each implicitly ANDed with the base.
#[derive(Clone, Debug)]
pub struct Query {
    pub name: String,
    pub base: Expression,
    pub subs: Vec<(String, Expression)>,
}

impl Query {
    pub fn new(name: impl Into<String>, base: Expression) -> Self {
        Self {
            name: name.into(),
            base,
            subs: Vec::new(),
        }
    }

    pub fn with_sub(mut self, label: impl Into<String>, expression: Expression) -> Self {
        self.subs.push((label.into(), expression));
        self
    }
}

/// Engine behavior switches.
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Evaluate leaves against stored per-row probabilities instead of
    /// binary bit tests. Requires a store with probabilities.
    pub probabilistic: bool,
    /// Count every sub-expression (plus synthesized AND remainders) during
    /// the scan. Required for upscaling.
    pub collect_stats: bool,
    /// Warn when a raw count lands exactly on this value.
    pub population_ceiling: Option<u64>,
}

/// Outcome of one query within a bundle.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub name: String,
    pub count: u64,
    pub sub_counts: Vec<(String, u64)>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one full scan.
#[derive(Clone, Debug)]
pub struct BundleResult {
    pub results: Vec<QueryResult>,
    pub rows_scanned: u64,
}

#[derive(Debug, PartialEq)]
enum EngineState {
    Idle,
    Dispatching,
    Finished,
}

struct PreparedSub {
    label: String,
    expr: PreparedExpression,
    /// base AND sub, used for stats registration and upscaling.
    combined: PreparedExpression,
    acc: f64,
    scaled: Option<u64>,
}

struct PreparedQuery {
    name: String,
    base: Option<PreparedExpression>,
    subs: Vec<PreparedSub>,
    acc: f64,
    scaled: Option<u64>,
    error: Option<String>,
    warnings: Vec<String>,
    broken: bool,
}

impl PreparedQuery {
    fn raw_count(&self) -> u64 {
        self.acc.round() as u64
    }

    fn fail(name: String, error: &QueryError) -> Self {
        Self {
            name,
            base: None,
            subs: Vec::new(),
            acc: 0.0,
            scaled: None,
            error: Some(error.to_string()),
            warnings: Vec::new(),
            broken: false,
        }
    }
}

/// Per-row memoization of evaluation results, keyed by expression identity.
#[derive(Default)]
struct EvaluationCache {
    bools: HashMap<u64, bool>,
    probs: HashMap<u64, f64>,
}

impl EvaluationCache {
    fn clear(&mut self) {
        self.bools.clear();
        self.probs.clear();
    }
}

/// Single-use engine: prepare queries, run one scan, read results.
pub struct QueryExecutionEngine {
    context: PreparationContext,
    options: EngineOptions,
    queries: Vec<PreparedQuery>,
    names: HashSet<String>,
    registry: StatsRegistry,
    cache: EvaluationCache,
    stats_counts: HashMap<u64, f64>,
    rows_scanned: u64,
    state: EngineState,
}

impl QueryExecutionEngine {
    pub fn new(context: PreparationContext, options: EngineOptions) -> Self {
        Self {
            context,
            options,
            queries: Vec::new(),
            names: HashSet::new(),
            registry: StatsRegistry::new(),
            cache: EvaluationCache::default(),
            stats_counts: HashMap::new(),
            rows_scanned: 0,
            state: EngineState::Idle,
        }
    }

    /// Prepare one query into the bundle. Preparation failures (duplicate
    /// name, empty combinator) are recorded in that query's result slot,
    /// never propagated.
    pub fn add_query(&mut self, query: Query) {
        if !self.names.insert(query.name.clone()) {
            let error = QueryError::DuplicateName {
                name: query.name.clone(),
            };
            tracing::warn!(query = %query.name, %error, "query rejected");
            self.queries.push(PreparedQuery::fail(query.name, &error));
            return;
        }

        let mut warnings = Vec::new();
        if let Some(value) = query.base.constant_value() {
            warnings.push(format!(
                "base expression reduces to the constant {value}; it matches {} regardless of the data",
                if value { "every row" } else { "no row" }
            ));
        }
        for (label, expression) in &query.subs {
            if let Some(value) = expression.constant_value() {
                warnings.push(format!(
                    "sub-clause '{label}' reduces to the constant {value}; its count is {} regardless of the data",
                    if value { "the base count" } else { "always zero" }
                ));
            }
        }

        let base = match self.context.prepare(&query.base) {
            Ok(base) => base,
            Err(error) => {
                tracing::warn!(query = %query.name, %error, "query rejected");
                self.queries.push(PreparedQuery::fail(query.name, &error));
                return;
            }
        };

        let mut subs = Vec::with_capacity(query.subs.len());
        for (label, expression) in &query.subs {
            let expr = match self.context.prepare(expression) {
                Ok(expr) => expr,
                Err(error) => {
                    tracing::warn!(query = %query.name, sub = %label, %error, "query rejected");
                    self.queries.push(PreparedQuery::fail(query.name, &error));
                    return;
                }
            };
            let combined = PreparedExpression::and_of(vec![base.clone(), expr.clone()]);
            subs.push(PreparedSub {
                label: label.clone(),
                expr,
                combined,
                acc: 0.0,
                scaled: None,
            });
        }

        if self.options.collect_stats {
            self.registry.register(&base);
            for sub in &subs {
                self.registry.register(&sub.combined);
            }
        }

        self.queries.push(PreparedQuery {
            name: query.name,
            base: Some(base),
            subs,
            acc: 0.0,
            scaled: None,
            error: None,
            warnings,
            broken: false,
        });
    }

    /// Run the scan and report raw sample counts.
    pub fn execute(&mut self, store: &dyn RecordStore) -> Result<BundleResult, QueryError> {
        if self.state != EngineState::Idle {
            return Err(QueryError::AlreadyExecuted);
        }
        let store_words = store.vector_words();
        let prepared_words = self.context.sizing().vector_words();
        if store_words != prepared_words {
            return Err(QueryError::GeometryMismatch {
                store_words,
                prepared_words,
            });
        }
        let provider = store.probabilities();
        let score_ids = match (self.options.probabilistic, provider) {
            (true, Some(provider)) => self.resolve_score_ids(provider),
            (true, None) => return Err(QueryError::NoProbabilities),
            (false, _) => HashMap::new(),
        };

        self.state = EngineState::Dispatching;
        tracing::debug!(
            queries = self.queries.len(),
            rows = store.rows_fed(),
            probabilistic = self.options.probabilistic,
            "scan starting"
        );

        let mut scanner = Scanner {
            queries: &mut self.queries,
            stats_exprs: self.registry.expressions(),
            stats_counts: &mut self.stats_counts,
            cache: &mut self.cache,
            score_ids: &score_ids,
            provider,
            probabilistic: self.options.probabilistic,
            rows: 0,
        };
        store.dispatch(&mut scanner)?;
        self.rows_scanned = scanner.rows;
        self.state = EngineState::Finished;

        let ceiling = self.options.population_ceiling;
        for query in &mut self.queries {
            if query.error.is_some() {
                continue;
            }
            let count = query.raw_count();
            if self.rows_scanned > 0 && count == self.rows_scanned {
                query
                    .warnings
                    .push("base expression matched every scanned row".to_string());
            }
            if ceiling == Some(count) {
                query
                    .warnings
                    .push(format!("count landed exactly on the population ceiling {count}"));
            }
        }

        Ok(self.results())
    }

    /// Run the scan, then scale every query's counts toward the upscaler's
    /// target population. Scaling failures are per-query.
    pub fn execute_upscaled(
        &mut self,
        store: &dyn RecordStore,
        upscaler: &UpscalingEngine,
    ) -> Result<BundleResult, QueryError> {
        if !self.options.collect_stats {
            return Err(QueryError::StatsNotCollected);
        }
        upscaler.config().check_sample(store.rows_fed())?;

        self.execute(store)?;

        let mut counts = HashMap::with_capacity(self.registry.expressions().len());
        for expression in self.registry.expressions() {
            let acc = self.stats_counts.get(&expression.id()).copied().unwrap_or(0.0);
            counts.insert(expression.id(), acc.round() as u64);
        }
        let registry = std::mem::take(&mut self.registry);
        let stats = registry.into_stats(counts);
        let sample = self.rows_scanned;
        let target = upscaler.config().target_population();

        for query in &mut self.queries {
            if query.error.is_some() {
                continue;
            }
            let Some(base) = query.base.as_ref() else {
                continue;
            };
            match upscaler.scale(base, query.raw_count(), &stats, sample) {
                Ok(outcome) => {
                    if outcome.count == target {
                        query.warnings.push(format!(
                            "scaled count landed exactly on the target population {target}"
                        ));
                    }
                    query.warnings.extend(outcome.warnings);
                    query.scaled = Some(outcome.count);
                }
                Err(error) => {
                    tracing::warn!(query = %query.name, %error, "upscaling failed");
                    query.error = Some(format!("upscaling failed: {error}"));
                    continue;
                }
            }
            for sub in &mut query.subs {
                match upscaler.scale(&sub.combined, sub.acc.round() as u64, &stats, sample) {
                    Ok(outcome) => sub.scaled = Some(outcome.count),
                    Err(error) => {
                        tracing::warn!(query = %query.name, sub = %sub.label, %error, "upscaling failed");
                        query.error = Some(format!("upscaling failed: {error}"));
                        break;
                    }
                }
            }
        }

        Ok(self.results())
    }

    fn results(&self) -> BundleResult {
        BundleResult {
            rows_scanned: self.rows_scanned,
            results: self
                .queries
                .iter()
                .map(|query| {
                    // A failed query carries its error instead of counts, no
                    // matter how far the scan got before it broke.
                    let failed = query.error.is_some();
                    QueryResult {
                        name: query.name.clone(),
                        count: if failed {
                            0
                        } else {
                            query.scaled.unwrap_or_else(|| query.raw_count())
                        },
                        sub_counts: query
                            .subs
                            .iter()
                            .map(|sub| {
                                let count = if failed {
                                    0
                                } else {
                                    sub.scaled.unwrap_or_else(|| sub.acc.round() as u64)
                                };
                                (sub.label.clone(), count)
                            })
                            .collect(),
                        error: query.error.clone(),
                        warnings: query.warnings.clone(),
                    }
                })
                .collect(),
        }
    }

    /// Map every Match leaf to its probability-dictionary id, once, before
    /// the scan touches any row.
    fn resolve_score_ids(&self, provider: &dyn ProbabilityProvider) -> HashMap<u64, Option<u32>> {
        let mut leaves = Vec::new();
        for query in &self.queries {
            if let Some(base) = &query.base {
                base.collect_leaves(&mut leaves);
            }
            for sub in &query.subs {
                sub.expr.collect_leaves(&mut leaves);
            }
        }
        for expression in self.registry.expressions() {
            expression.collect_leaves(&mut leaves);
        }

        let mut ids = HashMap::new();
        for leaf in leaves {
            let PreparedKind::Match { point, .. } = leaf.kind() else {
                continue;
            };
            ids.entry(leaf.id()).or_insert_with(|| provider.id_of(point));
        }
        ids
    }
}

struct Scanner<'a> {
    queries: &'a mut [PreparedQuery],
    stats_exprs: &'a [PreparedExpression],
    stats_counts: &'a mut HashMap<u64, f64>,
    cache: &'a mut EvaluationCache,
    score_ids: &'a HashMap<u64, Option<u32>>,
    provider: Option<&'a dyn ProbabilityProvider>,
    probabilistic: bool,
    rows: u64,
}

impl RowDelegate for Scanner<'_> {
    fn execute(&mut self, row: u64, words: &[u64]) {
        self.rows += 1;
        self.cache.clear();

        for query in self.queries.iter_mut() {
            if query.broken || query.error.is_some() {
                continue;
            }
            let Some(base) = query.base.as_ref() else {
                continue;
            };
            let base_p = match evaluate(
                base,
                row,
                words,
                self.probabilistic,
                self.provider,
                self.score_ids,
                self.cache,
            ) {
                Ok(p) => p,
                Err(error) => {
                    tracing::warn!(query = %query.name, row, %error, "query broken during scan");
                    query.broken = true;
                    query.error = Some(error.to_string());
                    continue;
                }
            };
            if base_p <= 0.0 {
                continue;
            }
            query.acc += base_p;

            let mut failed = None;
            for sub in query.subs.iter_mut() {
                match evaluate(
                    &sub.expr,
                    row,
                    words,
                    self.probabilistic,
                    self.provider,
                    self.score_ids,
                    self.cache,
                ) {
                    Ok(p) => sub.acc += base_p * p,
                    Err(error) => {
                        failed = Some(error);
                        break;
                    }
                }
            }
            if let Some(error) = failed {
                tracing::warn!(query = %query.name, row, %error, "query broken during scan");
                query.broken = true;
                query.error = Some(error.to_string());
            }
        }

        // Stats share the same per-row cache, so re-walking query trees is
        // lookups, not re-evaluation.
        for expression in self.stats_exprs {
            if let Ok(p) = evaluate(
                expression,
                row,
                words,
                self.probabilistic,
                self.provider,
                self.score_ids,
                self.cache,
            ) {
                if p > 0.0 {
                    *self.stats_counts.entry(expression.id()).or_insert(0.0) += p;
                }
            }
        }
    }
}

fn evaluate(
    node: &PreparedExpression,
    row: u64,
    words: &[u64],
    probabilistic: bool,
    provider: Option<&dyn ProbabilityProvider>,
    score_ids: &HashMap<u64, Option<u32>>,
    cache: &mut EvaluationCache,
) -> Result<f64, QueryError> {
    if probabilistic {
        let provider = provider.ok_or(QueryError::NoProbabilities)?;
        eval_prob(node, row, words, provider, score_ids, &mut cache.probs)
    } else {
        eval_bool(node, words, &mut cache.bools).map(|hit| if hit { 1.0 } else { 0.0 })
    }
}

/// Binary evaluation with short-circuiting and per-row memoization.
fn eval_bool(
    node: &PreparedExpression,
    words: &[u64],
    cache: &mut HashMap<u64, bool>,
) -> Result<bool, QueryError> {
    if let Some(value) = cache.get(&node.id()) {
        return Ok(*value);
    }
    let value = match node.kind() {
        PreparedKind::Literal(value) => *value,
        PreparedKind::Match { positions, .. } => {
            check_positions(positions, words)?;
            test_bits(words, positions)
        }
        PreparedKind::And(children) => {
            let mut value = true;
            for child in children {
                if !eval_bool(child, words, cache)? {
                    value = false;
                    break;
                }
            }
            value
        }
        PreparedKind::Or(children) => {
            let mut value = false;
            for child in children {
                if eval_bool(child, words, cache)? {
                    value = true;
                    break;
                }
            }
            value
        }
        PreparedKind::Not(child) => !eval_bool(child, words, cache)?,
    };
    cache.insert(node.id(), value);
    Ok(value)
}

/// Probabilistic evaluation: a leaf whose bits match contributes its stored
/// probability (1.0 when none was stored), a leaf whose bits miss
/// contributes 0. Combinators assume independence.
fn eval_prob(
    node: &PreparedExpression,
    row: u64,
    words: &[u64],
    provider: &dyn ProbabilityProvider,
    score_ids: &HashMap<u64, Option<u32>>,
    cache: &mut HashMap<u64, f64>,
) -> Result<f64, QueryError> {
    if let Some(p) = cache.get(&node.id()) {
        return Ok(*p);
    }
    let p = match node.kind() {
        PreparedKind::Literal(value) => {
            if *value {
                1.0
            } else {
                0.0
            }
        }
        PreparedKind::Match { positions, .. } => {
            check_positions(positions, words)?;
            if !test_bits(words, positions) {
                0.0
            } else {
                match score_ids.get(&node.id()) {
                    Some(Some(id)) => provider.probability(row, *id).unwrap_or(1.0),
                    _ => 1.0,
                }
            }
        }
        PreparedKind::And(children) => {
            let mut p = 1.0;
            for child in children {
                p *= eval_prob(child, row, words, provider, score_ids, cache)?;
                if p == 0.0 {
                    break;
                }
            }
            p
        }
        PreparedKind::Or(children) => {
            let mut miss = 1.0;
            for child in children {
                miss *= 1.0 - eval_prob(child, row, words, provider, score_ids, cache)?;
            }
            1.0 - miss
        }
        PreparedKind::Not(child) => {
            1.0 - eval_prob(child, row, words, provider, score_ids, cache)?
        }
    };
    cache.insert(node.id(), p);
    Ok(p)
}

fn check_positions(positions: &[usize], words: &[u64]) -> Result<(), QueryError> {
    let bits = words.len() * 64;
    match positions.iter().find(|&&position| position >= bits) {
        Some(&position) => Err(QueryError::PositionOutOfRange { position, bits }),
        None => Ok(()),
    }
}
