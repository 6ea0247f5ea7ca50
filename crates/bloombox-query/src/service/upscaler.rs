//! Probabilistic upscaling of sample counts to a target population
//!
//! Every expression node gets a leverage pair (see `domain::leverage`)
//! propagated bottom-up:
//!
//! - leaf: the configured factor for (attribute, value), falling back to the
//!   attribute factor, then the base factor; the complement side carries the
//!   attribute factor
//! - NOT: the child's pair, swapped
//! - OR: child factors averaged, weighted by child sample counts, then
//!   clamped so the node's own scaled count cannot exceed the target
//! - AND: like OR, but each child's factor is first capped by how much room
//!   the conjunction-without-that-child leaves (the synthesized remainder
//!   counted during the scan)
//!
//! A leaf referenced more than once inside one tree would have its factor
//! applied more than once through the combinator arithmetic, so repeated
//! leaves get square-root dampening and the query a warning.

use std::collections::{HashMap, HashSet};

use crate::domain::expression::{PreparedExpression, PreparedKind};
use crate::domain::leverage::{complement_factor, Leverage};
use crate::domain::stats::PreparationStats;
use crate::error::QueryError;

/// Scale overrides for one attribute: an optional factor for the attribute
/// as a whole and per-value refinements.
#[derive(Clone, Debug, Default)]
pub struct AttributeScale {
    factor: Option<f64>,
    values: HashMap<String, f64>,
}

/// Upscaling parameters: the target population and the factor hierarchy.
#[derive(Clone, Debug)]
pub struct UpscaleConfig {
    target_population: u64,
    base_factor: f64,
    attributes: HashMap<String, AttributeScale>,
}

impl UpscaleConfig {
    pub fn new(target_population: u64, base_factor: f64) -> Result<Self, QueryError> {
        if !(base_factor.is_finite() && base_factor >= 1.0) {
            return Err(QueryError::BaseFactorTooSmall {
                factor: base_factor,
            });
        }
        Ok(Self {
            target_population,
            base_factor,
            attributes: HashMap::new(),
        })
    }

    pub fn with_attribute_factor(
        mut self,
        attribute: impl Into<String>,
        factor: f64,
    ) -> Result<Self, QueryError> {
        check_factor(factor)?;
        self.attributes.entry(attribute.into()).or_default().factor = Some(factor);
        Ok(self)
    }

    pub fn with_value_factor(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<String>,
        factor: f64,
    ) -> Result<Self, QueryError> {
        check_factor(factor)?;
        self.attributes
            .entry(attribute.into())
            .or_default()
            .values
            .insert(value.into(), factor);
        Ok(self)
    }

    pub fn target_population(&self) -> u64 {
        self.target_population
    }

    /// Scaling a sample DOWN is never meaningful; the target must cover it.
    pub fn check_sample(&self, sample_rows: u64) -> Result<(), QueryError> {
        if self.target_population < sample_rows {
            return Err(QueryError::TargetTooSmall {
                target: self.target_population,
                sample: sample_rows,
            });
        }
        Ok(())
    }

    /// Most specific factor wins: value override, attribute override, base.
    fn value_factor(&self, attribute: &str, value: &str) -> f64 {
        self.attributes
            .get(attribute)
            .and_then(|scale| scale.values.get(value).copied().or(scale.factor))
            .unwrap_or(self.base_factor)
    }

    fn attribute_factor(&self, attribute: &str) -> f64 {
        self.attributes
            .get(attribute)
            .and_then(|scale| scale.factor)
            .unwrap_or(self.base_factor)
    }
}

fn check_factor(factor: f64) -> Result<(), QueryError> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(QueryError::InvalidScaleFactor { factor });
    }
    Ok(())
}

/// Result of scaling one expression's raw count.
#[derive(Clone, Debug)]
pub struct ScaleOutcome {
    pub count: u64,
    pub factor: f64,
    pub warnings: Vec<String>,
}

/// Stateless scaler over one config; safe to reuse across bundles.
pub struct UpscalingEngine {
    config: UpscaleConfig,
}

impl UpscalingEngine {
    pub fn new(config: UpscaleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UpscaleConfig {
        &self.config
    }

    /// Scale one expression's raw sample count toward the target population.
    ///
    /// Needs the per-node counts measured during the scan; a missing count
    /// is a hard error for this expression.
    pub fn scale(
        &self,
        expression: &PreparedExpression,
        raw_count: u64,
        stats: &PreparationStats,
        sample_rows: u64,
    ) -> Result<ScaleOutcome, QueryError> {
        if sample_rows == 0 {
            return Ok(ScaleOutcome {
                count: 0,
                factor: 1.0,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let repeated = repeated_leaf_ids(expression);
        if !repeated.is_empty() {
            tracing::warn!(
                leaves = repeated.len(),
                "repeated data points in one expression; dampening their factors"
            );
            warnings.push(format!(
                "{} data point(s) referenced more than once; square-root dampening applied",
                repeated.len()
            ));
        }

        let mut memo = HashMap::new();
        let leverage = self.leverage_of(
            expression,
            stats,
            sample_rows as f64,
            &repeated,
            &mut memo,
        )?;

        let target = self.config.target_population;
        let mut count = (raw_count as f64 * leverage.factor).round() as u64;
        if count > target {
            warnings.push(format!(
                "scaled count {count} clamped to the target population {target}"
            ));
            count = target;
        }
        Ok(ScaleOutcome {
            count,
            factor: leverage.factor,
            warnings,
        })
    }

    fn leverage_of(
        &self,
        node: &PreparedExpression,
        stats: &PreparationStats,
        n: f64,
        repeated: &HashSet<u64>,
        memo: &mut HashMap<u64, Leverage>,
    ) -> Result<Leverage, QueryError> {
        if let Some(leverage) = memo.get(&node.id()) {
            return Ok(*leverage);
        }
        let t = self.config.target_population as f64;
        let leverage = match node.kind() {
            PreparedKind::Literal(_) => Leverage::new(t / n, t / n),
            PreparedKind::Match { point, .. } => {
                let mut factor = self.config.value_factor(&point.attribute, &point.value);
                let mut complement = self.config.attribute_factor(&point.attribute);
                if repeated.contains(&node.id()) {
                    factor = factor.sqrt();
                    complement = complement.sqrt();
                }
                Leverage::new(factor, complement)
            }
            PreparedKind::Not(child) => self
                .leverage_of(child, stats, n, repeated, memo)?
                .negate(),
            PreparedKind::Or(children) => {
                let mut weight = 0.0;
                let mut weighted = 0.0;
                let mut plain = 0.0;
                for child in children {
                    let count = stats.count(child.id())? as f64;
                    let factor = self.leverage_of(child, stats, n, repeated, memo)?.factor;
                    weight += count;
                    weighted += count * factor;
                    plain += factor;
                }
                let own = stats.count(node.id())? as f64;
                let mut factor = if weight > 0.0 {
                    weighted / weight
                } else {
                    plain / children.len() as f64
                };
                if own > 0.0 {
                    factor = factor.min(t / own);
                }
                Leverage::new(factor, complement_factor(own, factor, n, t))
            }
            PreparedKind::And(children) => {
                let own = stats.count(node.id())? as f64;
                let mut weight = 0.0;
                let mut weighted = 0.0;
                let mut plain = 0.0;
                for child in children {
                    let count = stats.count(child.id())? as f64;
                    let mut factor =
                        self.leverage_of(child, stats, n, repeated, memo)?.factor;
                    if own > 0.0 {
                        if let Some(remainder) = stats.correction(node.id(), child.id()) {
                            let remainder_count = stats.count(remainder.id())? as f64;
                            let remainder_factor = self
                                .leverage_of(remainder, stats, n, repeated, memo)?
                                .factor;
                            // The conjunction cannot outgrow what survives
                            // with this child removed.
                            factor = factor.min(remainder_count * remainder_factor / own);
                        }
                    }
                    weight += count;
                    weighted += count * factor;
                    plain += factor;
                }
                let mut factor = if weight > 0.0 {
                    weighted / weight
                } else {
                    plain / children.len() as f64
                };
                if own > 0.0 {
                    factor = factor.min(t / own);
                }
                Leverage::new(factor, complement_factor(own, factor, n, t))
            }
        };
        memo.insert(node.id(), leverage);
        Ok(leverage)
    }
}

/// Leaf identities that occur structurally more than once in the tree.
fn repeated_leaf_ids(expression: &PreparedExpression) -> HashSet<u64> {
    let mut leaves = Vec::new();
    expression.collect_leaves(&mut leaves);
    let mut seen = HashSet::new();
    let mut repeated = HashSet::new();
    for leaf in leaves {
        if !seen.insert(leaf.id()) {
            repeated.insert(leaf.id());
        }
    }
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::{Expression, PreparationContext};
    use crate::domain::stats::StatsRegistry;
    use bloombox_filter::{FilterSizing, HashGenerator};

    fn prepared(expression: &Expression) -> PreparedExpression {
        let sizing = FilterSizing::from_elements_and_fpr(1000, 0.01).unwrap();
        PreparationContext::new(sizing, HashGenerator::new())
            .prepare(expression)
            .unwrap()
    }

    fn stats_for(expression: &PreparedExpression, counts: &[(u64, u64)]) -> PreparationStats {
        let mut registry = StatsRegistry::new();
        registry.register(expression);
        registry.into_stats(counts.iter().copied().collect())
    }

    fn config() -> UpscaleConfig {
        UpscaleConfig::new(10_000, 1.0)
            .unwrap()
            .with_attribute_factor("color", 2.0)
            .unwrap()
            .with_value_factor("color", "red", 5.0)
            .unwrap()
    }

    #[test]
    fn test_leaf_override_precedence() {
        let scaler = UpscalingEngine::new(config());
        let stats = PreparationStats::default();

        let red = prepared(&Expression::matches("color", "red"));
        assert_eq!(scaler.scale(&red, 100, &stats, 1000).unwrap().count, 500);

        let blue = prepared(&Expression::matches("color", "blue"));
        assert_eq!(scaler.scale(&blue, 100, &stats, 1000).unwrap().count, 200);

        let size = prepared(&Expression::matches("size", "m"));
        assert_eq!(scaler.scale(&size, 100, &stats, 1000).unwrap().count, 100);
    }

    #[test]
    fn test_not_swaps_to_attribute_factor() {
        let scaler = UpscalingEngine::new(config());
        let stats = PreparationStats::default();

        let not_red = prepared(&Expression::not(Expression::matches("color", "red")));
        let outcome = scaler.scale(&not_red, 900, &stats, 1000).unwrap();
        assert_eq!(outcome.factor, 2.0, "Negation uses the attribute factor");
        assert_eq!(outcome.count, 1800);
    }

    #[test]
    fn test_literal_scales_by_population_ratio() {
        let scaler = UpscalingEngine::new(config());
        let stats = PreparationStats::default();

        let literal = prepared(&Expression::Literal(true));
        let outcome = scaler.scale(&literal, 1000, &stats, 1000).unwrap();
        assert_eq!(outcome.count, 10_000, "Everything scales to the target");
    }

    #[test]
    fn test_or_averages_by_child_weight() {
        let scaler = UpscalingEngine::new(config());
        let expr = prepared(&Expression::or(vec![
            Expression::matches("color", "red"),
            Expression::matches("size", "m"),
        ]));
        let PreparedKind::Or(children) = expr.kind() else {
            panic!("Expected OR");
        };

        let stats = stats_for(
            &expr,
            &[(children[0].id(), 100), (children[1].id(), 300), (expr.id(), 400)],
        );

        // (100 * 5.0 + 300 * 1.0) / 400 = 2.0
        let outcome = scaler.scale(&expr, 400, &stats, 1000).unwrap();
        assert_eq!(outcome.factor, 2.0);
        assert_eq!(outcome.count, 800);
    }

    #[test]
    fn test_and_caps_children_by_remainder() {
        let scaler = UpscalingEngine::new(config());
        let expr = prepared(&Expression::and(vec![
            Expression::matches("color", "red"),
            Expression::matches("size", "m"),
        ]));
        let PreparedKind::And(children) = expr.kind() else {
            panic!("Expected AND");
        };

        let stats = stats_for(
            &expr,
            &[(children[0].id(), 100), (children[1].id(), 200), (expr.id(), 50)],
        );

        // red's factor 5.0 is capped by the remainder (size=m alone):
        // 200 * 1.0 / 50 = 4.0. Weighted: (100*4 + 200*1) / 300 = 2.0.
        let outcome = scaler.scale(&expr, 50, &stats, 1000).unwrap();
        assert_eq!(outcome.factor, 2.0);
        assert_eq!(outcome.count, 100);
    }

    #[test]
    fn test_scaled_count_clamped_to_target() {
        let scaler = UpscalingEngine::new(config());
        let stats = PreparationStats::default();

        let red = prepared(&Expression::matches("color", "red"));
        let outcome = scaler.scale(&red, 5000, &stats, 8000).unwrap();
        assert_eq!(outcome.count, 10_000, "25_000 clamps to the target");
        assert!(outcome.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_repeated_leaf_is_dampened() {
        let scaler = UpscalingEngine::new(config());
        let expr = prepared(&Expression::or(vec![
            Expression::matches("color", "red"),
            Expression::and(vec![
                Expression::matches("color", "red"),
                Expression::matches("size", "m"),
            ]),
        ]));
        let PreparedKind::Or(children) = expr.kind() else {
            panic!("Expected OR");
        };
        let PreparedKind::And(and_children) = children[1].kind() else {
            panic!("Expected AND");
        };

        let stats = stats_for(
            &expr,
            &[
                (and_children[0].id(), 100),
                (and_children[1].id(), 80),
                (children[1].id(), 50),
                (expr.id(), 120),
            ],
        );

        let outcome = scaler.scale(&expr, 120, &stats, 1000).unwrap();
        assert!(outcome.warnings.iter().any(|w| w.contains("dampening")));
        assert!(
            outcome.factor < 5.0_f64.sqrt() + 1e-9,
            "Dampened red factor bounds the average, got {}",
            outcome.factor
        );
    }

    #[test]
    fn test_missing_stats_is_hard_error() {
        let scaler = UpscalingEngine::new(config());
        let expr = prepared(&Expression::or(vec![
            Expression::matches("color", "red"),
            Expression::matches("size", "m"),
        ]));

        assert!(matches!(
            scaler.scale(&expr, 10, &PreparationStats::default(), 1000),
            Err(QueryError::MissingStats { .. })
        ));
    }

    #[test]
    fn test_empty_sample_scales_to_zero() {
        let scaler = UpscalingEngine::new(config());
        let red = prepared(&Expression::matches("color", "red"));
        let outcome = scaler
            .scale(&red, 0, &PreparationStats::default(), 0)
            .unwrap();
        assert_eq!(outcome.count, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            UpscaleConfig::new(1000, 0.5),
            Err(QueryError::BaseFactorTooSmall { .. })
        ));
        assert!(matches!(
            UpscaleConfig::new(1000, 1.0)
                .unwrap()
                .with_value_factor("a", "b", 0.0),
            Err(QueryError::InvalidScaleFactor { .. })
        ));
        assert!(matches!(
            UpscaleConfig::new(1000, 1.0).unwrap().check_sample(2000),
            Err(QueryError::TargetTooSmall {
                target: 1000,
                sample: 2000
            })
        ));
        assert!(UpscaleConfig::new(1000, 1.0)
            .unwrap()
            .check_sample(1000)
            .is_ok());
    }
}
