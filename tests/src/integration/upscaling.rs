//! # Upscaling flows
//!
//! Scan a sample, then project counts onto a larger target population with
//! per-attribute and per-value scale factors. The fixture counts are exact
//! (999 rows, colors cycling by 3), so scaled outcomes are deterministic.

#[cfg(test)]
mod tests {
    use crate::support::{init_tracing, seed_color_store, tight_sizing};
    use bloombox_filter::HashGenerator;
    use bloombox_query::{
        EngineOptions, Expression, PreparationContext, Query, QueryError,
        QueryExecutionEngine, UpscaleConfig, UpscalingEngine,
    };

    fn stats_engine() -> QueryExecutionEngine {
        QueryExecutionEngine::new(
            PreparationContext::new(tight_sizing(), HashGenerator::new()),
            EngineOptions {
                collect_stats: true,
                ..EngineOptions::default()
            },
        )
    }

    #[test]
    fn test_leaf_query_scales_by_value_factor() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(9990, 1.0)
            .unwrap()
            .with_value_factor("color", "red", 2.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new("red", Expression::matches("color", "red")));

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        assert_eq!(bundle.results[0].count, 666, "333 raw, factor 2.0");
    }

    #[test]
    fn test_or_scales_by_count_weighted_average() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(9990, 1.0)
            .unwrap()
            .with_value_factor("color", "red", 3.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new(
            "red_or_blue",
            Expression::or(vec![
                Expression::matches("color", "red"),
                Expression::matches("color", "blue"),
            ]),
        ));

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        // (333 * 3.0 + 333 * 1.0) / 666 = 2.0 over 666 raw rows.
        assert_eq!(bundle.results[0].count, 1332);
    }

    #[test]
    fn test_negation_uses_attribute_factor_and_caps_conjunction() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(9990, 1.0)
            .unwrap()
            .with_attribute_factor("color", 1.5)
            .unwrap()
            .with_value_factor("color", "red", 2.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new(
            "red_not_blue",
            Expression::and(vec![
                Expression::matches("color", "red"),
                Expression::not(Expression::matches("color", "blue")),
            ]),
        ));

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        // red: 333 rows at factor 2.0; NOT blue: 666 rows at the attribute
        // factor 1.5. Weighted: (333*2 + 666*1.5) / 999 = 5/3 over 333 rows.
        assert_eq!(bundle.results[0].count, 555);
    }

    #[test]
    fn test_sub_query_scales_within_base_bounds() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(9990, 1.0)
            .unwrap()
            .with_value_factor("color", "red", 2.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(
            Query::new("red", Expression::matches("color", "red"))
                .with_sub("north", Expression::matches("region", "north")),
        );

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        let result = &bundle.results[0];
        assert_eq!(result.count, 666);
        let (_, sub) = &result.sub_counts[0];
        assert!(
            (167..=666).contains(sub),
            "Scaled sub-count {sub} must stay between raw and base"
        );
    }

    #[test]
    fn test_overscale_clamps_to_target() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(1000, 1.0)
            .unwrap()
            .with_value_factor("color", "red", 100.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new("red", Expression::matches("color", "red")));

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        let result = &bundle.results[0];
        assert_eq!(result.count, 1000, "33_300 clamps to the target");
        assert!(result.warnings.iter().any(|w| w.contains("clamped")));
        assert!(result.warnings.iter().any(|w| w.contains("target population")));
    }

    #[test]
    fn test_target_below_sample_is_rejected() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(500, 1.0).unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new("red", Expression::matches("color", "red")));

        assert!(matches!(
            engine.execute_upscaled(&store, &UpscalingEngine::new(config)),
            Err(QueryError::TargetTooSmall { .. })
        ));
    }

    #[test]
    fn test_upscaling_requires_stats() {
        init_tracing();
        let store = seed_color_store(99);
        let config = UpscaleConfig::new(1000, 1.0).unwrap();

        let mut engine = QueryExecutionEngine::new(
            PreparationContext::new(tight_sizing(), HashGenerator::new()),
            EngineOptions::default(),
        );
        engine.add_query(Query::new("red", Expression::matches("color", "red")));

        assert!(matches!(
            engine.execute_upscaled(&store, &UpscalingEngine::new(config)),
            Err(QueryError::StatsNotCollected)
        ));
    }

    #[test]
    fn test_malformed_query_does_not_block_scaling() {
        init_tracing();
        let store = seed_color_store(999);
        let config = UpscaleConfig::new(9990, 1.0)
            .unwrap()
            .with_value_factor("color", "red", 2.0)
            .unwrap();

        let mut engine = stats_engine();
        engine.add_query(Query::new("red", Expression::matches("color", "red")));
        engine.add_query(Query::new("bad", Expression::and(vec![])));

        let bundle = engine
            .execute_upscaled(&store, &UpscalingEngine::new(config))
            .unwrap();
        assert_eq!(bundle.results[0].count, 666);
        assert!(bundle.results[1].error.is_some());
    }
}
