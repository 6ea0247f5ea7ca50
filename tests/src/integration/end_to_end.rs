//! # End-to-end counting flows
//!
//! Feed records through the store layer, scan them with the query engine,
//! and check exact counts. The fixture sizing is tight enough that filter
//! false positives cannot disturb the assertions.

#[cfg(test)]
mod tests {
    use crate::support::{init_tracing, seed_color_store, seed_parallel, tight_sizing};
    use bloombox_filter::{DataPoint, HashGenerator};
    use bloombox_query::{
        EngineOptions, Expression, PreparationContext, Query, QueryExecutionEngine,
    };
    use bloombox_store::{Feeder, ProbabilityStore, RecordStore};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn engine() -> QueryExecutionEngine {
        QueryExecutionEngine::new(
            PreparationContext::new(tight_sizing(), HashGenerator::new()),
            EngineOptions::default(),
        )
    }

    #[test]
    fn test_color_counts_over_a_thousand_rows() {
        init_tracing();
        let store = seed_color_store(999);

        let mut engine = engine();
        engine.add_query(Query::new("red", Expression::matches("color", "red")));
        engine.add_query(Query::new(
            "red_or_blue",
            Expression::or(vec![
                Expression::matches("color", "red"),
                Expression::matches("color", "blue"),
            ]),
        ));
        engine.add_query(Query::new(
            "not_green",
            Expression::not(Expression::matches("color", "green")),
        ));

        let bundle = engine.execute(&store).unwrap();
        assert_eq!(bundle.rows_scanned, 999);
        assert_eq!(bundle.results[0].count, 333);
        assert_eq!(bundle.results[1].count, 666);
        assert_eq!(bundle.results[2].count, 666);
    }

    #[test]
    fn test_conjunction_across_attributes() {
        init_tracing();
        let store = seed_color_store(999);

        let mut engine = engine();
        engine.add_query(Query::new(
            "red_north",
            Expression::and(vec![
                Expression::matches("color", "red"),
                Expression::matches("region", "north"),
            ]),
        ));

        let bundle = engine.execute(&store).unwrap();
        // Colors cycle by 3, regions by 2: both align every 6th row.
        assert_eq!(bundle.results[0].count, 167);
    }

    #[test]
    fn test_contradictory_sub_query_counts_zero() {
        init_tracing();
        let store = seed_color_store(300);

        let mut engine = engine();
        engine.add_query(
            Query::new("north", Expression::matches("region", "north"))
                .with_sub("red", Expression::matches("color", "red"))
                .with_sub(
                    "impossible",
                    Expression::and(vec![
                        Expression::matches("color", "red"),
                        Expression::not(Expression::matches("color", "red")),
                    ]),
                ),
        );

        let bundle = engine.execute(&store).unwrap();
        let result = &bundle.results[0];
        assert_eq!(result.count, 150);
        assert!(result.sub_counts[0].1 > 0);
        assert_eq!(result.sub_counts[1].1, 0);
    }

    #[test]
    fn test_broken_query_does_not_poison_the_bundle() {
        init_tracing();
        let store = seed_color_store(300);

        let mut engine = engine();
        engine.add_query(Query::new("ok_1", Expression::matches("color", "red")));
        engine.add_query(Query::new("bad", Expression::or(vec![])));
        engine.add_query(Query::new("ok_2", Expression::matches("color", "blue")));

        let bundle = engine.execute(&store).unwrap();
        assert_eq!(bundle.results[0].count, 100);
        assert!(bundle.results[1].error.is_some());
        assert_eq!(bundle.results[2].count, 100);
    }

    #[test]
    fn test_parallel_feeding_preserves_totals() {
        init_tracing();
        let store = seed_parallel(1200, 4);
        assert_eq!(store.rows_fed(), 1200);

        let mut engine = engine();
        for color in crate::support::COLORS {
            engine.add_query(Query::new(*color, Expression::matches("color", *color)));
        }

        let bundle = engine.execute(&store).unwrap();
        let total: u64 = bundle.results.iter().map(|r| r.count).sum();
        assert_eq!(total, 1200, "Every row carries exactly one color");
        for result in &bundle.results {
            assert_eq!(result.count, 400);
        }
    }

    #[test]
    fn test_probabilistic_counts() {
        init_tracing();
        let store = Arc::new(Mutex::new(ProbabilityStore::new(
            tight_sizing(),
            100,
            "scored fixture",
        )));
        let mut feeder = Feeder::new(store.clone());
        for _ in 0..100 {
            assert!(feeder
                .add_row_scored(&[(DataPoint::new("segment", "a"), 0.5)])
                .unwrap());
        }
        drop(feeder);
        let mut store = Arc::into_inner(store).unwrap().into_inner();
        store.feeding_complete().unwrap();

        let mut engine = QueryExecutionEngine::new(
            PreparationContext::new(tight_sizing(), HashGenerator::new()),
            EngineOptions {
                probabilistic: true,
                ..EngineOptions::default()
            },
        );
        engine.add_query(Query::new("segment", Expression::matches("segment", "a")));

        let bundle = engine.execute(&store).unwrap();
        assert_eq!(bundle.results[0].count, 50, "100 rows at p=0.5");
    }
}
