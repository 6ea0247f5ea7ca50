//! # Persistence flows
//!
//! Counts must survive the full persist / restore cycle for every store
//! kind, and a file-backed store must report the same counts as an
//! in-memory store fed identically.

#[cfg(test)]
mod tests {
    use crate::support::{init_tracing, row_points, seed_color_store, tight_sizing};
    use bloombox_filter::{DataPoint, HashGenerator};
    use bloombox_query::{
        BundleResult, EngineOptions, Expression, PreparationContext, Query,
        QueryExecutionEngine,
    };
    use bloombox_store::{persist, restore, Feeder, FileStore, ProbabilityStore, RecordStore};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn count_colors(store: &dyn RecordStore, probabilistic: bool) -> BundleResult {
        let mut engine = QueryExecutionEngine::new(
            PreparationContext::new(tight_sizing(), HashGenerator::new()),
            EngineOptions {
                probabilistic,
                ..EngineOptions::default()
            },
        );
        engine.add_query(Query::new("red", Expression::matches("color", "red")));
        engine.add_query(Query::new(
            "not_red",
            Expression::not(Expression::matches("color", "red")),
        ));
        engine.execute(store).unwrap()
    }

    #[test]
    fn test_memory_store_round_trip() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colors.bbx");

        let store = seed_color_store(600);
        let before = count_colors(&store, false);

        persist(&store, &path).unwrap();
        let restored = restore(&path).unwrap();
        let after = count_colors(restored.as_ref(), false);

        assert_eq!(before.rows_scanned, after.rows_scanned);
        assert_eq!(before.results[0].count, after.results[0].count);
        assert_eq!(before.results[1].count, after.results[1].count);
    }

    #[test]
    fn test_file_store_counts_match_memory() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colors-file.bbx");

        let rows = 600u64;
        let file = FileStore::create(&path, tight_sizing(), rows, "file fixture").unwrap();
        let shared = Arc::new(Mutex::new(file));
        let mut feeder = Feeder::new(shared.clone());
        for row in 0..rows {
            assert!(feeder.add_row(&row_points(row)).unwrap());
        }
        drop(feeder);
        let mut file = Arc::into_inner(shared).unwrap().into_inner();
        file.feeding_complete().unwrap();

        let memory = seed_color_store(rows);
        let from_file = count_colors(&file, false);
        let from_memory = count_colors(&memory, false);

        assert_eq!(from_file.results[0].count, from_memory.results[0].count);
        assert_eq!(from_file.results[1].count, from_memory.results[1].count);
    }

    #[test]
    fn test_file_store_round_trip_through_registry() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bbx");
        let copy = dir.path().join("copy.bbx");

        let rows = 300u64;
        let file = FileStore::create(&path, tight_sizing(), rows, "").unwrap();
        let shared = Arc::new(Mutex::new(file));
        let mut feeder = Feeder::new(shared.clone());
        for row in 0..rows {
            feeder.add_row(&row_points(row)).unwrap();
        }
        drop(feeder);
        let mut file = Arc::into_inner(shared).unwrap().into_inner();
        file.feeding_complete().unwrap();
        let before = count_colors(&file, false);

        persist(&file, &copy).unwrap();
        let restored = restore(&copy).unwrap();
        let after = count_colors(restored.as_ref(), false);

        assert_eq!(before.results[0].count, after.results[0].count);
    }

    #[test]
    fn test_probability_store_round_trip() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scored.bbx");

        let store = Arc::new(Mutex::new(ProbabilityStore::new(tight_sizing(), 80, "")));
        let mut feeder = Feeder::new(store.clone());
        for row in 0..80u64 {
            let color = crate::support::COLORS[row as usize % 3];
            feeder
                .add_row_scored(&[(DataPoint::new("color", color), 0.75)])
                .unwrap();
        }
        drop(feeder);
        let mut store = Arc::into_inner(store).unwrap().into_inner();
        store.feeding_complete().unwrap();

        let before = count_colors(&store, true);
        persist(&store, &path).unwrap();
        let restored = restore(&path).unwrap();
        let after = count_colors(restored.as_ref(), true);

        assert_eq!(before.results[0].count, after.results[0].count);
        assert_eq!(before.results[1].count, after.results[1].count);
        assert!(
            restored.probabilities().is_some(),
            "Probability access must survive restore"
        );
    }
}
