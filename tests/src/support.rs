//! Shared fixtures for integration tests and benchmarks

use std::sync::Arc;

use bloombox_filter::{DataPoint, FilterSizing};
use bloombox_store::{Feeder, MemoryStore, RecordStore};
use parking_lot::Mutex;
use rayon::prelude::*;

pub const COLORS: &[&str] = &["red", "blue", "green"];
pub const REGIONS: &[&str] = &["north", "south"];

/// Tight enough that a false positive across a few thousand rows is
/// effectively impossible, so count assertions can be exact.
pub fn tight_sizing() -> FilterSizing {
    FilterSizing::from_elements_and_fpr(16, 1e-9).unwrap()
}

/// Best-effort tracing init; repeated calls are fine.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// The (color, region) pair of one row: colors cycle by 3, regions by 2.
pub fn row_points(row: u64) -> Vec<DataPoint> {
    vec![
        DataPoint::new("color", COLORS[row as usize % COLORS.len()]),
        DataPoint::new("region", REGIONS[row as usize % REGIONS.len()]),
    ]
}

/// Sequentially feed `rows` color/region rows and seal the store.
pub fn seed_color_store(rows: u64) -> MemoryStore {
    let store = Arc::new(Mutex::new(MemoryStore::new(
        tight_sizing(),
        rows,
        "integration fixture",
    )));
    let mut feeder = Feeder::new(store.clone());
    for row in 0..rows {
        assert!(feeder.add_row(&row_points(row)).unwrap());
    }
    drop(feeder);

    let mut store = Arc::into_inner(store)
        .expect("no other handles")
        .into_inner();
    store.feeding_complete().unwrap();
    store
}

/// Feed `rows` rows from `workers` rayon tasks. Row-to-content assignment is
/// nondeterministic; totals per color are not.
pub fn seed_parallel(rows: u64, workers: u64) -> MemoryStore {
    assert_eq!(rows % workers, 0);
    let share = rows / workers;
    assert_eq!(
        share % COLORS.len() as u64,
        0,
        "Each worker must feed full color cycles for deterministic totals"
    );

    let store = Arc::new(Mutex::new(MemoryStore::new(
        tight_sizing(),
        rows,
        "parallel fixture",
    )));
    (0..workers).into_par_iter().for_each(|_| {
        let mut feeder = Feeder::new(store.clone());
        for i in 0..share {
            assert!(feeder.add_row(&row_points(i)).unwrap());
        }
    });

    let mut store = Arc::into_inner(store)
        .expect("no other handles")
        .into_inner();
    store.feeding_complete().unwrap();
    store
}
