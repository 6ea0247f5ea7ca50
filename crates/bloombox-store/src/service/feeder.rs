//! Feeder: one record in, one filter vector out
//!
//! A Feeder is a per-worker object. Every worker builds rows in its own
//! reusable scratch filter (digest state never crosses workers) and only the
//! claim-cursor-and-write step runs under the shared store lock, so
//! concurrent feeders never race for the same row index.

use std::sync::Arc;

use bloombox_filter::{DataPoint, FilterSizing, HashGenerator, PartitionedBloomFilter};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::ports::store::{RecordStore, ScoredRecordStore};

/// Per-worker feeder over a shared record store.
pub struct Feeder<S: RecordStore> {
    store: Arc<Mutex<S>>,
    scratch: PartitionedBloomFilter,
}

impl<S: RecordStore> Feeder<S> {
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        let sizing: FilterSizing = store.lock().sizing().clone();
        Self {
            store,
            scratch: PartitionedBloomFilter::new(sizing, HashGenerator::new()),
        }
    }

    /// Compress one record's (column, value) pairs into a filter vector and
    /// append it. Returns Ok(false) — fails closed — when the store is full
    /// or sealed.
    pub fn add_row(&mut self, columns: &[DataPoint]) -> Result<bool, StoreError> {
        self.scratch.clear();
        for point in columns {
            self.scratch.put(&point.parts());
        }

        let mut store = self.store.lock();
        if !store.ensure_open_for_feeding() {
            return Ok(false);
        }
        let row = store.rows_fed();
        store.feed_row(row, self.scratch.as_words())?;
        Ok(true)
    }
}

impl<S: ScoredRecordStore> Feeder<S> {
    /// Probabilistic feeding mode: each data point carries the probability
    /// that it truly applies to the record.
    pub fn add_row_scored(&mut self, columns: &[(DataPoint, f64)]) -> Result<bool, StoreError> {
        self.scratch.clear();
        for (point, _) in columns {
            self.scratch.put(&point.parts());
        }

        let mut store = self.store.lock();
        if !store.ensure_open_for_feeding() {
            return Ok(false);
        }
        let row = store.rows_fed();
        store.feed_scored_row(row, self.scratch.as_words(), columns)?;
        Ok(true)
    }
}
