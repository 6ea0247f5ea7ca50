//! Record store port
//!
//! A store owns a fixed number of fixed-width record vectors. Feeding is
//! append-only through a monotonically advancing cursor; once the cursor
//! reaches capacity (or the store is sealed) it is read-only. Scanning goes
//! through the dispatch protocol: every fed row is handed to a delegate
//! exactly once, in row-index order, as a borrowed word slice.

use std::io::Write;

use bloombox_filter::{DataPoint, FilterSizing};

use crate::error::StoreError;

/// Per-row callback of a dispatch scan.
///
/// The word slice is only valid for the duration of the call and must not be
/// retained.
pub trait RowDelegate {
    fn execute(&mut self, row: u64, words: &[u64]);
}

impl<F: FnMut(u64, &[u64])> RowDelegate for F {
    fn execute(&mut self, row: u64, words: &[u64]) {
        self(row, words)
    }
}

/// Read-only access to per-row attribute probabilities of a probabilistic
/// store.
pub trait ProbabilityProvider {
    /// Dictionary lookup: the low-precision id assigned to a data point, if
    /// it was ever fed.
    fn id_of(&self, point: &DataPoint) -> Option<u32>;

    /// The stored probability for a data point id in one row.
    fn probability(&self, row: u64, id: u32) -> Option<f64>;
}

/// A fixed-capacity array of record vectors.
pub trait RecordStore: Send {
    /// Fully-qualified store-kind identifier, persisted as BBX section 2.
    fn kind(&self) -> &'static str;

    fn sizing(&self) -> &FilterSizing;

    /// Fixed capacity in rows.
    fn row_count(&self) -> u64;

    /// Width of one record vector in 64-bit words.
    fn vector_words(&self) -> usize;

    /// The feed cursor: number of rows fed so far.
    fn rows_fed(&self) -> u64;

    /// True while further `feed_row` calls can succeed. A restored or
    /// explicitly sealed store always reports closed.
    fn ensure_open_for_feeding(&self) -> bool;

    /// Write one record vector at the cursor position. `row` must equal the
    /// current cursor; this keeps concurrent feeders honest about claiming
    /// row indices under the feed lock.
    fn feed_row(&mut self, row: u64, words: &[u64]) -> Result<(), StoreError>;

    /// Whether `merge_row` is available for this store kind.
    fn supports_merge(&self) -> bool {
        false
    }

    /// Bitwise-OR a late vector into an already-fed row.
    fn merge_row(&mut self, row: u64, words: &[u64]) -> Result<(), StoreError>;

    /// Sequential full scan: every fed row exactly once, in row order,
    /// without per-row allocation.
    fn dispatch(&self, delegate: &mut dyn RowDelegate) -> Result<(), StoreError>;

    /// Seal the store after the last `feed_row`.
    fn feeding_complete(&mut self) -> Result<(), StoreError>;

    /// Release held resources; the store is unusable afterwards.
    fn close(&mut self) -> Result<(), StoreError>;

    /// Serialize the complete BBX representation. The store must be sealed.
    fn write_to(&self, writer: &mut dyn Write) -> Result<(), StoreError>;

    /// Probability access for probabilistic store kinds.
    fn probabilities(&self) -> Option<&dyn ProbabilityProvider> {
        None
    }
}

/// A store that records per-data-point probabilities next to each row.
pub trait ScoredRecordStore: RecordStore {
    /// Feed one row plus its (data point, probability) scores. Dictionary
    /// ids are assigned on first use, under the same feed lock as the row
    /// write.
    fn feed_scored_row(
        &mut self,
        row: u64,
        words: &[u64],
        scores: &[(DataPoint, f64)],
    ) -> Result<(), StoreError>;
}
