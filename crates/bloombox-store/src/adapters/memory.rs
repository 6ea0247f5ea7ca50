//! In-memory record store
//!
//! One large contiguous word array of `rows * vector_words`; feed, merge and
//! dispatch are plain slice operations.

use std::io::{Read, Write};

use bloombox_filter::FilterSizing;

use crate::adapters::{decode_words_be, write_headers, write_words_be};
use crate::domain::header::{BundleHeader, StoreHeader};
use crate::error::StoreError;
use crate::ports::store::{RecordStore, RowDelegate};

pub const MEMORY_STORE_KIND: &str = "bloombox.store.memory";

/// Fixed-capacity in-memory store with bitwise-OR merge support.
pub struct MemoryStore {
    bundle: BundleHeader,
    rows: u64,
    vector_words: usize,
    words: Vec<u64>,
    cursor: u64,
    sealed: bool,
}

impl MemoryStore {
    pub fn new(sizing: FilterSizing, rows: u64, description: impl Into<String>) -> Self {
        let vector_words = sizing.vector_words();
        Self {
            bundle: BundleHeader::new(sizing, description),
            rows,
            vector_words,
            words: vec![0u64; rows as usize * vector_words],
            cursor: 0,
            sealed: false,
        }
    }

    pub fn bundle(&self) -> &BundleHeader {
        &self.bundle
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Write the full word array (including the unfed zero tail) as
    /// big-endian bytes, keeping the fixed rows*vector_words*8 section size.
    pub(crate) fn write_words(&self, writer: &mut dyn Write) -> Result<(), StoreError> {
        write_words_be(writer, &self.words)
    }

    fn row_range(&self, row: u64) -> std::ops::Range<usize> {
        let start = row as usize * self.vector_words;
        start..start + self.vector_words
    }

    fn check_width(&self, words: &[u64]) -> Result<(), StoreError> {
        if words.len() != self.vector_words {
            return Err(StoreError::VectorWidthMismatch {
                got: words.len(),
                expected: self.vector_words,
            });
        }
        Ok(())
    }

    /// Reconstruct a sealed store from parsed BBX headers and the raw row
    /// bytes that follow them.
    pub fn restore(
        bundle: BundleHeader,
        header: &StoreHeader,
        reader: &mut dyn Read,
    ) -> Result<Self, StoreError> {
        let vector_words = bundle.sizing.vector_words();
        if header.vector_words != vector_words as u64 {
            return Err(StoreError::MalformedHeader {
                reason: format!(
                    "store header says {} words per vector, sizing derives {}",
                    header.vector_words, vector_words
                ),
            });
        }
        let rows_fed = header.rows_fed.unwrap_or(header.rows);
        if rows_fed > header.rows {
            return Err(StoreError::MalformedHeader {
                reason: format!("rows_fed {} exceeds capacity {}", rows_fed, header.rows),
            });
        }

        let mut words = vec![0u64; header.rows as usize * vector_words];
        read_row_words(reader, &mut words)?;

        tracing::info!(
            rows = header.rows,
            rows_fed,
            vector_words,
            "restored in-memory store"
        );
        Ok(Self {
            bundle,
            rows: header.rows,
            vector_words,
            words,
            cursor: rows_fed,
            sealed: true,
        })
    }
}

/// Fill a word buffer from a big-endian byte stream, failing loudly on short
/// reads.
pub(crate) fn read_row_words(reader: &mut dyn Read, words: &mut [u64]) -> Result<(), StoreError> {
    let expected = words.len() as u64 * 8;
    let mut buffer = vec![0u8; words.len() * 8];
    let mut filled = 0usize;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..])? {
            0 => {
                return Err(StoreError::Truncated {
                    expected,
                    got: filled as u64,
                })
            }
            read => filled += read,
        }
    }
    decode_words_be(&buffer, words);
    Ok(())
}

impl RecordStore for MemoryStore {
    fn kind(&self) -> &'static str {
        MEMORY_STORE_KIND
    }

    fn sizing(&self) -> &FilterSizing {
        &self.bundle.sizing
    }

    fn row_count(&self) -> u64 {
        self.rows
    }

    fn vector_words(&self) -> usize {
        self.vector_words
    }

    fn rows_fed(&self) -> u64 {
        self.cursor
    }

    fn ensure_open_for_feeding(&self) -> bool {
        !self.sealed && self.cursor < self.rows
    }

    fn feed_row(&mut self, row: u64, words: &[u64]) -> Result<(), StoreError> {
        if !self.ensure_open_for_feeding() {
            return Err(StoreError::Sealed { rows: self.rows });
        }
        if row != self.cursor {
            return Err(StoreError::RowOutOfRange {
                row,
                rows: self.cursor,
            });
        }
        self.check_width(words)?;

        let range = self.row_range(row);
        self.words[range].copy_from_slice(words);
        self.cursor += 1;
        Ok(())
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn merge_row(&mut self, row: u64, words: &[u64]) -> Result<(), StoreError> {
        if row >= self.cursor {
            return Err(StoreError::RowOutOfRange {
                row,
                rows: self.cursor,
            });
        }
        self.check_width(words)?;

        let range = self.row_range(row);
        for (existing, late) in self.words[range].iter_mut().zip(words) {
            *existing |= *late;
        }
        Ok(())
    }

    fn dispatch(&self, delegate: &mut dyn RowDelegate) -> Result<(), StoreError> {
        if !self.sealed {
            return Err(StoreError::FeedingInProgress);
        }
        for row in 0..self.cursor {
            let range = self.row_range(row);
            delegate.execute(row, &self.words[range]);
        }
        Ok(())
    }

    fn feeding_complete(&mut self) -> Result<(), StoreError> {
        self.sealed = true;
        tracing::info!(rows_fed = self.cursor, rows = self.rows, "store sealed");
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.sealed = true;
        Ok(())
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), StoreError> {
        if !self.sealed {
            return Err(StoreError::FeedingInProgress);
        }
        let header = StoreHeader {
            rows: self.rows,
            vector_words: self.vector_words as u64,
            rows_fed: Some(self.cursor),
            dictionary: Vec::new(),
        };
        write_headers(writer, &self.bundle, MEMORY_STORE_KIND, &header)?;
        write_words_be(writer, &self.words)?;
        Ok(())
    }
}
