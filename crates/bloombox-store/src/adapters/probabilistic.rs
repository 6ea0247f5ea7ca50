//! Probabilistic record store
//!
//! An in-memory store that additionally keeps, per row, a compressed block
//! of per-data-point probabilities, plus the dictionary assigning each data
//! point its low-precision id. Used by the non-binary feeding mode; the
//! query engine reads the blocks through the `ProbabilityProvider` port.

use std::collections::HashMap;
use std::io::{Read, Write};

use bloombox_filter::{DataPoint, FilterSizing};

use crate::adapters::memory::MemoryStore;
use crate::adapters::write_headers;
use crate::domain::header::{BundleHeader, DictionaryEntry, StoreHeader};
use crate::domain::probability::{encode_block, ProbabilityBlock};
use crate::error::StoreError;
use crate::ports::store::{ProbabilityProvider, RecordStore, RowDelegate, ScoredRecordStore};

pub const PROBABILITY_STORE_KIND: &str = "bloombox.store.probability";

/// In-memory store with per-row probability blocks.
pub struct ProbabilityStore {
    base: MemoryStore,
    dictionary: HashMap<DataPoint, u32>,
    next_id: u32,
    blocks: Vec<ProbabilityBlock>,
}

impl ProbabilityStore {
    pub fn new(sizing: FilterSizing, rows: u64, description: impl Into<String>) -> Self {
        let blocks = (0..rows).map(|_| ProbabilityBlock::empty()).collect();
        Self {
            base: MemoryStore::new(sizing, rows, description),
            dictionary: HashMap::new(),
            next_id: 0,
            blocks,
        }
    }

    fn id_for(&mut self, point: &DataPoint) -> u32 {
        if let Some(id) = self.dictionary.get(point) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.dictionary.insert(point.clone(), id);
        id
    }

    /// Reconstruct a sealed store: row words, then one framed probability
    /// block per fed row.
    pub fn restore(
        bundle: BundleHeader,
        header: &StoreHeader,
        reader: &mut dyn Read,
    ) -> Result<Self, StoreError> {
        let base = MemoryStore::restore(bundle, header, reader)?;
        let rows_fed = base.rows_fed();

        let mut blocks: Vec<ProbabilityBlock> = Vec::with_capacity(header.rows as usize);
        for _ in 0..rows_fed {
            blocks.push(read_block(reader)?);
        }
        blocks.resize_with(header.rows as usize, ProbabilityBlock::empty);

        let mut dictionary = HashMap::with_capacity(header.dictionary.len());
        let mut next_id = 0u32;
        for entry in &header.dictionary {
            next_id = next_id.max(entry.id + 1);
            dictionary.insert(
                DataPoint::new(entry.attribute.clone(), entry.value.clone()),
                entry.id,
            );
        }

        Ok(Self {
            base,
            dictionary,
            next_id,
            blocks,
        })
    }
}

/// Read one framed probability block: 4-byte marker, then |marker| bytes.
fn read_block(reader: &mut dyn Read) -> Result<ProbabilityBlock, StoreError> {
    let mut marker = [0u8; 4];
    reader.read_exact(&mut marker).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            StoreError::Truncated { expected: 4, got: 0 }
        } else {
            StoreError::Io(e)
        }
    })?;
    let length = i32::from_be_bytes(marker).unsigned_abs() as usize;

    let mut bytes = Vec::with_capacity(4 + length);
    bytes.extend_from_slice(&marker);
    if length > 0 {
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StoreError::Truncated {
                    expected: length as u64,
                    got: 0,
                }
            } else {
                StoreError::Io(e)
            }
        })?;
        bytes.extend_from_slice(&payload);
    }
    ProbabilityBlock::from_encoded(bytes)
}

impl RecordStore for ProbabilityStore {
    fn kind(&self) -> &'static str {
        PROBABILITY_STORE_KIND
    }

    fn sizing(&self) -> &FilterSizing {
        self.base.sizing()
    }

    fn row_count(&self) -> u64 {
        self.base.row_count()
    }

    fn vector_words(&self) -> usize {
        self.base.vector_words()
    }

    fn rows_fed(&self) -> u64 {
        self.base.rows_fed()
    }

    fn ensure_open_for_feeding(&self) -> bool {
        self.base.ensure_open_for_feeding()
    }

    /// Binary feed: the row carries no probabilities.
    fn feed_row(&mut self, row: u64, words: &[u64]) -> Result<(), StoreError> {
        self.base.feed_row(row, words)
    }

    fn merge_row(&mut self, _row: u64, _words: &[u64]) -> Result<(), StoreError> {
        // Merging would desynchronize the stored probability blocks.
        Err(StoreError::MergeUnsupported {
            kind: PROBABILITY_STORE_KIND,
        })
    }

    fn dispatch(&self, delegate: &mut dyn RowDelegate) -> Result<(), StoreError> {
        self.base.dispatch(delegate)
    }

    fn feeding_complete(&mut self) -> Result<(), StoreError> {
        self.base.feeding_complete()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.base.close()
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), StoreError> {
        if !self.base.is_sealed() {
            return Err(StoreError::FeedingInProgress);
        }

        let mut dictionary: Vec<DictionaryEntry> = self
            .dictionary
            .iter()
            .map(|(point, id)| DictionaryEntry {
                attribute: point.attribute.clone(),
                value: point.value.clone(),
                id: *id,
            })
            .collect();
        dictionary.sort_by_key(|entry| entry.id);

        let header = StoreHeader {
            rows: self.row_count(),
            vector_words: self.vector_words() as u64,
            rows_fed: Some(self.rows_fed()),
            dictionary,
        };
        write_headers(writer, self.base.bundle(), PROBABILITY_STORE_KIND, &header)?;

        // Row words first, then the per-row trailing blocks.
        self.base.write_words(writer)?;
        for block in self.blocks.iter().take(self.rows_fed() as usize) {
            if block.encoded().is_empty() {
                writer.write_all(&0i32.to_be_bytes())?;
            } else {
                writer.write_all(block.encoded())?;
            }
        }
        Ok(())
    }

    fn probabilities(&self) -> Option<&dyn ProbabilityProvider> {
        Some(self)
    }
}

impl ScoredRecordStore for ProbabilityStore {
    fn feed_scored_row(
        &mut self,
        row: u64,
        words: &[u64],
        scores: &[(DataPoint, f64)],
    ) -> Result<(), StoreError> {
        let pairs: Vec<(u32, f64)> = scores
            .iter()
            .map(|(point, probability)| (self.id_for(point), *probability))
            .collect();
        let block = ProbabilityBlock::from_encoded(encode_block(&pairs)?)?;

        self.base.feed_row(row, words)?;
        self.blocks[row as usize] = block;
        Ok(())
    }
}

impl ProbabilityProvider for ProbabilityStore {
    fn id_of(&self, point: &DataPoint) -> Option<u32> {
        self.dictionary.get(point).copied()
    }

    fn probability(&self, row: u64, id: u32) -> Option<f64> {
        self.blocks.get(row as usize)?.lookup(id)
    }
}
