//! File-backed record store
//!
//! Rows are appended to the BBX file as a plain stream of big-endian words,
//! directly after the header sections. Dispatch re-opens the file and
//! streams it sequentially with a bounded read-ahead buffer, so memory use
//! stays flat regardless of store size. Merge is not supported: the stream
//! is append-only.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bloombox_filter::FilterSizing;

use crate::adapters::{decode_words_be, write_words_be};
use crate::domain::header::{BundleHeader, StoreHeader};
use crate::error::StoreError;
use crate::ports::store::{RecordStore, RowDelegate};

pub const FILE_STORE_KIND: &str = "bloombox.store.file";

/// Lower and upper bounds for the dispatch read-ahead buffer.
const MIN_READAHEAD: usize = 8 * 1024;
const MAX_READAHEAD: usize = 4 * 1024 * 1024;
/// Read-ahead target: a small multiple of one row.
const READAHEAD_ROWS: usize = 8;

/// Append-only file-backed store.
pub struct FileStore {
    path: PathBuf,
    bundle: BundleHeader,
    rows: u64,
    vector_words: usize,
    /// Byte offset of the first row word, right after the header sections.
    data_offset: u64,
    /// Byte offset and reserved width of the store-header line, which is
    /// rewritten in place at seal time to record the final fed-row count.
    header_offset: u64,
    header_width: usize,
    cursor: u64,
    sealed: bool,
    writer: Option<BufWriter<File>>,
}

fn json_line<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::MalformedHeader {
        reason: e.to_string(),
    })
}

/// Store-header line padded with trailing spaces to a fixed width, so the
/// same byte span holds both the unsealed and the sealed variant.
fn padded_store_header(header: &StoreHeader, width: usize) -> Result<Vec<u8>, StoreError> {
    let mut line = json_line(header)?.into_bytes();
    if line.len() > width {
        return Err(StoreError::MalformedHeader {
            reason: format!("store header takes {} bytes, {} reserved", line.len(), width),
        });
    }
    line.resize(width, b' ');
    line.push(b'\n');
    Ok(line)
}

impl FileStore {
    /// Create a fresh store file: header sections are written immediately,
    /// rows are appended as they are fed.
    pub fn create(
        path: impl AsRef<Path>,
        sizing: FilterSizing,
        rows: u64,
        description: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bundle = BundleHeader::new(sizing, description);
        let vector_words = bundle.sizing.vector_words();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);

        let header = StoreHeader {
            rows,
            vector_words: vector_words as u64,
            rows_fed: None,
            dictionary: Vec::new(),
        };
        // Reserve enough width for the sealed rewrite, whatever the final
        // cursor value turns out to be.
        let sealed_header = StoreHeader {
            rows_fed: Some(rows),
            ..header.clone()
        };
        let header_width = json_line(&header)?.len().max(json_line(&sealed_header)?.len());

        let mut header_bytes = Vec::new();
        header_bytes.extend_from_slice(json_line(&bundle)?.as_bytes());
        header_bytes.push(b'\n');
        header_bytes.extend_from_slice(FILE_STORE_KIND.as_bytes());
        header_bytes.push(b'\n');
        let header_offset = header_bytes.len() as u64;
        header_bytes.extend_from_slice(&padded_store_header(&header, header_width)?);
        writer.write_all(&header_bytes)?;

        tracing::info!(path = %path.display(), rows, vector_words, "created file store");
        Ok(Self {
            path,
            bundle,
            rows,
            vector_words,
            data_offset: header_bytes.len() as u64,
            header_offset,
            header_width,
            cursor: 0,
            sealed: false,
            writer: Some(writer),
        })
    }

    /// Reconstruct a sealed store around an existing BBX file. The stream
    /// length must match the fed-row count recorded at seal time exactly;
    /// anything shorter is truncated, even at a row boundary.
    pub(crate) fn restore(
        path: &Path,
        bundle: BundleHeader,
        header: &StoreHeader,
        data_offset: u64,
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
        let Some(rows_fed) = header.rows_fed else {
            return Err(StoreError::MalformedHeader {
                reason: "no fed-row count recorded; the store was never sealed".to_string(),
            });
        };
        if rows_fed > header.rows {
            return Err(StoreError::MalformedHeader {
                reason: format!("rows_fed {} exceeds capacity {}", rows_fed, header.rows),
            });
        }

        let file_len = std::fs::metadata(path)?.len();
        let data_len = file_len.saturating_sub(data_offset);
        let expected = rows_fed * vector_words as u64 * 8;
        if data_len < expected {
            return Err(StoreError::Truncated {
                expected,
                got: data_len,
            });
        }
        if data_len > expected {
            return Err(StoreError::MalformedHeader {
                reason: format!(
                    "stream holds {data_len} row bytes, the seal recorded {expected}"
                ),
            });
        }

        tracing::info!(
            path = %path.display(),
            rows = header.rows,
            rows_fed,
            "restored file store"
        );
        Ok(Self {
            path: path.to_path_buf(),
            bundle,
            rows: header.rows,
            vector_words,
            data_offset,
            header_offset: 0,
            header_width: 0,
            cursor: rows_fed,
            sealed: true,
            writer: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn readahead(&self) -> usize {
        (self.vector_words * 8 * READAHEAD_ROWS).clamp(MIN_READAHEAD, MAX_READAHEAD)
    }
}

impl RecordStore for FileStore {
    fn kind(&self) -> &'static str {
        FILE_STORE_KIND
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
        !self.sealed && self.writer.is_some() && self.cursor < self.rows
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
        if words.len() != self.vector_words {
            return Err(StoreError::VectorWidthMismatch {
                got: words.len(),
                expected: self.vector_words,
            });
        }

        let writer = self.writer.as_mut().ok_or(StoreError::Sealed { rows: self.rows })?;
        write_words_be(writer, words)?;
        self.cursor += 1;
        Ok(())
    }

    fn merge_row(&mut self, _row: u64, _words: &[u64]) -> Result<(), StoreError> {
        Err(StoreError::MergeUnsupported {
            kind: FILE_STORE_KIND,
        })
    }

    fn dispatch(&self, delegate: &mut dyn RowDelegate) -> Result<(), StoreError> {
        if !self.sealed {
            return Err(StoreError::FeedingInProgress);
        }

        let file = File::open(&self.path)?;
        let mut reader = BufReader::with_capacity(self.readahead(), file);
        reader.seek(SeekFrom::Start(self.data_offset))?;

        // One reusable row buffer; the scan never allocates per row.
        let row_bytes = self.vector_words * 8;
        let mut bytes = vec![0u8; row_bytes];
        let mut words = vec![0u64; self.vector_words];
        for row in 0..self.cursor {
            reader.read_exact(&mut bytes).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    StoreError::Truncated {
                        expected: self.cursor * row_bytes as u64,
                        got: row * row_bytes as u64,
                    }
                } else {
                    StoreError::Io(e)
                }
            })?;
            decode_words_be(&bytes, &mut words);
            delegate.execute(row, &words);
        }
        Ok(())
    }

    fn feeding_complete(&mut self) -> Result<(), StoreError> {
        if let Some(writer) = self.writer.take() {
            let mut file = writer
                .into_inner()
                .map_err(|e| StoreError::Io(e.into_error()))?;
            // Record the final cursor so restore can validate the stream
            // length exactly, including row-aligned truncation.
            let header = StoreHeader {
                rows: self.rows,
                vector_words: self.vector_words as u64,
                rows_fed: Some(self.cursor),
                dictionary: Vec::new(),
            };
            let line = padded_store_header(&header, self.header_width)?;
            file.seek(SeekFrom::Start(self.header_offset))?;
            file.write_all(&line)?;
            file.sync_all()?;
        }
        self.sealed = true;
        tracing::info!(rows_fed = self.cursor, rows = self.rows, "file store sealed");
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        self.sealed = true;
        Ok(())
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), StoreError> {
        if !self.sealed {
            return Err(StoreError::FeedingInProgress);
        }
        // The file already is the BBX representation; stream it through.
        let mut file = File::open(&self.path)?;
        std::io::copy(&mut file, writer)?;
        Ok(())
    }
}
