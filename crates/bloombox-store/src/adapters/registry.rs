//! BBX restore registry
//!
//! A closed mapping from the persisted store-kind tag to its restore
//! function, resolved at compile time. Restoring validates the format
//! version gate and the exact row/word geometry; truncated files fail
//! loudly.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::adapters::file::{FileStore, FILE_STORE_KIND};
use crate::adapters::memory::{MemoryStore, MEMORY_STORE_KIND};
use crate::adapters::probabilistic::{ProbabilityStore, PROBABILITY_STORE_KIND};
use crate::domain::header::{BundleHeader, StoreHeader};
use crate::error::StoreError;
use crate::ports::store::RecordStore;

/// Persist a sealed store to a BBX file.
pub fn persist(store: &dyn RecordStore, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let mut writer = std::io::BufWriter::new(File::create(path.as_ref())?);
    store.write_to(&mut writer)?;
    writer.flush()?;
    tracing::info!(
        path = %path.as_ref().display(),
        kind = store.kind(),
        rows = store.rows_fed(),
        "persisted store"
    );
    Ok(())
}

/// Restore a sealed store from a BBX file, picking the realization by its
/// persisted kind tag.
pub fn restore(path: impl AsRef<Path>) -> Result<Box<dyn RecordStore>, StoreError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut consumed = 0u64;
    let bundle_line = read_header_line(&mut reader, &mut consumed, "bundle header")?;
    let kind_line = read_header_line(&mut reader, &mut consumed, "store kind")?;
    let store_line = read_header_line(&mut reader, &mut consumed, "store header")?;

    let bundle: BundleHeader =
        serde_json::from_str(&bundle_line).map_err(|e| StoreError::MalformedHeader {
            reason: format!("bundle header: {e}"),
        })?;
    bundle.check_version()?;

    let header: StoreHeader =
        serde_json::from_str(&store_line).map_err(|e| StoreError::MalformedHeader {
            reason: format!("store header: {e}"),
        })?;

    match kind_line.as_str() {
        MEMORY_STORE_KIND => Ok(Box::new(MemoryStore::restore(bundle, &header, &mut reader)?)),
        PROBABILITY_STORE_KIND => Ok(Box::new(ProbabilityStore::restore(
            bundle,
            &header,
            &mut reader,
        )?)),
        FILE_STORE_KIND => Ok(Box::new(FileStore::restore(path, bundle, &header, consumed)?)),
        unknown => Err(StoreError::UnknownStoreKind {
            kind: unknown.to_string(),
        }),
    }
}

/// Read one newline-delimited header section, tracking consumed bytes so
/// the file-backed kind knows where its row stream starts.
fn read_header_line(
    reader: &mut BufReader<File>,
    consumed: &mut u64,
    section: &str,
) -> Result<String, StoreError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(StoreError::MalformedHeader {
            reason: format!("unexpected end of file before {section}"),
        });
    }
    *consumed += read as u64;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}
