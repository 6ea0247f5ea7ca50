//! Adapters layer: store realizations and the restore registry

pub mod file;
pub mod memory;
pub mod probabilistic;
pub mod registry;

use std::io::Write;

use crate::domain::header::{BundleHeader, StoreHeader};
use crate::error::StoreError;

/// Write the three newline-delimited BBX header sections.
pub(crate) fn write_headers(
    writer: &mut dyn Write,
    bundle: &BundleHeader,
    kind: &str,
    store_header: &StoreHeader,
) -> Result<(), StoreError> {
    let bundle_line = serde_json::to_string(bundle).map_err(|e| StoreError::MalformedHeader {
        reason: e.to_string(),
    })?;
    let store_line = serde_json::to_string(store_header).map_err(|e| StoreError::MalformedHeader {
        reason: e.to_string(),
    })?;
    writer.write_all(bundle_line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(kind.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(store_line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Append one row of big-endian 64-bit words.
pub(crate) fn write_words_be(writer: &mut dyn Write, words: &[u64]) -> Result<(), StoreError> {
    for word in words {
        writer.write_all(&word.to_be_bytes())?;
    }
    Ok(())
}

/// Decode big-endian bytes into a word buffer of matching length.
pub(crate) fn decode_words_be(bytes: &[u8], words: &mut [u64]) {
    debug_assert_eq!(bytes.len(), words.len() * 8);
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        *word = u64::from_be_bytes(chunk.try_into().unwrap_or_default());
    }
}
