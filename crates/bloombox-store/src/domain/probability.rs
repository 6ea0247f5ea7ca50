//! Fixed-point / Deflate codec for per-row attribute probabilities
//!
//! Each (id, probability) pair is packed into one 64-bit word: the
//! low-precision id in the high 32 bits, the probability fixed-point encoded
//! with 8 decimal digits in the low 32 bits. The packed words (big-endian,
//! id-sorted) are Deflate-compressed; when compression does not shrink the
//! payload the raw bytes are stored instead, signalled by a negative length
//! marker.

use std::io::{Read, Write};
use std::sync::OnceLock;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::StoreError;

/// 8 decimal digits of fixed-point precision.
const FIXED_POINT_SCALE: f64 = 100_000_000.0;

/// Encode an (id, probability) list into a framed block: a 4-byte big-endian
/// i32 length marker (positive = Deflate payload, negative = raw payload,
/// zero = empty) followed by the payload bytes.
pub fn encode_block(pairs: &[(u32, f64)]) -> Result<Vec<u8>, StoreError> {
    if pairs.is_empty() {
        return Ok(0i32.to_be_bytes().to_vec());
    }

    let mut sorted = pairs.to_vec();
    sorted.sort_by_key(|(id, _)| *id);

    let mut raw = Vec::with_capacity(sorted.len() * 8);
    for (id, probability) in &sorted {
        if !(0.0..=1.0).contains(probability) || !probability.is_finite() {
            return Err(StoreError::ProbabilityOutOfRange {
                id: *id,
                probability: *probability,
            });
        }
        let fixed = (probability * FIXED_POINT_SCALE).round() as u64;
        let word = (u64::from(*id) << 32) | fixed;
        raw.extend_from_slice(&word.to_be_bytes());
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    let mut block;
    if compressed.len() < raw.len() {
        block = Vec::with_capacity(4 + compressed.len());
        block.extend_from_slice(&(compressed.len() as i32).to_be_bytes());
        block.extend_from_slice(&compressed);
    } else {
        block = Vec::with_capacity(4 + raw.len());
        block.extend_from_slice(&(-(raw.len() as i32)).to_be_bytes());
        block.extend_from_slice(&raw);
    }
    Ok(block)
}

/// One row's probability block, decoded lazily on first lookup.
#[derive(Debug, Default)]
pub struct ProbabilityBlock {
    bytes: Vec<u8>,
    decoded: OnceLock<Vec<(u32, f64)>>,
}

impl Clone for ProbabilityBlock {
    fn clone(&self) -> Self {
        // The decode cache is not carried over; it rebuilds on demand.
        Self {
            bytes: self.bytes.clone(),
            decoded: OnceLock::new(),
        }
    }
}

impl ProbabilityBlock {
    /// An empty block (no probabilities stored for the row).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an encoded block, validating its framing up front so later lazy
    /// decodes cannot fail on structure.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, StoreError> {
        if bytes.is_empty() {
            return Ok(Self::empty());
        }
        if bytes.len() < 4 {
            return Err(StoreError::InvalidProbabilityBlock {
                reason: format!("{} bytes, marker needs 4", bytes.len()),
            });
        }
        let marker = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let payload = bytes.len() - 4;
        let expected = marker.unsigned_abs() as usize;
        if payload != expected {
            return Err(StoreError::InvalidProbabilityBlock {
                reason: format!("marker says {expected} payload bytes, got {payload}"),
            });
        }
        if marker < 0 && payload % 8 != 0 {
            return Err(StoreError::InvalidProbabilityBlock {
                reason: format!("raw payload of {payload} bytes is not word-aligned"),
            });
        }
        Ok(Self {
            bytes,
            decoded: OnceLock::new(),
        })
    }

    /// The framed bytes as persisted.
    pub fn encoded(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 4
    }

    /// Binary search the decoded, id-ordered pairs.
    pub fn lookup(&self, id: u32) -> Option<f64> {
        let pairs = self.pairs();
        pairs
            .binary_search_by_key(&id, |(entry_id, _)| *entry_id)
            .ok()
            .map(|index| pairs[index].1)
    }

    /// All decoded pairs, id-ordered.
    pub fn pairs(&self) -> &[(u32, f64)] {
        self.decoded.get_or_init(|| match self.decode() {
            Ok(pairs) => pairs,
            Err(error) => {
                // Framing was validated at construction; hitting this means
                // a corrupt Deflate stream. Degrade to an empty table.
                tracing::warn!("discarding corrupt probability block: {error}");
                Vec::new()
            }
        })
    }

    fn decode(&self) -> Result<Vec<(u32, f64)>, StoreError> {
        if self.bytes.len() < 4 {
            return Ok(Vec::new());
        }
        let marker = i32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
        if marker == 0 {
            return Ok(Vec::new());
        }

        let payload = &self.bytes[4..];
        let raw = if marker > 0 {
            let mut decoder = DeflateDecoder::new(payload);
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw)?;
            raw
        } else {
            payload.to_vec()
        };

        if raw.len() % 8 != 0 {
            return Err(StoreError::InvalidProbabilityBlock {
                reason: format!("decoded payload of {} bytes is not word-aligned", raw.len()),
            });
        }

        let mut pairs = Vec::with_capacity(raw.len() / 8);
        for chunk in raw.chunks_exact(8) {
            let word = u64::from_be_bytes(chunk.try_into().unwrap_or_default());
            let id = (word >> 32) as u32;
            let probability = (word & 0xFFFF_FFFF) as f64 / FIXED_POINT_SCALE;
            pairs.push((id, probability));
        }
        Ok(pairs)
    }
}
