//! Arbitrary-width digests over attribute tuples
//!
//! One `digest` call yields at least the requested number of bits. Widths up
//! to 512 use a single run of the smallest covering primitive (SHA-1,
//! SHA-256, SHA-512); wider requests chain SHA-512 runs, each salted with an
//! incrementing counter appended as an extra tuple part so no two runs see
//! identical input.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// One (attribute, value) combination, the atomic unit fed into a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPoint {
    pub attribute: String,
    pub value: String,
}

impl DataPoint {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// The tuple parts hashed for this data point.
    pub fn parts(&self) -> [&[u8]; 2] {
        [self.attribute.as_bytes(), self.value.as_bytes()]
    }
}

/// Stateless digest capability
///
/// Constructed once and passed by reference; every call owns its digest
/// state, so concurrent callers never share mutable hashing state.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashGenerator;

impl HashGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Digest the tuple into at least `bits` bits (rounded up to whole
    /// digest outputs, so the returned buffer may be longer).
    pub fn digest(&self, parts: &[&[u8]], bits: u32) -> Vec<u8> {
        if bits <= 160 {
            digest_once::<Sha1>(parts, None)
        } else if bits <= 256 {
            digest_once::<Sha256>(parts, None)
        } else if bits <= 512 {
            digest_once::<Sha512>(parts, None)
        } else {
            let mut out = Vec::with_capacity(bits.div_ceil(8) as usize);
            let mut salt = 0u64;
            while (out.len() as u32) * 8 < bits {
                out.extend_from_slice(&digest_once::<Sha512>(parts, Some(salt)));
                salt += 1;
            }
            out
        }
    }
}

/// One digest run over the canonical tuple encoding.
///
/// Every part is length-prefixed (u32 big-endian) so that ("ab", "c") and
/// ("a", "bc") hash differently; the salt, when present, is appended as an
/// extra 8-byte part.
fn digest_once<D: Digest>(parts: &[&[u8]], salt: Option<u64>) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    if let Some(salt) = salt {
        hasher.update(8u32.to_be_bytes());
        hasher.update(salt.to_be_bytes());
    }
    hasher.finalize().to_vec()
}
