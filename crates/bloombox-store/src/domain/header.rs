//! BBX header sections
//!
//! A persisted store starts with two one-line JSON headers: the bundle
//! header (format version, sizing, creation date, description) and, after the
//! store-kind tag line, the store header (row geometry plus kind-specific
//! fields). A major-version mismatch on read must fail; a minor mismatch
//! must not.

use std::time::{SystemTime, UNIX_EPOCH};

use bloombox_filter::FilterSizing;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const FORMAT_VERSION_MAJOR: u32 = 1;
pub const FORMAT_VERSION_MINOR: u32 = 0;

/// First BBX section: format version, filter sizing, provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleHeader {
    pub version_major: u32,
    pub version_minor: u32,
    pub sizing: FilterSizing,
    pub created_unix: u64,
    pub description: String,
}

impl BundleHeader {
    pub fn new(sizing: FilterSizing, description: impl Into<String>) -> Self {
        let created_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            sizing,
            created_unix,
            description: description.into(),
        }
    }

    /// Reject readers of a different major version; minor drift is fine.
    pub fn check_version(&self) -> Result<(), StoreError> {
        if self.version_major != FORMAT_VERSION_MAJOR {
            return Err(StoreError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
                supported: FORMAT_VERSION_MAJOR,
            });
        }
        Ok(())
    }
}

/// One dictionary entry of a probabilistic store: data point -> low-precision id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub attribute: String,
    pub value: String,
    pub id: u32,
}

/// Third BBX section: store geometry plus kind-specific fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreHeader {
    pub rows: u64,
    pub vector_words: u64,
    /// Rows actually fed, recorded at seal time. Restore validates the raw
    /// stream length against it; absent means the store was never sealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_fed: Option<u64>,
    /// Probability dictionary; empty for binary store kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dictionary: Vec<DictionaryEntry>,
}
