//! Serialized index snapshots.
//!
//! A [`Snapshot`] wraps an [`Index`] with build metadata and is encoded as
//! JSON. This module only deals in bytes; writing the file atomically is
//! the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::Index;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// An index plus the metadata of the build that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Unique id of the build (UUID v4).
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    /// Corpus root the index was built from, as given on the command line.
    pub source_root: String,
    /// Documents left out of the index because they failed to segment.
    #[serde(default)]
    pub skipped: Vec<SkippedDocument>,
    pub index: Index,
}

/// A document that was skipped during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub path: String,
    pub line: usize,
    pub message: String,
}

impl SkippedDocument {
    /// Record a build-time document error. Returns `None` for errors that
    /// are not tied to a document.
    pub fn from_error(err: &Error) -> Option<Self> {
        match err {
            Error::MalformedDocument { path, line } => Some(Self {
                path: path.clone(),
                line: *line,
                message: err.to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Header {
    format_version: u32,
}

impl Snapshot {
    pub fn new(source_root: impl Into<String>, index: Index, skipped: Vec<SkippedDocument>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            build_id: Uuid::new_v4().to_string(),
            built_at: Utc::now(),
            source_root: source_root.into(),
            skipped,
            index,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a snapshot, rejecting unknown format versions before the
    /// (much larger) index body is parsed.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let header: Header = serde_json::from_slice(bytes)?;
        if header.format_version != FORMAT_VERSION {
            return Err(Error::UnsupportedFormat {
                found: header.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
