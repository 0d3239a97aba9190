//! Error taxonomy shared by the segmenter, ranker and retrieval path.

use thiserror::Error;

/// Errors produced by `refdex-core` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A source document could not be segmented (unbalanced code fence).
    ///
    /// Recoverable at build time: the offending document is skipped.
    #[error("malformed document {path}: unclosed code fence opened at line {line}")]
    MalformedDocument { path: String, line: usize },

    /// The query normalized to zero terms.
    #[error("query must contain at least one searchable term")]
    EmptyQuery,

    /// Even the smallest section in the corpus does not fit the budget.
    #[error("token budget {budget} is smaller than the smallest section ({minimum} tokens)")]
    BudgetTooSmall { budget: usize, minimum: usize },

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },
}

/// Result alias for `refdex-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors caused by the request rather than the corpus or the
    /// snapshot. Caller errors are surfaced immediately and never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::EmptyQuery | Error::BudgetTooSmall { .. })
    }

    /// Minimum viable budget to hint back to the caller, if any.
    pub fn minimum_budget(&self) -> Option<usize> {
        match self {
            Error::BudgetTooSmall { minimum, .. } => Some(*minimum),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}
