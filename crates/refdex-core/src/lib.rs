//! # refdex core
//!
//! Pure indexing and retrieval logic for refdex: Markdown segmentation,
//! the inverted index, relevance ranking, budgeted retrieval and snapshot
//! encoding.
//!
//! This crate performs no filesystem or network I/O and does not depend on
//! an async runtime. An [`Index`] is immutable once built and is
//! `Send + Sync`, so it can be shared behind an `Arc` by any number of
//! concurrent readers.
//!
//! ```rust
//! use refdex_core::{build_index, retrieve};
//!
//! let outcome = build_index([(
//!     "istio/traffic.md",
//!     "# Traffic\n\n## Circuit Breaking\n\nTrip the circuit after five errors.",
//! )]);
//! let retrieval = retrieve(&outcome.index, "circuit", 100).unwrap();
//! assert_eq!(retrieval.results[0].heading_path, vec!["Traffic", "Circuit Breaking"]);
//! ```

pub mod error;
pub mod index;
pub mod models;
pub mod rank;
pub mod retrieve;
pub mod segment;
pub mod snapshot;

pub use error::{Error, Result};
pub use index::{build_index, prepare_document, BuildOutcome, Index, IndexBuilder, IndexStats};
pub use rank::{rank, rank_with, RankParams, RankRequest};
pub use retrieve::{retrieve, retrieve_with, RetrievalRequest};
pub use snapshot::{SkippedDocument, Snapshot, FORMAT_VERSION};
