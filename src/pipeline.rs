//! Corpus build pipeline.
//!
//! Orchestrates `index build` (and the service's background rebuilds):
//!
//! ```text
//! scan corpus → read + segment (parallel, blocking pool) → push in path order → snapshot
//! ```
//!
//! Documents are read and segmented concurrently, bounded by
//! `[source].max_concurrency`. Results are pushed into the
//! [`IndexBuilder`] in sorted relative-path order regardless of completion
//! order, so section ids are identical across builds of an unchanged tree.
//!
//! A document with an unbalanced code fence is skipped, logged and
//! recorded in the snapshot's `skipped` list; the remaining documents are
//! still indexed. Files that cannot be read as UTF-8 are logged and left
//! out without being recorded.

use anyhow::{Context, Result};
use refdex_core::index::PreparedDocument;
use refdex_core::{prepare_document, Error as CoreError, Index, IndexBuilder, SkippedDocument, Snapshot};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{Config, SourceConfig};
use crate::corpus::{scan_corpus, CorpusFile};
use crate::persist::write_snapshot;
use crate::progress::{format_number, BuildProgressEvent, BuildProgressReporter, ProgressMode};

/// Result of building a corpus in memory.
#[derive(Debug)]
pub struct CorpusBuild {
    pub index: Index,
    /// Documents skipped for unbalanced code fences, in path order.
    pub malformed: Vec<CoreError>,
    /// Files that could not be read as UTF-8 text.
    pub unreadable: usize,
}

impl CorpusBuild {
    pub fn into_snapshot(self, source_root: impl Into<String>) -> Snapshot {
        let skipped = self
            .malformed
            .iter()
            .filter_map(SkippedDocument::from_error)
            .collect();
        Snapshot::new(source_root, self.index, skipped)
    }
}

/// Summary of an `index build` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub sections: usize,
    pub skipped: usize,
    pub unreadable: usize,
}

enum FileOutcome {
    Prepared(PreparedDocument),
    Malformed(CoreError),
    Unreadable(String),
}

fn prepare_file(file: &CorpusFile) -> FileOutcome {
    match std::fs::read_to_string(&file.path) {
        Ok(text) => match prepare_document(&file.relative, &text) {
            Ok(doc) => FileOutcome::Prepared(doc),
            Err(err) => FileOutcome::Malformed(err),
        },
        Err(err) => FileOutcome::Unreadable(err.to_string()),
    }
}

/// Scan `root` and build an in-memory index from every selected file.
pub async fn build_corpus(
    config: &SourceConfig,
    root: &Path,
    reporter: &dyn BuildProgressReporter,
) -> Result<CorpusBuild> {
    reporter.report(BuildProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let files = scan_corpus(root, config)?;
    let total = files.len();
    tracing::info!(root = %root.display(), files = total, "corpus scanned");

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let mut tasks = JoinSet::new();
    for (idx, file) in files.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let outcome = tokio::task::spawn_blocking(move || {
                let outcome = prepare_file(&file);
                (file, outcome)
            })
            .await?;
            anyhow::Ok((idx, outcome))
        });
    }

    let mut slots: Vec<Option<(CorpusFile, FileOutcome)>> = (0..total).map(|_| None).collect();
    let mut done = 0u64;
    while let Some(joined) = tasks.join_next().await {
        let (idx, outcome) = joined.context("build task panicked")??;
        slots[idx] = Some(outcome);
        done += 1;
        if done % 50 == 0 || done == total as u64 {
            reporter.report(BuildProgressEvent::Indexing {
                n: done,
                total: total as u64,
            });
        }
    }

    let mut builder = IndexBuilder::new();
    let mut malformed = Vec::new();
    let mut unreadable = 0;
    for (file, outcome) in slots.into_iter().flatten() {
        match outcome {
            FileOutcome::Prepared(doc) => {
                builder.push(doc);
            }
            FileOutcome::Malformed(err) => {
                tracing::warn!(path = %file.relative, error = %err, "skipping malformed document");
                malformed.push(err);
            }
            FileOutcome::Unreadable(message) => {
                tracing::warn!(path = %file.path.display(), error = %message, "skipping unreadable file");
                unreadable += 1;
            }
        }
    }

    let index = builder.build();
    tracing::info!(
        documents = index.documents().len(),
        sections = index.section_count(),
        skipped = malformed.len(),
        "index built"
    );

    Ok(CorpusBuild {
        index,
        malformed,
        unreadable,
    })
}

/// Run `index build`: build the corpus and write the snapshot to `out`.
///
/// With `strict`, the first malformed document aborts the build before
/// anything is written; the error chain carries the core
/// [`CoreError::MalformedDocument`].
pub async fn run_build(
    config: &Config,
    source: &Path,
    out: &Path,
    strict: bool,
    progress: ProgressMode,
) -> Result<BuildReport> {
    let reporter = progress.reporter();
    let build = build_corpus(&config.source, source, reporter.as_ref()).await?;

    if strict {
        if let Some(err) = build.malformed.first() {
            return Err(anyhow::Error::new(err.clone()))
                .context("build aborted: malformed document (--strict)");
        }
    }

    let report = BuildReport {
        documents: build.index.documents().len(),
        sections: build.index.section_count(),
        skipped: build.malformed.len(),
        unreadable: build.unreadable,
    };
    let terms = build.index.term_count();
    let tokens = build.index.total_tokens();

    let snapshot = build.into_snapshot(source.display().to_string());
    write_snapshot(out, &snapshot)?;

    println!("build {}", source.display());
    println!("  documents: {}", format_number(report.documents as u64));
    println!("  sections: {}", format_number(report.sections as u64));
    println!("  terms: {}", format_number(terms as u64));
    println!("  tokens: {}", format_number(tokens as u64));
    if report.skipped > 0 {
        println!("  skipped (malformed): {}", report.skipped);
        for doc in &snapshot.skipped {
            println!("    {}:{}", doc.path, doc.line);
        }
    }
    if report.unreadable > 0 {
        println!("  skipped (unreadable): {}", report.unreadable);
    }
    println!("  snapshot: {}", out.display());
    println!("  build id: {}", snapshot.build_id);
    println!("ok");

    Ok(report)
}
