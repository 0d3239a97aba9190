//! Inverted index over document sections.
//!
//! Building is a two-step affair so the expensive part can run in
//! parallel across documents:
//!
//! 1. [`prepare_document`] segments and tokenizes one document. It touches
//!    no shared state and can run on any thread.
//! 2. [`IndexBuilder::push`] appends prepared documents in traversal order,
//!    assigning dense document and section ids and merging term
//!    frequencies into the posting table.
//!
//! [`IndexBuilder::build`] hands back an immutable [`Index`]. There is no
//! way to mutate an `Index` afterwards; a new build replaces it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Document, DocumentId, Posting, Section, SectionExcerpt, SectionId};
use crate::segment::{heading_terms, segment, tokens};

/// A document that has been segmented and tokenized, but not yet indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDocument {
    pub path: String,
    pub content_hash: String,
    pub sections: Vec<PreparedSection>,
}

/// A section with its token statistics, waiting for an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSection {
    pub heading_path: Vec<String>,
    pub text: String,
    pub token_count: usize,
    /// Term frequencies of the body, sorted by term.
    pub term_frequencies: Vec<(String, u32)>,
}

/// Segment and tokenize a single document.
///
/// Fails with [`Error::MalformedDocument`] when a code fence is left open.
pub fn prepare_document(path: &str, text: &str) -> Result<PreparedDocument> {
    let drafts = segment(path, text)?;

    let sections = drafts
        .into_iter()
        .map(|draft| {
            let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
            let mut token_count = 0;
            for token in tokens(&draft.text) {
                *frequencies.entry(token.term).or_insert(0) += 1;
                token_count += 1;
            }
            PreparedSection {
                heading_path: draft.heading_path,
                text: draft.text,
                token_count,
                term_frequencies: frequencies.into_iter().collect(),
            }
        })
        .collect();

    Ok(PreparedDocument {
        path: path.to_string(),
        content_hash: content_hash(text),
        sections,
    })
}

/// SHA-256 of a document's source text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Accumulates prepared documents into an [`Index`].
#[derive(Debug, Default)]
pub struct IndexBuilder {
    documents: Vec<Document>,
    sections: Vec<Section>,
    postings: BTreeMap<String, Vec<Posting>>,
    heading_postings: BTreeMap<String, Vec<SectionId>>,
    total_tokens: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare and push a document in one step.
    pub fn add_document(&mut self, path: &str, text: &str) -> Result<DocumentId> {
        let prepared = prepare_document(path, text)?;
        Ok(self.push(prepared))
    }

    /// Append a prepared document. Ids follow push order.
    ///
    /// Sections without a single token are not indexed: they can never
    /// match a query, and a zero-token section would make every budget
    /// look viable.
    pub fn push(&mut self, doc: PreparedDocument) -> DocumentId {
        let doc_id = self.documents.len();
        let first_section = self.sections.len();

        for prepared in doc.sections.into_iter().filter(|s| s.token_count > 0) {
            let section_id = self.sections.len();
            for (term, frequency) in prepared.term_frequencies {
                // Section ids only grow, so every posting list stays sorted.
                self.postings.entry(term).or_default().push(Posting {
                    section: section_id,
                    frequency,
                });
            }
            let terms = heading_terms(&prepared.heading_path);
            for term in &terms {
                self.heading_postings
                    .entry(term.clone())
                    .or_default()
                    .push(section_id);
            }
            self.total_tokens += prepared.token_count;
            self.sections.push(Section {
                id: section_id,
                document: doc_id,
                heading_terms: terms,
                heading_path: prepared.heading_path,
                text: prepared.text,
                token_count: prepared.token_count,
            });
        }

        self.documents.push(Document {
            id: doc_id,
            path: doc.path,
            content_hash: doc.content_hash,
            first_section,
            section_count: self.sections.len() - first_section,
        });
        doc_id
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Finish the build. A corpus without a single token yields an empty index.
    pub fn build(self) -> Index {
        if self.total_tokens == 0 {
            return Index::default();
        }
        Index {
            documents: self.documents,
            sections: self.sections,
            postings: self.postings,
            heading_postings: self.heading_postings,
            total_tokens: self.total_tokens,
        }
    }
}

/// The result of [`build_index`]: the index plus the documents left out.
#[derive(Debug)]
pub struct BuildOutcome {
    pub index: Index,
    /// Per-document failures; the remaining documents were still indexed.
    pub skipped: Vec<Error>,
}

/// Build an index from `(path, text)` pairs, in the order given.
///
/// A malformed document is skipped and reported in
/// [`BuildOutcome::skipped`]; it never aborts the build.
pub fn build_index<I, P, T>(docs: I) -> BuildOutcome
where
    I: IntoIterator<Item = (P, T)>,
    P: AsRef<str>,
    T: AsRef<str>,
{
    let mut builder = IndexBuilder::new();
    let mut skipped = Vec::new();
    for (path, text) in docs {
        if let Err(err) = builder.add_document(path.as_ref(), text.as_ref()) {
            skipped.push(err);
        }
    }
    BuildOutcome {
        index: builder.build(),
        skipped,
    }
}

/// An immutable corpus snapshot: documents, sections and postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    documents: Vec<Document>,
    sections: Vec<Section>,
    postings: BTreeMap<String, Vec<Posting>>,
    /// Term -> sections whose heading path contains it, ascending.
    heading_postings: BTreeMap<String, Vec<SectionId>>,
    total_tokens: usize,
}

/// Summary figures for an [`Index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub sections: usize,
    pub terms: usize,
    pub total_tokens: usize,
    pub smallest_section_tokens: Option<usize>,
    pub largest_section_tokens: Option<usize>,
}

impl Index {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id)
    }

    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Posting list for an already-normalized term.
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sections whose heading path contains an already-normalized term.
    pub fn heading_sections(&self, term: &str) -> &[SectionId] {
        self.heading_postings
            .get(term)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Frequency of `term` in one section's body.
    pub fn term_frequency(&self, term: &str, id: SectionId) -> u32 {
        let postings = self.postings(term);
        postings
            .binary_search_by_key(&id, |p| p.section)
            .map(|pos| postings[pos].frequency)
            .unwrap_or(0)
    }

    /// Number of sections whose body contains `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings(term).len()
    }

    /// Token count of the smallest section, `None` for an empty index.
    pub fn smallest_section_tokens(&self) -> Option<usize> {
        self.sections.iter().map(|s| s.token_count).min()
    }

    /// Build a retrieval excerpt for a section.
    pub fn excerpt(&self, id: SectionId, score: f64) -> Option<SectionExcerpt> {
        let section = self.section(id)?;
        let document = self.document(section.document)?;
        Some(SectionExcerpt {
            section_id: id,
            document: document.path.clone(),
            heading_path: section.heading_path.clone(),
            text: section.text.clone(),
            score,
            token_count: section.token_count,
        })
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents.len(),
            sections: self.sections.len(),
            terms: self.postings.len(),
            total_tokens: self.total_tokens,
            smallest_section_tokens: self.smallest_section_tokens(),
            largest_section_tokens: self.sections.iter().map(|s| s.token_count).max(),
        }
    }
}
