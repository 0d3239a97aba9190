//! Core data models shared by the index, ranker and retrieval path.
//!
//! The [`Index`](crate::index::Index) is an arena: it owns every
//! [`Document`] and [`Section`] of a corpus snapshot, and a
//! [`SectionId`] is simply the section's position in that arena.

use serde::{Deserialize, Serialize};

/// Dense section identifier, assigned in traversal order during a build.
pub type SectionId = usize;

/// Dense document identifier, assigned in traversal order during a build.
pub type DocumentId = usize;

/// A source document and the contiguous range of sections it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Path relative to the corpus root, `/`-separated.
    pub path: String,
    /// SHA-256 of the source text (hex).
    pub content_hash: String,
    /// Id of the first section owned by this document.
    pub first_section: SectionId,
    /// Number of sections owned by this document.
    pub section_count: usize,
}

impl Document {
    /// Ids of the sections owned by this document.
    pub fn section_ids(&self) -> std::ops::Range<SectionId> {
        self.first_section..self.first_section + self.section_count
    }
}

/// A heading-delimited span of a document: the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub document: DocumentId,
    /// Heading titles from the outermost heading down to this section's.
    /// Empty for a document's preamble or a document without headings.
    pub heading_path: Vec<String>,
    /// Section body, code fences included verbatim.
    pub text: String,
    /// Number of normalized tokens in `text`.
    pub token_count: usize,
    /// Normalized terms of the heading path, sorted and deduplicated.
    pub heading_terms: Vec<String>,
}

impl Section {
    pub fn has_heading_term(&self, term: &str) -> bool {
        self.heading_terms
            .binary_search_by(|t| t.as_str().cmp(term))
            .is_ok()
    }
}

/// One entry of a term's posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub section: SectionId,
    /// Occurrences of the term in the section body.
    pub frequency: u32,
}

/// Whether a token came from prose or from a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Prose,
    Code,
}

/// A normalized word unit and its position within its section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: usize,
    pub kind: TokenKind,
}

/// A ranked section returned by the ranker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSection {
    pub section_id: SectionId,
    pub score: f64,
    /// Scoring breakdown (populated when explain is requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Per-term breakdown of a section's score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub terms: Vec<TermContribution>,
}

/// Contribution of a single query term to a section's score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermContribution {
    pub term: String,
    pub term_frequency: u32,
    pub idf: f64,
    /// Heading boost applied for this term (0.0 when the heading lacks it).
    pub heading_boost: f64,
}

/// A section excerpt returned by the retrieval path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionExcerpt {
    pub section_id: SectionId,
    /// Path of the owning document.
    pub document: String,
    pub heading_path: Vec<String>,
    pub text: String,
    pub score: f64,
    pub token_count: usize,
}

/// The answer to a budgeted retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub results: Vec<SectionExcerpt>,
    /// Sum of `token_count` over `results`; never exceeds the budget.
    pub used_tokens: usize,
}

impl Retrieval {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            used_tokens: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
