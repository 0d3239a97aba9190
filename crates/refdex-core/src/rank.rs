//! Relevance ranking of sections against a free-text query.
//!
//! # Scoring
//!
//! For every distinct normalized query term *t* and section *s*:
//!
//! ```text
//! score(s) = Σ tf(t, s) × idf(t)  +  Σ boost · [t ∈ heading_path(s)]
//! idf(t)   = ln((N + 1) / (df(t) + 1)) + 1
//! ```
//!
//! where `N` is the number of sections and `df(t)` the number of sections
//! whose body contains *t*. The `+ 1` terms keep the idf finite and
//! strictly positive.
//!
//! # Ordering
//!
//! Results are sorted by score (desc), heading path length (asc), then
//! section id (asc). Sections scoring zero are left out.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::{RankedSection, ScoreExplanation, SectionId, TermContribution};
use crate::segment::normalize_query;

/// Additive boost for a query term found in a section's heading path.
pub const DEFAULT_HEADING_BOOST: f64 = 2.0;

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    pub heading_boost: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            heading_boost: DEFAULT_HEADING_BOOST,
        }
    }
}

/// Bundles all inputs for a single ranking call.
#[derive(Debug, Clone)]
pub struct RankRequest<'a> {
    pub query: &'a str,
    /// Maximum number of results; `None` ranks every matching section.
    pub limit: Option<usize>,
    pub params: RankParams,
    /// If true, populate [`ScoreExplanation`] on each result.
    pub explain: bool,
}

impl<'a> RankRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            limit: None,
            params: RankParams::default(),
            explain: false,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn params(mut self, params: RankParams) -> Self {
        self.params = params;
        self
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// Inverse document frequency with add-one smoothing.
pub fn idf(total_sections: usize, sections_containing: usize) -> f64 {
    ((total_sections as f64 + 1.0) / (sections_containing as f64 + 1.0)).ln() + 1.0
}

/// Rank sections for `query` with default parameters, keeping at most
/// `limit` results.
pub fn rank(index: &Index, query: &str, limit: usize) -> Result<Vec<RankedSection>> {
    rank_with(index, &RankRequest::new(query).limit(limit))
}

/// Rank sections for a fully specified [`RankRequest`].
///
/// Fails with [`Error::EmptyQuery`] when the query normalizes to nothing.
/// Unknown terms contribute nothing; an empty index yields no results.
pub fn rank_with(index: &Index, req: &RankRequest<'_>) -> Result<Vec<RankedSection>> {
    let terms = normalize_query(req.query);
    if terms.is_empty() {
        return Err(Error::EmptyQuery);
    }
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let total = index.section_count();
    let boost = req.params.heading_boost;
    let mut scores: HashMap<SectionId, f64> = HashMap::new();

    for term in &terms {
        let postings = index.postings(term);
        let term_idf = idf(total, postings.len());
        for posting in postings {
            *scores.entry(posting.section).or_insert(0.0) += posting.frequency as f64 * term_idf;
        }
        for &section in index.heading_sections(term) {
            *scores.entry(section).or_insert(0.0) += boost;
        }
    }

    let mut ranked: Vec<(SectionId, f64)> = scores
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| compare(index, *a, *b));
    if let Some(limit) = req.limit {
        ranked.truncate(limit);
    }

    Ok(ranked
        .into_iter()
        .map(|(section_id, score)| RankedSection {
            section_id,
            score,
            explain: req
                .explain
                .then(|| explain_section(index, &terms, section_id, boost)),
        })
        .collect())
}

fn compare(index: &Index, a: (SectionId, f64), b: (SectionId, f64)) -> Ordering {
    let depth = |id: SectionId| index.section(id).map_or(0, |s| s.heading_path.len());
    b.1.total_cmp(&a.1)
        .then_with(|| depth(a.0).cmp(&depth(b.0)))
        .then_with(|| a.0.cmp(&b.0))
}

fn explain_section(
    index: &Index,
    terms: &[String],
    section_id: SectionId,
    boost: f64,
) -> ScoreExplanation {
    let total = index.section_count();
    let in_heading = |term: &str| {
        index
            .section(section_id)
            .is_some_and(|s| s.has_heading_term(term))
    };
    ScoreExplanation {
        terms: terms
            .iter()
            .map(|term| TermContribution {
                term: term.clone(),
                term_frequency: index.term_frequency(term, section_id),
                idf: idf(total, index.document_frequency(term)),
                heading_boost: if in_heading(term) { boost } else { 0.0 },
            })
            .collect(),
    }
}
