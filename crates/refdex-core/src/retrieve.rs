//! Budgeted retrieval: the best sections that fit a token budget.
//!
//! Sections are taken greedily in rank order. A section that would overflow
//! the remaining budget is skipped whole, never truncated, and the walk
//! continues with the next one, so a small lower-ranked section can still
//! make it in after a large one was passed over.

use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::Retrieval;
use crate::rank::{rank_with, RankParams, RankRequest};

/// Bundles all inputs for a single retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    /// Maximum cumulative token count of the returned sections.
    pub max_tokens: usize,
    pub params: RankParams,
}

impl<'a> RetrievalRequest<'a> {
    pub fn new(query: &'a str, max_tokens: usize) -> Self {
        Self {
            query,
            max_tokens,
            params: RankParams::default(),
        }
    }

    pub fn params(mut self, params: RankParams) -> Self {
        self.params = params;
        self
    }
}

/// Retrieve sections for `query` within `max_tokens`, default parameters.
pub fn retrieve(index: &Index, query: &str, max_tokens: usize) -> Result<Retrieval> {
    retrieve_with(index, &RetrievalRequest::new(query, max_tokens))
}

/// Retrieve sections for a fully specified [`RetrievalRequest`].
///
/// # Errors
///
/// - [`Error::EmptyQuery`] if the query has no searchable terms.
/// - [`Error::BudgetTooSmall`] if even the smallest section in the corpus
///   exceeds the budget. When some section could fit but none of the
///   ranked ones does, the result is simply empty.
pub fn retrieve_with(index: &Index, req: &RetrievalRequest<'_>) -> Result<Retrieval> {
    let ranked = rank_with(index, &RankRequest::new(req.query).params(req.params))?;

    if let Some(minimum) = index.smallest_section_tokens() {
        if minimum > req.max_tokens {
            return Err(Error::BudgetTooSmall {
                budget: req.max_tokens,
                minimum,
            });
        }
    }

    let mut retrieval = Retrieval::empty();
    let mut remaining = req.max_tokens;
    for hit in ranked {
        let Some(excerpt) = index.excerpt(hit.section_id, hit.score) else {
            continue;
        };
        if excerpt.token_count > remaining {
            continue;
        }
        remaining -= excerpt.token_count;
        retrieval.used_tokens += excerpt.token_count;
        retrieval.results.push(excerpt);
    }
    Ok(retrieval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;

    fn long_and_short() -> Index {
        let long_body = vec!["envoy"; 50].join(" ");
        let doc = format!(
            "# Proxies\n\n## Sidecar Internals\n\n{}\n\n## Summary\n\nThe envoy proxy runs right beside each pod.",
            long_body
        );
        build_index([("istio/proxies.md", doc)]).index
    }

    #[test]
    fn test_skips_oversized_top_section() {
        let index = long_and_short();
        assert_eq!(index.section(0).unwrap().token_count, 50);
        assert_eq!(index.section(1).unwrap().token_count, 8);

        let retrieval = retrieve(&index, "envoy", 10).unwrap();
        assert_eq!(retrieval.results.len(), 1);
        let only = &retrieval.results[0];
        assert_eq!(only.heading_path, vec!["Proxies", "Summary"]);
        assert_eq!(only.text, "The envoy proxy runs right beside each pod.");
        assert_eq!(retrieval.used_tokens, 8);
    }

    #[test]
    fn test_takes_everything_that_fits_in_rank_order() {
        let index = long_and_short();
        let retrieval = retrieve(&index, "envoy", 100).unwrap();
        let ids: Vec<usize> = retrieval.results.iter().map(|r| r.section_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(retrieval.used_tokens, 58);
        assert!(retrieval.results[0].score > retrieval.results[1].score);
    }

    #[test]
    fn test_budget_too_small() {
        let index = long_and_short();
        let err = retrieve(&index, "envoy", 7).unwrap_err();
        assert_eq!(
            err,
            Error::BudgetTooSmall {
                budget: 7,
                minimum: 8
            }
        );
        assert_eq!(err.minimum_budget(), Some(8));
    }

    #[test]
    fn test_budget_too_small_ignores_tokenless_documents() {
        let long_body = vec!["envoy"; 50].join(" ");
        let index = build_index([
            ("istio/proxies.md", format!("# Proxies\n\n{}", long_body)),
            ("empty.md", String::new()),
            ("rule.md", "# Sep\n\n---".to_string()),
        ])
        .index;
        assert_eq!(
            retrieve(&index, "envoy", 5),
            Err(Error::BudgetTooSmall {
                budget: 5,
                minimum: 50
            })
        );
    }

    #[test]
    fn test_no_ranked_section_fits_is_empty_not_error() {
        let long_body = vec!["sidecar"; 30].join(" ");
        let doc = format!("# Mesh\n\n## Sidecars\n\n{}\n\n## Glossary\n\nMesh terms.", long_body);
        let index = build_index([("istio/mesh.md", doc)]).index;
        let retrieval = retrieve(&index, "sidecar", 5).unwrap();
        assert!(retrieval.is_empty());
        assert_eq!(retrieval.used_tokens, 0);
    }

    #[test]
    fn test_empty_query_checked_before_budget() {
        let index = long_and_short();
        assert_eq!(retrieve(&index, "  ", 1), Err(Error::EmptyQuery));
    }

    #[test]
    fn test_empty_corpus_returns_empty() {
        let index = Index::default();
        let retrieval = retrieve(&index, "anything", 0).unwrap();
        assert!(retrieval.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let index = long_and_short();
        let first = retrieve(&index, "envoy proxy", 20).unwrap();
        for _ in 0..5 {
            assert_eq!(retrieve(&index, "envoy proxy", 20).unwrap(), first);
        }
    }
}
