//! `index query` and `index rank` commands.
//!
//! Both load a snapshot file, run the core ranker/retriever with the
//! configured [`RankParams`](refdex_core::RankParams) and print either a
//! human-readable listing or JSON. The JSON response types here are also
//! the bodies returned by the HTTP service.

use anyhow::Result;
use refdex_core::models::{RankedSection, Retrieval, ScoreExplanation, SectionExcerpt};
use refdex_core::{rank_with, retrieve_with, Index, RankRequest, RetrievalRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::persist::read_snapshot;

/// Body of a budgeted retrieval response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResponse {
    pub results: Vec<QueryResultItem>,
    pub used_tokens: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResultItem {
    pub heading_path: Vec<String>,
    pub text: String,
    pub score: f64,
    pub document: String,
    pub section_id: usize,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

impl From<SectionExcerpt> for QueryResultItem {
    fn from(e: SectionExcerpt) -> Self {
        Self {
            heading_path: e.heading_path,
            text: e.text,
            score: e.score,
            document: e.document,
            section_id: e.section_id,
            tokens: e.token_count,
            explain: None,
        }
    }
}

impl From<Retrieval> for QueryResponse {
    fn from(r: Retrieval) -> Self {
        Self {
            results: r.results.into_iter().map(QueryResultItem::from).collect(),
            used_tokens: r.used_tokens,
        }
    }
}

/// Body of a ranking response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankResponse {
    pub results: Vec<RankResultItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankResultItem {
    pub section_id: usize,
    pub heading_path: Vec<String>,
    pub document: String,
    pub score: f64,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

impl RankResponse {
    pub fn from_ranked(index: &Index, ranked: Vec<RankedSection>) -> Self {
        let results = ranked
            .into_iter()
            .filter_map(|r| {
                let excerpt = index.excerpt(r.section_id, r.score)?;
                Some(RankResultItem {
                    section_id: r.section_id,
                    heading_path: excerpt.heading_path,
                    document: excerpt.document,
                    score: r.score,
                    tokens: excerpt.token_count,
                    explain: r.explain,
                })
            })
            .collect();
        Self { results }
    }
}

/// Budgeted retrieval against an index with the configured ranking params.
pub fn query_index(
    index: &Index,
    config: &Config,
    query: &str,
    budget: usize,
    explain: bool,
) -> refdex_core::Result<QueryResponse> {
    let params = config.ranking.params();
    let retrieval = retrieve_with(index, &RetrievalRequest::new(query, budget).params(params))?;
    let mut response = QueryResponse::from(retrieval);

    if explain && !response.results.is_empty() {
        let ranked = rank_with(index, &RankRequest::new(query).params(params).explain(true))?;
        let mut explanations: HashMap<usize, ScoreExplanation> = ranked
            .into_iter()
            .filter_map(|r| Some((r.section_id, r.explain?)))
            .collect();
        for item in &mut response.results {
            item.explain = explanations.remove(&item.section_id);
        }
    }

    Ok(response)
}

/// Rank an index with the configured ranking params.
pub fn rank_index(
    index: &Index,
    config: &Config,
    query: &str,
    limit: Option<usize>,
    explain: bool,
) -> refdex_core::Result<RankResponse> {
    let limit = limit.unwrap_or(config.ranking.default_limit);
    let request = RankRequest::new(query)
        .limit(limit)
        .params(config.ranking.params())
        .explain(explain);
    let ranked = rank_with(index, &request)?;
    Ok(RankResponse::from_ranked(index, ranked))
}

/// Run `index query`.
pub fn run_query(
    config: &Config,
    index_path: &Path,
    query: &str,
    budget: Option<usize>,
    json: bool,
    explain: bool,
) -> Result<()> {
    let snapshot = read_snapshot(index_path)?;
    let budget = budget.unwrap_or(config.retrieval.default_budget);
    let response = query_index(&snapshot.index, config, query, budget, explain)?;
    tracing::info!(
        query,
        budget,
        results = response.results.len(),
        used_tokens = response.used_tokens,
        "query answered"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, item) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            item.score,
            item.document,
            display_path(&item.heading_path)
        );
        println!("    tokens: {}", item.tokens);
        if let Some(explain) = &item.explain {
            print_explain(explain);
        }
        println!();
        for line in item.text.lines() {
            println!("    {}", line);
        }
        println!();
    }
    println!("used {} / {} tokens", response.used_tokens, budget);

    Ok(())
}

/// Run `index rank`.
pub fn run_rank(
    config: &Config,
    index_path: &Path,
    query: &str,
    limit: Option<usize>,
    explain: bool,
) -> Result<()> {
    let snapshot = read_snapshot(index_path)?;
    let response = rank_index(&snapshot.index, config, query, limit, explain)?;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, item) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            item.score,
            item.document,
            display_path(&item.heading_path)
        );
        println!("    section: {}  tokens: {}", item.section_id, item.tokens);
        if let Some(explain) = &item.explain {
            print_explain(explain);
        }
    }

    Ok(())
}

fn display_path(heading_path: &[String]) -> String {
    if heading_path.is_empty() {
        "(untitled)".to_string()
    } else {
        heading_path.join(" > ")
    }
}

fn print_explain(explain: &ScoreExplanation) {
    for term in &explain.terms {
        println!(
            "    {}: tf={} idf={:.3} boost={:.2}",
            term.term, term.term_frequency, term.idf, term.heading_boost
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdex_core::{build_index, Error as CoreError};

    fn index() -> Index {
        build_index([
            (
                "istio/security.md",
                "# Security\n\n## Certificate Rotation\n\nIstio rotates mtls certificates daily.\n\n## Peer Authentication\n\nEnable mtls in strict mode.",
            ),
            ("c/memory.md", "# Memory\n\nAlways free what you malloc."),
        ])
        .index
    }

    #[test]
    fn test_query_index_shape() {
        let index = index();
        let response = query_index(&index, &Config::default(), "rotation", 100, false).unwrap();
        assert_eq!(response.results.len(), 1);
        let item = &response.results[0];
        assert_eq!(item.heading_path, vec!["Security", "Certificate Rotation"]);
        assert_eq!(item.document, "istio/security.md");
        assert_eq!(response.used_tokens, item.tokens);
        assert!(item.explain.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["results"][0]["heading_path"].is_array());
        assert!(json["results"][0]["score"].is_f64());
        assert!(json["results"][0].get("explain").is_none());
    }

    #[test]
    fn test_query_index_explain() {
        let index = index();
        let response = query_index(&index, &Config::default(), "mtls rotation", 100, true).unwrap();
        let top = &response.results[0];
        let explain = top.explain.as_ref().unwrap();
        assert!(explain.terms.iter().any(|t| t.term == "rotation"));
    }

    #[test]
    fn test_query_index_errors() {
        let index = index();
        assert_eq!(
            query_index(&index, &Config::default(), "  !! ", 100, false).unwrap_err(),
            CoreError::EmptyQuery
        );
        assert!(matches!(
            query_index(&index, &Config::default(), "mtls", 1, false).unwrap_err(),
            CoreError::BudgetTooSmall { budget: 1, .. }
        ));
    }

    #[test]
    fn test_rank_index_default_limit() {
        let index = index();
        let mut config = Config::default();
        config.ranking.default_limit = 1;
        let response = rank_index(&index, &config, "mtls", None, false).unwrap();
        assert_eq!(response.results.len(), 1);
        let response = rank_index(&index, &config, "mtls", Some(5), false).unwrap();
        assert_eq!(response.results.len(), 2);
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(&[]), "(untitled)");
        assert_eq!(
            display_path(&["Traffic".to_string(), "Retries".to_string()]),
            "Traffic > Retries"
        );
    }
}
