//! Markdown segmenter and tokenizer.
//!
//! [`segment`] splits a Markdown document into heading-delimited
//! [`SectionDraft`]s, and [`tokens`] turns a section body into a lazy
//! stream of normalized [`Token`]s.
//!
//! # Segmentation rules
//!
//! 1. ATX headings (`#` … `######`, at most three leading spaces) open a
//!    new section. A heading at level *L* closes every open heading at
//!    level ≥ *L*; the titles still open form the section's heading path.
//! 2. Fenced code blocks (```` ``` ```` or `~~~`, three or more) are opaque:
//!    a `#` line inside a fence is never a heading.
//! 3. Text before the first heading becomes a section with an empty
//!    heading path. A document without headings is a single section.
//! 4. Headings with a blank body produce no section of their own.
//! 5. Sibling headings with the same title get an ordinal suffix so that
//!    heading paths stay unique within a document: `Example`, `Example (2)`.
//! 6. A leading YAML front-matter block is skipped.
//!
//! # Normalization
//!
//! Everything is lowercased. Outside fences, punctuation separates words
//! and is dropped. Inside fences, words are whitespace-delimited and keep
//! their punctuation (`x.yaml`, `-f`).

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Token, TokenKind};

/// A section as produced by the segmenter, before it receives an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDraft {
    pub heading_path: Vec<String>,
    pub text: String,
    /// 1-based line of the section's heading (first line for a preamble).
    pub line: usize,
}

/// Split `text` into heading-delimited sections.
///
/// `path` is only used to label a [`Error::MalformedDocument`].
pub fn segment(path: &str, text: &str) -> Result<Vec<SectionDraft>> {
    let lines: Vec<&str> = text.lines().collect();
    let start = front_matter_end(&lines);

    let mut drafts = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut seen_paths: HashSet<Vec<String>> = HashSet::new();
    let mut fence: Option<Fence> = None;
    let mut saw_heading = false;

    let mut current_path: Vec<String> = Vec::new();
    let mut current_line = start + 1;
    let mut body: Vec<&str> = Vec::new();

    for (idx, &line) in lines.iter().enumerate().skip(start) {
        let line_no = idx + 1;

        if let Some(open) = fence {
            if open.closes(line) {
                fence = None;
            }
            body.push(line);
            continue;
        }

        if let Some((open, _info)) = Fence::open(line, line_no) {
            fence = Some(open);
            body.push(line);
            continue;
        }

        if let Some((level, title)) = parse_heading(line) {
            flush(&mut drafts, &current_path, current_line, &body);
            body.clear();
            saw_heading = true;

            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            let parent: Vec<String> = stack.iter().map(|(_, t)| t.clone()).collect();
            let title = unique_title(&mut seen_paths, &parent, title);
            stack.push((level, title));

            current_path = stack.iter().map(|(_, t)| t.clone()).collect();
            current_line = line_no;
            continue;
        }

        body.push(line);
    }

    if let Some(open) = fence {
        return Err(Error::MalformedDocument {
            path: path.to_string(),
            line: open.line,
        });
    }

    if !saw_heading {
        return Ok(vec![SectionDraft {
            heading_path: Vec::new(),
            text: join_body(&body),
            line: start + 1,
        }]);
    }

    flush(&mut drafts, &current_path, current_line, &body);
    Ok(drafts)
}

/// Lazily tokenize a section body.
///
/// The returned iterator is finite and restartable: cloning it, or calling
/// `tokens` again on the same text, yields the same sequence.
pub fn tokens(text: &str) -> Tokens<'_> {
    Tokens {
        lines: text.lines(),
        fence: None,
        line_words: Vec::new().into_iter(),
        line_kind: TokenKind::Prose,
        position: 0,
    }
}

/// Number of normalized tokens in `text`.
pub fn token_count(text: &str) -> usize {
    tokens(text).count()
}

/// Normalize a free-text query into distinct terms, in first-seen order.
///
/// Queries follow the prose rules, so lookups are case and punctuation
/// insensitive.
pub fn normalize_query(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    prose_words(query)
        .into_iter()
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

/// Normalized terms of a heading path, sorted and deduplicated.
pub fn heading_terms(heading_path: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = heading_path
        .iter()
        .flat_map(|title| prose_words(title))
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Streaming tokenizer over a section body. See [`tokens`].
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    lines: std::str::Lines<'a>,
    fence: Option<Fence>,
    line_words: std::vec::IntoIter<String>,
    line_kind: TokenKind,
    position: usize,
}

impl Tokens<'_> {
    fn load_line(&mut self, line: &str) {
        let (words, kind) = match self.fence {
            Some(open) if open.closes(line) => {
                self.fence = None;
                (Vec::new(), TokenKind::Code)
            }
            Some(_) => (code_words(line), TokenKind::Code),
            None => match Fence::open(line, 0) {
                Some((open, info)) => {
                    self.fence = Some(open);
                    (code_words(info), TokenKind::Code)
                }
                None => (prose_words(line), TokenKind::Prose),
            },
        };
        self.line_words = words.into_iter();
        self.line_kind = kind;
    }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(term) = self.line_words.next() {
                let token = Token {
                    term,
                    position: self.position,
                    kind: self.line_kind,
                };
                self.position += 1;
                return Some(token);
            }
            let line = self.lines.next()?;
            self.load_line(line);
        }
    }
}

/// An open code fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
    line: usize,
}

impl Fence {
    /// Recognize an opening fence; returns it with the info string.
    fn open(line: &str, line_no: usize) -> Option<(Fence, &str)> {
        let trimmed = line.trim_start();
        let marker = trimmed.chars().next()?;
        if marker != '`' && marker != '~' {
            return None;
        }
        let len = trimmed.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }
        // Marker characters are ASCII, so `len` is also a byte offset.
        let info = &trimmed[len..];
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some((
            Fence {
                marker,
                len,
                line: line_no,
            },
            info,
        ))
    }

    fn closes(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|c| *c == self.marker).count();
        run >= self.len && run == trimmed.len()
    }
}

/// Parse an ATX heading into `(level, title)`.
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let level = rest.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.is_empty() && !after.starts_with(char::is_whitespace) {
        return None;
    }

    let mut title = after.trim();
    // Optional closing sequence: `## Title ##`.
    let without_hashes = title.trim_end_matches('#');
    if without_hashes.is_empty() {
        title = without_hashes;
    } else if without_hashes.len() < title.len() && without_hashes.ends_with(char::is_whitespace)
    {
        title = without_hashes.trim_end();
    }
    Some((level, title.to_string()))
}

/// Pick a title whose full path has not been used yet in this document.
fn unique_title(seen: &mut HashSet<Vec<String>>, parent: &[String], title: String) -> String {
    let mut candidate = title.clone();
    let mut ordinal = 1;
    loop {
        let mut path = parent.to_vec();
        path.push(candidate.clone());
        if seen.insert(path) {
            return candidate;
        }
        ordinal += 1;
        candidate = format!("{} ({})", title, ordinal);
    }
}

fn flush(drafts: &mut Vec<SectionDraft>, path: &[String], line: usize, body: &[&str]) {
    let text = join_body(body);
    if text.is_empty() {
        return;
    }
    drafts.push(SectionDraft {
        heading_path: path.to_vec(),
        text,
        line,
    });
}

/// Join body lines, dropping leading and trailing blank lines.
fn join_body(lines: &[&str]) -> String {
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Index of the first line after a leading `---` front-matter block.
///
/// The block must read as YAML: no ATX headings, and its first non-blank
/// line a `key:` entry. Otherwise the opening `---` is a thematic break.
fn front_matter_end(lines: &[&str]) -> usize {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return 0;
    }
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| matches!(l.trim_end(), "---" | "..."))
        .map(|pos| pos + 1)
    else {
        return 0;
    };

    let block = &lines[1..close];
    let no_headings = block.iter().all(|l| parse_heading(l).is_none());
    let keyed = block
        .iter()
        .find(|l| !l.trim().is_empty())
        .map_or(true, |l| is_yaml_key(l));
    if no_headings && keyed {
        close + 1
    } else {
        0
    }
}

fn is_yaml_key(line: &str) -> bool {
    line.split_once(':').is_some_and(|(key, _)| {
        !key.is_empty()
            && !key.starts_with(char::is_whitespace)
            && key
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' ' | '"' | '\''))
    })
}

fn prose_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn code_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(text: &str) -> Vec<String> {
        tokens(text).map(|t| t.term).collect()
    }

    #[test]
    fn test_no_headings_single_section() {
        let sections = segment("notes.md", "Just some notes.\n\nAnd more.").unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].heading_path.is_empty());
        assert_eq!(sections[0].text, "Just some notes.\n\nAnd more.");
    }

    #[test]
    fn test_empty_document_single_empty_section() {
        let sections = segment("empty.md", "").unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].heading_path.is_empty());
        assert!(sections[0].text.is_empty());
    }

    #[test]
    fn test_nested_heading_paths() {
        let text = "# Traffic Management\n\nIntro.\n\n## Circuit Breaking\n\nLimits.\n\n### Outlier Detection\n\nEjects hosts.\n\n## Retries\n\nRetry budget.";
        let sections = segment("istio.md", text).unwrap();
        let paths: Vec<Vec<String>> = sections.iter().map(|s| s.heading_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                vec!["Traffic Management".to_string()],
                vec!["Traffic Management".into(), "Circuit Breaking".into()],
                vec![
                    "Traffic Management".into(),
                    "Circuit Breaking".into(),
                    "Outlier Detection".into()
                ],
                vec!["Traffic Management".into(), "Retries".into()],
            ]
        );
        assert_eq!(sections[2].text, "Ejects hosts.");
        assert_eq!(sections[2].line, 9);
    }

    #[test]
    fn test_heading_inside_fence_is_not_split() {
        let text = "# Build\n\n```sh\n# not a heading\nmake all\n```\n\nDone.";
        let sections = segment("c.md", text).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("# not a heading"));
        assert!(sections[0].text.ends_with("Done."));
    }

    #[test]
    fn test_unbalanced_fence_is_malformed() {
        let text = "# Setup\n\n```yaml\nkind: Gateway\n";
        let err = segment("istio/gw.md", text).unwrap_err();
        assert_eq!(
            err,
            Error::MalformedDocument {
                path: "istio/gw.md".to_string(),
                line: 3
            }
        );
    }

    #[test]
    fn test_tilde_fence_needs_matching_marker() {
        let text = "~~~~\ncode\n```\nstill code\n~~~~\nafter";
        let sections = segment("t.md", text).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.ends_with("after"));
    }

    #[test]
    fn test_inline_triple_backticks_do_not_open_fence() {
        let sections = segment("t.md", "```code``` inline.\n# Next\nbody").unwrap();
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn test_preamble_and_blank_heading_bodies() {
        let text = "Preamble text.\n\n# Title\n\n## Section\n\nBody.";
        let sections = segment("d.md", text).unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections[0].heading_path.is_empty());
        assert_eq!(sections[0].text, "Preamble text.");
        assert_eq!(sections[1].heading_path, vec!["Title", "Section"]);
    }

    #[test]
    fn test_duplicate_headings_disambiguated() {
        let text = "# Guide\n## Example\nOne\n### Details\nA\n## Example\nTwo\n### Details\nB";
        let sections = segment("g.md", text).unwrap();
        let paths: Vec<String> = sections.iter().map(|s| s.heading_path.join(" > ")).collect();
        assert_eq!(
            paths,
            vec![
                "Guide > Example",
                "Guide > Example > Details",
                "Guide > Example (2)",
                "Guide > Example (2) > Details",
            ]
        );
    }

    #[test]
    fn test_front_matter_skipped() {
        let text = "---\ntitle: Migrations\n---\n# Migrations\n\nRun them in order.";
        let sections = segment("m.md", text).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading_path, vec!["Migrations"]);
        assert!(!sections[0].text.contains("title:"));
    }

    #[test]
    fn test_leading_thematic_break_is_not_front_matter() {
        let text = "---\n# Title\n\nBody\n\n---\n\nMore";
        let sections = segment("rules.md", text).unwrap();
        let title = sections
            .iter()
            .find(|s| s.heading_path == vec!["Title"])
            .unwrap();
        assert!(title.text.contains("Body"));
        assert!(title.text.contains("More"));

        let prose = "---\nJust a rule, then prose.\n---\n# Next\n\nbody";
        let sections = segment("prose.md", prose).unwrap();
        assert!(sections[0].text.contains("Just a rule"));
    }

    #[test]
    fn test_heading_closing_hashes_and_indent() {
        assert_eq!(parse_heading("## Pointers ##"), Some((2, "Pointers".to_string())));
        assert_eq!(parse_heading("   # Indented"), Some((1, "Indented".to_string())));
        assert_eq!(parse_heading("    # Code"), None);
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("####### seven"), None);
        assert_eq!(parse_heading("# C#"), Some((1, "C#".to_string())));
    }

    #[test]
    fn test_prose_normalization() {
        assert_eq!(
            terms("Circuit-Breaking: mTLS, rotation!"),
            vec!["circuit", "breaking", "mtls", "rotation"]
        );
    }

    #[test]
    fn test_code_keeps_punctuation() {
        let toks: Vec<Token> = tokens("Apply it:\n\n```bash\nkubectl apply -f x.yaml\n```").collect();
        let code: Vec<&str> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Code)
            .map(|t| t.term.as_str())
            .collect();
        assert_eq!(code, vec!["bash", "kubectl", "apply", "-f", "x.yaml"]);
        let positions: Vec<usize> = toks.iter().map(|t| t.position).collect();
        assert_eq!(positions, (0..toks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_tokens_deterministic_and_restartable() {
        let text = "Pointers and arrays.\n\n```c\nint *p = &a[0];\n```\nDecay rules.";
        let stream = tokens(text);
        let first: Vec<Token> = stream.clone().collect();
        let second: Vec<Token> = stream.collect();
        let third: Vec<Token> = tokens(text).collect();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(token_count(text), first.len());
    }

    #[test]
    fn test_normalize_query_dedups() {
        assert_eq!(
            normalize_query("Istio mTLS  rotation, istio!"),
            vec!["istio", "mtls", "rotation"]
        );
        assert!(normalize_query("  ?!  ").is_empty());
    }

    #[test]
    fn test_heading_terms_sorted() {
        let path = vec!["Security".to_string(), "Certificate Rotation".to_string()];
        assert_eq!(heading_terms(&path), vec!["certificate", "rotation", "security"]);
    }
}
