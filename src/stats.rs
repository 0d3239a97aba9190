//! Index snapshot statistics.
//!
//! `index stats` summarizes what a snapshot holds: build metadata, corpus
//! size, section token range and a per-document breakdown, plus any
//! documents the build skipped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use refdex_core::Snapshot;
use std::path::Path;

use crate::persist::read_snapshot;
use crate::progress::format_number;

/// Run the stats command: load the snapshot and print a summary.
pub fn run_stats(index_path: &Path) -> Result<()> {
    let snapshot = read_snapshot(index_path)?;
    let file_size = std::fs::metadata(index_path).map(|m| m.len()).unwrap_or(0);
    print!("{}", render_stats(&snapshot, index_path, file_size, Utc::now()));
    Ok(())
}

fn render_stats(snapshot: &Snapshot, index_path: &Path, file_size: u64, now: DateTime<Utc>) -> String {
    let index = &snapshot.index;
    let stats = index.stats();
    let mut out = String::new();

    out.push_str("refdex index stats\n");
    out.push_str("==================\n\n");
    out.push_str(&format!("  Index:       {}\n", index_path.display()));
    out.push_str(&format!("  Size:        {}\n", format_bytes(file_size)));
    out.push_str(&format!("  Source:      {}\n", snapshot.source_root));
    out.push_str(&format!("  Build id:    {}\n", snapshot.build_id));
    out.push_str(&format!(
        "  Built:       {}\n",
        format_relative(snapshot.built_at, now)
    ));
    out.push('\n');
    out.push_str(&format!("  Documents:   {}\n", format_number(stats.documents as u64)));
    out.push_str(&format!("  Sections:    {}\n", format_number(stats.sections as u64)));
    out.push_str(&format!("  Terms:       {}\n", format_number(stats.terms as u64)));
    out.push_str(&format!("  Tokens:      {}\n", format_number(stats.total_tokens as u64)));
    if let (Some(min), Some(max)) = (stats.smallest_section_tokens, stats.largest_section_tokens) {
        out.push_str(&format!("  Section:     {} - {} tokens\n", min, max));
    }

    if !index.documents().is_empty() {
        out.push_str("\n  By document:\n");
        out.push_str(&format!("  {:<48} {:>8} {:>8}\n", "DOCUMENT", "SECTIONS", "TOKENS"));
        out.push_str(&format!("  {}\n", "-".repeat(66)));
        for doc in index.documents() {
            let tokens: usize = doc
                .section_ids()
                .filter_map(|id| index.section(id))
                .map(|s| s.token_count)
                .sum();
            out.push_str(&format!(
                "  {:<48} {:>8} {:>8}\n",
                doc.path, doc.section_count, tokens
            ));
        }
    }

    if !snapshot.skipped.is_empty() {
        out.push_str(&format!("\n  Skipped ({}):\n", snapshot.skipped.len()));
        for skipped in &snapshot.skipped {
            out.push_str(&format!("    {}:{}  {}\n", skipped.path, skipped.line, skipped.message));
        }
    }

    out.push('\n');
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();
    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
