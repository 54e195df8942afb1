//! Markdown crawl summary at `reports/crawl_summary.md`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autopom_core_types::CrawlSchema;
use tokio::fs;

pub const REPORT_DIR: &str = "reports";
pub const REPORT_FILE: &str = "crawl_summary.md";

pub fn render_summary(schema: &CrawlSchema) -> String {
    let meta = &schema.metadata;
    let counters = &meta.counters;
    let confidence = schema
        .average_confidence()
        .map(|c| format!("{c:.2}"))
        .unwrap_or_else(|| "n/a".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "# AutoPOM Crawl Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Base URL: {}", meta.base_url);
    let _ = writeln!(out, "- Session: {}", meta.session_id);
    let _ = writeln!(out, "- End reason: {}", meta.end_reason.as_str());
    if meta.truncated {
        let _ = writeln!(out, "- Partial map: yes");
    }
    let _ = writeln!(out, "- Pages modeled: {}", schema.states.len());
    let _ = writeln!(out, "- Elements mapped: {}", schema.element_count());
    let _ = writeln!(out, "- Unverifiable elements: {}", schema.unverifiable_count());
    let _ = writeln!(out, "- Average selector confidence: {confidence}");
    let _ = writeln!(out, "- Actions executed: {}", counters.actions_executed);
    let _ = writeln!(out, "- Actions failed: {}", counters.actions_failed);
    let _ = writeln!(out, "- Guardrail rejections: {}", counters.guardrail_rejections);
    let _ = writeln!(out, "- Backtracks: {}", counters.backtracks);

    if !schema.states.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Pages");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Page | Route | Depth | Elements | Unverifiable | Actions |");
        let _ = writeln!(out, "|------|-------|-------|----------|--------------|---------|");
        let mut entries: Vec<_> = schema.states.values().collect();
        entries.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.page_name.cmp(&b.page_name)));
        for entry in entries {
            let actions: Vec<&str> = entry.actions.iter().map(|a| a.name.as_str()).collect();
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                entry.page_name,
                entry.route,
                entry.depth,
                entry.elements.len(),
                entry.unverifiable.len(),
                if actions.is_empty() { "-".to_string() } else { actions.join(", ") },
            );
        }
    }
    out
}

pub async fn write_summary(schema: &CrawlSchema, output_dir: &Path) -> Result<PathBuf> {
    let dir = output_dir.join(REPORT_DIR);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(REPORT_FILE);
    fs::write(&path, render_summary(schema))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
