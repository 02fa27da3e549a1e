//! Markdown crawl reports
//!
//! Renders a `CrawlReport` as a human-readable summary: totals, the method
//! mix, every fetched page and every failure.

use crate::crawler::CrawlReport;
use crate::output::OutputResult;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Pages listed before the table is truncated
const MAX_PAGE_ROWS: usize = 200;

/// Writes `report` as markdown to `output_path`
pub fn write_crawl_report(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_crawl_report(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

pub fn format_crawl_report(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Harvest Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", report.seed));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        report.elapsed_ms as f64 / 1000.0
    ));
    let ending = if report.stopped {
        "stopped"
    } else if report.frontier_exhausted {
        "frontier exhausted"
    } else {
        "page limit reached"
    };
    md.push_str(&format!("- **Ended**: {}\n\n", ending));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Visited**: {}\n", report.visited));
    md.push_str(&format!("- **Fetched**: {}\n", report.succeeded()));
    md.push_str(&format!("- **Failed**: {}\n", report.failed()));
    let warned = report.results.iter().filter(|r| !r.is_complete()).count();
    md.push_str(&format!("- **Partial Extractions**: {}\n", warned));
    let from_cache = report
        .results
        .iter()
        .filter(|r| r.performance.from_cache)
        .count();
    md.push_str(&format!("- **Served From Cache**: {}\n\n", from_cache));

    if !report.results.is_empty() {
        let mut methods: BTreeMap<&str, usize> = BTreeMap::new();
        for result in &report.results {
            *methods.entry(result.method.as_str()).or_default() += 1;
        }

        md.push_str("## Fetch Methods\n\n");
        md.push_str("| Method | Pages |\n");
        md.push_str("|--------|-------|\n");
        for (method, count) in methods {
            md.push_str(&format!("| {} | {} |\n", method, count));
        }
        md.push('\n');

        md.push_str("## Pages\n\n");
        md.push_str("| URL | Method | Status | Title |\n");
        md.push_str("|-----|--------|--------|-------|\n");
        for result in report.results.iter().take(MAX_PAGE_ROWS) {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                result.url,
                result.method,
                result
                    .status_code
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
                escape_cell(result.title().unwrap_or("")),
            ));
        }
        if report.results.len() > MAX_PAGE_ROWS {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.results.len() - MAX_PAGE_ROWS
            ));
        }
        md.push('\n');
    }

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Kind | Attempts | Message |\n");
        md.push_str("|-----|------|----------|---------|\n");
        for (url, error) in &report.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                url,
                error.kind,
                error.attempts,
                escape_cell(&error.message)
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
