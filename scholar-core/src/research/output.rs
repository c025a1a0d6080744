//! Report export: a Markdown document and a JSON rendition.
//!
//! Both renderings are pure functions of the `Report`, so exporting the same
//! report twice yields identical bytes.

use super::report::Report;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Longest file stem derived from a topic.
const MAX_STEM_CHARS: usize = 50;

/// Paths written by [`write_exports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

/// Render the report as Markdown.
pub fn to_text_document(report: &Report) -> String {
    let mut out = format!("# Research Report: {}\n\n", report.topic);
    let _ = writeln!(
        out,
        "**Generated:** {} | **Model:** {} | **Style:** {} | **Tone:** {} | **Sources analyzed:** {}\n",
        report.generated_at.to_rfc3339(),
        report.model_id,
        report.style,
        report.tone,
        report.sources_analyzed,
    );

    out.push_str("## TL;DR\n\n");
    out.push_str(&report.summary);
    out.push_str("\n\n");

    // Citations are numbered by first appearance across all findings.
    let mut numbered: Vec<&str> = Vec::new();
    out.push_str("## Key Findings\n\n");
    if report.findings.is_empty() {
        out.push_str("_No findings reported._\n");
    }
    for (i, finding) in report.findings.iter().enumerate() {
        let links: Vec<String> = finding
            .citations
            .iter()
            .map(|url| {
                let n = match numbered.iter().position(|u| *u == url.as_str()) {
                    Some(pos) => pos + 1,
                    None => {
                        numbered.push(url);
                        numbered.len()
                    }
                };
                format!("[{n}]({url})")
            })
            .collect();
        let _ = writeln!(out, "{}. {} {}", i + 1, finding.statement, links.join(" "));
    }
    out.push('\n');

    out.push_str("## Conflicts & Caveats\n\n");
    if report.caveats.trim().is_empty() {
        out.push_str("_None noted._\n");
    } else {
        out.push_str(report.caveats.trim());
        out.push('\n');
    }
    out.push('\n');

    out.push_str("## Top Sources\n\n");
    if report.top_sources.is_empty() {
        out.push_str("_No top sources selected._\n");
    }
    for (i, top) in report.top_sources.iter().enumerate() {
        let source = &top.source;
        let title = if source.title.is_empty() {
            source.url.as_str()
        } else {
            source.title.as_str()
        };
        let _ = writeln!(
            out,
            "{}. **[{}]({})** (relevance: {:.0}%)",
            i + 1,
            title,
            source.url,
            source.relevance * 100.0
        );
        if !source.snippet.is_empty() {
            let _ = writeln!(out, "   > {}", source.snippet.replace('\n', " "));
        }
        if !top.why_it_matters.is_empty() {
            let _ = writeln!(out, "   *Why it matters:* {}", top.why_it_matters);
        }
    }

    out
}

/// Render the report as pretty-printed JSON.
pub fn to_structured_data(report: &Report) -> String {
    // Every field serializes infallibly; an empty string is unreachable.
    serde_json::to_string_pretty(report).unwrap_or_default()
}

/// Parse JSON produced by [`to_structured_data`].
pub fn from_structured_data(data: &str) -> Result<Report, serde_json::Error> {
    serde_json::from_str(data)
}

/// Derive a file stem from a topic: ASCII letters, digits, `-` and `_`
/// only, spaces become `_`, at most 50 characters.
pub fn export_file_stem(topic: &str) -> String {
    let kept: String = topic
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem: String = kept
        .trim()
        .chars()
        .take(MAX_STEM_CHARS)
        .collect::<String>()
        .trim_end()
        .replace(' ', "_");
    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}

/// Write `{stem}_{timestamp}.md` and `.json` into `dir`, creating it if
/// needed. The timestamp is the report's `generated_at`.
pub async fn write_exports(report: &Report, dir: &Path) -> std::io::Result<ExportedFiles> {
    tokio::fs::create_dir_all(dir).await?;

    let stem = format!(
        "{}_{}",
        export_file_stem(&report.topic),
        report.generated_at.format("%Y%m%d_%H%M%S")
    );
    let files = ExportedFiles {
        markdown: dir.join(format!("{stem}.md")),
        json: dir.join(format!("{stem}.json")),
    };

    tokio::fs::write(&files.markdown, to_text_document(report)).await?;
    tokio::fs::write(&files.json, to_structured_data(report)).await?;

    info!(
        markdown = %files.markdown.display(),
        json = %files.json.display(),
        "Report exported"
    );
    Ok(files)
}
