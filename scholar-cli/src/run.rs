//! One research run: build providers, run the pipeline, print and export.

use scholar_core::config::ScholarConfig;
use scholar_core::research::output::{to_text_document, write_exports};
use scholar_core::research::{ResearchCallback, ResearchPipeline, ResearchRequest, Style, Tone};
use std::sync::Arc;
use tracing::warn;

/// Per-run choices taken from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub style: Style,
    pub tone: Tone,
    /// Defaults to, and is capped by, `research.max_search_results`.
    pub max_sources: Option<usize>,
    pub export: bool,
    pub quiet: bool,
}

/// Progress lines on stderr, so stdout carries only the report.
struct ConsoleProgress;

impl ResearchCallback for ConsoleProgress {
    fn on_stage_change(&self, stage: &str, progress: f32) {
        eprintln!("  [{:>3.0}%] {stage}", progress * 100.0);
    }

    fn on_search_complete(&self, query: &str, results: usize) {
        eprintln!("         searched \"{query}\": {results} results");
    }

    fn on_synthesis_attempt(&self, attempt: usize, max: usize) {
        if attempt > 1 {
            eprintln!("         retrying synthesis ({attempt}/{max})");
        }
    }
}

/// The source budget for a run: the requested value, never above `bound`.
fn effective_max_sources(requested: Option<usize>, bound: usize) -> usize {
    match requested {
        Some(n) if n > bound => {
            warn!(
                requested = n,
                max_search_results = bound,
                "--max-sources exceeds research.max_search_results; capping"
            );
            bound
        }
        Some(n) => n,
        None => bound,
    }
}

pub async fn run_research(
    topic: &str,
    options: RunOptions,
    config: ScholarConfig,
) -> anyhow::Result<()> {
    for warning in config.validate()? {
        warn!("{warning}");
    }

    let llm = scholar_core::providers::create_provider(&config.llm)?;
    let search = scholar_tools::create_search_provider(&config.search)?;

    let mut pipeline = ResearchPipeline::from_config(&config, llm, search);
    if !options.quiet {
        pipeline = pipeline.with_callback(Arc::new(ConsoleProgress));
    }

    let max_sources =
        effective_max_sources(options.max_sources, config.research.max_search_results);
    let request = ResearchRequest::new(topic, max_sources)
        .with_style(options.style)
        .with_tone(options.tone);

    let report = pipeline.run(&request).await?;
    println!("{}", to_text_document(&report));

    if options.export {
        let files = write_exports(&report, &config.export.output_dir).await?;
        if !options.quiet {
            eprintln!(
                "Saved {} and {}",
                files.markdown.display(),
                files.json.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_sources_defaults_to_config() {
        assert_eq!(effective_max_sources(None, 10), 10);
    }

    #[test]
    fn test_max_sources_capped_by_config() {
        assert_eq!(effective_max_sources(Some(7), 10), 7);
        assert_eq!(effective_max_sources(Some(15), 10), 10);
        // Zero passes through so the research stage can reject it.
        assert_eq!(effective_max_sources(Some(0), 10), 0);
    }
}
