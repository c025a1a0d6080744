//! Research and synthesis stages.
//!
//! A run goes through two stages:
//! 1. **Research**: the model issues `web_search` tool calls; the hits are
//!    curated into a bounded, deduplicated source set.
//! 2. **Synthesis**: the model writes a JSON report citing only those
//!    sources, with one corrective retry on invalid output.
//!
//! `output` renders the finished report as Markdown and JSON.

pub mod agent;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod sources;
pub mod synthesis;

/// Upper bound on sources per run and results per search call.
pub const MAX_SOURCES_LIMIT: usize = 20;

pub use agent::ResearchAgent;
pub use output::{ExportedFiles, export_file_stem, write_exports};
pub use pipeline::{ResearchPipeline, ResearchRequest};
pub use progress::{NoOpResearchCallback, ResearchCallback};
pub use report::{Finding, Report, Style, Tone, TopSource};
pub use sources::CuratedSourceSet;
pub use synthesis::{SynthesisLimits, Synthesizer};
