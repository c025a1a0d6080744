//! Research pipeline: research stage followed by synthesis stage.

use super::agent::ResearchAgent;
use super::progress::{NoOpResearchCallback, ResearchCallback};
use super::report::{Report, Style, Tone};
use super::synthesis::{SynthesisLimits, Synthesizer};
use crate::brain::LlmProvider;
use crate::config::ScholarConfig;
use crate::error::ScholarError;
use crate::search::SearchProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// What the presentation layer asks the pipeline for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub tone: Tone,
    pub max_sources: usize,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>, max_sources: usize) -> Self {
        Self {
            topic: topic.into(),
            style: Style::default(),
            tone: Tone::default(),
            max_sources,
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }
}

/// Runs one request through both stages.
pub struct ResearchPipeline {
    agent: ResearchAgent,
    synthesizer: Synthesizer,
    callback: Arc<dyn ResearchCallback>,
}

impl ResearchPipeline {
    pub fn new(agent: ResearchAgent, synthesizer: Synthesizer) -> Self {
        Self {
            agent,
            synthesizer,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    /// Build both stages from configuration and the two provider handles.
    pub fn from_config(
        config: &ScholarConfig,
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        let agent = ResearchAgent::new(llm.clone(), search, config.research.clone())
            .with_sampling(config.llm.temperature, config.llm.max_tokens);

        let mut synthesizer = Synthesizer::new(llm, SynthesisLimits::from(&config.research))
            .with_sampling(config.llm.temperature, config.llm.max_tokens);
        if let Some(model) = &config.llm.synthesis_model {
            synthesizer = synthesizer.with_model(model.clone());
        }

        Self::new(agent, synthesizer)
    }

    /// Route progress updates from both stages to `callback`.
    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.agent = self.agent.with_callback(callback.clone());
        self.synthesizer = self.synthesizer.with_callback(callback.clone());
        self.callback = callback;
        self
    }

    /// Research the topic, then synthesize a report from the curated sources.
    pub async fn run(&self, request: &ResearchRequest) -> Result<Report, ScholarError> {
        info!(
            topic = %request.topic,
            style = %request.style,
            tone = %request.tone,
            max_sources = request.max_sources,
            "Research pipeline started"
        );

        let sources = self
            .agent
            .research(&request.topic, request.max_sources)
            .await?;
        self.callback.on_stage_change("synthesizing", 0.6);

        let report = self
            .synthesizer
            .synthesize(&sources, request.style, request.tone)
            .await?;
        self.callback.on_stage_change("complete", 1.0);

        Ok(report)
    }
}
