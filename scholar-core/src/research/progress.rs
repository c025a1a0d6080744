//! Progress reporting hooks for a pipeline run.

/// Callback for research progress updates.
pub trait ResearchCallback: Send + Sync {
    /// Called when the pipeline enters a new stage.
    fn on_stage_change(&self, stage: &str, progress: f32);
    /// Called after each executed web search.
    fn on_search_complete(&self, query: &str, results: usize);
    /// Called before each synthesis completion call.
    fn on_synthesis_attempt(&self, attempt: usize, max: usize);
}

/// No-op callback.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_stage_change(&self, _stage: &str, _progress: f32) {}
    fn on_search_complete(&self, _query: &str, _results: usize) {}
    fn on_synthesis_attempt(&self, _attempt: usize, _max: usize) {}
}
