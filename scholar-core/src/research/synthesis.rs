//! Synthesis stage: turn a curated source set into a cited report.
//!
//! One structured-output completion call produces a JSON draft. The draft is
//! validated against the source set; on any problem the model gets exactly
//! one corrective retry listing what was wrong.

use super::progress::{NoOpResearchCallback, ResearchCallback};
use super::report::{Finding, Report, Style, Tone, TopSource};
use super::sources::CuratedSourceSet;
use crate::brain::LlmProvider;
use crate::config::ResearchConfig;
use crate::error::SynthesisError;
use crate::types::{CompletionRequest, Message, ResponseFormat, TokenUsage};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// First attempt plus one corrective retry.
pub const MAX_SYNTHESIS_ATTEMPTS: usize = 2;

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a research analyst who writes concise, well-cited research reports. \
Base every statement on the provided sources and cite only those sources. \
Always answer with a single JSON object and nothing else.";

/// Limits a draft is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisLimits {
    pub max_summary_words: usize,
    pub max_final_sources: usize,
}

impl From<&ResearchConfig> for SynthesisLimits {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            max_summary_words: config.max_summary_words,
            max_final_sources: config.max_final_sources,
        }
    }
}

/// Text, or a list of strings joined line by line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    fn into_text(self) -> String {
        match self {
            TextOrList::Text(text) => text.trim().to_string(),
            TextOrList::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A citation as the model wrote it: a URL, `[n]`, or a bare number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CitationRef {
    Text(String),
    Index(u64),
}

impl CitationRef {
    /// The references this entry holds. A string such as `"[1], [3]"` that
    /// does not resolve as a whole is split on commas.
    fn references(&self, sources: &CuratedSourceSet) -> Vec<String> {
        match self {
            CitationRef::Index(n) => vec![n.to_string()],
            CitationRef::Text(s) if s.contains(',') && sources.resolve_citation(s).is_none() => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            CitationRef::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Vec::new()
                } else {
                    vec![s.to_string()]
                }
            }
        }
    }
}

/// One citation or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Citations {
    List(Vec<CitationRef>),
    Single(CitationRef),
}

impl Default for Citations {
    fn default() -> Self {
        Citations::List(Vec::new())
    }
}

impl Citations {
    fn references(&self, sources: &CuratedSourceSet) -> Vec<String> {
        match self {
            Citations::List(items) => items.iter().flat_map(|c| c.references(sources)).collect(),
            Citations::Single(item) => item.references(sources),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DraftFinding {
    #[serde(default, alias = "finding")]
    statement: String,
    #[serde(default, alias = "citation")]
    citations: Citations,
}

#[derive(Debug, Default, Deserialize)]
struct DraftTopSource {
    #[serde(default)]
    url: String,
    #[serde(default, alias = "why_matters")]
    why_it_matters: String,
}

/// The model's JSON, before validation.
#[derive(Debug, Default, Deserialize)]
struct DraftReport {
    #[serde(default, alias = "tldr")]
    summary: String,
    #[serde(default, alias = "key_findings")]
    findings: Vec<DraftFinding>,
    #[serde(default, alias = "conflicts_and_caveats")]
    caveats: Option<TextOrList>,
    #[serde(default)]
    top_sources: Vec<DraftTopSource>,
}

/// A draft that passed validation, with citations canonicalized to set URLs.
#[derive(Debug)]
struct ValidatedDraft {
    summary: String,
    findings: Vec<Finding>,
    caveats: String,
    top_sources: Vec<TopSource>,
}

/// Slice the outermost JSON object out of a model reply, tolerating code
/// fences and surrounding prose.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Decode and validate a reply. Every problem found is returned.
fn validate_draft(
    raw: &str,
    sources: &CuratedSourceSet,
    limits: SynthesisLimits,
) -> Result<ValidatedDraft, Vec<String>> {
    let json = extract_json_object(raw)
        .ok_or_else(|| vec!["the response did not contain a JSON object".to_string()])?;
    let draft: DraftReport = serde_json::from_str(json)
        .map_err(|e| vec![format!("the response was not valid report JSON: {e}")])?;

    let mut problems = Vec::new();

    let summary = draft.summary.trim().to_string();
    let words = summary.split_whitespace().count();
    if words == 0 {
        problems.push("summary is empty".to_string());
    } else if words > limits.max_summary_words {
        problems.push(format!(
            "summary has {words} words; the limit is {}",
            limits.max_summary_words
        ));
    }

    let mut findings = Vec::with_capacity(draft.findings.len());
    for (i, finding) in draft.findings.into_iter().enumerate() {
        let n = i + 1;
        let statement = finding.statement.trim().to_string();
        if statement.is_empty() {
            problems.push(format!("finding {n} has an empty statement"));
        }
        let references = finding.citations.references(sources);
        if references.is_empty() {
            problems.push(format!("finding {n} has no citations"));
        }
        let mut citations = BTreeSet::new();
        for reference in references {
            match sources.resolve_citation(&reference) {
                Some(source) => {
                    citations.insert(source.url.clone());
                }
                None => problems.push(format!(
                    "finding {n} cites '{reference}', which is not one of the provided sources"
                )),
            }
        }
        findings.push(Finding {
            statement,
            citations,
        });
    }

    if draft.top_sources.len() > limits.max_final_sources {
        problems.push(format!(
            "top_sources has {} entries; the limit is {}",
            draft.top_sources.len(),
            limits.max_final_sources
        ));
    }
    let mut seen = HashSet::new();
    let mut top_sources = Vec::with_capacity(draft.top_sources.len());
    for top in draft.top_sources {
        match sources.resolve_citation(&top.url) {
            Some(source) => {
                if !seen.insert(source.url.clone()) {
                    problems.push(format!("top source '{}' is listed more than once", top.url));
                    continue;
                }
                top_sources.push(TopSource {
                    source: source.clone(),
                    why_it_matters: top.why_it_matters.trim().to_string(),
                });
            }
            None => problems.push(format!(
                "top source '{}' is not one of the provided sources",
                top.url
            )),
        }
    }

    if problems.is_empty() {
        Ok(ValidatedDraft {
            summary,
            findings,
            caveats: draft
                .caveats
                .map(TextOrList::into_text)
                .unwrap_or_default(),
            top_sources,
        })
    } else {
        Err(problems)
    }
}

/// Render the synthesis prompt for a source set.
fn build_prompt(
    sources: &CuratedSourceSet,
    style: Style,
    tone: Tone,
    limits: SynthesisLimits,
) -> String {
    let mut prompt = format!("Research topic: {}\n\nSources:\n", sources.topic());
    for (i, source) in sources.sources().iter().enumerate() {
        let _ = write!(
            prompt,
            "[{}] {}\nURL: {}\nRelevance: {:.2}\nExcerpt: {}\n\n",
            i + 1,
            source.title,
            source.url,
            source.relevance,
            source.snippet
        );
    }
    if let Some(analysis) = sources.analysis() {
        let _ = write!(prompt, "Research notes:\n{analysis}\n\n");
    }

    let _ = write!(
        prompt,
        "Writing style ({style}): {}\nTone ({tone}): {}\n\n",
        style.instructions(),
        tone.instructions()
    );

    let _ = write!(
        prompt,
        "Requirements:\n\
         - \"summary\": a TL;DR of at most {words} words.\n\
         - \"findings\": 3 to 5 key findings. Each cites at least one source by its exact URL from the list above.\n\
         - \"caveats\": conflicting evidence, limitations and open questions, or an empty string.\n\
         - \"top_sources\": at most {top} of the most useful sources by exact URL, each with one sentence on why it matters.\n\
         - Cite only the sources listed above.\n\n\
         Respond with a single JSON object of exactly this shape:\n\
         {{\"summary\": \"...\", \"findings\": [{{\"statement\": \"...\", \"citations\": [\"https://...\"]}}], \
         \"caveats\": \"...\", \"top_sources\": [{{\"url\": \"https://...\", \"why_it_matters\": \"...\"}}]}}",
        words = limits.max_summary_words,
        top = limits.max_final_sources,
    );
    prompt
}

fn correction_prompt(problems: &[String]) -> String {
    let mut prompt = String::from("Your previous response could not be used:\n");
    for problem in problems {
        let _ = writeln!(prompt, "- {problem}");
    }
    prompt.push_str(
        "\nReturn the corrected report as a single JSON object with the same shape, \
         citing only URLs from the source list.",
    );
    prompt
}

/// Writes the final report from a curated source set.
pub struct Synthesizer {
    llm: Arc<dyn LlmProvider>,
    model: Option<String>,
    limits: SynthesisLimits,
    temperature: f32,
    max_tokens: Option<usize>,
    callback: Arc<dyn ResearchCallback>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, limits: SynthesisLimits) -> Self {
        Self {
            llm,
            model: None,
            limits,
            temperature: 0.3,
            max_tokens: None,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    /// Use a different model than the provider default for synthesis.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub async fn synthesize(
        &self,
        sources: &CuratedSourceSet,
        style: Style,
        tone: Tone,
    ) -> Result<Report, SynthesisError> {
        if sources.is_empty() {
            return Err(SynthesisError::EmptySources);
        }

        info!(
            topic = sources.topic(),
            sources = sources.len(),
            %style,
            %tone,
            "Starting synthesis stage"
        );

        let mut messages = vec![
            Message::system(SYNTHESIS_SYSTEM_PROMPT),
            Message::user(build_prompt(sources, style, tone, self.limits)),
        ];
        let mut problems = Vec::new();
        let mut usage = TokenUsage::default();

        for attempt in 1..=MAX_SYNTHESIS_ATTEMPTS {
            self.callback
                .on_synthesis_attempt(attempt, MAX_SYNTHESIS_ATTEMPTS);

            let request = CompletionRequest {
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                model: self.model.clone(),
                response_format: ResponseFormat::Json,
                ..Default::default()
            };
            let response = self
                .llm
                .complete(request)
                .await
                .map_err(SynthesisError::Completion)?;
            usage.accumulate(&response.usage);
            let raw = response.message.content.joined_text();

            match validate_draft(&raw, sources, self.limits) {
                Ok(draft) => {
                    let model_id = if response.model.is_empty() {
                        self.model
                            .clone()
                            .unwrap_or_else(|| self.llm.model_name().to_string())
                    } else {
                        response.model
                    };
                    info!(
                        attempt,
                        findings = draft.findings.len(),
                        top_sources = draft.top_sources.len(),
                        model = %model_id,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        total_tokens = usage.total(),
                        "Synthesis stage complete"
                    );
                    return Ok(Report {
                        topic: sources.topic().to_string(),
                        summary: draft.summary,
                        findings: draft.findings,
                        caveats: draft.caveats,
                        top_sources: draft.top_sources,
                        generated_at: Utc::now(),
                        model_id,
                        style,
                        tone,
                        sources_analyzed: sources.len(),
                    });
                }
                Err(found) => {
                    warn!(
                        attempt,
                        problems = ?found,
                        "Synthesis output failed validation"
                    );
                    if attempt < MAX_SYNTHESIS_ATTEMPTS {
                        messages.push(Message::assistant(raw));
                        messages.push(Message::user(correction_prompt(&found)));
                    }
                    problems = found;
                }
            }
        }

        Err(SynthesisError::InvalidOutput {
            attempts: MAX_SYNTHESIS_ATTEMPTS,
            problems: problems.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::LlmError;
    use crate::search::SourceRecord;
    use crate::types::Role;
    use serde_json::json;

    const LIMITS: SynthesisLimits = SynthesisLimits {
        max_summary_words: 120,
        max_final_sources: 5,
    };

    fn source_set() -> CuratedSourceSet {
        CuratedSourceSet::curate(
            "quantum computing",
            vec![
                SourceRecord::new("Qubits 101", "https://a.example/qubits", "Intro.", 0.9),
                SourceRecord::new("Error correction", "https://b.example/qec", "QEC.", 0.7),
                SourceRecord::new("Industry outlook", "https://c.example", "Market.", 0.4),
            ],
            5,
        )
    }

    fn valid_json() -> String {
        json!({
            "summary": "Quantum computers use qubits and need error correction.",
            "findings": [
                {"statement": "Qubits exploit superposition.", "citations": ["https://a.example/qubits"]},
                {"statement": "Error correction is the main hurdle.", "citations": ["https://b.example/qec", "https://a.example/qubits"]}
            ],
            "caveats": "Timelines are uncertain.",
            "top_sources": [
                {"url": "https://b.example/qec", "why_it_matters": "Covers the bottleneck."}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("```json\n{\"a\": 1}\n```"),
            Some("{\"a\": 1}")
        );
        assert_eq!(
            extract_json_object("Here you go: {\"a\": {\"b\": 2}} Thanks!"),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_validate_accepts_and_canonicalizes() {
        let draft = validate_draft(&valid_json(), &source_set(), LIMITS).unwrap();
        assert_eq!(draft.findings.len(), 2);
        assert_eq!(draft.findings[1].citations.len(), 2);
        assert_eq!(draft.top_sources[0].source.title, "Error correction");
        assert_eq!(draft.top_sources[0].source.relevance, 0.7);
        assert_eq!(draft.caveats, "Timelines are uncertain.");
    }

    #[test]
    fn test_validate_accepts_original_shape_and_index_citations() {
        let raw = json!({
            "tldr": "Short summary.",
            "key_findings": [
                {"finding": "A claim.", "citations": ["[1]", 3]},
                {"finding": "Another.", "citations": ["https://b.example/qec/"]}
            ],
            "conflicts_and_caveats": ["Small samples.", "Vendor bias."],
            "top_sources": [
                {"title": "ignored", "url": "[2]", "score": 0.1, "why_matters": "Depth."}
            ]
        })
        .to_string();
        let draft = validate_draft(&raw, &source_set(), LIMITS).unwrap();
        let first: Vec<&str> = draft.findings[0]
            .citations
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(first, vec!["https://a.example/qubits", "https://c.example"]);
        assert!(draft.findings[1].citations.contains("https://b.example/qec"));
        assert_eq!(draft.caveats, "Small samples.\nVendor bias.");
        assert_eq!(draft.top_sources[0].source.url, "https://b.example/qec");
        assert_eq!(draft.top_sources[0].source.title, "Error correction");
        assert_eq!(draft.top_sources[0].why_it_matters, "Depth.");
    }

    #[test]
    fn test_validate_accepts_single_comma_joined_citation() {
        let raw = json!({
            "tldr": "Short.",
            "key_findings": [
                {"finding": "A claim.", "citation": "[1], [3]"},
                {"finding": "Another.", "citation": 2},
                {"finding": "Third.", "citation": "https://b.example/qec"}
            ],
            "conflicts_and_caveats": "",
            "top_sources": []
        })
        .to_string();
        let draft = validate_draft(&raw, &source_set(), LIMITS).unwrap();
        let first: Vec<&str> = draft.findings[0]
            .citations
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(first, vec!["https://a.example/qubits", "https://c.example"]);
        assert!(draft.findings[1].citations.contains("https://b.example/qec"));
        assert!(draft.findings[2].citations.contains("https://b.example/qec"));

        let raw = json!({
            "summary": "Short.",
            "findings": [{"statement": "A claim.", "citation": "[1], https://x.example"}]
        })
        .to_string();
        let problems = validate_draft(&raw, &source_set(), LIMITS).unwrap_err();
        assert_eq!(
            problems,
            vec!["finding 1 cites 'https://x.example', which is not one of the provided sources"]
        );
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let raw = json!({
            "summary": "",
            "findings": [
                {"statement": "", "citations": []},
                {"statement": "x", "citations": ["https://unknown.example", "[9]"]}
            ],
            "top_sources": [
                {"url": "https://a.example/qubits"},
                {"url": "https://a.example/qubits"},
                {"url": "https://nowhere.example"}
            ]
        })
        .to_string();
        let problems = validate_draft(&raw, &source_set(), LIMITS).unwrap_err();
        assert_eq!(
            problems,
            vec![
                "summary is empty".to_string(),
                "finding 1 has an empty statement".to_string(),
                "finding 1 has no citations".to_string(),
                "finding 2 cites 'https://unknown.example', which is not one of the provided sources".to_string(),
                "finding 2 cites '[9]', which is not one of the provided sources".to_string(),
                "top source 'https://a.example/qubits' is listed more than once".to_string(),
                "top source 'https://nowhere.example' is not one of the provided sources".to_string(),
            ]
        );
    }

    #[test]
    fn test_validate_limits() {
        let long_summary = vec!["word"; 121].join(" ");
        let raw = json!({
            "summary": long_summary,
            "findings": [],
            "top_sources": [
                {"url": "[1]"}, {"url": "[2]"}, {"url": "[3]"}
            ]
        })
        .to_string();
        let limits = SynthesisLimits {
            max_summary_words: 120,
            max_final_sources: 2,
        };
        let problems = validate_draft(&raw, &source_set(), limits).unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("121 words"));
        assert!(problems[1].contains("3 entries"));
    }

    #[test]
    fn test_validate_rejects_non_json() {
        let problems = validate_draft("I cannot do that.", &source_set(), LIMITS).unwrap_err();
        assert_eq!(problems, vec!["the response did not contain a JSON object"]);
        let problems = validate_draft("{\"summary\": 5}", &source_set(), LIMITS).unwrap_err();
        assert!(problems[0].starts_with("the response was not valid report JSON"));
    }

    #[test]
    fn test_build_prompt_lists_sources_and_limits() {
        let set = source_set().with_analysis(Some("Mostly hardware papers.".into()));
        let prompt = build_prompt(&set, Style::Technical, Tone::Advisory, LIMITS);
        assert!(prompt.contains("[1] Qubits 101\nURL: https://a.example/qubits"));
        assert!(prompt.contains("[3] Industry outlook"));
        assert!(prompt.contains("Mostly hardware papers."));
        assert!(prompt.contains(Style::Technical.instructions()));
        assert!(prompt.contains(Tone::Advisory.instructions()));
        assert!(prompt.contains("at most 120 words"));
        assert!(prompt.contains("at most 5 of the most useful sources"));
        assert!(prompt.contains("\"why_it_matters\""));
    }

    #[tokio::test]
    async fn test_synthesize_first_attempt() {
        let llm = Arc::new(MockLlmProvider::with_model("gpt-4o"));
        llm.queue_response(MockLlmProvider::text_response(&valid_json()));
        let report = Synthesizer::new(llm.clone(), LIMITS)
            .with_model("gpt-4o")
            .synthesize(&source_set(), Style::Layperson, Tone::Neutral)
            .await
            .unwrap();

        assert_eq!(report.topic, "quantum computing");
        assert_eq!(report.sources_analyzed, 3);
        assert_eq!(report.model_id, "mock-model");
        assert_eq!(llm.call_count(), 1);

        let request = &llm.requests()[0];
        assert_eq!(request.response_format, ResponseFormat::Json);
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert!(request.tools.is_none());
    }

    #[tokio::test]
    async fn test_synthesize_corrective_retry() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_response(MockLlmProvider::text_response("{ not json"));
        llm.queue_response(MockLlmProvider::text_response(&valid_json()));

        let report = Synthesizer::new(llm.clone(), LIMITS)
            .synthesize(&source_set(), Style::Technical, Tone::Advisory)
            .await
            .unwrap();
        assert_eq!(report.findings.len(), 2);
        assert_eq!(llm.call_count(), 2);

        let retry = &llm.requests()[1];
        let n = retry.messages.len();
        assert_eq!(retry.messages[n - 2].role, Role::Assistant);
        assert_eq!(retry.messages[n - 2].content.as_text(), Some("{ not json"));
        assert_eq!(retry.messages[n - 1].role, Role::User);
        assert!(
            retry.messages[n - 1]
                .content
                .as_text()
                .unwrap()
                .contains("could not be used")
        );
    }

    #[tokio::test]
    async fn test_synthesize_gives_up_after_two_attempts() {
        let llm = Arc::new(MockLlmProvider::new());
        let bad = json!({
            "summary": "ok",
            "findings": [{"statement": "x", "citations": ["https://made-up.example"]}]
        })
        .to_string();
        llm.queue_response(MockLlmProvider::text_response(&bad));
        llm.queue_response(MockLlmProvider::text_response(&bad));
        llm.queue_response(MockLlmProvider::text_response(&valid_json()));

        let err = Synthesizer::new(llm.clone(), LIMITS)
            .synthesize(&source_set(), Style::Layperson, Tone::Neutral)
            .await
            .unwrap_err();
        match err {
            SynthesisError::InvalidOutput { attempts, problems } => {
                assert_eq!(attempts, 2);
                assert!(problems.contains("https://made-up.example"));
            }
            other => panic!("Expected InvalidOutput, got {other:?}"),
        }
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_synthesize_completion_error_is_not_retried() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_error(LlmError::Timeout { timeout_secs: 60 });
        let err = Synthesizer::new(llm.clone(), LIMITS)
            .synthesize(&source_set(), Style::Layperson, Tone::Neutral)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Completion(LlmError::Timeout { .. })
        ));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_empty_sources() {
        let llm = Arc::new(MockLlmProvider::new());
        let empty = CuratedSourceSet::curate("t", Vec::new(), 5);
        let err = Synthesizer::new(llm.clone(), LIMITS)
            .synthesize(&empty, Style::Layperson, Tone::Neutral)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EmptySources));
        assert_eq!(llm.call_count(), 0);
    }
}
