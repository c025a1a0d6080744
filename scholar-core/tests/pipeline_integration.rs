//! Integration tests for the research pipeline.
//!
//! These exercise both stages end-to-end with `MockLlmProvider` and
//! `MockSearchProvider`, checking curation bounds, the citation invariant
//! and the synthesis retry policy.

use scholar_core::brain::MockLlmProvider;
use scholar_core::config::ScholarConfig;
use scholar_core::error::{ResearchError, ScholarError, Stage, SynthesisError};
use scholar_core::research::{ResearchPipeline, ResearchRequest, Style, Tone};
use scholar_core::search::{MockSearchProvider, SourceRecord};
use scholar_core::types::Role;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn rec(url: &str, relevance: f64) -> SourceRecord {
    SourceRecord::new(format!("Page at {url}"), url, "Snippet text.", relevance)
}

/// Two overlapping result pages for the quantum computing scenario.
fn quantum_search() -> MockSearchProvider {
    MockSearchProvider::new()
        .with_results(
            "quantum computing basics",
            vec![
                rec("https://a.example/qc", 0.95),
                rec("https://b.example/qc", 0.80),
                rec("https://c.example/qc", 0.60),
                rec("https://d.example/qc", 0.30),
            ],
        )
        .with_results(
            "quantum error correction",
            vec![
                rec("https://b.example/qc/", 0.85),
                rec("https://e.example/qec", 0.75),
                rec("https://f.example/qec", 0.50),
                rec("https://g.example/qec", 0.20),
            ],
        )
}

fn queue_quantum_research(llm: &MockLlmProvider) {
    llm.queue_response(MockLlmProvider::multi_tool_call_response(vec![
        ("web_search", json!({"query": "quantum computing basics", "k": 10})),
        ("web_search", json!({"query": "quantum error correction"})),
    ]));
    llm.queue_response(MockLlmProvider::text_response(
        "Sources cover hardware basics and error correction.",
    ));
}

fn quantum_report_json() -> String {
    json!({
        "summary": "Quantum computers use qubits; error correction is the main hurdle.",
        "findings": [
            {"statement": "Qubits exploit superposition.", "citations": ["https://a.example/qc"]},
            {"statement": "Error correction needs many physical qubits.", "citations": ["[2]", "https://e.example/qec"]}
        ],
        "caveats": "Vendor roadmaps differ.",
        "top_sources": [
            {"url": "https://a.example/qc", "why_it_matters": "Clear introduction."},
            {"url": "https://e.example/qec", "why_it_matters": "Covers error correction."}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_quantum_computing_scenario() {
    let llm = Arc::new(MockLlmProvider::new());
    queue_quantum_research(&llm);
    llm.queue_response(MockLlmProvider::text_response(&quantum_report_json()));
    let search = Arc::new(quantum_search());

    let pipeline =
        ResearchPipeline::from_config(&ScholarConfig::default(), llm.clone(), search.clone());
    let request = ResearchRequest::new("quantum computing", 5)
        .with_style(Style::Layperson)
        .with_tone(Tone::Advisory);
    let report = pipeline.run(&request).await.unwrap();

    assert_eq!(
        search.queries(),
        vec!["quantum computing basics", "quantum error correction"]
    );
    assert_eq!(report.sources_analyzed, 5);
    assert!(report.top_sources.len() <= 5);
    assert_eq!(report.tone, Tone::Advisory);
    assert_eq!(report.model_id, "mock-model");

    // Every citation is one of the five curated sources; d and g fell below the cut.
    let curated: BTreeSet<&str> = [
        "https://a.example/qc",
        "https://b.example/qc/",
        "https://c.example/qc",
        "https://e.example/qec",
        "https://f.example/qec",
    ]
    .into();
    assert!(report.cited_urls().is_subset(&curated));
    assert_eq!(
        report.findings[1].citations,
        ["https://b.example/qc/", "https://e.example/qec"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>()
    );

    // The synthesis prompt lists the curated sources in relevance order.
    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let prompt = requests[2].messages[1].content.joined_text();
    let a = prompt.find("https://a.example/qc").unwrap();
    let b = prompt.find("https://b.example/qc/").unwrap();
    let e = prompt.find("https://e.example/qec").unwrap();
    assert!(a < b && b < e);
    assert!(!prompt.contains("https://d.example/qc"));
    assert!(prompt.contains("Sources cover hardware basics"));
}

#[tokio::test]
async fn test_provider_failure_stops_before_synthesis() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_response(MockLlmProvider::tool_call_response(
        "web_search",
        json!({"query": "quantum computing"}),
    ));
    let pipeline = ResearchPipeline::from_config(
        &ScholarConfig::default(),
        llm.clone(),
        Arc::new(MockSearchProvider::failing()),
    );

    let err = pipeline
        .run(&ResearchRequest::new("quantum computing", 5))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Research);
    assert!(matches!(
        err,
        ScholarError::Research(ResearchError::Provider(_))
    ));
    assert!(err.to_string().starts_with("Research stage failed:"));
    // Only the research completion ran.
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_malformed_then_valid_json_recovers() {
    let llm = Arc::new(MockLlmProvider::new());
    queue_quantum_research(&llm);
    llm.queue_response(MockLlmProvider::text_response(
        "Here is your report: {\"summary\": ",
    ));
    llm.queue_response(MockLlmProvider::text_response(&quantum_report_json()));

    let pipeline = ResearchPipeline::from_config(
        &ScholarConfig::default(),
        llm.clone(),
        Arc::new(quantum_search()),
    );
    let report = pipeline
        .run(&ResearchRequest::new("quantum computing", 5))
        .await
        .unwrap();
    assert_eq!(report.findings.len(), 2);

    let requests = llm.requests();
    assert_eq!(requests.len(), 4);
    let retry = &requests[3];
    let last = retry.messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert!(
        last.content
            .joined_text()
            .starts_with("Your previous response could not be used:")
    );
    let echoed = &retry.messages[retry.messages.len() - 2];
    assert_eq!(echoed.role, Role::Assistant);
}

#[tokio::test]
async fn test_invalid_output_twice_fails_synthesis() {
    let llm = Arc::new(MockLlmProvider::new());
    queue_quantum_research(&llm);
    let uncited = json!({
        "summary": "Short.",
        "findings": [{"statement": "Made up.", "citations": ["https://nowhere.example"]}],
        "caveats": "",
        "top_sources": []
    })
    .to_string();
    llm.queue_response(MockLlmProvider::text_response(&uncited));
    llm.queue_response(MockLlmProvider::text_response(&uncited));

    let pipeline = ResearchPipeline::from_config(
        &ScholarConfig::default(),
        llm.clone(),
        Arc::new(quantum_search()),
    );
    let err = pipeline
        .run(&ResearchRequest::new("quantum computing", 5))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Synthesis);
    match err {
        ScholarError::Synthesis(SynthesisError::InvalidOutput { attempts, problems }) => {
            assert_eq!(attempts, 2);
            assert!(problems.contains("https://nowhere.example"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Two research rounds plus exactly two synthesis attempts.
    assert_eq!(llm.call_count(), 4);
}

#[tokio::test]
async fn test_tool_round_limit_still_synthesizes() {
    let mut config = ScholarConfig::default();
    config.research.max_tool_rounds = 2;

    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_response(MockLlmProvider::tool_call_response(
        "web_search",
        json!({"query": "quantum computing basics"}),
    ));
    llm.queue_response(MockLlmProvider::tool_call_response(
        "web_search",
        json!({"query": "quantum error correction"}),
    ));
    llm.queue_response(MockLlmProvider::text_response(&quantum_report_json()));
    let search = Arc::new(quantum_search());

    let pipeline = ResearchPipeline::from_config(&config, llm.clone(), search.clone());
    let report = pipeline
        .run(&ResearchRequest::new("quantum computing", 5))
        .await
        .unwrap();

    assert_eq!(search.call_count(), 2);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(report.sources_analyzed, 5);
    // The third request is the synthesis call, with no tools attached.
    assert!(llm.requests()[2].tools.is_none());
}

#[tokio::test]
async fn test_index_citations_resolve_to_urls() {
    let llm = Arc::new(MockLlmProvider::new());
    queue_quantum_research(&llm);
    llm.queue_response(MockLlmProvider::text_response(
        &json!({
            "tldr": "Indexed citations.",
            "key_findings": [{"statement": "First source matters.", "citations": [1, "[3]"]}],
            "top_sources": [{"url": "[1]", "why_matters": "Top ranked."}]
        })
        .to_string(),
    ));

    let pipeline = ResearchPipeline::from_config(
        &ScholarConfig::default(),
        llm,
        Arc::new(quantum_search()),
    );
    let report = pipeline
        .run(&ResearchRequest::new("quantum computing", 5))
        .await
        .unwrap();

    let cited: Vec<&str> = report.cited_urls().into_iter().collect();
    assert_eq!(cited, vec!["https://a.example/qc", "https://e.example/qec"]);
    assert_eq!(report.top_sources[0].source.url, "https://a.example/qc");
    assert_eq!(report.top_sources[0].why_it_matters, "Top ranked.");
    assert_eq!(report.caveats, "");
}
