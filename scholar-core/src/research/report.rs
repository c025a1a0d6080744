//! The report data model produced by the synthesis stage.

use crate::search::SourceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Writing register of the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Technical,
    #[default]
    Layperson,
}

impl Style {
    /// Prompt guidance for this style.
    pub fn instructions(self) -> &'static str {
        match self {
            Style::Technical => {
                "Use technical terminology and assume domain expertise. Include specific details, methodologies, and precise terminology."
            }
            Style::Layperson => {
                "Use accessible language that a general audience can understand. Explain concepts clearly and avoid jargon."
            }
        }
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Style::Technical => write!(f, "technical"),
            Style::Layperson => write!(f, "layperson"),
        }
    }
}

impl std::str::FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(Style::Technical),
            "layperson" => Ok(Style::Layperson),
            other => Err(format!(
                "unknown style '{other}' (expected technical or layperson)"
            )),
        }
    }
}

/// Stance the report takes toward its reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Neutral,
    Advisory,
}

impl Tone {
    /// Prompt guidance for this tone.
    pub fn instructions(self) -> &'static str {
        match self {
            Tone::Neutral => "Present information objectively without advocacy.",
            Tone::Advisory => "Provide guidance and recommendations based on the evidence.",
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tone::Neutral => write!(f, "neutral"),
            Tone::Advisory => write!(f, "advisory"),
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Tone::Neutral),
            "advisory" => Ok(Tone::Advisory),
            other => Err(format!(
                "unknown tone '{other}' (expected neutral or advisory)"
            )),
        }
    }
}

/// A claim backed by one or more curated sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub statement: String,
    /// URLs of the supporting sources.
    pub citations: BTreeSet<String>,
}

/// A curated source singled out in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSource {
    pub source: SourceRecord,
    pub why_it_matters: String,
}

/// The synthesized research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub topic: String,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub caveats: String,
    pub top_sources: Vec<TopSource>,
    pub generated_at: DateTime<Utc>,
    pub model_id: String,
    pub style: Style,
    pub tone: Tone,
    /// Size of the curated set the report was written from.
    pub sources_analyzed: usize,
}

impl Report {
    /// Every distinct URL cited by any finding, in sorted order.
    pub fn cited_urls(&self) -> BTreeSet<&str> {
        self.findings
            .iter()
            .flat_map(|f| f.citations.iter().map(String::as_str))
            .collect()
    }
}
