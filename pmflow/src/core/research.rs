//! Research depth decision.
//!
//! The coordinator agent only recommends; the flow branches on the
//! [`ResearchDecision`] produced here with a plain conditional.

use serde::{Deserialize, Serialize};

use crate::core::types::ProjectRequest;

/// Descriptions at least this long are treated as complete.
const DETAILED_DESCRIPTION_WORDS: usize = 200;
/// Descriptions shorter than this get full research.
const SPARSE_DESCRIPTION_WORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchRecommendation {
    None,
    Limited,
    Full,
}

/// Output contract of the research coordinator task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchAssessment {
    pub research_recommendation: ResearchRecommendation,
    pub reasoning: String,
    #[serde(default)]
    pub information_gaps: Vec<String>,
    #[serde(default)]
    pub research_topics: Vec<String>,
    /// Share of needed information already present, as a number or `"80%"`.
    #[serde(default)]
    pub estimated_completeness: serde_json::Value,
}

/// How much research the flow runs before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "lowercase")]
pub enum ResearchDecision {
    Skip,
    Limited { topics: Vec<String> },
    Full,
}

impl ResearchDecision {
    pub fn from_assessment(assessment: &ResearchAssessment) -> Self {
        match assessment.research_recommendation {
            ResearchRecommendation::None => ResearchDecision::Skip,
            ResearchRecommendation::Full => ResearchDecision::Full,
            ResearchRecommendation::Limited => {
                let topics: Vec<String> = assessment
                    .research_topics
                    .iter()
                    .map(|topic| topic.trim())
                    .filter(|topic| !topic.is_empty())
                    .map(str::to_string)
                    .collect();
                ResearchDecision::Limited { topics }
            }
        }
    }

    /// Lowercase level name used in prompts and reports.
    pub fn level(&self) -> &'static str {
        match self {
            ResearchDecision::Skip => "none",
            ResearchDecision::Limited { .. } => "limited",
            ResearchDecision::Full => "full",
        }
    }

    pub fn runs_research(&self) -> bool {
        !matches!(self, ResearchDecision::Skip)
    }

    pub fn topics(&self) -> &[String] {
        match self {
            ResearchDecision::Limited { topics } => topics,
            _ => &[],
        }
    }
}

/// Deterministic decision from description length alone.
///
/// Used when the coordinator agent is disabled.
pub fn heuristic_decision(request: &ProjectRequest) -> ResearchDecision {
    let words = request.description.split_whitespace().count();
    if words >= DETAILED_DESCRIPTION_WORDS {
        ResearchDecision::Skip
    } else if words < SPARSE_DESCRIPTION_WORDS {
        ResearchDecision::Full
    } else {
        let industry = request.industry.trim();
        let topics = if industry.is_empty() {
            Vec::new()
        } else {
            vec![format!("{industry} industry practices")]
        };
        ResearchDecision::Limited { topics }
    }
}
