//! Retrieval candidate models.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::plan::Appointment;

/// Knowledge source a candidate was retrieved from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Real historical case with its actual treatment sequence
    ClinicalCase,
    /// Generated sequence validated by a practitioner
    ApprovedSequence,
    /// Expert-authored standardized sequence
    IdealSequence,
    /// Anything else in the knowledge base
    GeneralKnowledge,
    /// Distilled guideline from offline analysis
    DiscoveredRule,
}

impl SourceType {
    /// All source types, in reference display order.
    pub const ALL: [SourceType; 5] = [
        SourceType::ClinicalCase,
        SourceType::ApprovedSequence,
        SourceType::IdealSequence,
        SourceType::GeneralKnowledge,
        SourceType::DiscoveredRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ClinicalCase => "clinical_case",
            SourceType::ApprovedSequence => "approved_sequence",
            SourceType::IdealSequence => "ideal_sequence",
            SourceType::GeneralKnowledge => "general_knowledge",
            SourceType::DiscoveredRule => "discovered_rule",
        }
    }

    /// Parse a source type name. Accepts the plural keys used by settings payloads.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "clinical_case" | "clinical_cases" | "clinicalcases" => Some(SourceType::ClinicalCase),
            "approved_sequence" | "approved_sequences" | "approvedsequences" => {
                Some(SourceType::ApprovedSequence)
            }
            "ideal_sequence" | "ideal_sequences" | "idealsequences" => {
                Some(SourceType::IdealSequence)
            }
            "general_knowledge" | "knowledge" | "generalknowledge" => {
                Some(SourceType::GeneralKnowledge)
            }
            "discovered_rule" | "discovered_rules" | "discoveredrules" => {
                Some(SourceType::DiscoveredRule)
            }
            _ => None,
        }
    }

    /// Whether candidates of this type carry an appointment sequence.
    pub fn carries_sequence(&self) -> bool {
        matches!(
            self,
            SourceType::ClinicalCase | SourceType::ApprovedSequence | SourceType::IdealSequence
        )
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match-quality tier that produced a candidate's boosted score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BoostReason {
    None,
    KeywordMatch,
    PrimaryTreatment,
    ExactMatch,
}

impl BoostReason {
    /// Score multiplier for this tier.
    pub fn multiplier(&self) -> f64 {
        match self {
            BoostReason::None => 1.0,
            BoostReason::KeywordMatch => 1.2,
            BoostReason::PrimaryTreatment => 1.5,
            BoostReason::ExactMatch => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoostReason::None => "none",
            BoostReason::KeywordMatch => "keyword_match",
            BoostReason::PrimaryTreatment => "primary_treatment",
            BoostReason::ExactMatch => "exact_match",
        }
    }
}

/// Rule-specific fields carried by discovered rule candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleDetails {
    pub description: String,
    pub clinical_reasoning: String,
    /// Confidence 0 - 100
    pub confidence: f64,
    pub conditions: Vec<String>,
    pub exceptions: Vec<String>,
    pub priority: String,
}

/// Source-specific data attached to a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidatePayload {
    /// Provenance (document collection, practitioner, rule engine)
    pub source: String,
    pub filename: String,
    pub categories: Vec<String>,
    /// Consultation text after abbreviation expansion
    pub consultation_text_expanded: Option<String>,
    /// Appointment sequence for case/sequence sources
    pub sequence: Vec<Appointment>,
    pub rule: Option<RuleDetails>,
}

/// A reference case returned by one retrieval pass and ranked by the scoring engine.
///
/// Identity is `(source_type, id)`. `boosted_score >= similarity_score` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalCandidate {
    pub id: String,
    pub source_type: SourceType,
    pub title: String,
    pub consultation_text: String,
    /// Raw similarity in [0, 1]
    pub similarity_score: f64,
    /// Similarity after the boost multiplier, in [0, 2]
    pub boosted_score: f64,
    pub boost_reason: BoostReason,
    pub payload: CandidatePayload,
}

impl RetrievalCandidate {
    /// Create an unboosted candidate. Similarity is clamped into [0, 1].
    pub fn new(
        id: impl Into<String>,
        source_type: SourceType,
        title: impl Into<String>,
        consultation_text: impl Into<String>,
        similarity_score: f64,
    ) -> Self {
        let similarity = clamp_similarity(similarity_score);
        Self {
            id: id.into(),
            source_type,
            title: title.into(),
            consultation_text: consultation_text.into(),
            similarity_score: similarity,
            boosted_score: similarity,
            boost_reason: BoostReason::None,
            payload: CandidatePayload::default(),
        }
    }

    /// Identity used for deduplication.
    pub fn identity(&self) -> (SourceType, &str) {
        (self.source_type, self.id.as_str())
    }

    /// Set the boost tier and recompute the boosted score from the raw similarity.
    pub fn apply_boost(&mut self, reason: BoostReason) {
        self.boost_reason = reason;
        self.boosted_score = self.similarity_score * reason.multiplier();
    }

    pub fn is_boosted(&self) -> bool {
        self.boost_reason != BoostReason::None
    }
}

/// Clamp a similarity into [0, 1], mapping NaN to 0.
pub fn clamp_similarity(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
