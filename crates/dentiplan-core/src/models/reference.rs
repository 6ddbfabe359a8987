//! Reference records shown to the user alongside a generated plan.

use serde::{Deserialize, Serialize};

use super::candidate::{RetrievalCandidate, SourceType};

/// A user-facing pointer to a knowledge item that informed a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub title: String,
    pub id: String,
    pub source: String,
    pub filename: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Percentage 0 - 100, present only when scores are shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

impl Reference {
    /// Build a reference from a candidate, optionally carrying its raw similarity as a percentage.
    pub fn from_candidate(candidate: &RetrievalCandidate, show_score: bool) -> Self {
        Self {
            source_type: candidate.source_type,
            title: candidate.title.clone(),
            id: candidate.id.clone(),
            source: candidate.payload.source.clone(),
            filename: candidate.payload.filename.clone(),
            categories: candidate.payload.categories.clone(),
            similarity_score: show_score.then(|| candidate.similarity_score * 100.0),
        }
    }
}
