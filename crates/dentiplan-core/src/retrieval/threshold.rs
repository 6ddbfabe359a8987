//! Raw-similarity floor.

use crate::models::RetrievalCandidate;

/// Drops candidates whose raw similarity is below a percentage threshold.
///
/// Boosting never rescues a candidate: only `similarity_score` is compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdFilter {
    threshold: f64,
}

impl ThresholdFilter {
    /// Threshold as a percentage, clamped into [0, 100].
    pub fn new(threshold_pct: f64) -> Self {
        let pct = if threshold_pct.is_finite() {
            threshold_pct.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            threshold: pct / 100.0,
        }
    }

    pub fn keeps(&self, candidate: &RetrievalCandidate) -> bool {
        // Tolerance for percentages that do not divide exactly
        candidate.similarity_score + 1e-9 >= self.threshold
    }

    pub fn filter(&self, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        candidates.into_iter().filter(|c| self.keeps(c)).collect()
    }
}
