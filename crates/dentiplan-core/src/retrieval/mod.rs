//! Retrieval pipeline: multi-pass search, boost scoring and threshold filtering.

mod retriever;
mod scoring;
mod threshold;

pub use retriever::*;
pub use scoring::*;
pub use threshold::*;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{RetrievalCandidate, SourceType};
use crate::query::{AbbreviationExpander, QueryAnalysis};
use crate::settings::SearchSettings;

/// Retrieval errors. Index failures never surface here; they empty a pass.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval cancelled")]
    Cancelled,
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Retained candidates per source type, each list ranked by boosted score.
pub type CandidatesBySource = BTreeMap<SourceType, Vec<RetrievalCandidate>>;

/// Score, cap and threshold raw results, independently per source.
pub fn rank_and_filter(
    raw: RawCandidatesBySource,
    analysis: &QueryAnalysis,
    expander: &AbbreviationExpander,
    settings: &SearchSettings,
) -> CandidatesBySource {
    let engine = ScoringEngine::new(expander);
    let filter = ThresholdFilter::new(settings.similarity_threshold_pct);

    raw.into_iter()
        .map(|(source, candidates)| {
            let ranked = engine.score_and_cap(candidates, analysis, settings.cap(source));
            let kept = filter.filter(ranked);
            tracing::debug!(source = %source, kept = kept.len(), "Ranked source");
            (source, kept)
        })
        .collect()
}
