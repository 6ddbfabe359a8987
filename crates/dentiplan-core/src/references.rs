//! Reference list for display.

use crate::models::{Reference, SourceType};
use crate::retrieval::CandidatesBySource;
use crate::settings::SearchSettings;

/// One reference per retained candidate.
///
/// With scores shown, the list is sorted by raw similarity descending across
/// categories; otherwise it follows [`SourceType::ALL`] order and each
/// category keeps its ranked order.
pub fn format_references(
    filtered: &CandidatesBySource,
    settings: &SearchSettings,
) -> Vec<Reference> {
    let mut references: Vec<Reference> = SourceType::ALL
        .iter()
        .filter_map(|source| filtered.get(source))
        .flatten()
        .map(|candidate| Reference::from_candidate(candidate, settings.show_scores))
        .collect();

    if settings.show_scores {
        references.sort_by(|a, b| {
            b.similarity_score
                .unwrap_or(0.0)
                .partial_cmp(&a.similarity_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    references
}
