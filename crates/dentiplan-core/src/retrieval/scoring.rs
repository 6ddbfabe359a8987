//! Boost tiers, deduplication and ranking.
//!
//! Tiers, first match wins:
//! - exact_match (x2.0): consultation equals the request, a keyword, or a tooth + keyword form
//! - primary_treatment (x1.5): a keyword appears in a short consultation (at most 5 words)
//! - keyword_match (x1.2): a keyword appears anywhere in the consultation
//! - none (x1.0)

use std::collections::HashMap;

use super::{PassKind, RawCandidate};
use crate::models::{BoostReason, RetrievalCandidate, SourceType};
use crate::query::{contains_word, AbbreviationExpander, KeywordKind, QueryAnalysis};

/// Consultations with at most this many words are "about" a matched treatment.
pub const PRIMARY_TREATMENT_MAX_WORDS: usize = 5;

/// Terms a candidate is matched against for one retrieval pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchTerms {
    /// Lowercased texts that count as an exact match
    pub exact: Vec<String>,
    /// Lowercased keywords checked for whole-word containment
    pub contained: Vec<String>,
}

impl MatchTerms {
    fn push_exact(&mut self, term: &str) {
        let term = normalize(term);
        if !term.is_empty() && !self.exact.contains(&term) {
            self.exact.push(term);
        }
    }

    fn push_contained(&mut self, term: &str) {
        let term = normalize(term);
        if !term.is_empty() && !self.contained.contains(&term) {
            self.contained.push(term);
        }
    }

    /// Evaluate the boost tier of a consultation text.
    pub fn evaluate(&self, consultation: &str) -> BoostReason {
        let text = normalize(consultation);
        if text.is_empty() {
            return BoostReason::None;
        }
        if self.exact.iter().any(|term| *term == text) {
            return BoostReason::ExactMatch;
        }
        if !self.contained.iter().any(|term| contains_word(&text, term)) {
            return BoostReason::None;
        }
        if text.split_whitespace().count() <= PRIMARY_TREATMENT_MAX_WORDS {
            BoostReason::PrimaryTreatment
        } else {
            BoostReason::KeywordMatch
        }
    }
}

/// Assigns boost tiers and merges candidates across passes.
pub struct ScoringEngine<'a> {
    expander: &'a AbbreviationExpander,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(expander: &'a AbbreviationExpander) -> Self {
        Self { expander }
    }

    /// Terms for the full-request pass: the request, its expansion and every keyword.
    pub fn query_terms(&self, analysis: &QueryAnalysis) -> MatchTerms {
        let mut terms = MatchTerms::default();
        terms.push_exact(&analysis.original);
        terms.push_exact(&analysis.expanded);
        for keyword in &analysis.keywords {
            self.add_keyword(&mut terms, &keyword.text, tooth_number(analysis));
        }
        terms
    }

    /// Terms for a keyword pass: the keyword and its expansion.
    pub fn keyword_terms(&self, analysis: &QueryAnalysis, keyword: &str) -> MatchTerms {
        let mut terms = MatchTerms::default();
        self.add_keyword(&mut terms, keyword, tooth_number(analysis));
        terms
    }

    fn add_keyword(&self, terms: &mut MatchTerms, keyword: &str, tooth: Option<&str>) {
        let expanded = self.expander.expand(keyword);
        terms.push_exact(keyword);
        terms.push_exact(&expanded);
        terms.push_contained(keyword);
        terms.push_contained(&expanded);
        if normalize(&expanded) != normalize(keyword) {
            terms.push_exact(&format!("{keyword} ({expanded})"));
        }
        if let Some(tooth) = tooth {
            if !keyword.starts_with(tooth) {
                terms.push_exact(&format!("{tooth} {keyword}"));
                terms.push_exact(&format!("{tooth} {expanded}"));
            }
        }
    }

    /// Boost every raw candidate, merge duplicates keeping the higher boosted score,
    /// and sort by boosted score descending. Ties keep pass order, then hit order.
    pub fn score(
        &self,
        raw: Vec<RawCandidate>,
        analysis: &QueryAnalysis,
    ) -> Vec<RetrievalCandidate> {
        let query_terms = self.query_terms(analysis);
        let mut keyword_terms: HashMap<String, MatchTerms> = HashMap::new();

        let mut merged: Vec<RetrievalCandidate> = Vec::new();
        let mut positions: HashMap<(SourceType, String), usize> = HashMap::new();

        for item in raw {
            let terms: &MatchTerms = match (&item.pass, &item.keyword) {
                (PassKind::FullQuery, _) | (_, None) => &query_terms,
                (_, Some(keyword)) => keyword_terms
                    .entry(keyword.clone())
                    .or_insert_with(|| self.keyword_terms(analysis, keyword)),
            };

            let mut candidate = item.candidate;
            let reason = terms.evaluate(&candidate.consultation_text);
            candidate.apply_boost(reason);
            if reason != BoostReason::None {
                tracing::debug!(
                    id = %candidate.id,
                    similarity = candidate.similarity_score,
                    boosted = candidate.boosted_score,
                    reason = reason.as_str(),
                    "Boosted candidate"
                );
            }

            let key = (candidate.source_type, candidate.id.clone());
            match positions.get(&key) {
                Some(&pos) => {
                    if candidate.boosted_score > merged[pos].boosted_score {
                        merged[pos] = candidate;
                    }
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(candidate);
                }
            }
        }

        merged.sort_by(|a, b| {
            b.boosted_score
                .partial_cmp(&a.boosted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged
    }

    /// [`ScoringEngine::score`] truncated to `cap`.
    pub fn score_and_cap(
        &self,
        raw: Vec<RawCandidate>,
        analysis: &QueryAnalysis,
        cap: usize,
    ) -> Vec<RetrievalCandidate> {
        let mut scored = self.score(raw, analysis);
        scored.truncate(cap);
        scored
    }
}

/// Tooth number of the leading tooth combination keyword, if any.
fn tooth_number(analysis: &QueryAnalysis) -> Option<&str> {
    analysis
        .keywords
        .iter()
        .find(|k| k.kind == KeywordKind::ToothCombination)
        .and_then(|k| k.text.split_whitespace().next())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
