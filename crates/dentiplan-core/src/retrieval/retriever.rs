//! Multi-pass retrieval across all source types.
//!
//! Per source type: one pass with the full request, then up to two passes
//! with priority keywords and one with a secondary keyword. A pass that fails
//! or overruns its time budget contributes nothing; the other passes still run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{RetrievalError, RetrievalResult};
use crate::cancel::CancellationToken;
use crate::index::{IndexFilter, IndexQuery, VectorIndex};
use crate::knowledge::candidate_from_hit;
use crate::models::{RetrievalCandidate, SourceType};
use crate::query::{searchable, AbbreviationExpander, QueryAnalysis};
use crate::settings::SearchSettings;

/// Maximum keyword passes per source.
const MAX_PRIORITY_PASSES: usize = 2;
const MAX_SECONDARY_PASSES: usize = 1;

/// Hits requested by the full-request pass, as a multiple of the source cap.
const QUERY_PASS_MULTIPLIER: usize = 2;
const PRIORITY_PASS_MAX_K: usize = 3;
const SECONDARY_PASS_MAX_K: usize = 2;

/// Kind of retrieval pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    FullQuery,
    PriorityKeyword,
    SecondaryKeyword,
}

/// One planned query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPass {
    pub kind: PassKind,
    /// Keyword driving the pass; `None` for the full-request pass
    pub keyword: Option<String>,
    /// Text sent to the index
    pub text: String,
    pub k: usize,
}

/// A candidate as returned by one pass, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub candidate: RetrievalCandidate,
    pub pass: PassKind,
    pub keyword: Option<String>,
    /// Position of the pass within its source
    pub pass_order: usize,
}

/// Unscored candidates per source type, in pass order then hit order.
pub type RawCandidatesBySource = BTreeMap<SourceType, Vec<RawCandidate>>;

/// Runs retrieval passes against a [`VectorIndex`].
pub struct MultiSourceRetriever<'a> {
    index: &'a dyn VectorIndex,
    expander: &'a AbbreviationExpander,
    timeout: Duration,
}

impl<'a> MultiSourceRetriever<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        expander: &'a AbbreviationExpander,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            expander,
            timeout,
        }
    }

    /// Source types queried under these settings.
    pub fn sources(settings: &SearchSettings) -> Vec<SourceType> {
        SourceType::ALL
            .into_iter()
            .filter(|s| *s != SourceType::DiscoveredRule || settings.use_discovered_rules)
            .collect()
    }

    /// Run every pass for every enabled source.
    pub fn retrieve(
        &self,
        analysis: &QueryAnalysis,
        settings: &SearchSettings,
        cancel: &CancellationToken,
    ) -> RetrievalResult<RawCandidatesBySource> {
        let mut results = BTreeMap::new();
        for source in Self::sources(settings) {
            let passes = self.plan_passes(analysis, settings, source);
            let mut raw = Vec::new();
            for (order, pass) in passes.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(RetrievalError::Cancelled);
                }
                raw.extend(self.run_pass(source, pass, order, settings));
            }
            results.insert(source, raw);
        }
        Ok(results)
    }

    /// Passes for one source, in execution order.
    pub fn plan_passes(
        &self,
        analysis: &QueryAnalysis,
        settings: &SearchSettings,
        source: SourceType,
    ) -> Vec<RetrievalPass> {
        let cap = settings.cap(source);
        let mut passes = Vec::new();

        if !analysis.original.is_empty() {
            passes.push(RetrievalPass {
                kind: PassKind::FullQuery,
                keyword: None,
                text: analysis.searchable_text(),
                k: cap * QUERY_PASS_MULTIPLIER,
            });
        }

        for keyword in analysis.priority_keywords().take(MAX_PRIORITY_PASSES) {
            passes.push(self.keyword_pass(
                PassKind::PriorityKeyword,
                &keyword.text,
                cap.min(PRIORITY_PASS_MAX_K),
            ));
        }
        for keyword in analysis.secondary_keywords().take(MAX_SECONDARY_PASSES) {
            passes.push(self.keyword_pass(
                PassKind::SecondaryKeyword,
                &keyword.text,
                cap.min(SECONDARY_PASS_MAX_K),
            ));
        }
        passes
    }

    fn keyword_pass(&self, kind: PassKind, keyword: &str, k: usize) -> RetrievalPass {
        RetrievalPass {
            kind,
            keyword: Some(keyword.to_string()),
            text: searchable(keyword, &self.expander.expand(keyword)),
            k,
        }
    }

    fn run_pass(
        &self,
        source: SourceType,
        pass: &RetrievalPass,
        order: usize,
        settings: &SearchSettings,
    ) -> Vec<RawCandidate> {
        let mut query = IndexQuery::new(source, &pass.text, pass.k, self.timeout);
        if source == SourceType::DiscoveredRule {
            query = query.with_filter(IndexFilter::MinConfidence(settings.min_rule_confidence));
        }

        let started = Instant::now();
        let hits = match self.index.query(&query) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    source = %source,
                    pass = ?pass.kind,
                    error = %e,
                    "Retrieval pass failed"
                );
                return Vec::new();
            }
        };
        if started.elapsed() > self.timeout {
            tracing::warn!(
                source = %source,
                pass = ?pass.kind,
                timeout_ms = self.timeout.as_millis() as u64,
                "Retrieval pass exceeded its time budget"
            );
            return Vec::new();
        }

        let raw: Vec<RawCandidate> = hits
            .iter()
            .take(pass.k)
            .map(|hit| candidate_from_hit(source, hit))
            .filter(|c| match &c.payload.rule {
                Some(rule) => rule.confidence >= settings.min_rule_confidence,
                None => source != SourceType::DiscoveredRule,
            })
            .map(|candidate| RawCandidate {
                candidate,
                pass: pass.kind,
                keyword: pass.keyword.clone(),
                pass_order: order,
            })
            .collect();

        tracing::debug!(source = %source, pass = ?pass.kind, hits = raw.len(), "Retrieval pass");
        raw
    }
}
