//! Per-request search settings.
//!
//! Settings arrive as loosely-typed JSON from the host application. They are
//! read into [`RawSearchSettings`] and normalized by [`SearchSettings::from_raw`]:
//! out-of-range values are clamped, missing or non-finite values take defaults.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::SourceType;

/// Upper bound for any per-source result cap.
pub const MAX_PER_SOURCE_CAP: usize = 20;

/// How closely generation should follow retrieved references.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    Strict,
    #[default]
    Adaptive,
    Creative,
}

impl ReasoningMode {
    /// Parse a mode name; unknown names fall back to adaptive.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "strict" => ReasoningMode::Strict,
            "creative" => ReasoningMode::Creative,
            _ => ReasoningMode::Adaptive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningMode::Strict => "strict",
            ReasoningMode::Adaptive => "adaptive",
            ReasoningMode::Creative => "creative",
        }
    }
}

/// Settings payload as sent by callers, before validation.
///
/// Values of the wrong JSON type read as absent; numbers and flags sent as
/// strings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchSettings {
    /// Caps keyed by source type name
    #[serde(default, alias = "per_source_cap", deserialize_with = "lenient::caps")]
    pub per_source_cap: Option<HashMap<String, f64>>,
    #[serde(default, alias = "clinical_cases_count", deserialize_with = "lenient::number")]
    pub clinical_cases_count: Option<f64>,
    #[serde(default, alias = "approved_sequences_count", deserialize_with = "lenient::number")]
    pub approved_sequences_count: Option<f64>,
    #[serde(default, alias = "ideal_sequences_count", deserialize_with = "lenient::number")]
    pub ideal_sequences_count: Option<f64>,
    #[serde(default, alias = "knowledge_count", deserialize_with = "lenient::number")]
    pub knowledge_count: Option<f64>,
    #[serde(default, alias = "discovered_rules_count", deserialize_with = "lenient::number")]
    pub discovered_rules_count: Option<f64>,
    #[serde(
        default,
        alias = "similarity_threshold",
        alias = "similarityThresholdPct",
        alias = "similarity_threshold_pct",
        deserialize_with = "lenient::number"
    )]
    pub similarity_threshold: Option<f64>,
    #[serde(default, alias = "rag_preference", deserialize_with = "lenient::number")]
    pub rag_preference: Option<f64>,
    #[serde(default, alias = "reasoning_mode", deserialize_with = "lenient::text")]
    pub reasoning_mode: Option<String>,
    #[serde(
        default,
        alias = "showSimilarityScores",
        alias = "show_scores",
        alias = "show_similarity_scores",
        deserialize_with = "lenient::flag"
    )]
    pub show_scores: Option<bool>,
    #[serde(default, alias = "use_discovered_rules", deserialize_with = "lenient::flag")]
    pub use_discovered_rules: Option<bool>,
    #[serde(default, alias = "min_rule_confidence", deserialize_with = "lenient::number")]
    pub min_rule_confidence: Option<f64>,
    #[serde(default, alias = "explain_reasoning", deserialize_with = "lenient::flag")]
    pub explain_reasoning: Option<bool>,
}

/// Validated settings for one retrieval request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchSettings {
    /// Maximum results per source, each in [1, 20]
    pub per_source_cap: BTreeMap<SourceType, usize>,
    /// Minimum raw similarity, percent in [0, 100]
    pub similarity_threshold_pct: f64,
    /// Negative favors clinical cases, positive favors ideal sequences; [-100, 100]
    pub rag_preference: i32,
    pub reasoning_mode: ReasoningMode,
    pub show_scores: bool,
    pub use_discovered_rules: bool,
    /// Minimum rule confidence, [0, 100]
    pub min_rule_confidence: f64,
    pub explain_reasoning: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            per_source_cap: SourceType::ALL
                .iter()
                .map(|s| (*s, default_cap(*s)))
                .collect(),
            similarity_threshold_pct: 60.0,
            rag_preference: 0,
            reasoning_mode: ReasoningMode::Adaptive,
            show_scores: true,
            use_discovered_rules: true,
            min_rule_confidence: 60.0,
            explain_reasoning: true,
        }
    }
}

impl SearchSettings {
    /// Normalize a raw payload.
    pub fn from_raw(raw: &RawSearchSettings) -> Self {
        let defaults = Self::default();

        let mut caps = defaults.per_source_cap.clone();
        let legacy = [
            (SourceType::ClinicalCase, raw.clinical_cases_count),
            (SourceType::ApprovedSequence, raw.approved_sequences_count),
            (SourceType::IdealSequence, raw.ideal_sequences_count),
            (SourceType::GeneralKnowledge, raw.knowledge_count),
            (SourceType::DiscoveredRule, raw.discovered_rules_count),
        ];
        for (source, value) in legacy {
            if let Some(cap) = finite(value) {
                caps.insert(source, clamp_cap(cap));
            }
        }
        // Explicit map entries take precedence over the legacy count keys
        if let Some(map) = &raw.per_source_cap {
            for (name, value) in map {
                match (SourceType::parse(name), finite(Some(*value))) {
                    (Some(source), Some(cap)) => {
                        caps.insert(source, clamp_cap(cap));
                    }
                    _ => tracing::debug!(key = %name, "Ignoring per-source cap entry"),
                }
            }
        }

        Self {
            per_source_cap: caps,
            similarity_threshold_pct: finite(raw.similarity_threshold)
                .map(|v| v.clamp(0.0, 100.0))
                .unwrap_or(defaults.similarity_threshold_pct),
            rag_preference: finite(raw.rag_preference)
                .map(|v| v.clamp(-100.0, 100.0).round() as i32)
                .unwrap_or(defaults.rag_preference),
            reasoning_mode: raw
                .reasoning_mode
                .as_deref()
                .map(ReasoningMode::parse)
                .unwrap_or(defaults.reasoning_mode),
            show_scores: raw.show_scores.unwrap_or(defaults.show_scores),
            use_discovered_rules: raw
                .use_discovered_rules
                .unwrap_or(defaults.use_discovered_rules),
            min_rule_confidence: finite(raw.min_rule_confidence)
                .map(|v| v.clamp(0.0, 100.0))
                .unwrap_or(defaults.min_rule_confidence),
            explain_reasoning: raw.explain_reasoning.unwrap_or(defaults.explain_reasoning),
        }
    }

    /// Parse and normalize a JSON settings payload. An empty string yields defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawSearchSettings = serde_json::from_str(json)?;
        Ok(Self::from_raw(&raw))
    }

    /// Result cap for a source, in [1, 20] even when the map was filled directly.
    pub fn cap(&self, source: SourceType) -> usize {
        self.per_source_cap
            .get(&source)
            .copied()
            .unwrap_or_else(|| default_cap(source))
            .clamp(1, MAX_PER_SOURCE_CAP)
    }

    /// Set a cap, clamped into [1, 20].
    pub fn with_cap(mut self, source: SourceType, cap: usize) -> Self {
        self.per_source_cap
            .insert(source, cap.clamp(1, MAX_PER_SOURCE_CAP));
        self
    }

    /// Threshold as a fraction in [0, 1].
    pub fn threshold(&self) -> f64 {
        self.similarity_threshold_pct / 100.0
    }
}

/// Deserializers for loosely-typed fields.
mod lenient {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(as_number(&Value::deserialize(d)?))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Some(b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn caps<'de, D: Deserializer<'de>>(d: D) -> Result<Option<HashMap<String, f64>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Object(map) => Some(
                map.iter()
                    .filter_map(|(key, value)| as_number(value).map(|n| (key.clone(), n)))
                    .collect(),
            ),
            _ => None,
        })
    }
}

fn default_cap(source: SourceType) -> usize {
    match source {
        SourceType::ClinicalCase => 3,
        SourceType::ApprovedSequence => 3,
        SourceType::IdealSequence => 2,
        SourceType::GeneralKnowledge => 2,
        SourceType::DiscoveredRule => 3,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn clamp_cap(value: f64) -> usize {
    value.round().clamp(1.0, MAX_PER_SOURCE_CAP as f64) as usize
}
