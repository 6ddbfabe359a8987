//! Knowledge base: reference entries loaded from disk and indexed per source type.
//!
//! File format: `{"data": [entry, ...]}`. Each entry is a clinical case, an
//! ideal sequence or a general knowledge item; the `type` field decides which.

mod documents;
mod indexer;

pub use documents::*;
pub use indexer::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::index::IndexError;
use crate::models::{Appointment, SourceType, TreatmentPlan};
use crate::query::AbbreviationExpander;

/// Knowledge base errors.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// One knowledge base entry as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub entry_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub consultation_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub treatment_sequence: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub treatment_sequence_enhanced: Vec<Value>,
    /// Fields not used for retrieval (content, stats, metadata...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KnowledgeEntry {
    /// Source type from the `type` field. Unknown types are general knowledge.
    pub fn source_type(&self) -> SourceType {
        match SourceType::parse(&self.entry_type) {
            Some(SourceType::DiscoveredRule) | None => SourceType::GeneralKnowledge,
            Some(source) => source,
        }
    }

    /// Text the entry is about: the consultation, falling back to the title.
    pub fn consultation(&self) -> &str {
        let consultation = self.consultation_text.trim();
        if consultation.is_empty() {
            self.title.as_deref().map(str::trim).unwrap_or_default()
        } else {
            consultation
        }
    }

    /// Appointment sequence, preferring the enhanced version when present.
    pub fn sequence(&self) -> Vec<Appointment> {
        let items = if self.treatment_sequence_enhanced.is_empty() {
            &self.treatment_sequence
        } else {
            &self.treatment_sequence_enhanced
        };
        let appointments = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| Appointment::from_value(item, i))
            .collect();
        TreatmentPlan::new(self.consultation(), appointments).sequence
    }

    /// Union of appointment categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .treatment_sequence_enhanced
            .iter()
            .flat_map(|item| crate::models::string_list(item.get("categories")))
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// The loaded knowledge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub data: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Load a knowledge base file. A missing file yields an empty base.
    pub fn load<P: AsRef<Path>>(path: P) -> KnowledgeResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Knowledge base file not found, starting empty");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let base = Self::from_json_str(&text)?;
        tracing::info!(entries = base.len(), "Loaded knowledge base");
        Ok(base)
    }

    pub fn from_json_str(json: &str) -> KnowledgeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Id under which entry `i` is indexed.
    pub fn entry_id(&self, i: usize) -> String {
        self.data
            .get(i)
            .and_then(|e| e.id.clone())
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("enhanced_{i}"))
    }

    /// Find an entry by its indexed id.
    pub fn find(&self, id: &str) -> Option<&KnowledgeEntry> {
        (0..self.data.len())
            .find(|i| self.entry_id(*i) == id)
            .and_then(|i| self.data.get(i))
    }

    /// SHA-256 over the serialized base and the abbreviation table.
    pub fn fingerprint<'a>(
        &self,
        abbreviations: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> KnowledgeResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self)?);
        for (short, canonical) in abbreviations {
            hasher.update(short.as_bytes());
            hasher.update([0u8]);
            hasher.update(canonical.as_bytes());
            hasher.update([0u8]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Entry counts per source type.
    pub fn counts(&self) -> BTreeMap<SourceType, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.data {
            *counts.entry(entry.source_type()).or_insert(0) += 1;
        }
        counts
    }

    /// Full detail of the entry indexed under `id`, laid out as it was indexed.
    pub fn detail(&self, id: &str, expander: &AbbreviationExpander) -> Option<DetailedReference> {
        let position = (0..self.data.len()).find(|i| self.entry_id(*i) == id)?;
        let entry = self.data.get(position)?;
        let doc = entry_document(entry, position, expander);
        let field = |key: &str| meta_str(&doc.metadata, key).unwrap_or_default();

        Some(DetailedReference {
            id: id.to_string(),
            source_type: entry.source_type(),
            title: field("title"),
            filename: field("filename"),
            source: field("source"),
            consultation_text: field("consultation_text"),
            consultation_text_expanded: field("consultation_text_expanded"),
            sequence: entry.sequence(),
            categories: entry.categories(),
            extra: entry.extra.clone(),
        })
    }
}

/// Full detail of one knowledge item, for a reference drill-down.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetailedReference {
    pub id: String,
    pub source_type: SourceType,
    pub title: String,
    pub filename: String,
    pub source: String,
    pub consultation_text: String,
    pub consultation_text_expanded: String,
    pub sequence: Vec<Appointment>,
    pub categories: Vec<String>,
    pub extra: Map<String, Value>,
}

/// Knowledge base and index counts.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct KnowledgeStatistics {
    pub total_entries: usize,
    /// Entries on disk per source type
    pub entries: BTreeMap<SourceType, usize>,
    /// Documents in the index per source type
    pub indexed: BTreeMap<SourceType, usize>,
    pub fingerprint: Option<String>,
}

/// A distilled guideline produced by offline analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredRule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub clinical_reasoning: String,
    /// Confidence 0 - 100
    pub confidence: f64,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub exceptions: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}
