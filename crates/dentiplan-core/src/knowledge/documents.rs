//! Index document layout.
//!
//! Each knowledge item becomes one index document whose text is the
//! consultation (plus its expansion) and whose metadata carries everything
//! needed to rebuild a [`RetrievalCandidate`] from a hit.

use serde_json::{json, Map, Value};

use super::{DiscoveredRule, KnowledgeEntry};
use crate::index::IndexHit;
use crate::models::{
    string_list, Appointment, CandidatePayload, RetrievalCandidate, RuleDetails, SourceType,
    TreatmentPlan,
};
use crate::query::{searchable, AbbreviationExpander};

/// Text and metadata for one index document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Build the index document for a knowledge base entry.
pub fn entry_document(
    entry: &KnowledgeEntry,
    position: usize,
    expander: &AbbreviationExpander,
) -> IndexDocument {
    let consultation = entry.consultation().to_string();
    let expanded = expander.expand(&consultation);
    let source_type = entry.source_type();
    let filename = entry
        .filename
        .clone()
        .unwrap_or_else(|| format!("entry_{position}"));

    let title = match entry.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None if source_type == SourceType::IdealSequence
            && filename.to_lowercase().contains("sequence") =>
        {
            ideal_sequence_title(&filename, &consultation)
        }
        None => consultation.clone(),
    };

    let sequence = entry.sequence();
    let mut metadata = Map::new();
    metadata.insert("type".into(), json!(source_type.as_str()));
    metadata.insert("title".into(), json!(title));
    metadata.insert("consultation_text".into(), json!(consultation));
    metadata.insert("consultation_text_expanded".into(), json!(expanded));
    metadata.insert("filename".into(), json!(filename));
    metadata.insert(
        "source".into(),
        json!(entry.source.clone().unwrap_or_else(|| "unknown".into())),
    );
    metadata.insert("categories".into(), json!(entry.categories()));
    metadata.insert("treatment_sequence".into(), json!(sequence));

    IndexDocument {
        text: searchable(&consultation, &expanded),
        metadata,
    }
}

/// Build the index document for a discovered rule.
pub fn rule_document(rule: &DiscoveredRule) -> IndexDocument {
    let text = if rule.description.trim().is_empty() {
        rule.title.clone()
    } else {
        format!("{}\n{}", rule.title, rule.description)
    };

    let mut metadata = Map::new();
    metadata.insert("type".into(), json!(SourceType::DiscoveredRule.as_str()));
    metadata.insert("title".into(), json!(rule.title));
    metadata.insert("consultation_text".into(), json!(rule.title));
    metadata.insert("source".into(), json!("discovered_rules"));
    metadata.insert("description".into(), json!(rule.description));
    metadata.insert("clinical_reasoning".into(), json!(rule.clinical_reasoning));
    metadata.insert("confidence".into(), json!(rule.confidence.clamp(0.0, 100.0)));
    metadata.insert("conditions".into(), json!(rule.conditions));
    metadata.insert("exceptions".into(), json!(rule.exceptions));
    metadata.insert("priority".into(), json!(rule.priority));

    IndexDocument { text, metadata }
}

/// Build the index document for a practitioner-approved plan.
pub fn approved_document(
    title: &str,
    plan: &TreatmentPlan,
    approved_by: &str,
    expander: &AbbreviationExpander,
) -> IndexDocument {
    let consultation = plan.consultation_text.trim().to_string();
    let expanded = expander.expand(&consultation);

    let mut metadata = Map::new();
    metadata.insert("type".into(), json!(SourceType::ApprovedSequence.as_str()));
    metadata.insert("title".into(), json!(title));
    metadata.insert("consultation_text".into(), json!(consultation));
    metadata.insert("consultation_text_expanded".into(), json!(expanded));
    metadata.insert("filename".into(), json!("approved_sequences"));
    metadata.insert("source".into(), json!(approved_by));
    metadata.insert("categories".into(), json!(Vec::<String>::new()));
    metadata.insert("treatment_sequence".into(), json!(plan.sequence));
    metadata.insert("approved_at".into(), json!(chrono::Utc::now().to_rfc3339()));

    IndexDocument {
        text: searchable(&consultation, &expanded),
        metadata,
    }
}

/// Rebuild a candidate from an index hit.
pub fn candidate_from_hit(source_type: SourceType, hit: &IndexHit) -> RetrievalCandidate {
    let meta = &hit.metadata;
    let consultation = meta_str(meta, "consultation_text")
        .or_else(|| hit.document.lines().next().map(|l| l.trim().to_string()))
        .unwrap_or_default();
    let title = meta_str(meta, "title").unwrap_or_else(|| consultation.clone());

    let mut candidate =
        RetrievalCandidate::new(&hit.id, source_type, title, consultation, hit.similarity());

    let sequence = meta
        .get("treatment_sequence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| Appointment::from_value(item, i))
                .collect()
        })
        .unwrap_or_default();

    let rule = (source_type == SourceType::DiscoveredRule).then(|| RuleDetails {
        description: meta_str(meta, "description").unwrap_or_default(),
        clinical_reasoning: meta_str(meta, "clinical_reasoning").unwrap_or_default(),
        confidence: meta.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
        conditions: string_list(meta.get("conditions")),
        exceptions: string_list(meta.get("exceptions")),
        priority: meta_str(meta, "priority").unwrap_or_else(|| "medium".into()),
    });

    candidate.payload = CandidatePayload {
        source: meta_str(meta, "source").unwrap_or_else(|| "unknown".into()),
        filename: meta_str(meta, "filename").unwrap_or_default(),
        categories: string_list(meta.get("categories")),
        consultation_text_expanded: meta_str(meta, "consultation_text_expanded"),
        sequence,
        rule,
    };
    candidate
}

fn ideal_sequence_title(filename: &str, consultation: &str) -> String {
    let clean = filename
        .replace('_', " ")
        .replace(".docx", "")
        .replace(".json", "");
    format!("{} - {}", clean.trim(), consultation.trim())
        .trim_matches(|c| c == ' ' || c == '-')
        .to_string()
}

pub(crate) fn meta_str(meta: &Map<String, Value>, key: &str) -> Option<String> {
    meta.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
