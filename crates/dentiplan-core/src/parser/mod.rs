//! Extraction of a structured treatment plan from generated text.
//!
//! The generator is asked to write its reasoning, then a
//! `### TREATMENT_PLAN_JSON ###` marker, then the plan as JSON. Output rarely
//! follows that shape exactly, so parsing runs an ordered chain:
//!
//! 1. find the most specific marker spelling and decode the outermost object after it;
//! 2. with no marker at all, scan the whole text for a brace-balanced object
//!    mentioning a sequence field;
//! 3. otherwise give the text back unchanged as [`ParseResult::Unstructured`].
//!
//! A marker followed by unusable JSON does not fall through to step 2.

mod json_scan;
mod markers;

pub use json_scan::{balanced_object_end, objects_containing, outermost_object};
pub use markers::{find_marker, MarkerMatch, MarkerVariant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::TreatmentPlan;

/// Quoted field names that identify a candidate plan object in free text.
const SEQUENCE_FIELD_NEEDLES: [&str; 2] = ["\"treatment_sequence\"", "\"sequence\""];

/// Which step of the chain produced a structured result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "stage", content = "marker", rename_all = "snake_case")]
pub enum ParseStage {
    Marker(MarkerVariant),
    LegacyScan,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::Marker(_) => "marker",
            ParseStage::LegacyScan => "legacy_scan",
        }
    }
}

/// Outcome of one parse attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseResult {
    Structured {
        plan: TreatmentPlan,
        reasoning: String,
        stage: ParseStage,
    },
    Unstructured {
        raw_text: String,
    },
}

impl ParseResult {
    pub fn is_structured(&self) -> bool {
        matches!(self, ParseResult::Structured { .. })
    }

    pub fn plan(&self) -> Option<&TreatmentPlan> {
        match self {
            ParseResult::Structured { plan, .. } => Some(plan),
            ParseResult::Unstructured { .. } => None,
        }
    }

    pub fn stage(&self) -> Option<ParseStage> {
        match self {
            ParseResult::Structured { stage, .. } => Some(*stage),
            ParseResult::Unstructured { .. } => None,
        }
    }
}

/// Parse generated text into a plan, or return it as plain text.
pub fn parse_generated_plan(text: &str) -> ParseResult {
    let structured = match find_marker(text) {
        Some(marker) => {
            tracing::debug!(variant = ?marker.variant, "Plan marker found");
            parse_after_marker(text, marker)
        }
        None => parse_legacy(text),
    };

    structured.unwrap_or_else(|| ParseResult::Unstructured {
        raw_text: text.to_string(),
    })
}

fn parse_after_marker(text: &str, marker: MarkerMatch) -> Option<ParseResult> {
    let reasoning = text[..marker.start].trim();
    let candidate = text[marker.end..].trim();

    let Some(json) = outermost_object(candidate) else {
        tracing::warn!(variant = ?marker.variant, "Plan marker present but no JSON object follows");
        return None;
    };

    match decode_plan(json) {
        Ok(plan) => Some(ParseResult::Structured {
            plan,
            reasoning: reasoning.to_string(),
            stage: ParseStage::Marker(marker.variant),
        }),
        Err(reason) => {
            tracing::warn!(
                variant = ?marker.variant,
                reason,
                "Plan marker present but JSON unusable"
            );
            None
        }
    }
}

fn parse_legacy(text: &str) -> Option<ParseResult> {
    objects_containing(text, &SEQUENCE_FIELD_NEEDLES).find_map(|(start, json)| {
        let plan = decode_plan(json).ok()?;
        tracing::debug!(start, appointments = plan.len(), "Plan recovered by legacy scan");
        Some(ParseResult::Structured {
            plan,
            reasoning: text[..start].trim().to_string(),
            stage: ParseStage::LegacyScan,
        })
    })
}

/// Decode an object holding a non-empty appointment array.
fn decode_plan(json: &str) -> Result<TreatmentPlan, &'static str> {
    let value: Value = serde_json::from_str(json).map_err(|_| "malformed JSON")?;
    if !value.is_object() {
        return Err("not an object");
    }
    let plan = TreatmentPlan::from_value(&value).ok_or("no sequence array")?;
    if plan.is_empty() {
        return Err("no usable appointment");
    }
    Ok(plan)
}
