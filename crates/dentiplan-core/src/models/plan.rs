//! Treatment plan models.
//!
//! Serialized field names follow the French wire format used by the
//! generator and the knowledge base (`rdv`, `traitement`, `duree`, ...).
//! Parsing from loose JSON goes through [`TreatmentPlan::from_value`], which
//! also accepts the English field names and tolerates numbers or nulls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that may hold the appointment array of a plan.
pub const SEQUENCE_KEYS: [&str; 2] = ["treatment_sequence", "sequence"];

/// One step of a treatment sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// 1-based position in the sequence
    #[serde(rename = "rdv")]
    pub index: u32,
    #[serde(rename = "traitement")]
    pub treatment_description: String,
    #[serde(rename = "duree", default)]
    pub duration: String,
    #[serde(rename = "delai", default)]
    pub delay_before_next: String,
    #[serde(rename = "dr", default)]
    pub practitioner: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "remarque", default)]
    pub notes: String,
    #[serde(
        rename = "traitement_expanded",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expanded_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl Appointment {
    pub fn new(index: u32, treatment_description: impl Into<String>) -> Self {
        Self {
            index,
            treatment_description: treatment_description.into(),
            ..Default::default()
        }
    }

    /// Read an appointment from a loose JSON object.
    ///
    /// Returns `None` when the value is not an object or has no treatment text.
    /// `position` (0-based) is used when the object carries no usable index.
    pub fn from_value(value: &Value, position: usize) -> Option<Self> {
        let obj = value.as_object()?;

        let treatment_description =
            text_field(obj, &["traitement", "treatment", "treatment_description", "description"])?;

        let index = text_field(obj, &["rdv", "index", "appointment"])
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(position as u32 + 1);

        Some(Self {
            index,
            treatment_description,
            duration: text_field(obj, &["duree", "durée", "duration"]).unwrap_or_default(),
            delay_before_next: text_field(obj, &["delai", "délai", "delay", "delay_before_next"])
                .unwrap_or_default(),
            practitioner: text_field(obj, &["dr", "practitioner", "doctor"]).unwrap_or_default(),
            date: text_field(obj, &["date"]).unwrap_or_default(),
            notes: text_field(obj, &["remarque", "notes", "note", "remarks"]).unwrap_or_default(),
            expanded_description: text_field(
                obj,
                &["traitement_expanded", "treatment_expanded", "expanded_description"],
            ),
            categories: string_list(obj.get("categories")),
        })
    }

    /// Treatment text for display, preferring the expanded form.
    pub fn display_treatment(&self) -> &str {
        self.expanded_description
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.treatment_description)
    }
}

/// An ordered appointment sequence with the consultation it answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreatmentPlan {
    #[serde(default)]
    pub consultation_text: String,
    #[serde(rename = "treatment_sequence", alias = "sequence")]
    pub sequence: Vec<Appointment>,
}

impl TreatmentPlan {
    pub fn new(consultation_text: impl Into<String>, sequence: Vec<Appointment>) -> Self {
        let mut plan = Self {
            consultation_text: consultation_text.into(),
            sequence,
        };
        plan.renumber();
        plan
    }

    /// Build a plan from a JSON object holding a `treatment_sequence` or `sequence` array.
    ///
    /// Returns `None` when no such array exists. Items without treatment text are
    /// dropped and the remaining items are renumbered from 1 in their original order.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let items = SEQUENCE_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))?;

        let sequence = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| Appointment::from_value(item, i))
            .collect();

        let consultation_text =
            text_field(obj, &["consultation_text", "consultation", "consultation_text_expanded"])
                .unwrap_or_default();

        Some(Self::new(consultation_text, sequence))
    }

    /// Parse a plan from JSON text. See [`TreatmentPlan::from_value`].
    pub fn from_json_str(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        Self::from_value(&value)
    }

    /// Renumber appointments 1..n in their current order.
    pub fn renumber(&mut self) {
        for (i, appt) in self.sequence.iter_mut().enumerate() {
            appt.index = i as u32 + 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }
}

/// First non-empty scalar among `keys`, as trimmed text.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// A list of strings from either a JSON array or a comma separated string.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
