//! Prompt context: category ordering, relevance tiers and the current-plan section.
//!
//! Rendered text is French, the working language of the prompts it feeds.

mod assembler;
mod modification;

pub use assembler::*;
pub use modification::*;

use serde::{Deserialize, Serialize};

use crate::models::{Appointment, RetrievalCandidate, SourceType};

/// Preference magnitude beyond which one side is floated first.
pub const PREFERENCE_DEADBAND: i32 = 20;

/// Number of appointments shown for a moderate-tier candidate.
pub const SUMMARY_APPOINTMENTS: usize = 3;

/// Relevance tier of a retained candidate, from its boosted score capped at 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceTier {
    Moderate,
    High,
    VeryHigh,
    Exact,
}

impl RelevanceTier {
    pub fn from_score(score: f64) -> Self {
        let score = display_score(score);
        if score >= 0.95 {
            RelevanceTier::Exact
        } else if score >= 0.90 {
            RelevanceTier::VeryHigh
        } else if score >= 0.80 {
            RelevanceTier::High
        } else {
            RelevanceTier::Moderate
        }
    }

    pub fn of(candidate: &RetrievalCandidate) -> Self {
        Self::from_score(candidate.boosted_score)
    }

    /// High tier and above render their full appointment sequence.
    pub fn renders_full_sequence(&self) -> bool {
        *self >= RelevanceTier::High
    }

    /// Banner line announcing the tier, if any.
    pub fn banner(&self, pct: u32) -> Option<String> {
        match self {
            RelevanceTier::Exact => Some(format!(
                "🎯 CORRESPONDANCE EXACTE [{pct}%] - UTILISER CETTE SÉQUENCE EXACTEMENT 🎯"
            )),
            RelevanceTier::VeryHigh => Some(format!(
                "⚠️ TRÈS HAUTE SIMILARITÉ [{pct}%] - SUIVRE CE CAS PRÉCISÉMENT ⚠️"
            )),
            RelevanceTier::High => Some(format!("⚠️ HAUTE SIMILARITÉ [{pct}%] ⚠️")),
            RelevanceTier::Moderate => None,
        }
    }
}

/// Boosted score as used for display: capped at 1.0, NaN as 0.
pub fn display_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Whole percentage of a display score.
pub fn display_pct(score: f64) -> u32 {
    (display_score(score) * 100.0 + 1e-9).floor() as u32
}

/// Category order for the prompt. Discovered rules always come first.
pub fn presentation_order(rag_preference: i32) -> [SourceType; 5] {
    use SourceType::*;
    if rag_preference < -PREFERENCE_DEADBAND {
        [DiscoveredRule, ClinicalCase, ApprovedSequence, IdealSequence, GeneralKnowledge]
    } else if rag_preference > PREFERENCE_DEADBAND {
        [DiscoveredRule, IdealSequence, ApprovedSequence, ClinicalCase, GeneralKnowledge]
    } else {
        [DiscoveredRule, ApprovedSequence, ClinicalCase, IdealSequence, GeneralKnowledge]
    }
}

/// `RDV n: treatment (duration)` with an optional delay line.
pub(crate) fn appointment_lines(appt: &Appointment, indent: &str) -> Vec<String> {
    let duration = if appt.duration.trim().is_empty() {
        "N/A"
    } else {
        appt.duration.trim()
    };
    let mut lines = vec![format!(
        "{indent}RDV {}: {} ({duration})",
        appt.index,
        appt.display_treatment()
    )];
    if !appt.delay_before_next.trim().is_empty() {
        lines.push(format!("{indent}  Délai: {}", appt.delay_before_next.trim()));
    }
    lines
}
