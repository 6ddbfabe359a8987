//! Prompt context assembly.

use super::{
    appointment_lines, display_pct, presentation_order, RelevanceTier, SUMMARY_APPOINTMENTS,
};
use crate::models::{RetrievalCandidate, SourceType};
use crate::retrieval::CandidatesBySource;
use crate::settings::{ReasoningMode, SearchSettings};

const STRICT_BANNER: &str = "🔒 MODE STRICT: Suivre exactement les cas similaires sans adaptation.";
const CREATIVE_BANNER: &str =
    "🎨 MODE CRÉATIF: Utiliser les références comme inspiration avec liberté d'adaptation.";

/// Renders retained candidates into the context block of the generator prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Render all categories in preference order. Empty when nothing was retained.
    pub fn assemble(&self, filtered: &CandidatesBySource, settings: &SearchSettings) -> String {
        let sections: Vec<String> = presentation_order(settings.rag_preference)
            .into_iter()
            .filter_map(|source| {
                let candidates = filtered.get(&source)?;
                if candidates.is_empty() {
                    return None;
                }
                Some(self.render_section(source, candidates))
            })
            .collect();

        if sections.is_empty() {
            return String::new();
        }

        let mut parts = Vec::with_capacity(sections.len() + 1);
        match settings.reasoning_mode {
            ReasoningMode::Strict => parts.push(STRICT_BANNER.to_string()),
            ReasoningMode::Creative => parts.push(CREATIVE_BANNER.to_string()),
            ReasoningMode::Adaptive => {}
        }
        parts.extend(sections);
        parts.join("\n\n")
    }

    fn render_section(&self, source: SourceType, candidates: &[RetrievalCandidate]) -> String {
        let mut lines = vec![section_title(source).to_string()];
        for candidate in candidates {
            lines.push(String::new());
            if source == SourceType::DiscoveredRule {
                lines.extend(render_rule(candidate));
            } else {
                lines.extend(render_candidate(source, candidate));
            }
        }
        lines.join("\n")
    }
}

fn section_title(source: SourceType) -> &'static str {
    match source {
        SourceType::DiscoveredRule => "=== RÈGLES CLINIQUES DÉCOUVERTES ===",
        SourceType::ClinicalCase => "=== CAS CLINIQUES PERTINENTS ===",
        SourceType::ApprovedSequence => "=== SÉQUENCES APPROUVÉES ===",
        SourceType::IdealSequence => "=== SÉQUENCES IDÉALES ===",
        SourceType::GeneralKnowledge => "=== CONNAISSANCES PERTINENTES ===",
    }
}

fn render_candidate(source: SourceType, candidate: &RetrievalCandidate) -> Vec<String> {
    let tier = RelevanceTier::of(candidate);
    let pct = display_pct(candidate.boosted_score);
    let mut lines = Vec::new();

    if let Some(banner) = tier.banner(pct) {
        lines.push(banner);
    }
    let mut heading = format!("[{pct}% similaire] {}", candidate.title);
    if candidate.is_boosted() {
        heading.push_str(&format!(" (correspondance: {})", candidate.boost_reason.as_str()));
    }
    heading.push(':');
    lines.push(heading);

    if !candidate.consultation_text.is_empty() {
        lines.push(format!("Consultation: {}", candidate.consultation_text));
    }
    if let Some(expanded) = candidate
        .payload
        .consultation_text_expanded
        .as_deref()
        .filter(|e| !e.is_empty() && *e != candidate.consultation_text)
    {
        lines.push(format!("Consultation étendue: {expanded}"));
    }
    if matches!(source, SourceType::ApprovedSequence | SourceType::IdealSequence)
        && !candidate.payload.source.is_empty()
    {
        lines.push(format!("Source: {}", candidate.payload.source));
    }

    let sequence = &candidate.payload.sequence;
    if source.carries_sequence() && !sequence.is_empty() {
        if tier.renders_full_sequence() {
            lines.push("SÉQUENCE À REPRODUIRE:".to_string());
            for appt in sequence {
                lines.extend(appointment_lines(appt, "  "));
            }
        } else {
            lines.push("Aperçu de la séquence:".to_string());
            for appt in sequence.iter().take(SUMMARY_APPOINTMENTS) {
                lines.push(format!(
                    "  - RDV {}: {}",
                    appt.index,
                    appt.display_treatment()
                ));
            }
            if sequence.len() > SUMMARY_APPOINTMENTS {
                lines.push(format!(
                    "  ... (+{} RDV)",
                    sequence.len() - SUMMARY_APPOINTMENTS
                ));
            }
        }
    }

    if source == SourceType::GeneralKnowledge {
        lines.push(format!("Type: {}", source.as_str()));
        if !candidate.payload.categories.is_empty() {
            lines.push(format!(
                "Catégories: {}",
                candidate.payload.categories.join(", ")
            ));
        }
    }
    lines
}

fn render_rule(candidate: &RetrievalCandidate) -> Vec<String> {
    let Some(rule) = &candidate.payload.rule else {
        return vec![format!("{}:", candidate.title)];
    };
    let mut lines = vec![format!(
        "[Confiance {}%] {} (priorité: {})",
        rule.confidence.round() as i64,
        candidate.title,
        rule.priority
    )];
    if !rule.description.is_empty() {
        lines.push(format!("Description: {}", rule.description));
    }
    if !rule.clinical_reasoning.is_empty() {
        lines.push(format!("Raisonnement clinique: {}", rule.clinical_reasoning));
    }
    if !rule.conditions.is_empty() {
        lines.push(format!("Conditions: {}", rule.conditions.join("; ")));
    }
    if !rule.exceptions.is_empty() {
        lines.push(format!("Exceptions: {}", rule.exceptions.join("; ")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, BoostReason, RuleDetails};

    fn candidate(
        id: &str,
        source: SourceType,
        consultation: &str,
        similarity: f64,
    ) -> RetrievalCandidate {
        RetrievalCandidate::new(id, source, consultation, consultation, similarity)
    }

    /// Retain a single candidate for `source`.
    fn keep(filtered: &mut CandidatesBySource, source: SourceType, consultation: &str, sim: f64) {
        filtered.insert(source, vec![candidate(source.as_str(), source, consultation, sim)]);
    }

    fn with_sequence(mut c: RetrievalCandidate, n: u32) -> RetrievalCandidate {
        c.payload.sequence = (1..=n).map(|i| Appointment::new(i, format!("Étape {i}"))).collect();
        c
    }

    fn assemble(filtered: CandidatesBySource, settings: &SearchSettings) -> String {
        ContextAssembler::new().assemble(&filtered, settings)
    }

    #[test]
    fn test_empty_when_nothing_retained() {
        let mut filtered = CandidatesBySource::new();
        filtered.insert(SourceType::ClinicalCase, vec![]);
        let settings = SearchSettings {
            reasoning_mode: ReasoningMode::Strict,
            ..Default::default()
        };
        assert_eq!(assemble(filtered, &settings), "");
    }

    #[test]
    fn test_clinical_first_with_negative_preference() {
        let mut filtered = CandidatesBySource::new();
        keep(&mut filtered, SourceType::ClinicalCase, "26 CC", 0.85);
        keep(&mut filtered, SourceType::IdealSequence, "Couronne", 0.95);

        let settings = SearchSettings {
            rag_preference: -50,
            ..Default::default()
        };
        let text = assemble(filtered, &settings);
        let clinical = text.find("CAS CLINIQUES").unwrap();
        let ideal = text.find("SÉQUENCES IDÉALES").unwrap();
        assert!(clinical < ideal);
    }

    #[test]
    fn test_ideal_first_with_positive_preference() {
        let mut filtered = CandidatesBySource::new();
        keep(&mut filtered, SourceType::ClinicalCase, "26 CC", 0.85);
        keep(&mut filtered, SourceType::IdealSequence, "Couronne", 0.95);

        let settings = SearchSettings {
            rag_preference: 50,
            ..Default::default()
        };
        let text = assemble(filtered, &settings);
        assert!(text.find("SÉQUENCES IDÉALES").unwrap() < text.find("CAS CLINIQUES").unwrap());
    }

    #[test]
    fn test_rules_always_first() {
        let mut rule = candidate("r", SourceType::DiscoveredRule, "Couronne après TR", 0.7);
        rule.payload.rule = Some(RuleDetails {
            description: "Toujours couronner".into(),
            confidence: 82.4,
            priority: "high".into(),
            ..Default::default()
        });
        let mut filtered = CandidatesBySource::new();
        keep(&mut filtered, SourceType::ClinicalCase, "26 CC", 0.85);
        filtered.insert(SourceType::DiscoveredRule, vec![rule]);

        let settings = SearchSettings {
            rag_preference: -80,
            ..Default::default()
        };
        let text = assemble(filtered, &settings);
        assert!(text.starts_with("=== RÈGLES CLINIQUES DÉCOUVERTES ==="));
        assert!(text.contains("[Confiance 82%] Couronne après TR (priorité: high)"));
        assert!(text.contains("Description: Toujours couronner"));
    }

    #[test]
    fn test_high_tier_renders_full_sequence() {
        let c = with_sequence(candidate("c", SourceType::ClinicalCase, "26 CC", 0.85), 5);
        let mut filtered = CandidatesBySource::new();
        filtered.insert(SourceType::ClinicalCase, vec![c]);

        let text = assemble(filtered, &SearchSettings::default());
        assert!(text.contains("⚠️ HAUTE SIMILARITÉ [85%] ⚠️"));
        assert!(text.contains("SÉQUENCE À REPRODUIRE:"));
        assert!(text.contains("  RDV 5: Étape 5 (N/A)"));
    }

    #[test]
    fn test_moderate_tier_renders_summary() {
        let c = with_sequence(candidate("c", SourceType::ClinicalCase, "26 CC", 0.7), 5);
        let mut filtered = CandidatesBySource::new();
        filtered.insert(SourceType::ClinicalCase, vec![c]);

        let text = assemble(filtered, &SearchSettings::default());
        assert!(!text.contains("SÉQUENCE À REPRODUIRE"));
        assert!(text.contains("  - RDV 3: Étape 3"));
        assert!(!text.contains("RDV 4"));
        assert!(text.contains("(+2 RDV)"));
    }

    #[test]
    fn test_exact_banner_uses_capped_boost() {
        let mut c = candidate("i", SourceType::IdealSequence, "Facette", 0.7);
        c.apply_boost(BoostReason::ExactMatch);
        let mut filtered = CandidatesBySource::new();
        filtered.insert(SourceType::IdealSequence, vec![c]);

        let text = assemble(filtered, &SearchSettings::default());
        assert!(text.contains("🎯 CORRESPONDANCE EXACTE [100%]"));
        assert!(text.contains("[100% similaire] Facette (correspondance: exact_match):"));
    }

    #[test]
    fn test_reasoning_mode_banner() {
        let mut filtered = CandidatesBySource::new();
        keep(&mut filtered, SourceType::GeneralKnowledge, "Hygiène", 0.7);

        let mode = |reasoning_mode| SearchSettings {
            reasoning_mode,
            ..Default::default()
        };
        let strict = assemble(filtered.clone(), &mode(ReasoningMode::Strict));
        assert!(strict.starts_with(STRICT_BANNER));

        let creative = assemble(filtered.clone(), &mode(ReasoningMode::Creative));
        assert!(creative.starts_with(CREATIVE_BANNER));

        let adaptive = assemble(filtered, &SearchSettings::default());
        assert!(adaptive.starts_with("=== CONNAISSANCES PERTINENTES ==="));
        assert!(adaptive.contains("Type: general_knowledge"));
    }
}
