//! Markdown explanation for a parsed plan that arrived without reasoning.

use dentiplan_core::retrieval::CandidatesBySource;
use dentiplan_core::{RetrievalCandidate, SearchSettings, TreatmentPlan};

/// Unique treatments listed before summarizing the rest.
pub const LISTED_TREATMENTS: usize = 5;

/// Raw similarity from which a plan is said to be based on a reference.
pub const BASED_ON_SIMILARITY: f64 = 0.8;

/// Raw similarity from which a plan is said to be inspired by a reference.
pub const INSPIRED_BY_SIMILARITY: f64 = 0.6;

pub fn generate_explanation(
    plan: &TreatmentPlan,
    candidates: &CandidatesBySource,
    settings: &SearchSettings,
) -> String {
    if plan.is_empty() {
        return "Aucune séquence de traitement générée.".to_string();
    }

    let mut out = String::from("## Plan de traitement proposé\n\n");
    out.push_str(&format!("**Nombre de séances:** {}\n\n", plan.len()));
    let consultation = plan.consultation_text.trim();
    if !consultation.is_empty() {
        out.push_str(&format!("**Demande:** {consultation}\n\n"));
    }

    out.push_str("### Résumé des interventions\n\n");
    let mut treatments: Vec<&str> = Vec::new();
    for appt in &plan.sequence {
        let treatment = appt.treatment_description.as_str();
        if !treatment.is_empty() && !treatments.contains(&treatment) {
            treatments.push(treatment);
        }
    }
    for (i, treatment) in treatments.iter().take(LISTED_TREATMENTS).enumerate() {
        out.push_str(&format!("{}. {treatment}\n", i + 1));
    }
    if treatments.len() > LISTED_TREATMENTS {
        out.push_str(&format!(
            "... et {} autres interventions\n",
            treatments.len() - LISTED_TREATMENTS
        ));
    }

    if settings.explain_reasoning {
        out.push_str("\n### Raisonnement clinique\n\n");
        out.push_str(&reasoning_paragraph(best_reference(candidates)));
    }

    if plan.len() > 1 {
        out.push_str("\n### Durée et délais\n\n");
        let has_delays = plan
            .sequence
            .iter()
            .any(|appt| !appt.delay_before_next.trim().is_empty());
        if has_delays {
            out.push_str(
                "Le plan inclut des délais spécifiques entre certaines séances pour assurer \
                 une guérison optimale et le succès du traitement.\n",
            );
        } else {
            out.push_str("Les séances peuvent être programmées selon votre disponibilité.\n");
        }
    }

    out
}

/// Highest raw similarity among retained sequence-bearing candidates.
/// Earlier categories win ties.
fn best_reference(candidates: &CandidatesBySource) -> Option<&RetrievalCandidate> {
    let mut best: Option<&RetrievalCandidate> = None;
    for candidate in candidates
        .iter()
        .filter(|(source, _)| source.carries_sequence())
        .flat_map(|(_, kept)| kept)
    {
        if best.map_or(true, |b| candidate.similarity_score > b.similarity_score) {
            best = Some(candidate);
        }
    }
    best
}

fn reasoning_paragraph(best: Option<&RetrievalCandidate>) -> String {
    match best {
        Some(c) if c.similarity_score >= BASED_ON_SIMILARITY => format!(
            "Ce plan est basé sur {} avec une correspondance de {:.0}%. \
             La séquence suit les meilleures pratiques établies.\n",
            c.title,
            c.similarity_score * 100.0
        ),
        Some(c) if c.similarity_score >= INSPIRED_BY_SIMILARITY => format!(
            "Ce plan s'inspire de {} (correspondance: {:.0}%) \
             avec des adaptations spécifiques à votre cas.\n",
            c.title,
            c.similarity_score * 100.0
        ),
        _ => "Ce plan a été élaboré en combinant plusieurs références cliniques pour répondre \
              spécifiquement à vos besoins.\n"
            .to_string(),
    }
}
