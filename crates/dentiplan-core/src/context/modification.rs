//! Current-plan injection for modification requests.

use super::appointment_lines;
use crate::models::TreatmentPlan;
use crate::query::contains_word;

/// Words signalling a request to change an existing plan (French and English).
pub const MODIFICATION_LEXICON: &[&str] = &[
    "ajoute", "ajouter", "ajout", "modifie", "modifier", "modification", "change", "changer",
    "supprime", "supprimer", "enlève", "enlever", "retire", "retirer", "remplace", "remplacer",
    "déplace", "déplacer", "fusionne", "fusionner", "après", "avant", "séance", "rdv",
    "rendez-vous", "add", "remove", "delete", "replace", "move", "merge", "appointment",
    "session", "before", "after",
];

/// Whether a request reads as a change to an existing plan.
pub fn is_modification_request(request: &str) -> bool {
    MODIFICATION_LEXICON
        .iter()
        .any(|word| contains_word(request, word))
}

/// Render the current plan with instructions to return the complete modified plan.
pub fn current_plan_section(plan: &TreatmentPlan) -> String {
    let consultation = if plan.consultation_text.trim().is_empty() {
        "Non spécifiée"
    } else {
        plan.consultation_text.trim()
    };

    let mut lines = vec![
        "--- PLAN DE TRAITEMENT ACTUEL À MODIFIER ---".to_string(),
        format!("Consultation: {consultation}"),
        "Séquence actuelle:".to_string(),
    ];
    for appt in &plan.sequence {
        lines.extend(appointment_lines(appt, "  "));
    }
    lines.push(String::new());
    lines.push("IMPORTANT: L'utilisateur demande de MODIFIER ce plan existant. Vous devez:".into());
    lines.push("1. Appliquer uniquement les modifications demandées".into());
    lines.push("2. Garder le reste du plan intact".into());
    lines.push("3. Renuméroter les RDV de façon continue à partir de 1".into());
    lines.push("4. Retourner le plan COMPLET modifié au format JSON habituel".into());
    lines.join("\n")
}

/// Append the current plan to `context` when `request` is a modification of it.
pub fn inject_current_plan(
    context: String,
    request: &str,
    prior_plan: Option<&TreatmentPlan>,
) -> String {
    let Some(plan) = prior_plan else {
        return context;
    };
    if plan.is_empty() || !is_modification_request(request) {
        return context;
    }
    tracing::debug!(appointments = plan.len(), "Injecting current plan for modification");

    let section = current_plan_section(plan);
    if context.is_empty() {
        section
    } else {
        format!("{context}\n\n{section}")
    }
}
