//! Detection of treatment-planning requests.
//!
//! Clinical shorthand ("26 CC", "MA + CC") is matched case-sensitively since the
//! codes are written in capitals; phrases and edit verbs ignore case.

use std::sync::LazyLock;

use dentiplan_core::context::is_modification_request;
use dentiplan_core::TreatmentPlan;
use regex::Regex;

static PLANNING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "12 à 22", "11 a 13"
        r"\b\d{1,2}\s*(?i:à|a)\s*\d{1,2}\b",
        // "26 CC", "12 F"
        r"\b\d{1,2}\s*[A-Z]{1,3}\b",
        // "Plan de TT", "plan de traitement"
        r"(?i)\bplan\s+de\s+t",
        // "dém. CC"
        r"(?i:dém\.).*CC",
        // "TR 3 canaux"
        r"\bTR\s+\d+\s+(?i:canaux)",
        // "MA + CC", "CC + TR"
        r"\b[A-Z]{1,3}\s*\+\s*[A-Z]{1,3}\b",
        r"(?i)ajoute.*\b(après|avant)\b.*séance",
        r"(?i)modifi.*séance",
        r"(?i)change.*traitement",
        r"(?i)supprime.*rdv",
        r"(?i)enlève.*séance",
        r"(?i)remplace.*par",
        r"(?i)déplace.*séance",
        r"(?i)fusionne.*séances",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid planning pattern"))
    .collect()
});

/// Whether a message asks for a new or edited treatment plan.
pub fn is_treatment_planning_request(message: &str) -> bool {
    PLANNING_PATTERNS.iter().any(|re| re.is_match(message))
}

/// How a message relates to treatment planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestIntent {
    pub new_plan: bool,
    /// Edit of a non-empty prior plan
    pub modification: bool,
}

impl RequestIntent {
    pub fn detect(message: &str, prior_plan: Option<&TreatmentPlan>) -> Self {
        let has_plan = prior_plan.is_some_and(|plan| !plan.is_empty());
        Self {
            new_plan: is_treatment_planning_request(message),
            modification: has_plan && is_modification_request(message),
        }
    }

    /// Whether the generated answer should be parsed for a plan.
    pub fn wants_plan(&self) -> bool {
        self.new_plan || self.modification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentiplan_core::Appointment;

    #[test]
    fn test_planning_requests() {
        for message in [
            "12 à 22 F",
            "11 a 13 CC",
            "26 CC",
            "Plan de TT pour 36",
            "plan de traitement",
            "dém. CC",
            "TR 3 canaux",
            "MA + CC",
            "ajoute un blanchiment après la séance 3",
            "Modifie la séance 2",
            "remplace la couronne par un inlay",
            "fusionne les séances 1 et 2",
        ] {
            assert!(is_treatment_planning_request(message), "{message}");
        }
    }

    #[test]
    fn test_conversational_messages() {
        for message in [
            "Bonjour",
            "Quelle est la durée moyenne d'un détartrage ?",
            "j'ai 2 questions",
            "merci beaucoup",
        ] {
            assert!(!is_treatment_planning_request(message), "{message}");
        }
    }

    #[test]
    fn test_intent_requires_prior_plan_for_modification() {
        let plan = TreatmentPlan::new("26 CC", vec![Appointment::new(1, "Préparation")]);

        let intent = RequestIntent::detect("ajoute un détartrage", Some(&plan));
        assert!(intent.modification);
        assert!(intent.wants_plan());

        let intent = RequestIntent::detect("ajoute un détartrage", None);
        assert!(!intent.modification);

        let empty = TreatmentPlan::default();
        assert!(!RequestIntent::detect("ajoute un détartrage", Some(&empty)).modification);
    }

    #[test]
    fn test_intent_plain_question() {
        assert!(!RequestIntent::detect("Bonjour", None).wants_plan());
        assert!(RequestIntent::detect("26 CC", None).new_plan);
    }
}
