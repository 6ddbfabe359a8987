use dentiplan_core::models::{BoostReason, RetrievalCandidate, SourceType};
use dentiplan_core::query::{AbbreviationExpander, QueryAnalysis};
use dentiplan_core::retrieval::{PassKind, RawCandidate, ScoringEngine, ThresholdFilter};
use proptest::prelude::*;

const CONSULTATIONS: [&str; 6] = [
    "Facette",
    "26 CC",
    "Couronne céramique sur 26",
    "Bilan parodontal complet avec détartrage et surfaçage",
    "Extraction 38",
    "TR 36",
];

fn expander() -> AbbreviationExpander {
    AbbreviationExpander::from_pairs([
        ("CC", "Couronne céramique"),
        ("F", "Facette"),
        ("TR", "Traitement de racine"),
        ("TRT", "Traitement"),
    ])
}

fn raw(id: usize, consultation: &str, similarity: f64, order: usize) -> RawCandidate {
    RawCandidate {
        candidate: RetrievalCandidate::new(
            format!("c{id}"),
            SourceType::ClinicalCase,
            consultation,
            consultation,
            similarity,
        ),
        pass: PassKind::FullQuery,
        keyword: None,
        pass_order: order,
    }
}

fn arb_raw() -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    prop::collection::vec((0usize..8, 0usize..CONSULTATIONS.len(), -0.5f64..1.5), 0..24)
}

fn arb_query() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("Facette"),
        Just("26 CC"),
        Just("12 à 22 F"),
        Just("TR 36"),
        Just("Détartrage"),
    ]
}

// ── Score invariants ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn boosted_never_below_similarity(items in arb_raw(), query in arb_query()) {
        let expander = expander();
        let analysis = QueryAnalysis::analyze(query, &expander);
        let input = items
            .iter()
            .enumerate()
            .map(|(i, (id, c, sim))| raw(*id, CONSULTATIONS[*c], *sim, i))
            .collect();

        for candidate in ScoringEngine::new(&expander).score(input, &analysis) {
            prop_assert!((0.0..=1.0).contains(&candidate.similarity_score));
            prop_assert!(candidate.boosted_score >= candidate.similarity_score);
            let expected = candidate.similarity_score * candidate.boost_reason.multiplier();
            prop_assert!((candidate.boosted_score - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn output_sorted_and_unique(items in arb_raw(), query in arb_query(), cap in 1usize..10) {
        let expander = expander();
        let analysis = QueryAnalysis::analyze(query, &expander);
        let input = items
            .iter()
            .enumerate()
            .map(|(i, (id, c, sim))| raw(*id, CONSULTATIONS[*c], *sim, i))
            .collect();

        let ranked = ScoringEngine::new(&expander).score_and_cap(input, &analysis, cap);
        prop_assert!(ranked.len() <= cap);
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].boosted_score >= pair[1].boosted_score);
        }
        let mut ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), ranked.len());
    }
}

// ── Dedup keeps the maximum ──────────────────────────────────────────────

proptest! {
    #[test]
    fn dedup_keeps_max_boosted(
        occurrences in prop::collection::vec((0usize..CONSULTATIONS.len(), 0.0f64..1.0), 1..8),
    ) {
        let expander = expander();
        let analysis = QueryAnalysis::analyze("Facette", &expander);
        let engine = ScoringEngine::new(&expander);

        let input: Vec<RawCandidate> = occurrences
            .iter()
            .enumerate()
            .map(|(i, (c, sim))| raw(0, CONSULTATIONS[*c], *sim, i))
            .collect();
        let expected_max = input
            .iter()
            .map(|r| {
                let mut c = r.candidate.clone();
                c.apply_boost(engine.query_terms(&analysis).evaluate(&c.consultation_text));
                c.boosted_score
            })
            .fold(f64::MIN, f64::max);

        let scored = engine.score(input, &analysis);
        prop_assert_eq!(scored.len(), 1);
        prop_assert!((scored[0].boosted_score - expected_max).abs() < 1e-12);
    }
}

// ── Boost ordering ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn exact_outranks_keyword_at_equal_similarity(
        sim in 0.01f64..=1.0,
        exact_first in any::<bool>(),
    ) {
        let expander = expander();
        let analysis = QueryAnalysis::analyze("Facette", &expander);
        let exact = raw(1, "Facette", sim, 0);
        let keyword = raw(2, "Facette sur 11 et 21 avec préparation minimale", sim, 1);
        let input = if exact_first { vec![exact, keyword] } else { vec![keyword, exact] };

        let scored = ScoringEngine::new(&expander).score(input, &analysis);
        prop_assert_eq!(scored[0].boost_reason, BoostReason::ExactMatch);
        prop_assert_eq!(scored[1].boost_reason, BoostReason::KeywordMatch);
        prop_assert_eq!(scored[0].id.as_str(), "c1");
    }
}

// ── Threshold monotonicity ───────────────────────────────────────────────

proptest! {
    #[test]
    fn raising_threshold_never_keeps_more(
        sims in prop::collection::vec(0.0f64..=1.0, 0..20),
        low in 0.0f64..=100.0,
        delta in 0.0f64..=100.0,
    ) {
        let high = (low + delta).min(100.0);
        let candidates: Vec<RetrievalCandidate> = sims
            .iter()
            .enumerate()
            .map(|(i, sim)| {
                let mut c =
                    RetrievalCandidate::new(format!("c{i}"), SourceType::IdealSequence, "t", "t", *sim);
                c.apply_boost(BoostReason::ExactMatch);
                c
            })
            .collect();

        let kept_low = ThresholdFilter::new(low).filter(candidates.clone()).len();
        let kept_high = ThresholdFilter::new(high).filter(candidates).len();
        prop_assert!(kept_high <= kept_low);
    }
}

// ── Expansion idempotence ────────────────────────────────────────────────

proptest! {
    #[test]
    fn expansion_is_idempotent(words in prop::collection::vec(
        prop_oneof![
            Just("CC"), Just("cc"), Just("F"), Just("TR"), Just("TRT"), Just("26"),
            Just("Couronne"), Just("céramique"), Just("Facette"), Just("et"), Just("à"),
        ],
        0..8,
    )) {
        let expander = expander();
        let text = words.join(" ");
        let once = expander.expand(&text);
        prop_assert_eq!(expander.expand(&once), once);
    }
}
