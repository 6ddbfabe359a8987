//! Golden tests for planning requests through the full planner.

use std::io::Write;
use std::sync::Arc;
use std::thread;

use dentiplan_core::{CancellationToken, SearchService, SearchSettings, ServiceConfig};
use dentiplan_llm::{GeneratorConfig, Planner, ScriptedGenerator};
use uuid::Uuid;

const KNOWLEDGE: &str = r#"{
    "data": [
        {
            "type": "clinical_case",
            "consultation_text": "12 à 22 F",
            "treatment_sequence": [
                {"rdv": 1, "traitement": "Empreintes et wax-up", "duree": "1h"},
                {"rdv": 2, "traitement": "Préparation facettes", "duree": "2h", "delai": "2 sem"},
                {"rdv": 3, "traitement": "Collage facettes", "duree": "2h"}
            ]
        }
    ]
}"#;

struct GoldenCase {
    message: &'static str,
    answer: &'static str,
    expect_plan: bool,
    expect_appointments: usize,
    expect_text_prefix: &'static str,
}

fn cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            message: "12 à 22 F",
            answer: "Cas clinique exact.\n\n### TREATMENT_PLAN_JSON ###\n{\"consultation_text\": \"12 à 22 F\", \"treatment_sequence\": [{\"rdv\": 1, \"traitement\": \"Empreintes\"}, {\"rdv\": 2, \"traitement\": \"Préparation\"}, {\"rdv\": 3, \"traitement\": \"Collage\"}]}",
            expect_plan: true,
            expect_appointments: 3,
            expect_text_prefix: "Cas clinique exact.",
        },
        GoldenCase {
            message: "Plan de TT 26 CC",
            answer: "Voici le plan.\n{\"sequence\": [{\"rdv\": 4, \"traitement\": \"Préparation\"}, {\"rdv\": 9, \"traitement\": \"Scellement\"}]}",
            expect_plan: true,
            expect_appointments: 2,
            expect_text_prefix: "Voici le plan.",
        },
        GoldenCase {
            message: "MA + CC",
            answer: "### TREATMENT_PLAN_JSON ###\n{\"treatment_sequence\": []}",
            expect_plan: false,
            expect_appointments: 0,
            expect_text_prefix: "### TREATMENT_PLAN_JSON ###",
        },
        GoldenCase {
            message: "Merci pour votre aide",
            answer: "Avec plaisir.",
            expect_plan: false,
            expect_appointments: 0,
            expect_text_prefix: "Avec plaisir.",
        },
    ]
}

fn service() -> anyhow::Result<(Arc<SearchService>, tempfile::NamedTempFile)> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(KNOWLEDGE.as_bytes())?;
    let service = SearchService::open(ServiceConfig {
        knowledge_base_path: Some(file.path().to_path_buf()),
        ..Default::default()
    })?;
    service.initialize()?;
    Ok((Arc::new(service), file))
}

#[test]
fn test_golden_planner_cases() -> anyhow::Result<()> {
    let (service, _file) = service()?;

    for (i, case) in cases().iter().enumerate() {
        let generator = Arc::new(ScriptedGenerator::new([case.answer]));
        let planner = Planner::new(Arc::clone(&service), generator, &GeneratorConfig::default());
        let response = planner.respond(
            Uuid::new_v4(),
            case.message,
            &SearchSettings::default(),
            None,
            &CancellationToken::new(),
        )?;

        assert_eq!(
            response.is_treatment_plan(),
            case.expect_plan,
            "Case {}: plan mismatch",
            i
        );
        assert_eq!(
            response.plan.as_ref().map_or(0, |p| p.len()),
            case.expect_appointments,
            "Case {}: appointment count mismatch",
            i
        );
        assert!(
            response.text.starts_with(case.expect_text_prefix),
            "Case {}: text mismatch: {}",
            i,
            response.text
        );
    }
    Ok(())
}

#[test]
fn test_plans_are_renumbered() -> anyhow::Result<()> {
    let (service, _file) = service()?;
    let answer = cases()[1].answer;
    let planner = Planner::new(
        service,
        Arc::new(ScriptedGenerator::new([answer])),
        &GeneratorConfig::default(),
    );
    let response = planner.respond(
        Uuid::new_v4(),
        "Plan de TT 26 CC",
        &SearchSettings::default(),
        None,
        &CancellationToken::new(),
    )?;

    let plan = response.plan.ok_or_else(|| anyhow::anyhow!("no plan"))?;
    let indices: Vec<u32> = plan.sequence.iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![1, 2]);
    Ok(())
}

#[test]
fn test_sessions_share_planner_across_threads() -> anyhow::Result<()> {
    let (service, _file) = service()?;
    let generator = Arc::new(ScriptedGenerator::default());
    for _ in 0..8 {
        generator.push_reply("Réponse");
    }
    let planner = Arc::new(Planner::new(service, generator, &GeneratorConfig::default()));

    let sessions: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let handles: Vec<_> = sessions
        .iter()
        .map(|&session| {
            let planner = Arc::clone(&planner);
            thread::spawn(move || {
                for _ in 0..2 {
                    planner
                        .respond(
                            session,
                            "Bonjour",
                            &SearchSettings::default(),
                            None,
                            &CancellationToken::new(),
                        )
                        .map(|_| ())
                        .map_err(|e| e.to_string())?;
                }
                Ok::<_, String>(())
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("worker panicked"))?
            .map_err(anyhow::Error::msg)?;
    }

    for session in sessions {
        assert_eq!(planner.service().history().len(session), 2);
    }
    Ok(())
}
