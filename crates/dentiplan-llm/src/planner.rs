//! One planning request end to end: context, generation, history, parsing.

use std::sync::Arc;
use std::time::Duration;

use dentiplan_core::{
    parse_generated_plan, CancellationToken, ParseResult, ParseStage, Reference, SearchService,
    SearchSettings, ServiceError, TreatmentPlan,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::detection::RequestIntent;
use crate::explanation::generate_explanation;
use crate::generator::{GenerationError, GeneratorConfig, ModelParams, TextGenerator};
use crate::prompts::{build_messages, build_system_prompt};

/// Planner errors.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

pub type PlannerResult<T> = Result<T, PlannerError>;

/// Answer to one request.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerResponse {
    /// Text shown to the user: the generator's reasoning, a generated
    /// explanation, or the raw answer
    pub text: String,
    pub references: Vec<Reference>,
    pub plan: Option<TreatmentPlan>,
    pub stage: Option<ParseStage>,
}

impl PlannerResponse {
    pub fn is_treatment_plan(&self) -> bool {
        self.plan.is_some()
    }
}

pub struct Planner {
    service: Arc<SearchService>,
    generator: Arc<dyn TextGenerator>,
    params: ModelParams,
    timeout: Duration,
}

impl Planner {
    pub fn new(
        service: Arc<SearchService>,
        generator: Arc<dyn TextGenerator>,
        config: &GeneratorConfig,
    ) -> Self {
        Self {
            service,
            generator,
            params: config.params(),
            timeout: config.timeout(),
        }
    }

    pub fn service(&self) -> &SearchService {
        &self.service
    }

    pub fn respond(
        &self,
        session: Uuid,
        message: &str,
        settings: &SearchSettings,
        prior_plan: Option<&TreatmentPlan>,
        cancel: &CancellationToken,
    ) -> PlannerResult<PlannerResponse> {
        let bundle = self
            .service
            .build_context_and_references(message, settings, prior_plan, cancel)?;

        let exchanges = self
            .service
            .history()
            .recent(session, self.service.config().history_prompt_exchanges);
        let messages = build_messages(
            build_system_prompt(&bundle.prompt_text, &exchanges),
            message,
        );

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled.into());
        }
        let generated = match self.generator.complete(&messages, &self.params, self.timeout) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, model = %self.params.model, "Generation failed");
                return Err(e.into());
            }
        };
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled.into());
        }

        self.service.history().append(session, message, generated.as_str());

        let intent = RequestIntent::detect(message, prior_plan);
        if !intent.wants_plan() {
            return Ok(PlannerResponse {
                text: generated,
                references: bundle.references,
                plan: None,
                stage: None,
            });
        }
        tracing::info!(
            new_plan = intent.new_plan,
            modification = intent.modification,
            "Treatment planning request detected"
        );

        match parse_generated_plan(&generated) {
            ParseResult::Structured { plan, reasoning, stage } => {
                tracing::info!(
                    stage = stage.as_str(),
                    appointments = plan.len(),
                    "Parsed treatment plan"
                );
                let text = if reasoning.is_empty() {
                    generate_explanation(&plan, &bundle.candidates, settings)
                } else {
                    reasoning
                };
                Ok(PlannerResponse {
                    text,
                    references: bundle.references,
                    plan: Some(plan),
                    stage: Some(stage),
                })
            }
            ParseResult::Unstructured { raw_text } => {
                tracing::warn!("Treatment planning detected but no plan could be parsed");
                Ok(PlannerResponse {
                    text: raw_text,
                    references: bundle.references,
                    plan: None,
                    stage: None,
                })
            }
        }
    }
}
