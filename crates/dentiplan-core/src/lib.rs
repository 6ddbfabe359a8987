//! Dentiplan Core Library
//!
//! Reference retrieval, prompt context assembly and treatment plan extraction
//! for dental treatment planning.
//!
//! # Architecture
//!
//! ```text
//! request ──► QueryAnalysis (expand shorthand, extract keywords)
//!                  │
//!                  ▼
//!          MultiSourceRetriever ──► VectorIndex (one collection per source type)
//!                  │                 full request pass + keyword passes
//!                  ▼
//!           ScoringEngine (boost tier, dedup, cap)
//!                  │
//!                  ▼
//!           ThresholdFilter (raw similarity floor)
//!                  │
//!          ┌───────┴────────┐
//!          ▼                ▼
//!   ContextAssembler   format_references
//!   (+ current plan)
//!          │
//!          ▼
//!     generator (external) ──► parse_generated_plan ──► Structured | Unstructured
//! ```
//!
//! # Modules
//!
//! - [`models`]: Candidates, plans, references
//! - [`settings`]: Per-request search settings, clamped from raw input
//! - [`query`]: Abbreviation expansion and keyword extraction
//! - [`index`]: Similarity index contract and the embedded SQLite index
//! - [`knowledge`]: Knowledge base loading and indexing
//! - [`retrieval`]: Multi-pass retrieval, boost scoring, threshold filtering
//! - [`context`]: Prompt context rendering and current-plan injection
//! - [`references`]: Reference list for display
//! - [`parser`]: Plan extraction from generated text
//! - [`history`]: Per-session chat history
//! - [`cancel`]: Cooperative cancellation
//! - [`service`]: The [`SearchService`] lifecycle object

pub mod cancel;
pub mod context;
pub mod history;
pub mod index;
pub mod knowledge;
pub mod models;
pub mod parser;
pub mod query;
pub mod references;
pub mod retrieval;
pub mod service;
pub mod settings;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use context::{ContextAssembler, RelevanceTier};
pub use history::{ChatHistory, Exchange};
pub use index::{CollectionStore, IndexError, SqliteIndex, VectorIndex};
pub use knowledge::{DiscoveredRule, KnowledgeBase};
pub use models::{
    Appointment, BoostReason, Reference, RetrievalCandidate, SourceType, TreatmentPlan,
};
pub use parser::{parse_generated_plan, ParseResult, ParseStage};
pub use query::AbbreviationExpander;
pub use service::{ContextBundle, SearchService, ServiceConfig, ServiceError};
pub use settings::{ReasoningMode, SearchSettings};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum DentiplanError {
    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeError(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<ServiceError> for DentiplanError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotInitialized => {
                DentiplanError::NotInitialized("call initialize first".into())
            }
            ServiceError::Cancelled => DentiplanError::Cancelled("request aborted".into()),
            ServiceError::Knowledge(inner) => inner.into(),
            ServiceError::Index(inner) => inner.into(),
        }
    }
}

impl From<IndexError> for DentiplanError {
    fn from(e: IndexError) -> Self {
        DentiplanError::IndexError(e.to_string())
    }
}

impl From<knowledge::KnowledgeError> for DentiplanError {
    fn from(e: knowledge::KnowledgeError) -> Self {
        DentiplanError::KnowledgeError(e.to_string())
    }
}

impl From<serde_json::Error> for DentiplanError {
    fn from(e: serde_json::Error) -> Self {
        DentiplanError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a service from a JSON [`ServiceConfig`]. Call `initialize` before use.
#[uniffi::export]
pub fn open_service(config_json: String) -> Result<Arc<DentiplanCore>, DentiplanError> {
    let config = ServiceConfig::from_json_str(&config_json)?;
    let service = SearchService::open(config)?;
    Ok(Arc::new(DentiplanCore { service }))
}

/// Extract a plan from generated text without a service.
#[uniffi::export]
pub fn parse_plan_text(text: String) -> FfiParseResult {
    parse_generated_plan(&text).into()
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe service wrapper for FFI.
#[derive(uniffi::Object)]
pub struct DentiplanCore {
    service: SearchService,
}

#[uniffi::export]
impl DentiplanCore {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the knowledge base and abbreviations, indexing when they changed.
    pub fn initialize(&self) -> Result<(), DentiplanError> {
        Ok(self.service.initialize()?)
    }

    pub fn shutdown(&self) {
        self.service.shutdown();
    }

    /// Force a full rebuild of the knowledge collections.
    pub fn reindex_all(&self) -> Result<u64, DentiplanError> {
        Ok(self.service.reindex_all()? as u64)
    }

    // =========================================================================
    // Request Pipeline
    // =========================================================================

    /// Prompt context and reference list for one request.
    ///
    /// `settings_json` may be empty for defaults. `prior_plan_json` is the plan
    /// currently shown to the user, if any.
    pub fn build_context_and_references(
        &self,
        query: String,
        settings_json: String,
        prior_plan_json: Option<String>,
    ) -> Result<FfiContextBundle, DentiplanError> {
        let settings = SearchSettings::from_json(&settings_json)?;
        let prior_plan = match prior_plan_json.as_deref().map(str::trim) {
            Some(json) if !json.is_empty() => Some(TreatmentPlan::from_json_str(json).ok_or_else(
                || DentiplanError::InvalidInput("prior plan has no appointment sequence".into()),
            )?),
            _ => None,
        };

        let bundle = self.service.build_context_and_references(
            &query,
            &settings,
            prior_plan.as_ref(),
            &CancellationToken::new(),
        )?;
        Ok(bundle.into())
    }

    pub fn parse_generated_plan(&self, text: String) -> FfiParseResult {
        self.service.parse_generated_plan(&text).into()
    }

    // =========================================================================
    // Knowledge Operations
    // =========================================================================

    pub fn statistics(&self) -> Result<FfiStatistics, DentiplanError> {
        let stats = self.service.statistics()?;
        Ok(FfiStatistics {
            total_entries: stats.total_entries as u64,
            entries: source_counts(stats.entries),
            indexed: source_counts(stats.indexed),
            fingerprint: stats.fingerprint,
        })
    }

    /// Full detail of a knowledge item as JSON, if the id is known.
    pub fn detailed_reference_json(&self, id: String) -> Result<Option<String>, DentiplanError> {
        match self.service.detailed_reference(&id)? {
            Some(detail) => Ok(Some(serde_json::to_string(&detail)?)),
            None => Ok(None),
        }
    }

    /// Store a practitioner-approved plan. Returns its index id.
    pub fn index_approved_sequence(
        &self,
        title: String,
        plan: FfiTreatmentPlan,
        approved_by: String,
    ) -> Result<String, DentiplanError> {
        let plan: TreatmentPlan = plan.into();
        if plan.is_empty() {
            return Err(DentiplanError::InvalidInput("plan has no appointment".into()));
        }
        Ok(self
            .service
            .index_approved_sequence(&title, &plan, &approved_by)?)
    }

    /// Add or replace a discovered rule given as JSON.
    pub fn index_discovered_rule_json(&self, rule_json: String) -> Result<(), DentiplanError> {
        let rule: DiscoveredRule = serde_json::from_str(&rule_json)?;
        Ok(self.service.index_discovered_rule(&rule)?)
    }
}

fn source_counts(counts: std::collections::BTreeMap<SourceType, usize>) -> Vec<FfiSourceCount> {
    counts
        .into_iter()
        .map(|(source, count)| FfiSourceCount {
            source_type: source.as_str().to_string(),
            count: count as u64,
        })
        .collect()
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe reference.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReference {
    pub source_type: String,
    pub title: String,
    pub id: String,
    pub source: String,
    pub filename: String,
    pub categories: Vec<String>,
    pub similarity_score: Option<f64>,
}

impl From<Reference> for FfiReference {
    fn from(r: Reference) -> Self {
        Self {
            source_type: r.source_type.as_str().to_string(),
            title: r.title,
            id: r.id,
            source: r.source,
            filename: r.filename,
            categories: r.categories,
            similarity_score: r.similarity_score,
        }
    }
}

/// FFI-safe context bundle.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiContextBundle {
    pub prompt_text: String,
    pub references: Vec<FfiReference>,
    pub expanded_query: String,
    pub keywords: Vec<String>,
}

impl From<ContextBundle> for FfiContextBundle {
    fn from(bundle: ContextBundle) -> Self {
        Self {
            prompt_text: bundle.prompt_text,
            references: bundle.references.into_iter().map(|r| r.into()).collect(),
            expanded_query: bundle.analysis.expanded,
            keywords: bundle
                .analysis
                .keywords
                .into_iter()
                .map(|k| k.text)
                .collect(),
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub index: u32,
    pub treatment_description: String,
    pub duration: String,
    pub delay_before_next: String,
    pub practitioner: String,
    pub date: String,
    pub notes: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(a: Appointment) -> Self {
        Self {
            index: a.index,
            treatment_description: a.treatment_description,
            duration: a.duration,
            delay_before_next: a.delay_before_next,
            practitioner: a.practitioner,
            date: a.date,
            notes: a.notes,
        }
    }
}

impl From<FfiAppointment> for Appointment {
    fn from(a: FfiAppointment) -> Self {
        Appointment {
            index: a.index,
            treatment_description: a.treatment_description,
            duration: a.duration,
            delay_before_next: a.delay_before_next,
            practitioner: a.practitioner,
            date: a.date,
            notes: a.notes,
            expanded_description: None,
            categories: Vec::new(),
        }
    }
}

/// FFI-safe treatment plan.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTreatmentPlan {
    pub consultation_text: String,
    pub sequence: Vec<FfiAppointment>,
}

impl From<TreatmentPlan> for FfiTreatmentPlan {
    fn from(plan: TreatmentPlan) -> Self {
        Self {
            consultation_text: plan.consultation_text,
            sequence: plan.sequence.into_iter().map(|a| a.into()).collect(),
        }
    }
}

impl From<FfiTreatmentPlan> for TreatmentPlan {
    fn from(plan: FfiTreatmentPlan) -> Self {
        let sequence = plan
            .sequence
            .into_iter()
            .map(Appointment::from)
            .filter(|a| !a.treatment_description.trim().is_empty())
            .collect();
        TreatmentPlan::new(plan.consultation_text, sequence)
    }
}

/// FFI-safe parse outcome.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiParseResult {
    Structured {
        plan: FfiTreatmentPlan,
        reasoning: String,
        stage: String,
    },
    Unstructured {
        raw_text: String,
    },
}

impl From<ParseResult> for FfiParseResult {
    fn from(result: ParseResult) -> Self {
        match result {
            ParseResult::Structured {
                plan,
                reasoning,
                stage,
            } => FfiParseResult::Structured {
                plan: plan.into(),
                reasoning,
                stage: stage.as_str().to_string(),
            },
            ParseResult::Unstructured { raw_text } => FfiParseResult::Unstructured { raw_text },
        }
    }
}

/// Document count for one source type.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSourceCount {
    pub source_type: String,
    pub count: u64,
}

/// FFI-safe knowledge statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatistics {
    pub total_entries: u64,
    pub entries: Vec<FfiSourceCount>,
    pub indexed: Vec<FfiSourceCount>,
    pub fingerprint: Option<String>,
}
