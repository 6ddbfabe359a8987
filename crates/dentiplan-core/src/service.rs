//! The search service: one explicitly constructed object owning the index
//! handles, the loaded knowledge base and per-session history.
//!
//! Lifecycle: [`SearchService::new`] → [`SearchService::initialize`] →
//! requests → [`SearchService::shutdown`]. Requests outside that window fail
//! with [`ServiceError::NotInitialized`].

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::context::{inject_current_plan, ContextAssembler};
use crate::history::ChatHistory;
use crate::index::{CollectionStore, IndexError, SqliteIndex, VectorIndex};
use crate::knowledge::{
    DetailedReference, DiscoveredRule, KnowledgeBase, KnowledgeError, KnowledgeIndexer,
    KnowledgeStatistics, KNOWLEDGE_COLLECTION,
};
use crate::models::{Reference, SourceType, TreatmentPlan};
use crate::parser::{self, ParseResult};
use crate::query::{AbbreviationExpander, QueryAnalysis};
use crate::references::format_references;
use crate::retrieval::{rank_and_filter, CandidatesBySource, MultiSourceRetriever, RetrievalError};
use crate::settings::SearchSettings;

/// Index path that selects an in-memory SQLite index.
pub const IN_MEMORY_INDEX: &str = ":memory:";

/// Service errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service not initialized")]
    NotInitialized,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

impl From<RetrievalError> for ServiceError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Cancelled => ServiceError::Cancelled,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub knowledge_base_path: Option<PathBuf>,
    pub abbreviations_path: Option<PathBuf>,
    /// SQLite file, or `:memory:`
    pub index_path: String,
    pub index_timeout_ms: u64,
    /// Exchanges retained per session
    pub history_window: usize,
    /// Exchanges replayed into the prompt
    pub history_prompt_exchanges: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: None,
            abbreviations_path: None,
            index_path: IN_MEMORY_INDEX.to_string(),
            index_timeout_ms: 5000,
            history_window: 10,
            history_prompt_exchanges: 3,
        }
    }
}

impl ServiceConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }
}

/// Everything the generator call needs from one request.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub prompt_text: String,
    pub references: Vec<Reference>,
    pub analysis: QueryAnalysis,
    /// Retained candidates per source, ranked
    pub candidates: CandidatesBySource,
}

/// Loaded between `initialize` and `shutdown`.
#[derive(Debug)]
struct LoadedState {
    expander: AbbreviationExpander,
    knowledge: KnowledgeBase,
}

pub struct SearchService {
    config: ServiceConfig,
    index: Arc<dyn VectorIndex>,
    collections: Arc<dyn CollectionStore>,
    state: RwLock<Option<Arc<LoadedState>>>,
    history: ChatHistory,
}

impl SearchService {
    pub fn new(
        config: ServiceConfig,
        index: Arc<dyn VectorIndex>,
        collections: Arc<dyn CollectionStore>,
    ) -> Self {
        let history = ChatHistory::new(config.history_window);
        Self {
            config,
            index,
            collections,
            state: RwLock::new(None),
            history,
        }
    }

    /// Build a service over the embedded SQLite index named by `config.index_path`.
    pub fn open(config: ServiceConfig) -> ServiceResult<Self> {
        let index = if config.index_path == IN_MEMORY_INDEX {
            SqliteIndex::open_in_memory()?
        } else {
            SqliteIndex::open(&config.index_path)?
        };
        let index = Arc::new(index);
        Ok(Self::new(config, index.clone(), index))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Load the abbreviation table and knowledge base, indexing when the content changed.
    pub fn initialize(&self) -> ServiceResult<()> {
        let state = self.load()?;
        let written = self.indexer(&state.expander).sync(&state.knowledge)?;
        tracing::info!(
            entries = state.knowledge.len(),
            abbreviations = state.expander.len(),
            indexed = written,
            "Search service initialized"
        );
        self.replace_state(Some(Arc::new(state)));
        Ok(())
    }

    /// Release loaded state. Later requests fail until `initialize` runs again.
    pub fn shutdown(&self) {
        self.replace_state(None);
        tracing::info!("Search service shut down");
    }

    /// Reload from disk and rebuild the knowledge collections unconditionally.
    pub fn reindex_all(&self) -> ServiceResult<usize> {
        self.loaded()?;
        let state = self.load()?;
        let written = self.indexer(&state.expander).reindex(&state.knowledge)?;
        self.replace_state(Some(Arc::new(state)));
        Ok(written)
    }

    /// Retrieve, rank and render the prompt context and reference list for one request.
    pub fn build_context_and_references(
        &self,
        query: &str,
        settings: &SearchSettings,
        prior_plan: Option<&TreatmentPlan>,
        cancel: &CancellationToken,
    ) -> ServiceResult<ContextBundle> {
        let state = self.loaded()?;
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let analysis = QueryAnalysis::analyze(query, &state.expander);
        tracing::info!(
            keywords = ?analysis.keywords.iter().map(|k| k.text.as_str()).collect::<Vec<_>>(),
            "Extracted keywords"
        );

        let retriever = MultiSourceRetriever::new(
            self.index.as_ref(),
            &state.expander,
            self.config.index_timeout(),
        );
        let raw = retriever.retrieve(&analysis, settings, cancel)?;
        let candidates = rank_and_filter(raw, &analysis, &state.expander, settings);
        for (source, kept) in &candidates {
            tracing::info!(source = %source, retained = kept.len(), "Retained candidates");
        }

        let context = ContextAssembler::new().assemble(&candidates, settings);
        let prompt_text = inject_current_plan(context, query, prior_plan);
        let references = format_references(&candidates, settings);

        Ok(ContextBundle {
            prompt_text,
            references,
            analysis,
            candidates,
        })
    }

    /// Extract a plan from generated text. Does not require initialization.
    pub fn parse_generated_plan(&self, text: &str) -> ParseResult {
        parser::parse_generated_plan(text)
    }

    pub fn statistics(&self) -> ServiceResult<KnowledgeStatistics> {
        let state = self.loaded()?;
        let mut indexed = std::collections::BTreeMap::new();
        for source in SourceType::ALL {
            indexed.insert(source, self.index.count(source)?);
        }
        Ok(KnowledgeStatistics {
            total_entries: state.knowledge.len(),
            entries: state.knowledge.counts(),
            indexed,
            fingerprint: self.collections.load_collection(KNOWLEDGE_COLLECTION)?,
        })
    }

    pub fn detailed_reference(&self, id: &str) -> ServiceResult<Option<DetailedReference>> {
        let state = self.loaded()?;
        Ok(state.knowledge.detail(id, &state.expander))
    }

    pub fn index_discovered_rule(&self, rule: &DiscoveredRule) -> ServiceResult<()> {
        let state = self.loaded()?;
        self.indexer(&state.expander).index_discovered_rule(rule)?;
        Ok(())
    }

    /// Store a practitioner-approved plan. Returns its index id.
    pub fn index_approved_sequence(
        &self,
        title: &str,
        plan: &TreatmentPlan,
        approved_by: &str,
    ) -> ServiceResult<String> {
        let state = self.loaded()?;
        Ok(self
            .indexer(&state.expander)
            .index_approved_sequence(title, plan, approved_by)?)
    }

    fn load(&self) -> ServiceResult<LoadedState> {
        let expander = self
            .config
            .abbreviations_path
            .as_ref()
            .map(AbbreviationExpander::load)
            .unwrap_or_default();
        let knowledge = match &self.config.knowledge_base_path {
            Some(path) => KnowledgeBase::load(path)?,
            None => KnowledgeBase::default(),
        };
        Ok(LoadedState {
            expander,
            knowledge,
        })
    }

    fn loaded(&self) -> ServiceResult<Arc<LoadedState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ServiceError::NotInitialized)
    }

    fn replace_state(&self, state: Option<Arc<LoadedState>>) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn indexer<'a>(&'a self, expander: &'a AbbreviationExpander) -> KnowledgeIndexer<'a> {
        KnowledgeIndexer::new(self.index.as_ref(), self.collections.as_ref(), expander)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Appointment;
    use std::io::Write;

    const KNOWLEDGE: &str = r#"{
        "data": [
            {
                "type": "clinical_case",
                "consultation_text": "26 CC",
                "treatment_sequence": [
                    {"rdv": 1, "traitement": "Préparation couronne", "duree": "1h", "delai": "2 sem"},
                    {"rdv": 2, "traitement": "Scellement", "duree": "30min"}
                ]
            },
            {
                "type": "ideal_sequence",
                "consultation_text": "Facette",
                "filename": "sequence_facette.docx",
                "treatment_sequence": [{"rdv": 1, "traitement": "Empreinte"}]
            }
        ]
    }"#;

    fn service() -> (SearchService, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KNOWLEDGE.as_bytes()).unwrap();
        let config = ServiceConfig {
            knowledge_base_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        (SearchService::open(config).unwrap(), file)
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = ServiceConfig::from_json_str(r#"{"index_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.index_timeout(), Duration::from_millis(250));
        assert_eq!(config.history_window, 10);
        assert_eq!(config.index_path, IN_MEMORY_INDEX);
        assert_eq!(ServiceConfig::from_json_str("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_requires_initialize() {
        let (service, _file) = service();
        let result = service.build_context_and_references(
            "26 CC",
            &SearchSettings::default(),
            None,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ServiceError::NotInitialized)));
        assert!(matches!(service.statistics(), Err(ServiceError::NotInitialized)));
    }

    #[test]
    fn test_build_context_after_initialize() {
        let (service, _file) = service();
        service.initialize().unwrap();

        let bundle = service
            .build_context_and_references(
                "26 CC",
                &SearchSettings::default(),
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(bundle.prompt_text.contains("=== CAS CLINIQUES PERTINENTS ==="));
        assert!(bundle.prompt_text.contains("RDV 1: Préparation couronne (1h)"));
        assert_eq!(bundle.references[0].id, "enhanced_0");
        assert_eq!(bundle.analysis.original, "26 CC");
    }

    #[test]
    fn test_cancelled_request() {
        let (service, _file) = service();
        service.initialize().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let settings = SearchSettings::default();
        let result = service.build_context_and_references("26 CC", &settings, None, &cancel);
        assert!(matches!(result, Err(ServiceError::Cancelled)));
    }

    #[test]
    fn test_modification_injects_prior_plan() {
        let (service, _file) = service();
        service.initialize().unwrap();
        let plan = TreatmentPlan::new("26 CC", vec![Appointment::new(1, "Préparation")]);
        let bundle = service
            .build_context_and_references(
                "ajoute un détartrage",
                &SearchSettings::default(),
                Some(&plan),
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(bundle
            .prompt_text
            .contains("--- PLAN DE TRAITEMENT ACTUEL À MODIFIER ---"));
    }

    #[test]
    fn test_statistics_and_reindex() {
        let (service, _file) = service();
        service.initialize().unwrap();

        let stats = service.statistics().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.indexed[&SourceType::ClinicalCase], 1);
        assert_eq!(stats.indexed[&SourceType::IdealSequence], 1);
        assert!(stats.fingerprint.is_some());

        assert_eq!(service.reindex_all().unwrap(), 2);
        assert_eq!(service.statistics().unwrap().indexed[&SourceType::ClinicalCase], 1);
    }

    #[test]
    fn test_runtime_additions_and_detail() {
        let (service, _file) = service();
        service.initialize().unwrap();

        let rule = DiscoveredRule {
            id: "rule_1".into(),
            title: "Couronne après traitement de racine".into(),
            confidence: 85.0,
            ..Default::default()
        };
        service.index_discovered_rule(&rule).unwrap();
        let plan = TreatmentPlan::new("Facette", vec![Appointment::new(1, "Empreinte")]);
        let id = service
            .index_approved_sequence("Facette validée", &plan, "Dr Martin")
            .unwrap();
        assert!(id.starts_with("approved_"));

        let stats = service.statistics().unwrap();
        assert_eq!(stats.indexed[&SourceType::DiscoveredRule], 1);
        assert_eq!(stats.indexed[&SourceType::ApprovedSequence], 1);

        let detail = service.detailed_reference("enhanced_1").unwrap().unwrap();
        assert_eq!(detail.title, "sequence facette - Facette");
    }

    #[test]
    fn test_reindex_all_forgets_withdrawn_approvals() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            r#"{"data": [{"type": "approved_sequence", "title": "Facette validée",
                 "consultation_text": "Facette",
                 "treatment_sequence": [{"rdv": 1, "traitement": "Empreinte"}]}]}"#
                .as_bytes(),
        )
        .unwrap();
        let service = SearchService::open(ServiceConfig {
            knowledge_base_path: Some(file.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        service.initialize().unwrap();
        assert_eq!(service.statistics().unwrap().indexed[&SourceType::ApprovedSequence], 1);

        std::fs::write(
            file.path(),
            r#"{"data": [{"type": "clinical_case", "consultation_text": "26 CC"}]}"#,
        )
        .unwrap();
        assert_eq!(service.reindex_all().unwrap(), 1);
        assert_eq!(service.statistics().unwrap().indexed[&SourceType::ApprovedSequence], 0);

        let bundle = service
            .build_context_and_references(
                "Facette",
                &SearchSettings::default(),
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(bundle
            .references
            .iter()
            .all(|r| r.source_type != SourceType::ApprovedSequence));

        let detail = service.detailed_reference("enhanced_0").unwrap().unwrap();
        assert_eq!(detail.source_type, SourceType::ClinicalCase);
    }

    #[test]
    fn test_shutdown_releases_state() {
        let (service, _file) = service();
        service.initialize().unwrap();
        assert!(service.is_initialized());
        service.shutdown();
        assert!(!service.is_initialized());
        assert!(matches!(service.reindex_all(), Err(ServiceError::NotInitialized)));
    }
}
