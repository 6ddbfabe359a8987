//! Writes knowledge items into a [`VectorIndex`].

use super::{
    approved_document, entry_document, rule_document, DiscoveredRule, KnowledgeBase,
    KnowledgeResult,
};
use crate::index::{CollectionStore, VectorIndex};
use crate::models::{SourceType, TreatmentPlan};
use crate::query::AbbreviationExpander;

/// Collection-store key holding the fingerprint of the indexed knowledge base.
pub const KNOWLEDGE_COLLECTION: &str = "knowledge_base";

/// Id prefix of approved sequences added at runtime. These survive a reindex.
pub const RUNTIME_APPROVED_PREFIX: &str = "approved_";

/// Source types populated only from the knowledge base file.
const FILE_SOURCES: [SourceType; 3] = [
    SourceType::ClinicalCase,
    SourceType::IdealSequence,
    SourceType::GeneralKnowledge,
];

/// Indexes knowledge base entries, rules and approved sequences.
pub struct KnowledgeIndexer<'a> {
    index: &'a dyn VectorIndex,
    collections: &'a dyn CollectionStore,
    expander: &'a AbbreviationExpander,
}

impl<'a> KnowledgeIndexer<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        collections: &'a dyn CollectionStore,
        expander: &'a AbbreviationExpander,
    ) -> Self {
        Self {
            index,
            collections,
            expander,
        }
    }

    /// Index the knowledge base unless the stored fingerprint matches and the index is populated.
    ///
    /// Returns the number of entries written (0 when the index was already current).
    pub fn sync(&self, base: &KnowledgeBase) -> KnowledgeResult<usize> {
        let fingerprint = base.fingerprint(self.expander.iter())?;
        let stored = self.collections.load_collection(KNOWLEDGE_COLLECTION)?;

        let mut indexed = self.index.count(SourceType::ApprovedSequence)?;
        for source in FILE_SOURCES {
            indexed += self.index.count(source)?;
        }

        if stored.as_deref() == Some(fingerprint.as_str()) && (indexed > 0 || base.is_empty()) {
            tracing::info!(documents = indexed, "Knowledge index is current");
            return Ok(0);
        }
        self.reindex(base)
    }

    /// Drop and rebuild the knowledge base collections.
    ///
    /// Approved sequences from the file are dropped too; runtime approvals are kept.
    pub fn reindex(&self, base: &KnowledgeBase) -> KnowledgeResult<usize> {
        for source in FILE_SOURCES {
            self.index.delete_all(source)?;
        }
        let stale = self
            .index
            .retain_prefixed(SourceType::ApprovedSequence, RUNTIME_APPROVED_PREFIX)?;
        if stale > 0 {
            tracing::debug!(removed = stale, "Dropped file approved sequences");
        }

        let mut written = 0;
        for (i, entry) in base.data.iter().enumerate() {
            if entry.consultation().is_empty() {
                tracing::warn!(entry = i, "Skipping entry without consultation text");
                continue;
            }
            let doc = entry_document(entry, i, self.expander);
            self.index
                .upsert(entry.source_type(), &base.entry_id(i), &doc.text, &doc.metadata)?;
            written += 1;
        }

        let fingerprint = base.fingerprint(self.expander.iter())?;
        self.collections
            .store_collection(KNOWLEDGE_COLLECTION, &fingerprint)?;

        tracing::info!(documents = written, "Indexed knowledge base");
        Ok(written)
    }

    /// Add or replace a discovered rule.
    pub fn index_discovered_rule(&self, rule: &DiscoveredRule) -> KnowledgeResult<()> {
        let doc = rule_document(rule);
        self.index
            .upsert(SourceType::DiscoveredRule, &rule.id, &doc.text, &doc.metadata)?;
        tracing::debug!(rule = %rule.id, confidence = rule.confidence, "Indexed discovered rule");
        Ok(())
    }

    /// Add a practitioner-approved plan. Returns the id it was stored under.
    pub fn index_approved_sequence(
        &self,
        title: &str,
        plan: &TreatmentPlan,
        approved_by: &str,
    ) -> KnowledgeResult<String> {
        let id = format!("{RUNTIME_APPROVED_PREFIX}{}", uuid::Uuid::new_v4());
        let doc = approved_document(title, plan, approved_by, self.expander);
        self.index
            .upsert(SourceType::ApprovedSequence, &id, &doc.text, &doc.metadata)?;
        tracing::debug!(id = %id, appointments = plan.len(), "Indexed approved sequence");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SqliteIndex;
    use crate::models::Appointment;

    fn base() -> KnowledgeBase {
        KnowledgeBase::from_json_str(
            r#"{"data": [
                {"type": "clinical_case", "consultation_text": "26 CC"},
                {"type": "ideal_sequence", "consultation_text": "Facette"},
                {"type": "general", "consultation_text": ""}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_reindex_writes_entries() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);

        let written = indexer.reindex(&base()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(index.count(SourceType::ClinicalCase).unwrap(), 1);
        assert_eq!(index.count(SourceType::IdealSequence).unwrap(), 1);
        assert!(index.load_collection(KNOWLEDGE_COLLECTION).unwrap().is_some());
    }

    #[test]
    fn test_sync_skips_when_current() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);

        assert_eq!(indexer.sync(&base()).unwrap(), 2);
        assert_eq!(indexer.sync(&base()).unwrap(), 0);
    }

    #[test]
    fn test_sync_reindexes_on_change() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);
        indexer.sync(&base()).unwrap();

        let mut changed = base();
        changed.data.truncate(1);
        assert_eq!(indexer.sync(&changed).unwrap(), 1);
        assert_eq!(index.count(SourceType::IdealSequence).unwrap(), 0);
    }

    #[test]
    fn test_sync_reindexes_when_index_emptied() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);
        indexer.sync(&base()).unwrap();

        index.delete_all(SourceType::ClinicalCase).unwrap();
        index.delete_all(SourceType::IdealSequence).unwrap();
        assert_eq!(indexer.sync(&base()).unwrap(), 2);
    }

    #[test]
    fn test_runtime_additions_survive_reindex() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);

        let plan = TreatmentPlan::new("36 TR", vec![Appointment::new(1, "Traitement de racine")]);
        let id = indexer
            .index_approved_sequence("TR 36", &plan, "Dr Martin")
            .unwrap();
        assert!(id.starts_with("approved_"));

        indexer
            .index_discovered_rule(&DiscoveredRule {
                id: "r1".into(),
                title: "Couronne après TR".into(),
                confidence: 80.0,
                ..Default::default()
            })
            .unwrap();

        indexer.reindex(&base()).unwrap();
        assert_eq!(index.count(SourceType::ApprovedSequence).unwrap(), 1);
        assert_eq!(index.count(SourceType::DiscoveredRule).unwrap(), 1);
    }

    #[test]
    fn test_reindex_drops_withdrawn_file_approvals() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let expander = AbbreviationExpander::new();
        let indexer = KnowledgeIndexer::new(&index, &index, &expander);

        let v1 = KnowledgeBase::from_json_str(
            r#"{"data": [{"type": "approved_sequence", "consultation_text": "Facette"}]}"#,
        )
        .unwrap();
        assert_eq!(indexer.sync(&v1).unwrap(), 1);
        assert_eq!(index.count(SourceType::ApprovedSequence).unwrap(), 1);
        assert_eq!(indexer.sync(&v1).unwrap(), 0);

        let plan = TreatmentPlan::new("36 TR", vec![Appointment::new(1, "Traitement de racine")]);
        let runtime_id = indexer
            .index_approved_sequence("TR 36", &plan, "Dr Martin")
            .unwrap();

        let v2 = KnowledgeBase::from_json_str(
            r#"{"data": [{"type": "clinical_case", "consultation_text": "26 CC"}]}"#,
        )
        .unwrap();
        indexer.reindex(&v2).unwrap();

        assert_eq!(index.count(SourceType::ApprovedSequence).unwrap(), 1);
        assert_eq!(index.count(SourceType::ClinicalCase).unwrap(), 1);
        let hits = index
            .query(&crate::index::IndexQuery::new(
                SourceType::ApprovedSequence,
                "Facette",
                10,
                std::time::Duration::from_secs(5),
            ))
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec![runtime_id.as_str()]);
    }
}
