//! Similarity index abstraction.
//!
//! The retriever talks to an index through [`VectorIndex`]. One collection
//! exists per [`SourceType`]. [`SqliteIndex`] is the embedded implementation;
//! hosts with an embedding-backed store provide their own.

mod schema;
mod sqlite;

pub use schema::*;
pub use sqlite::*;

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{clamp_similarity, SourceType};

/// Index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Query exceeded its time budget of {0:?}")]
    Timeout(Duration),

    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Metadata filter applied by the index before ranking.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexFilter {
    /// Keep documents whose `confidence` metadata is at least this value
    MinConfidence(f64),
}

impl IndexFilter {
    /// Whether a document's metadata passes the filter.
    pub fn accepts(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            IndexFilter::MinConfidence(min) => metadata
                .get("confidence")
                .and_then(Value::as_f64)
                .is_some_and(|c| c >= *min),
        }
    }
}

/// One similarity query against a single collection.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub source_type: SourceType,
    pub text: String,
    /// Maximum hits to return
    pub k: usize,
    pub filter: Option<IndexFilter>,
    pub timeout: Duration,
}

impl IndexQuery {
    pub fn new(
        source_type: SourceType,
        text: impl Into<String>,
        k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source_type,
            text: text.into(),
            k,
            filter: None,
            timeout,
        }
    }

    pub fn with_filter(mut self, filter: IndexFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A document returned by an index query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    /// Distance in [0, 1], 0 meaning identical
    pub distance: f64,
}

impl IndexHit {
    /// Similarity derived from distance, clamped into [0, 1].
    pub fn similarity(&self) -> f64 {
        clamp_similarity(1.0 - self.distance)
    }
}

/// A queryable similarity index holding one collection per source type.
pub trait VectorIndex: Send + Sync {
    /// Nearest documents to `query.text`, closest first, at most `query.k`.
    fn query(&self, query: &IndexQuery) -> IndexResult<Vec<IndexHit>>;

    /// Insert or replace a document.
    fn upsert(
        &self,
        source_type: SourceType,
        id: &str,
        document: &str,
        metadata: &Map<String, Value>,
    ) -> IndexResult<()>;

    /// Remove every document of a collection.
    fn delete_all(&self, source_type: SourceType) -> IndexResult<()>;

    /// Remove the documents of a collection whose id does not start with `prefix`.
    /// Returns the number removed.
    fn retain_prefixed(&self, source_type: SourceType, prefix: &str) -> IndexResult<usize>;

    /// Number of documents in a collection.
    fn count(&self, source_type: SourceType) -> IndexResult<usize>;
}

/// Key/value store for collection-level bookkeeping (content fingerprints).
pub trait CollectionStore: Send + Sync {
    fn store_collection(&self, name: &str, fingerprint: &str) -> IndexResult<()>;

    fn load_collection(&self, name: &str) -> IndexResult<Option<String>>;
}
