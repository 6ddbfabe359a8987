//! Embedded SQLite index with lexical similarity ranking.
//!
//! Documents are stored per collection and ranked at query time by a string
//! similarity combining Jaro-Winkler (prefix-sensitive) and normalized
//! Levenshtein. Multi-line texts are compared line against line and the best
//! pair wins, so a request matches a document through its expansion as well.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{
    CollectionStore, IndexError, IndexHit, IndexQuery, IndexResult, VectorIndex, SCHEMA,
};
use crate::models::SourceType;

/// SQLite-backed similarity index.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open index at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.initialize()?;
        Ok(index)
    }

    /// Create in-memory index (for testing).
    pub fn open_in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.initialize()?;
        Ok(index)
    }

    /// Initialize schema.
    fn initialize(&self) -> IndexResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IndexError::Unavailable("index connection poisoned".into()))
    }

    /// Fetch one stored document.
    pub fn get(&self, source_type: SourceType, id: &str) -> IndexResult<Option<IndexHit>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, document, metadata FROM index_documents WHERE source_type = ?1 AND id = ?2",
                params![source_type.as_str(), id],
                |row| {
                    Ok(DocumentRow {
                        id: row.get(0)?,
                        document: row.get(1)?,
                        metadata: row.get(2)?,
                    })
                },
            )
            .optional()?;

        row.map(|r| r.into_hit(0.0)).transpose()
    }
}

/// Raw database row for a document.
struct DocumentRow {
    id: String,
    document: String,
    metadata: String,
}

impl DocumentRow {
    fn into_hit(self, distance: f64) -> IndexResult<IndexHit> {
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata)?;
        Ok(IndexHit {
            id: self.id,
            document: self.document,
            metadata,
            distance,
        })
    }
}

impl VectorIndex for SqliteIndex {
    fn query(&self, query: &IndexQuery) -> IndexResult<Vec<IndexHit>> {
        if query.k == 0 || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();

        let rows: Vec<DocumentRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, document, metadata FROM index_documents WHERE source_type = ?1",
            )?;
            let rows = stmt.query_map([query.source_type.as_str()], |row| {
                Ok(DocumentRow {
                    id: row.get(0)?,
                    document: row.get(1)?,
                    metadata: row.get(2)?,
                })
            })?;
            let collected: Vec<DocumentRow> = rows.collect::<Result<_, _>>()?;
            collected
        };

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let similarity = lexical_similarity(&query.text, &row.document);
            let hit = row.into_hit(1.0 - similarity)?;
            if query.filter.as_ref().map_or(true, |f| f.accepts(&hit.metadata)) {
                hits.push(hit);
            }
        }

        if started.elapsed() > query.timeout {
            return Err(IndexError::Timeout(query.timeout));
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.k);
        Ok(hits)
    }

    fn upsert(
        &self,
        source_type: SourceType,
        id: &str,
        document: &str,
        metadata: &Map<String, Value>,
    ) -> IndexResult<()> {
        let metadata_json = serde_json::to_string(metadata)?;
        self.conn()?.execute(
            r#"
            INSERT INTO index_documents (source_type, id, document, metadata, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(source_type, id) DO UPDATE SET
                document = excluded.document,
                metadata = excluded.metadata,
                updated_at = datetime('now')
            "#,
            params![source_type.as_str(), id, document, metadata_json],
        )?;
        Ok(())
    }

    fn delete_all(&self, source_type: SourceType) -> IndexResult<()> {
        self.conn()?.execute(
            "DELETE FROM index_documents WHERE source_type = ?1",
            [source_type.as_str()],
        )?;
        Ok(())
    }

    fn retain_prefixed(&self, source_type: SourceType, prefix: &str) -> IndexResult<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM index_documents WHERE source_type = ?1 AND substr(id, 1, length(?2)) <> ?2",
            params![source_type.as_str(), prefix],
        )?;
        Ok(removed)
    }

    fn count(&self, source_type: SourceType) -> IndexResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM index_documents WHERE source_type = ?1",
            [source_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl CollectionStore for SqliteIndex {
    fn store_collection(&self, name: &str, fingerprint: &str) -> IndexResult<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO index_collections (name, fingerprint, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(name) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                updated_at = datetime('now')
            "#,
            params![name, fingerprint],
        )?;
        Ok(())
    }

    fn load_collection(&self, name: &str) -> IndexResult<Option<String>> {
        let fingerprint = self
            .conn()?
            .query_row(
                "SELECT fingerprint FROM index_collections WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }
}

/// Best line-to-line similarity between two texts, in [0, 1].
pub fn lexical_similarity(query: &str, document: &str) -> f64 {
    let query_lines: Vec<String> = normalized_lines(query);
    let document_lines: Vec<String> = normalized_lines(document);

    query_lines
        .iter()
        .flat_map(|q| document_lines.iter().map(move |d| fuzzy_match(q, d)))
        .fold(0.0, f64::max)
}

fn normalized_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Compute fuzzy string similarity using combined metrics.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);

    jw * 0.6 + lev * 0.4
}
