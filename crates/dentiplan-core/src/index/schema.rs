//! SQLite schema for the embedded index.

/// Schema for the embedded similarity index.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Indexed documents, one collection per source type
-- ============================================================================

CREATE TABLE IF NOT EXISTS index_documents (
    source_type TEXT NOT NULL,
    id TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',          -- JSON object
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (source_type, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON index_documents(source_type);

-- ============================================================================
-- Collection bookkeeping (knowledge base fingerprints)
-- ============================================================================

CREATE TABLE IF NOT EXISTS index_collections (
    name TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
