//! SQL DDL for all braid tables.
//!
//! Defines the `threads`, `messages`, `bridges`, `archives`, and
//! `engine_meta` tables. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization.

use rusqlite::Connection;

/// All schema DDL statements for braid's core tables.
const SCHEMA_SQL: &str = r#"
-- Work-thread storage
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    topics TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL CHECK(status IN ('active','suspended','archived')),
    origin TEXT NOT NULL CHECK(origin IN ('prompt','file_read','task','fetch','split','reactivation')),
    parent_id TEXT,
    child_ids TEXT NOT NULL DEFAULT '[]',
    split_lock_mode TEXT CHECK(split_lock_mode IN ('compaction','agent_release','force')),
    weight REAL NOT NULL DEFAULT 1.0 CHECK(weight >= 0.0 AND weight <= 1.0),
    last_active TEXT NOT NULL,
    activation_count INTEGER NOT NULL DEFAULT 0,
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_threads_status ON threads(status);
CREATE INDEX IF NOT EXISTS idx_threads_parent ON threads(parent_id);
CREATE INDEX IF NOT EXISTS idx_threads_weight ON threads(weight);

-- Messages, append-only except when moved by a split
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);

-- Semantic edges between threads
CREATE TABLE IF NOT EXISTS bridges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation TEXT NOT NULL CHECK(relation IN ('extends','contradicts','depends','replaces','child_of','sibling')),
    reason TEXT NOT NULL DEFAULT '',
    shared_concepts TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL CHECK(confidence >= 0.0 AND confidence <= 1.0),
    weight REAL NOT NULL CHECK(weight >= 0.0 AND weight <= 1.0),
    status TEXT NOT NULL CHECK(status IN ('active','weak','invalid')),
    propagated_from TEXT,
    propagation_depth INTEGER NOT NULL DEFAULT 0,
    use_count INTEGER NOT NULL DEFAULT 0,
    last_used TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bridges_source ON bridges(source_id);
CREATE INDEX IF NOT EXISTS idx_bridges_target ON bridges(target_id);

-- Condensed records of archived threads; ids stay resolvable here after
-- the live row is gone
CREATE TABLE IF NOT EXISTS archives (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    synthesis TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    archived_at TEXT NOT NULL
);

-- Engine metadata (schema version, quota mode)
CREATE TABLE IF NOT EXISTS engine_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO engine_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"threads".to_string()));
        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"bridges".to_string()));
        assert!(tables.contains(&"archives".to_string()));
        assert!(tables.contains(&"engine_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }
}
