//! SQL migration definitions for the docpipe database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: entry_metadata, path_index, entry_content",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Entry id -> metadata document
CREATE TABLE IF NOT EXISTS entry_metadata (
    entry_id      TEXT PRIMARY KEY,
    metadata_json TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Rendered resource path -> entry id (one id per path, one path per id)
CREATE TABLE IF NOT EXISTS path_index (
    path     TEXT PRIMARY KEY,
    entry_id TEXT NOT NULL UNIQUE
);

-- Entry id -> filtered content
CREATE TABLE IF NOT EXISTS entry_content (
    entry_id     TEXT PRIMARY KEY,
    content      TEXT NOT NULL,
    content_hash TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
