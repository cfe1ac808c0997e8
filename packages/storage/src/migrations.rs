//! SQL migration definitions for the vidlore database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number, a human-readable description, and a batch of SQL
//! statements. The `schema_migrations` table records what has been applied,
//! so the history stays queryable.

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
            description: "Initial schema: channels, videos, transcripts, knowledge, taxonomy, FTS5",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered channels
CREATE TABLE IF NOT EXISTS channels (
    id               TEXT PRIMARY KEY,
    external_id      TEXT NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    url              TEXT NOT NULL,
    description      TEXT,
    subscriber_count INTEGER,
    video_count      INTEGER,
    thumbnail_url    TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Discovered videos and their ingestion state
CREATE TABLE IF NOT EXISTS videos (
    id             TEXT PRIMARY KEY,
    channel_id     TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    external_id    TEXT NOT NULL UNIQUE,
    title          TEXT NOT NULL,
    description    TEXT,
    published_at   TEXT,
    thumbnail_url  TEXT,
    status         TEXT NOT NULL DEFAULT 'pending',
    failure_reason TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(channel_id);
CREATE INDEX IF NOT EXISTS idx_videos_status ON videos(status);

-- Fetched transcripts (append-only)
CREATE TABLE IF NOT EXISTS transcripts (
    id            TEXT PRIMARY KEY,
    video_id      TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    language_code TEXT NOT NULL,
    is_generated  INTEGER NOT NULL,
    snippets_json TEXT NOT NULL,
    full_text     TEXT NOT NULL,
    word_count    INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transcripts_video ON transcripts(video_id);

-- Extracted knowledge entries
CREATE TABLE IF NOT EXISTS knowledge_entries (
    id                TEXT PRIMARY KEY,
    video_id          TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    entry_type        TEXT NOT NULL,
    title             TEXT NOT NULL,
    content           TEXT NOT NULL,
    source_quote      TEXT,
    source_start_time REAL,
    source_end_time   REAL,
    confidence        REAL NOT NULL,
    chunk_index       INTEGER,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_video ON knowledge_entries(video_id);
CREATE INDEX IF NOT EXISTS idx_entries_type ON knowledge_entries(entry_type);

-- Taxonomy
CREATE TABLE IF NOT EXISTS categories (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tags (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS entry_categories (
    entry_id    TEXT NOT NULL REFERENCES knowledge_entries(id) ON DELETE CASCADE,
    category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    UNIQUE(entry_id, category_id)
);

CREATE TABLE IF NOT EXISTS entry_tags (
    entry_id TEXT NOT NULL REFERENCES knowledge_entries(id) ON DELETE CASCADE,
    tag_id   TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE(entry_id, tag_id)
);

-- Commercial bias annotations (non-destructive; one per entry per type)
CREATE TABLE IF NOT EXISTS bias_flags (
    id          TEXT PRIMARY KEY,
    entry_id    TEXT NOT NULL REFERENCES knowledge_entries(id) ON DELETE CASCADE,
    bias_type   TEXT NOT NULL,
    severity    TEXT NOT NULL,
    brand_names TEXT NOT NULL,
    notes       TEXT NOT NULL,
    detected_by TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(entry_id, bias_type)
);

CREATE INDEX IF NOT EXISTS idx_bias_entry ON bias_flags(entry_id);

-- Full-text search on knowledge entries
CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
    title,
    content,
    source_quote,
    content=knowledge_entries,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS knowledge_fts_insert AFTER INSERT ON knowledge_entries BEGIN
    INSERT INTO knowledge_fts(rowid, title, content, source_quote)
    VALUES (new.rowid, new.title, new.content, new.source_quote);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_fts_delete AFTER DELETE ON knowledge_entries BEGIN
    INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, source_quote)
    VALUES ('delete', old.rowid, old.title, old.content, old.source_quote);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_fts_update AFTER UPDATE ON knowledge_entries BEGIN
    INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, source_quote)
    VALUES ('delete', old.rowid, old.title, old.content, old.source_quote);
    INSERT INTO knowledge_fts(rowid, title, content, source_quote)
    VALUES (new.rowid, new.title, new.content, new.source_quote);
END;

-- Full-text search on transcripts
CREATE VIRTUAL TABLE IF NOT EXISTS transcript_fts USING fts5(
    full_text,
    content=transcripts,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS transcript_fts_insert AFTER INSERT ON transcripts BEGIN
    INSERT INTO transcript_fts(rowid, full_text)
    VALUES (new.rowid, new.full_text);
END;

CREATE TRIGGER IF NOT EXISTS transcript_fts_delete AFTER DELETE ON transcripts BEGIN
    INSERT INTO transcript_fts(transcript_fts, rowid, full_text)
    VALUES ('delete', old.rowid, old.full_text);
END;

INSERT INTO schema_migrations (version, description)
VALUES (1, 'Initial schema: channels, videos, transcripts, knowledge, taxonomy, FTS5');
"#,
        },
        Migration {
            version: 2,
            description: "Curation queue and audit logs",
            sql: r#"
-- Proposed maintenance actions awaiting review/execution
CREATE TABLE IF NOT EXISTS curation_queue (
    id           TEXT PRIMARY KEY,
    action_type  TEXT NOT NULL,
    severity     TEXT NOT NULL,
    target_type  TEXT NOT NULL,
    target_id    TEXT,
    description  TEXT NOT NULL,
    details_json TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    resolved_by  TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_status ON curation_queue(status);

-- Per-video pipeline audit (append-only)
CREATE TABLE IF NOT EXISTS processing_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id   TEXT NOT NULL,
    step       TEXT NOT NULL,
    status     TEXT NOT NULL,
    detail     TEXT,
    tokens_in  INTEGER,
    tokens_out INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processing_video ON processing_log(video_id);

-- Curation/merge provenance (append-only)
CREATE TABLE IF NOT EXISTS curation_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    action     TEXT NOT NULL,
    detail     TEXT,
    created_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version, description)
VALUES (2, 'Curation queue and audit logs');
"#,
        },
    ]
}
