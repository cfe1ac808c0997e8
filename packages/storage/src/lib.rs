//! libSQL storage layer for the vidlore knowledge base.
//!
//! The [`Storage`] struct wraps a local libSQL database holding channels,
//! videos, transcripts, knowledge entries, taxonomy, bias flags, the curation
//! queue, audit logs, and FTS5 full-text search. It is the sole writer; every
//! status transition and confidence change goes through a method here.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;
use vidlore_shared::{
    BiasFlag, BiasSeverity, BiasSummary, BiasType, Category, Channel, ChannelInfo,
    ChannelOverview, EntryType, IngestStatus, IngestionStats, KnowledgeEntry, NewBiasFlag,
    NewQueueItem, PendingVideo, QueueItem, QueueStatus, RawVideo, Result, SearchHit, Tag,
    TagUsage, TranscriptData, TranscriptHit, Video, VidloreError,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VidloreError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    VidloreError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Migration history as `(version, description, applied_at)` rows.
    pub async fn migration_history(&self) -> Result<Vec<(u32, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT version, description, applied_at FROM schema_migrations ORDER BY version",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<u32>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                row.get::<String>(2)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Channel operations
    // -----------------------------------------------------------------------

    /// Upsert a channel keyed by its external id. Returns the stable db id.
    pub async fn upsert_channel(&self, info: &ChannelInfo) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO channels (id, external_id, name, url, description,
                                       subscriber_count, video_count, thumbnail_url,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(external_id) DO UPDATE SET
                   name = excluded.name,
                   url = excluded.url,
                   description = excluded.description,
                   subscriber_count = excluded.subscriber_count,
                   video_count = excluded.video_count,
                   thumbnail_url = excluded.thumbnail_url,
                   updated_at = excluded.updated_at",
                params![
                    id.as_str(),
                    info.external_id.as_str(),
                    info.name.as_str(),
                    info.url.as_str(),
                    info.description.as_deref(),
                    info.subscriber_count,
                    info.video_count,
                    info.thumbnail_url.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        // On conflict the original row id survives; read it back.
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM channels WHERE external_id = ?1",
                params![info.external_id.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| VidloreError::Storage(e.to_string())),
            _ => Err(VidloreError::Storage(
                "channel vanished after upsert".into(),
            )),
        }
    }

    /// Get a channel by external id.
    pub async fn get_channel(&self, external_id: &str) -> Result<Option<Channel>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, external_id, name, url, description,
                        subscriber_count, video_count, thumbnail_url
                 FROM channels WHERE external_id = ?1",
                params![external_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_channel(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(VidloreError::Storage(e.to_string())),
        }
    }

    /// List all channels with total/analyzed video counts.
    pub async fn list_channels(&self) -> Result<Vec<ChannelOverview>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.id, c.external_id, c.name, c.url, c.description,
                        c.subscriber_count, c.video_count, c.thumbnail_url,
                        COUNT(v.id),
                        SUM(CASE WHEN v.status = 'analyzed' THEN 1 ELSE 0 END)
                 FROM channels c
                 LEFT JOIN videos v ON v.channel_id = c.id
                 GROUP BY c.id
                 ORDER BY c.name",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ChannelOverview {
                channel: row_to_channel(&row)?,
                total_videos: row.get::<i64>(8).unwrap_or(0),
                analyzed_videos: row.get::<i64>(9).unwrap_or(0),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Video operations
    // -----------------------------------------------------------------------

    /// Batch-insert discovered videos, skipping any already known by external
    /// id. Returns the number of newly-inserted rows.
    pub async fn insert_videos_batch(
        &self,
        channel_id: &str,
        videos: &[RawVideo],
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0usize;
        for video in videos {
            let changed = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO videos
                       (id, channel_id, external_id, title, description,
                        published_at, thumbnail_url, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                    params![
                        Uuid::now_v7().to_string(),
                        channel_id,
                        video.external_id.as_str(),
                        video.title.as_str(),
                        video.description.as_deref(),
                        video.published_at.map(|t| t.to_rfc3339()),
                        video.thumbnail_url.as_deref(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            inserted += changed as usize;
        }
        tracing::debug!(total = videos.len(), inserted, "batch video insert");
        Ok(inserted)
    }

    /// List videos eligible for ingestion (pending or failed), newest first.
    /// Optionally filtered by channel external id and capped at `limit`.
    pub async fn list_pending(
        &self,
        channel_external_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<PendingVideo>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut rows = match channel_external_id {
            Some(channel) => self
                .conn
                .query(
                    "SELECT v.id, v.external_id, v.title, v.description,
                            c.name, c.external_id
                     FROM videos v
                     JOIN channels c ON c.id = v.channel_id
                     WHERE v.status IN ('pending', 'failed') AND c.external_id = ?1
                     ORDER BY v.published_at DESC
                     LIMIT ?2",
                    params![channel, limit],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT v.id, v.external_id, v.title, v.description,
                            c.name, c.external_id
                     FROM videos v
                     JOIN channels c ON c.id = v.channel_id
                     WHERE v.status IN ('pending', 'failed')
                     ORDER BY v.published_at DESC
                     LIMIT ?1",
                    params![limit],
                )
                .await,
        }
        .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(PendingVideo {
                id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                external_id: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                title: row
                    .get::<String>(2)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                description: row.get::<String>(3).ok(),
                channel_name: row
                    .get::<String>(4)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                channel_external_id: row
                    .get::<String>(5)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    /// Set a video's ingestion status. The only status writer: one atomic
    /// update of status, failure reason, and timestamp.
    pub async fn set_video_status(
        &self,
        video_id: &str,
        status: IngestStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE videos SET status = ?1, failure_reason = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), reason, now.as_str(), video_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a video by its db id.
    pub async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, channel_id, external_id, title, description,
                        published_at, thumbnail_url, status, failure_reason
                 FROM videos WHERE id = ?1",
                params![video_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_video(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(VidloreError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Transcript operations
    // -----------------------------------------------------------------------

    /// Store a fetched transcript (append-only). Returns the transcript id.
    pub async fn insert_transcript(
        &self,
        video_id: &str,
        transcript: &TranscriptData,
    ) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let snippets_json = serde_json::to_string(&transcript.snippets)
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO transcripts
                   (id, video_id, language_code, is_generated, snippets_json,
                    full_text, word_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.as_str(),
                    video_id,
                    transcript.language_code.as_str(),
                    transcript.is_generated as i64,
                    snippets_json.as_str(),
                    transcript.full_text.as_str(),
                    transcript.word_count,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Knowledge entry operations
    // -----------------------------------------------------------------------

    /// Insert a knowledge entry.
    pub async fn insert_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO knowledge_entries
                   (id, video_id, entry_type, title, content, source_quote,
                    source_start_time, source_end_time, confidence, chunk_index,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    entry.id.as_str(),
                    entry.video_id.as_str(),
                    entry.entry_type.as_str(),
                    entry.title.as_str(),
                    entry.content.as_str(),
                    entry.source_quote.as_deref(),
                    entry.source_start_time,
                    entry.source_end_time,
                    entry.confidence,
                    entry.chunk_index,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a knowledge entry by id.
    pub async fn get_entry(&self, entry_id: &str) -> Result<Option<KnowledgeEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM knowledge_entries WHERE id = ?1"),
                params![entry_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(VidloreError::Storage(e.to_string())),
        }
    }

    /// Get or create a category by display name (deduplicated by slug).
    pub async fn get_or_create_category(&self, name: &str) -> Result<Category> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(VidloreError::validation(format!(
                "category name '{name}' normalizes to nothing"
            )));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, name, slug FROM categories WHERE slug = ?1",
                params![slug.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        if let Ok(Some(row)) = rows.next().await {
            return Ok(Category {
                id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                slug: row
                    .get::<String>(2)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            });
        }

        let id = Uuid::now_v7().to_string();
        let display = name.trim();
        self.conn
            .execute(
                "INSERT INTO categories (id, name, slug) VALUES (?1, ?2, ?3)",
                params![id.as_str(), display, slug.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(Category {
            id,
            name: display.to_string(),
            slug,
        })
    }

    /// Get or create a tag (deduplicated by lowercase-trimmed name).
    pub async fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(VidloreError::validation("empty tag name"));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, name FROM tags WHERE name = ?1",
                params![normalized.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        if let Ok(Some(row)) = rows.next().await {
            return Ok(Tag {
                id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            });
        }

        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                params![id.as_str(), normalized.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(Tag {
            id,
            name: normalized,
        })
    }

    /// Link an entry to a category. A duplicate link is a no-op.
    pub async fn link_entry_category(&self, entry_id: &str, category_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO entry_categories (entry_id, category_id) VALUES (?1, ?2)",
                params![entry_id, category_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Link an entry to a tag. A duplicate link is a no-op.
    pub async fn link_entry_tag(&self, entry_id: &str, tag_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2)",
                params![entry_id, tag_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update an entry's confidence, clamped to [0, 1].
    pub async fn update_entry_confidence(&self, entry_id: &str, confidence: f64) -> Result<()> {
        let clamped = confidence.clamp(0.0, 1.0);
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE knowledge_entries SET confidence = ?1, updated_at = ?2 WHERE id = ?3",
                params![clamped, now.as_str(), entry_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete an entry along with its taxonomy links and bias flags.
    pub async fn delete_entry(&self, entry_id: &str) -> Result<()> {
        for sql in [
            "DELETE FROM entry_categories WHERE entry_id = ?1",
            "DELETE FROM entry_tags WHERE entry_id = ?1",
            "DELETE FROM bias_flags WHERE entry_id = ?1",
            "DELETE FROM knowledge_entries WHERE id = ?1",
        ] {
            self.conn
                .execute(sql, params![entry_id])
                .await
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Full-text search over knowledge entries, BM25-ranked, optionally
    /// restricted to one entry type. Hits carry video/channel display fields.
    pub async fn search_knowledge(
        &self,
        query: &str,
        limit: u32,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<SearchHit>> {
        let fts_query = fts_or_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let base = format!(
            "SELECT {}, v.external_id, v.title, c.name, fts.rank
             FROM knowledge_fts fts
             JOIN knowledge_entries k ON k.rowid = fts.rowid
             JOIN videos v ON v.id = k.video_id
             JOIN channels c ON c.id = v.channel_id
             WHERE knowledge_fts MATCH ?1",
            entry_columns_prefixed("k")
        );

        let mut rows = match entry_type {
            Some(et) => self
                .conn
                .query(
                    &format!("{base} AND k.entry_type = ?2 ORDER BY rank, k.rowid LIMIT ?3"),
                    params![fts_query.as_str(), et.as_str(), limit],
                )
                .await,
            None => self
                .conn
                .query(
                    &format!("{base} ORDER BY rank, k.rowid LIMIT ?2"),
                    params![fts_query.as_str(), limit],
                )
                .await,
        }
        .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(SearchHit {
                entry: row_to_entry(&row)?,
                video_external_id: row
                    .get::<String>(10)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                video_title: row
                    .get::<String>(11)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                channel_name: row
                    .get::<String>(12)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                rank: row.get::<f64>(13).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    /// Full-text search over transcript text.
    pub async fn search_transcripts(&self, query: &str, limit: u32) -> Result<Vec<TranscriptHit>> {
        let fts_query = fts_or_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = self
            .conn
            .query(
                "SELECT t.id, v.external_id, v.title, c.name, t.word_count, fts.rank
                 FROM transcript_fts fts
                 JOIN transcripts t ON t.rowid = fts.rowid
                 JOIN videos v ON v.id = t.video_id
                 JOIN channels c ON c.id = v.channel_id
                 WHERE transcript_fts MATCH ?1
                 ORDER BY rank, t.rowid
                 LIMIT ?2",
                params![fts_query.as_str(), limit],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(TranscriptHit {
                transcript_id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                video_external_id: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                video_title: row
                    .get::<String>(2)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                channel_name: row
                    .get::<String>(3)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                word_count: row.get::<i64>(4).unwrap_or(0),
                rank: row.get::<f64>(5).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Bias flag operations
    // -----------------------------------------------------------------------

    /// Entries that carry no bias flag of any type yet.
    pub async fn unflagged_entries(&self) -> Result<Vec<KnowledgeEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
                     WHERE id NOT IN (SELECT entry_id FROM bias_flags)
                     ORDER BY created_at"
                ),
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    /// Insert a bias flag. Returns `false` when the entry already carries a
    /// flag of this type (the duplicate is silently suppressed).
    pub async fn insert_bias_flag(&self, flag: &NewBiasFlag) -> Result<bool> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let brands = serde_json::to_string(&flag.brand_names)
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO bias_flags
                   (id, entry_id, bias_type, severity, brand_names, notes,
                    detected_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.as_str(),
                    flag.entry_id.as_str(),
                    flag.bias_type.as_str(),
                    flag.severity.as_str(),
                    brands.as_str(),
                    flag.notes.as_str(),
                    flag.detected_by.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// All bias flags on an entry.
    pub async fn bias_flags_for_entry(&self, entry_id: &str) -> Result<Vec<BiasFlag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entry_id, bias_type, severity, brand_names, notes, detected_by
                 FROM bias_flags WHERE entry_id = ?1 ORDER BY created_at",
                params![entry_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let brands_json: String = row
                .get(4)
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            results.push(BiasFlag {
                id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                entry_id: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                bias_type: BiasType::coerce(
                    &row.get::<String>(2)
                        .map_err(|e| VidloreError::Storage(e.to_string()))?,
                ),
                severity: BiasSeverity::coerce(
                    &row.get::<String>(3)
                        .map_err(|e| VidloreError::Storage(e.to_string()))?,
                ),
                brand_names: serde_json::from_str(&brands_json)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                notes: row
                    .get::<String>(5)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                detected_by: row
                    .get::<String>(6)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    /// Aggregate bias flag counts.
    pub async fn bias_summary(&self) -> Result<BiasSummary> {
        let mut summary = BiasSummary::default();

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COUNT(DISTINCT entry_id) FROM bias_flags",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        if let Ok(Some(row)) = rows.next().await {
            summary.total_flags = row.get::<i64>(0).unwrap_or(0);
            summary.flagged_entries = row.get::<i64>(1).unwrap_or(0);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT bias_type, COUNT(*) FROM bias_flags GROUP BY bias_type",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        while let Ok(Some(row)) = rows.next().await {
            let key: String = row
                .get(0)
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            summary.by_type.insert(key, row.get::<i64>(1).unwrap_or(0));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT severity, COUNT(*) FROM bias_flags GROUP BY severity",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        while let Ok(Some(row)) = rows.next().await {
            let key: String = row
                .get(0)
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            summary
                .by_severity
                .insert(key, row.get::<i64>(1).unwrap_or(0));
        }

        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Curation queue operations
    // -----------------------------------------------------------------------

    /// Insert a new queue item (status starts at pending). Returns its id.
    pub async fn insert_queue_item(&self, item: &NewQueueItem) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let details = serde_json::to_string(&item.details)
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO curation_queue
                   (id, action_type, severity, target_type, target_id,
                    description, details_json, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                params![
                    id.as_str(),
                    item.action_type.as_str(),
                    item.severity.as_str(),
                    item.target_type.as_str(),
                    item.target_id.as_deref(),
                    item.description.as_str(),
                    details.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Queue items awaiting review.
    pub async fn pending_queue_items(&self) -> Result<Vec<QueueItem>> {
        self.queue_items_with_status(QueueStatus::Pending).await
    }

    /// Queue items approved and awaiting execution.
    pub async fn approved_queue_items(&self) -> Result<Vec<QueueItem>> {
        self.queue_items_with_status(QueueStatus::Approved).await
    }

    async fn queue_items_with_status(&self, status: QueueStatus) -> Result<Vec<QueueItem>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, action_type, severity, target_type, target_id,
                        description, details_json, status
                 FROM curation_queue WHERE status = ?1 ORDER BY created_at",
                params![status.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_queue_item(&row)?);
        }
        Ok(results)
    }

    /// Transition a queue item's status, recording who resolved it.
    pub async fn set_queue_status(
        &self,
        item_id: &str,
        status: QueueStatus,
        resolved_by: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE curation_queue SET status = ?1, resolved_by = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), resolved_by, now.as_str(), item_id],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit logs
    // -----------------------------------------------------------------------

    /// Append one per-video pipeline audit row.
    pub async fn log_processing_step(
        &self,
        video_id: &str,
        step: &str,
        status: &str,
        detail: Option<&str>,
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO processing_log
                   (video_id, step, status, detail, tokens_in, tokens_out, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![video_id, step, status, detail, tokens_in, tokens_out, now.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Append one curation provenance row.
    pub async fn log_curation(&self, action: &str, detail: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO curation_log (action, detail, created_at) VALUES (?1, ?2, ?3)",
                params![action, detail, now.as_str()],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Curation queries
    // -----------------------------------------------------------------------

    /// All tags with their link usage counts, most-used first.
    pub async fn tags_with_counts(&self) -> Result<Vec<TagUsage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.name, COUNT(et.entry_id)
                 FROM tags t
                 LEFT JOIN entry_tags et ON et.tag_id = t.id
                 GROUP BY t.id
                 ORDER BY COUNT(et.entry_id) DESC, t.name",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(TagUsage {
                id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                usage_count: row.get::<i64>(2).unwrap_or(0),
            });
        }
        Ok(results)
    }

    /// Merge tags: repoint every link on the losers to `keep_id` (duplicates
    /// collapse), then delete the losers.
    pub async fn merge_tags(&self, keep_id: &str, remove_ids: &[String]) -> Result<()> {
        for remove_id in remove_ids {
            self.conn
                .execute(
                    "UPDATE OR IGNORE entry_tags SET tag_id = ?1 WHERE tag_id = ?2",
                    params![keep_id, remove_id.as_str()],
                )
                .await
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            // Rows that would have duplicated an existing link stay behind.
            self.conn
                .execute(
                    "DELETE FROM entry_tags WHERE tag_id = ?1",
                    params![remove_id.as_str()],
                )
                .await
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            self.conn
                .execute("DELETE FROM tags WHERE id = ?1", params![remove_id.as_str()])
                .await
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Entries with no category links yet.
    pub async fn entries_without_categories(&self, limit: u32) -> Result<Vec<KnowledgeEntry>> {
        self.entries_without_links("entry_categories", limit).await
    }

    /// Entries with no tag links yet.
    pub async fn entries_without_tags(&self, limit: u32) -> Result<Vec<KnowledgeEntry>> {
        self.entries_without_links("entry_tags", limit).await
    }

    async fn entries_without_links(&self, link_table: &str, limit: u32) -> Result<Vec<KnowledgeEntry>> {
        // link_table is one of two compile-time constants, never user input.
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
                     WHERE id NOT IN (SELECT entry_id FROM {link_table})
                     ORDER BY created_at
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    /// Lightweight view of every entry for cross-video comparison.
    pub async fn entries_for_comparison(&self) -> Result<Vec<ComparisonEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, video_id, title, confidence FROM knowledge_entries ORDER BY title",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ComparisonEntry {
                entry_id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                video_id: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                title: row
                    .get::<String>(2)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                confidence: row.get::<f64>(3).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    /// Entries that look like extraction garbage: low confidence AND short
    /// content.
    pub async fn low_quality_entries(
        &self,
        max_confidence: f64,
        max_content_len: i64,
    ) -> Result<Vec<KnowledgeEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
                     WHERE confidence < ?1 AND LENGTH(content) < ?2
                     ORDER BY confidence"
                ),
                params![max_confidence, max_content_len],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    /// Analyzed videos whose extraction looks weak: too few entries or too
    /// low an average confidence.
    pub async fn videos_with_low_entry_stats(
        &self,
        min_entries: i64,
        min_avg_confidence: f64,
    ) -> Result<Vec<LowStatsVideo>> {
        let mut rows = self
            .conn
            .query(
                "SELECT v.id, v.title, COUNT(k.id), COALESCE(AVG(k.confidence), 0.0)
                 FROM videos v
                 LEFT JOIN knowledge_entries k ON k.video_id = v.id
                 WHERE v.status = 'analyzed'
                 GROUP BY v.id, v.title
                 HAVING COUNT(k.id) < ?1 OR COALESCE(AVG(k.confidence), 0.0) < ?2",
                params![min_entries, min_avg_confidence],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(LowStatsVideo {
                video_id: row
                    .get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                title: row
                    .get::<String>(1)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
                entry_count: row.get::<i64>(2).unwrap_or(0),
                avg_confidence: row.get::<f64>(3).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    /// Existing category display names, alphabetical.
    pub async fn category_names(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT name FROM categories ORDER BY name", params![])
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| VidloreError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Total knowledge entry count.
    pub async fn count_entries(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM knowledge_entries", params![])
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
            _ => Ok(0),
        }
    }

    /// Aggregate ingestion counts for the presentation boundary.
    pub async fn ingestion_stats(&self) -> Result<IngestionStats> {
        let mut stats = IngestionStats::default();

        let mut rows = self
            .conn
            .query(
                "SELECT (SELECT COUNT(*) FROM channels),
                        (SELECT COUNT(*) FROM videos),
                        (SELECT COUNT(*) FROM knowledge_entries),
                        (SELECT COUNT(*) FROM categories),
                        (SELECT COUNT(*) FROM tags),
                        (SELECT COALESCE(SUM(COALESCE(tokens_in, 0) + COALESCE(tokens_out, 0)), 0)
                         FROM processing_log)",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        if let Ok(Some(row)) = rows.next().await {
            stats.channels = row.get::<i64>(0).unwrap_or(0);
            stats.total_videos = row.get::<i64>(1).unwrap_or(0);
            stats.knowledge_entries = row.get::<i64>(2).unwrap_or(0);
            stats.categories = row.get::<i64>(3).unwrap_or(0);
            stats.tags = row.get::<i64>(4).unwrap_or(0);
            stats.total_tokens = row.get::<i64>(5).unwrap_or(0);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM videos GROUP BY status",
                params![],
            )
            .await
            .map_err(|e| VidloreError::Storage(e.to_string()))?;
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| VidloreError::Storage(e.to_string()))?;
            stats
                .videos_by_status
                .insert(status, row.get::<i64>(1).unwrap_or(0));
        }

        Ok(stats)
    }
}

/// One entry in the cross-video comparison view.
#[derive(Debug, Clone)]
pub struct ComparisonEntry {
    pub entry_id: String,
    pub video_id: String,
    pub title: String,
    pub confidence: f64,
}

/// An analyzed video with weak extraction stats.
#[derive(Debug, Clone)]
pub struct LowStatsVideo {
    pub video_id: String,
    pub title: String,
    pub entry_count: i64,
    pub avg_confidence: f64,
}

/// Rewrite a natural-language query into an FTS5 OR-query of sanitized terms.
///
/// Each whitespace-separated word is stripped to alphanumerics/underscore;
/// empty remainders are dropped. Returns an empty string when nothing usable
/// is left.
pub fn fts_or_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Normalize a category display name into a slug.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Column list for reading a [`KnowledgeEntry`], in `row_to_entry` order.
const ENTRY_COLUMNS: &str = "id, video_id, entry_type, title, content, source_quote, \
                             source_start_time, source_end_time, confidence, chunk_index";

fn entry_columns_prefixed(alias: &str) -> String {
    ENTRY_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a database row (in [`ENTRY_COLUMNS`] order) to a [`KnowledgeEntry`].
fn row_to_entry(row: &libsql::Row) -> Result<KnowledgeEntry> {
    Ok(KnowledgeEntry {
        id: row
            .get::<String>(0)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        video_id: row
            .get::<String>(1)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        entry_type: EntryType::coerce(
            &row.get::<String>(2)
                .map_err(|e| VidloreError::Storage(e.to_string()))?,
        ),
        title: row
            .get::<String>(3)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        content: row
            .get::<String>(4)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        source_quote: row.get::<String>(5).ok(),
        source_start_time: row.get::<f64>(6).ok(),
        source_end_time: row.get::<f64>(7).ok(),
        confidence: row.get::<f64>(8).unwrap_or(0.0),
        chunk_index: row.get::<i64>(9).ok(),
    })
}

/// Convert a database row to a [`Channel`].
fn row_to_channel(row: &libsql::Row) -> Result<Channel> {
    Ok(Channel {
        id: row
            .get::<String>(0)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        external_id: row
            .get::<String>(1)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        name: row
            .get::<String>(2)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        url: row
            .get::<String>(3)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        description: row.get::<String>(4).ok(),
        subscriber_count: row.get::<i64>(5).ok(),
        video_count: row.get::<i64>(6).ok(),
        thumbnail_url: row.get::<String>(7).ok(),
    })
}

/// Convert a database row to a [`Video`].
fn row_to_video(row: &libsql::Row) -> Result<Video> {
    let status_str: String = row
        .get(7)
        .map_err(|e| VidloreError::Storage(e.to_string()))?;
    let status = IngestStatus::parse(&status_str)
        .ok_or_else(|| VidloreError::Storage(format!("unknown video status '{status_str}'")))?;

    Ok(Video {
        id: row
            .get::<String>(0)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        channel_id: row
            .get::<String>(1)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        external_id: row
            .get::<String>(2)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        title: row
            .get::<String>(3)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        description: row.get::<String>(4).ok(),
        published_at: row
            .get::<String>(5)
            .ok()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        thumbnail_url: row.get::<String>(6).ok(),
        status,
        failure_reason: row.get::<String>(8).ok(),
    })
}

/// Convert a database row to a [`QueueItem`].
fn row_to_queue_item(row: &libsql::Row) -> Result<QueueItem> {
    let severity_str: String = row
        .get(2)
        .map_err(|e| VidloreError::Storage(e.to_string()))?;
    let status_str: String = row
        .get(7)
        .map_err(|e| VidloreError::Storage(e.to_string()))?;
    let details_json: String = row
        .get(6)
        .map_err(|e| VidloreError::Storage(e.to_string()))?;

    Ok(QueueItem {
        id: row
            .get::<String>(0)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        action_type: row
            .get::<String>(1)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        severity: vidlore_shared::ActionSeverity::parse(&severity_str).ok_or_else(|| {
            VidloreError::Storage(format!("unknown action severity '{severity_str}'"))
        })?,
        target_type: row
            .get::<String>(3)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        target_id: row.get::<String>(4).ok(),
        description: row
            .get::<String>(5)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        details: serde_json::from_str(&details_json)
            .map_err(|e| VidloreError::Storage(e.to_string()))?,
        status: QueueStatus::parse(&status_str).ok_or_else(|| {
            VidloreError::Storage(format!("unknown queue status '{status_str}'"))
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use vidlore_shared::{ActionSeverity, Snippet};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("vidlore_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn channel_info(external_id: &str, name: &str) -> ChannelInfo {
        ChannelInfo {
            external_id: external_id.into(),
            name: name.into(),
            url: format!("https://videos.example/c/{external_id}"),
            description: None,
            subscriber_count: Some(1200),
            video_count: Some(40),
            thumbnail_url: None,
        }
    }

    fn raw_video(external_id: &str, title: &str, days_ago: i64) -> RawVideo {
        RawVideo {
            external_id: external_id.into(),
            title: title.into(),
            description: None,
            published_at: Some(Utc::now() - Duration::days(days_ago)),
            thumbnail_url: None,
        }
    }

    fn entry(video_id: &str, title: &str, content: &str, confidence: f64) -> KnowledgeEntry {
        KnowledgeEntry {
            id: Uuid::now_v7().to_string(),
            video_id: video_id.into(),
            entry_type: EntryType::Tip,
            title: title.into(),
            content: content.into(),
            source_quote: None,
            source_start_time: Some(12.0),
            source_end_time: Some(85.0),
            confidence,
            chunk_index: Some(0),
        }
    }

    /// Create a channel with one video; returns the video's db id.
    async fn seed_video(storage: &Storage) -> String {
        let channel_id = storage
            .upsert_channel(&channel_info("chan-1", "Test Channel"))
            .await
            .unwrap();
        storage
            .insert_videos_batch(&channel_id, &[raw_video("vid-1", "Test Video", 1)])
            .await
            .unwrap();
        let pending = storage.list_pending(None, None).await.unwrap();
        pending[0].id.clone()
    }

    #[test]
    fn fts_query_preparation() {
        assert_eq!(
            fts_or_query("How do I tune carbon arrows?"),
            "How OR do OR I OR tune OR carbon OR arrows"
        );
        assert_eq!(fts_or_query("  broadhead!!  "), "broadhead");
        assert_eq!(fts_or_query("?!* --"), "");
        assert_eq!(fts_or_query(""), "");
    }

    #[test]
    fn slug_normalization() {
        assert_eq!(slugify("Gear & Tuning"), "gear-tuning");
        assert_eq!(slugify("  Shot Placement  "), "shot-placement");
        assert_eq!(slugify("already-slugged"), "already-slugged");
        assert_eq!(slugify("!!!"), "");
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 2);

        let history = storage.migration_history().await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, 1);
        assert!(history[0].1.contains("Initial schema"));
        assert_eq!(history[1].0, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("vidlore_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 2);
        assert_eq!(s2.migration_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn channel_upsert_updates_in_place() {
        let storage = test_storage().await;

        let id1 = storage
            .upsert_channel(&channel_info("chan-1", "Old Name"))
            .await
            .expect("first upsert");
        let id2 = storage
            .upsert_channel(&channel_info("chan-1", "New Name"))
            .await
            .expect("second upsert");
        assert_eq!(id1, id2);

        let channel = storage.get_channel("chan-1").await.unwrap().unwrap();
        assert_eq!(channel.name, "New Name");

        let overviews = storage.list_channels().await.unwrap();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].total_videos, 0);
        assert_eq!(overviews[0].analyzed_videos, 0);
    }

    #[tokio::test]
    async fn video_batch_insert_skips_duplicates() {
        let storage = test_storage().await;
        let channel_id = storage
            .upsert_channel(&channel_info("chan-1", "Test"))
            .await
            .unwrap();

        let first = storage
            .insert_videos_batch(
                &channel_id,
                &[
                    raw_video("v1", "One", 3),
                    raw_video("v2", "Two", 2),
                    raw_video("v3", "Three", 1),
                ],
            )
            .await
            .expect("first batch");
        assert_eq!(first, 3);

        let second = storage
            .insert_videos_batch(
                &channel_id,
                &[raw_video("v2", "Two again", 2), raw_video("v4", "Four", 0)],
            )
            .await
            .expect("second batch");
        assert_eq!(second, 1);
    }

    #[tokio::test]
    async fn pending_selection_order_and_filters() {
        let storage = test_storage().await;
        let channel_id = storage
            .upsert_channel(&channel_info("chan-1", "Test"))
            .await
            .unwrap();
        storage
            .insert_videos_batch(
                &channel_id,
                &[
                    raw_video("old", "Oldest", 10),
                    raw_video("mid", "Middle", 5),
                    raw_video("new", "Newest", 1),
                ],
            )
            .await
            .unwrap();

        let pending = storage.list_pending(None, None).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].external_id, "new");
        assert_eq!(pending[2].external_id, "old");
        assert_eq!(pending[0].channel_name, "Test");

        // Analyzed drops out; failed stays in.
        storage
            .set_video_status(&pending[0].id, IngestStatus::Analyzed, None)
            .await
            .unwrap();
        storage
            .set_video_status(&pending[1].id, IngestStatus::Failed, Some("no transcript"))
            .await
            .unwrap();
        let pending = storage.list_pending(None, None).await.unwrap();
        assert_eq!(pending.len(), 2);

        let limited = storage.list_pending(Some("chan-1"), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        let other = storage.list_pending(Some("nonexistent"), None).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn status_writer_roundtrip() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;

        storage
            .set_video_status(&video_id, IngestStatus::Failed, Some("timeout"))
            .await
            .unwrap();
        let video = storage.get_video(&video_id).await.unwrap().unwrap();
        assert_eq!(video.status, IngestStatus::Failed);
        assert_eq!(video.failure_reason.as_deref(), Some("timeout"));

        // Reset clears the reason.
        storage
            .set_video_status(&video_id, IngestStatus::Pending, None)
            .await
            .unwrap();
        let video = storage.get_video(&video_id).await.unwrap().unwrap();
        assert_eq!(video.status, IngestStatus::Pending);
        assert!(video.failure_reason.is_none());
    }

    #[tokio::test]
    async fn transcript_insert_and_search() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;

        let transcript = TranscriptData {
            language_code: "en".into(),
            is_generated: true,
            snippets: vec![Snippet {
                text: "today we talk about broadhead tuning".into(),
                start: 0.0,
                duration: 5.0,
            }],
            full_text: "today we talk about broadhead tuning and arrow spine".into(),
            word_count: 9,
        };
        storage
            .insert_transcript(&video_id, &transcript)
            .await
            .expect("insert transcript");

        let hits = storage
            .search_transcripts("broadhead tuning?", 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_external_id, "vid-1");
        assert_eq!(hits[0].word_count, 9);

        let misses = storage.search_transcripts("quantum", 10).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn taxonomy_get_or_create_is_idempotent() {
        let storage = test_storage().await;

        let c1 = storage.get_or_create_category("Gear Tuning").await.unwrap();
        let c2 = storage.get_or_create_category("gear tuning!").await.unwrap();
        assert_eq!(c1.id, c2.id);
        assert_eq!(c1.slug, "gear-tuning");

        let t1 = storage.get_or_create_tag("  Broadheads ").await.unwrap();
        let t2 = storage.get_or_create_tag("broadheads").await.unwrap();
        assert_eq!(t1.id, t2.id);
        assert_eq!(t1.name, "broadheads");

        assert!(storage.get_or_create_tag("   ").await.is_err());
        assert!(storage.get_or_create_category("!!!").await.is_err());

        let names = storage.category_names().await.unwrap();
        assert_eq!(names, vec!["Gear Tuning".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_links_are_no_ops() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let e = entry(&video_id, "Paper tune first", "Start with paper tuning.", 0.8);
        storage.insert_entry(&e).await.unwrap();

        let tag = storage.get_or_create_tag("tuning").await.unwrap();
        storage.link_entry_tag(&e.id, &tag.id).await.unwrap();
        storage.link_entry_tag(&e.id, &tag.id).await.unwrap();

        let usage = storage.tags_with_counts().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].usage_count, 1);
    }

    #[tokio::test]
    async fn confidence_updates_are_clamped() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let e = entry(&video_id, "Anchor point", "Keep a consistent anchor.", 0.5);
        storage.insert_entry(&e).await.unwrap();

        storage.update_entry_confidence(&e.id, 1.7).await.unwrap();
        let got = storage.get_entry(&e.id).await.unwrap().unwrap();
        assert!((got.confidence - 1.0).abs() < f64::EPSILON);

        storage.update_entry_confidence(&e.id, -0.2).await.unwrap();
        let got = storage.get_entry(&e.id).await.unwrap().unwrap();
        assert!(got.confidence.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn delete_entry_removes_links_and_flags() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let e = entry(&video_id, "Rangefinder habit", "Range landmarks early.", 0.6);
        storage.insert_entry(&e).await.unwrap();

        let tag = storage.get_or_create_tag("habits").await.unwrap();
        storage.link_entry_tag(&e.id, &tag.id).await.unwrap();
        storage
            .insert_bias_flag(&NewBiasFlag {
                entry_id: e.id.clone(),
                bias_type: BiasType::Affiliate,
                severity: BiasSeverity::Medium,
                brand_names: vec![],
                notes: "discount code".into(),
                detected_by: "bias_agent".into(),
            })
            .await
            .unwrap();

        storage.delete_entry(&e.id).await.expect("delete");
        assert_eq!(storage.count_entries().await.unwrap(), 0);
        assert_eq!(storage.bias_summary().await.unwrap().total_flags, 0);
        assert_eq!(storage.tags_with_counts().await.unwrap()[0].usage_count, 0);
    }

    #[tokio::test]
    async fn duplicate_bias_flag_is_suppressed() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let e = entry(&video_id, "Best broadhead ever", "This one is the best.", 0.7);
        storage.insert_entry(&e).await.unwrap();

        let flag = NewBiasFlag {
            entry_id: e.id.clone(),
            bias_type: BiasType::BrandPromotion,
            severity: BiasSeverity::Low,
            brand_names: vec!["hoyt".into()],
            notes: "brand mention".into(),
            detected_by: "heuristic_fallback".into(),
        };
        assert!(storage.insert_bias_flag(&flag).await.unwrap());
        assert!(!storage.insert_bias_flag(&flag).await.unwrap());

        let flags = storage.bias_flags_for_entry(&e.id).await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].brand_names, vec!["hoyt".to_string()]);

        let summary = storage.bias_summary().await.unwrap();
        assert_eq!(summary.total_flags, 1);
        assert_eq!(summary.flagged_entries, 1);
        assert_eq!(summary.by_type.get("brand_promotion"), Some(&1));
        assert_eq!(summary.by_severity.get("low"), Some(&1));

        // The other entry-less view: unflagged excludes this one.
        let e2 = entry(&video_id, "Second entry", "More content here.", 0.7);
        storage.insert_entry(&e2).await.unwrap();
        let unflagged = storage.unflagged_entries().await.unwrap();
        assert_eq!(unflagged.len(), 1);
        assert_eq!(unflagged[0].id, e2.id);
    }

    #[tokio::test]
    async fn queue_lifecycle() {
        let storage = test_storage().await;

        let id = storage
            .insert_queue_item(&NewQueueItem {
                action_type: "delete_entry".into(),
                severity: ActionSeverity::Destructive,
                target_type: "knowledge_entry".into(),
                target_id: Some("entry-123".into()),
                description: "Low quality entry".into(),
                details: serde_json::json!({"confidence": 0.2}),
            })
            .await
            .expect("insert queue item");

        let pending = storage.pending_queue_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_type, "delete_entry");
        assert_eq!(pending[0].details["confidence"], 0.2);

        storage
            .set_queue_status(&id, QueueStatus::Approved, Some("reviewer"))
            .await
            .unwrap();
        assert!(storage.pending_queue_items().await.unwrap().is_empty());
        let approved = storage.approved_queue_items().await.unwrap();
        assert_eq!(approved.len(), 1);

        storage
            .set_queue_status(&id, QueueStatus::Executed, Some("optimizer"))
            .await
            .unwrap();
        assert!(storage.approved_queue_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn knowledge_search_ranks_and_filters() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;

        let mut tip = entry(
            &video_id,
            "Carbon arrow spine selection",
            "Pick arrow spine by draw weight and length.",
            0.8,
        );
        tip.entry_type = EntryType::Tip;
        let mut warning = entry(
            &video_id,
            "Carbon damage check",
            "Flex carbon arrows to check for cracks.",
            0.9,
        );
        warning.entry_type = EntryType::Warning;
        let other = entry(&video_id, "Glassing ridgelines", "Glass from vantage points.", 0.7);
        storage.insert_entry(&tip).await.unwrap();
        storage.insert_entry(&warning).await.unwrap();
        storage.insert_entry(&other).await.unwrap();

        let hits = storage
            .search_knowledge("carbon arrows?", 10, None)
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].channel_name, "Test Channel");
        assert_eq!(hits[0].video_external_id, "vid-1");

        let tips_only = storage
            .search_knowledge("carbon", 10, Some(EntryType::Tip))
            .await
            .unwrap();
        assert_eq!(tips_only.len(), 1);
        assert_eq!(tips_only[0].entry.id, tip.id);

        let nothing = storage.search_knowledge("?!", 10, None).await.unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn low_quality_and_low_stats_views() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;

        storage
            .insert_entry(&entry(&video_id, "Garbage", "huh", 0.2))
            .await
            .unwrap();
        storage
            .insert_entry(&entry(
                &video_id,
                "Solid advice",
                "A detailed and useful description that is long enough.",
                0.2,
            ))
            .await
            .unwrap();

        let garbage = storage.low_quality_entries(0.3, 50).await.unwrap();
        assert_eq!(garbage.len(), 1);
        assert_eq!(garbage[0].title, "Garbage");

        storage
            .set_video_status(&video_id, IngestStatus::Analyzed, None)
            .await
            .unwrap();
        let weak = storage.videos_with_low_entry_stats(3, 0.5).await.unwrap();
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].entry_count, 2);
        assert!(weak[0].avg_confidence < 0.5);
    }

    #[tokio::test]
    async fn merge_tags_collapses_duplicates() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let e1 = entry(&video_id, "One", "Content one is long enough.", 0.8);
        let e2 = entry(&video_id, "Two", "Content two is long enough.", 0.8);
        storage.insert_entry(&e1).await.unwrap();
        storage.insert_entry(&e2).await.unwrap();

        let keep = storage.get_or_create_tag("elk hunting").await.unwrap();
        let lose = storage.get_or_create_tag("elk-hunting").await.unwrap();
        storage.link_entry_tag(&e1.id, &keep.id).await.unwrap();
        storage.link_entry_tag(&e1.id, &lose.id).await.unwrap();
        storage.link_entry_tag(&e2.id, &lose.id).await.unwrap();

        storage
            .merge_tags(&keep.id, &[lose.id.clone()])
            .await
            .expect("merge");

        let usage = storage.tags_with_counts().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].id, keep.id);
        assert_eq!(usage[0].usage_count, 2);
    }

    #[tokio::test]
    async fn untagged_and_uncategorized_views() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        let tagged = entry(&video_id, "Tagged", "Has a tag already attached.", 0.8);
        let bare = entry(&video_id, "Bare", "No taxonomy on this one yet.", 0.8);
        storage.insert_entry(&tagged).await.unwrap();
        storage.insert_entry(&bare).await.unwrap();

        let tag = storage.get_or_create_tag("scouting").await.unwrap();
        storage.link_entry_tag(&tagged.id, &tag.id).await.unwrap();

        let untagged = storage.entries_without_tags(50).await.unwrap();
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].id, bare.id);

        let uncategorized = storage.entries_without_categories(50).await.unwrap();
        assert_eq!(uncategorized.len(), 2);
    }

    #[tokio::test]
    async fn stats_aggregate_counts() {
        let storage = test_storage().await;
        let video_id = seed_video(&storage).await;
        storage
            .insert_entry(&entry(&video_id, "A", "Entry content goes here.", 0.8))
            .await
            .unwrap();
        storage.get_or_create_tag("gear").await.unwrap();
        storage
            .log_processing_step(&video_id, "analysis", "ok", None, Some(1200), Some(300))
            .await
            .unwrap();
        storage
            .log_curation("normalize_tags", Some("merged 2 tags into 'gear'"))
            .await
            .unwrap();

        let stats = storage.ingestion_stats().await.unwrap();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.total_videos, 1);
        assert_eq!(stats.knowledge_entries, 1);
        assert_eq!(stats.tags, 1);
        assert_eq!(stats.total_tokens, 1500);
        assert_eq!(stats.videos_by_status.get("pending"), Some(&1));

        let comparisons = storage.entries_for_comparison().await.unwrap();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].video_id, video_id);
    }
}
