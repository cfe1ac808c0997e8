//! Core domain types for the vidlore knowledge base.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ingestion state machine
// ---------------------------------------------------------------------------

/// Per-video ingestion status.
///
/// Normal progression is `Pending → TranscriptFetched → Analyzed`.
/// `Skipped` and `Failed` are alternate terminals; an approved `re_ingest`
/// queue action resets any of the three end states back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Pending,
    TranscriptFetched,
    Analyzed,
    Skipped,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::TranscriptFetched => "transcript_fetched",
            Self::Analyzed => "analyzed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "transcript_fetched" => Some(Self::TranscriptFetched),
            "analyzed" => Some(Self::Analyzed),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Channels & videos
// ---------------------------------------------------------------------------

/// A video channel, upserted by its stable external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Database id (UUID v7).
    pub id: String,
    /// Stable external platform id.
    pub external_id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Channel metadata as produced by a discovery source (no db id yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub external_id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subscriber_count: Option<i64>,
    #[serde(default)]
    pub video_count: Option<i64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A channel row enriched with ingestion progress counts.
#[derive(Debug, Clone)]
pub struct ChannelOverview {
    pub channel: Channel,
    pub total_videos: i64,
    pub analyzed_videos: i64,
}

/// A raw video record from a discovery source. The core only deduplicates
/// and stores these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVideo {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A stored video with its ingestion state.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    pub status: IngestStatus,
    pub failure_reason: Option<String>,
}

/// A pending video joined with its channel display fields, as returned by
/// `Storage::list_pending`.
#[derive(Debug, Clone)]
pub struct PendingVideo {
    pub id: String,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub channel_name: String,
    pub channel_external_id: String,
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

/// One timestamped caption snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    /// Offset from the start of the video, in seconds.
    pub start: f64,
    /// Duration of the snippet, in seconds.
    pub duration: f64,
}

/// A fetched transcript, as produced by a transcript source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptData {
    pub language_code: String,
    pub is_generated: bool,
    pub snippets: Vec<Snippet>,
    pub full_text: String,
    pub word_count: i64,
}

// ---------------------------------------------------------------------------
// Knowledge entries
// ---------------------------------------------------------------------------

/// The closed set of knowledge entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Insight,
    Tip,
    Concept,
    Technique,
    Warning,
    Resource,
    Quote,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::Tip => "tip",
            Self::Concept => "concept",
            Self::Technique => "technique",
            Self::Warning => "warning",
            Self::Resource => "resource",
            Self::Quote => "quote",
        }
    }

    /// Parse an entry type, coercing anything unknown to `Insight`.
    pub fn coerce(s: &str) -> Self {
        match s {
            "tip" => Self::Tip,
            "concept" => Self::Concept,
            "technique" => Self::Technique,
            "warning" => Self::Warning,
            "resource" => Self::Resource,
            "quote" => Self::Quote,
            _ => Self::Insight,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic extracted claim/tip/insight tied to a source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub video_id: String,
    pub entry_type: EntryType,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_end_time: Option<f64>,
    /// Always within [0.0, 1.0].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
}

/// A category, deduplicated by normalized slug.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// A tag, deduplicated by lowercase-trimmed name.
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A tag with its link usage count, for normalization passes.
#[derive(Debug, Clone)]
pub struct TagUsage {
    pub id: String,
    pub name: String,
    pub usage_count: i64,
}

// ---------------------------------------------------------------------------
// Bias flags
// ---------------------------------------------------------------------------

/// The closed set of commercial-bias categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    BrandPromotion,
    Affiliate,
    Sponsored,
    ProductPlacement,
    UnsubstantiatedClaim,
}

impl BiasType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrandPromotion => "brand_promotion",
            Self::Affiliate => "affiliate",
            Self::Sponsored => "sponsored",
            Self::ProductPlacement => "product_placement",
            Self::UnsubstantiatedClaim => "unsubstantiated_claim",
        }
    }

    /// Parse a bias type, coercing anything unknown to `BrandPromotion`.
    pub fn coerce(s: &str) -> Self {
        match s {
            "affiliate" => Self::Affiliate,
            "sponsored" => Self::Sponsored,
            "product_placement" => Self::ProductPlacement,
            "unsubstantiated_claim" => Self::UnsubstantiatedClaim,
            _ => Self::BrandPromotion,
        }
    }
}

/// Bias flag severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasSeverity {
    Low,
    Medium,
    High,
}

impl BiasSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a severity, coercing anything unknown to `Medium`.
    pub fn coerce(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// A non-destructive annotation marking commercial concern on an entry.
/// At most one flag of a given [`BiasType`] exists per entry.
#[derive(Debug, Clone)]
pub struct BiasFlag {
    pub id: String,
    pub entry_id: String,
    pub bias_type: BiasType,
    pub severity: BiasSeverity,
    pub brand_names: Vec<String>,
    pub notes: String,
    pub detected_by: String,
}

/// A bias flag ready for insertion (no id yet).
#[derive(Debug, Clone)]
pub struct NewBiasFlag {
    pub entry_id: String,
    pub bias_type: BiasType,
    pub severity: BiasSeverity,
    pub brand_names: Vec<String>,
    pub notes: String,
    pub detected_by: String,
}

// ---------------------------------------------------------------------------
// Curation queue
// ---------------------------------------------------------------------------

/// Whether a proposed action can be auto-executed or needs approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSeverity {
    Safe,
    Destructive,
}

impl ActionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Destructive => "destructive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(Self::Safe),
            "destructive" => Some(Self::Destructive),
            _ => None,
        }
    }
}

/// Queue item lifecycle: `pending → approved|rejected → executed|failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "executed" => Some(Self::Executed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A proposed maintenance action awaiting review or execution.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: String,
    /// Open action vocabulary; executors must tolerate unknown values.
    pub action_type: String,
    pub severity: ActionSeverity,
    pub target_type: String,
    pub target_id: Option<String>,
    pub description: String,
    pub details: serde_json::Value,
    pub status: QueueStatus,
}

/// A queue item ready for insertion (status starts at `Pending`).
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub action_type: String,
    pub severity: ActionSeverity,
    pub target_type: String,
    pub target_id: Option<String>,
    pub description: String,
    pub details: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// A ranked knowledge search hit, enriched for presentation.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: KnowledgeEntry,
    pub video_external_id: String,
    pub video_title: String,
    pub channel_name: String,
    /// FTS5 BM25 rank (lower is better).
    pub rank: f64,
}

/// A ranked transcript search hit.
#[derive(Debug, Clone)]
pub struct TranscriptHit {
    pub transcript_id: String,
    pub video_external_id: String,
    pub video_title: String,
    pub channel_name: String,
    pub word_count: i64,
    pub rank: f64,
}

// ---------------------------------------------------------------------------
// Aggregates for the presentation boundary
// ---------------------------------------------------------------------------

/// Knowledge-base ingestion counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStats {
    pub channels: i64,
    pub total_videos: i64,
    pub videos_by_status: BTreeMap<String, i64>,
    pub knowledge_entries: i64,
    pub total_tokens: i64,
    pub categories: i64,
    pub tags: i64,
}

/// Bias flag counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BiasSummary {
    pub total_flags: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    pub flagged_entries: i64,
}
