//! Shared types, error model, and configuration for vidlore.
//!
//! This crate is the foundation depended on by all other vidlore crates.
//! It provides:
//! - [`VidloreError`] — the unified error type, plus [`ErrorKind`] retry
//!   classification
//! - Domain types ([`Channel`], [`Video`], [`KnowledgeEntry`], [`BiasFlag`],
//!   [`QueueItem`], ...)
//! - Configuration ([`AppConfig`] and derived runtime configs, config loading)

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChunkConfig, CurationConfig, CurationThresholds, DatabaseConfig, OllamaConfig,
    RetryConfig, TranscriptsConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{ErrorKind, Result, VidloreError};
pub use logging::{LogFormat, init_tracing};
pub use types::{
    ActionSeverity, BiasFlag, BiasSeverity, BiasSummary, BiasType, Category, Channel, ChannelInfo,
    ChannelOverview, EntryType, IngestStatus, IngestionStats, KnowledgeEntry, NewBiasFlag,
    NewQueueItem, PendingVideo, QueueItem, QueueStatus, RawVideo, SearchHit, Snippet, Tag,
    TagUsage, TranscriptData, TranscriptHit, Video,
};
