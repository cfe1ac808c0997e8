//! Ingestion for vidlore: transcript chunking, knowledge extraction, and the
//! per-video pipeline state machine.
//!
//! The upstream platform and the generative service both sit behind traits
//! ([`TranscriptSource`], [`ChannelSource`], [`CompletionClient`]); the
//! pipeline itself only touches [`vidlore_storage::Storage`] and those
//! boundaries.

pub mod chunker;
pub mod client;
pub mod extractor;
pub mod pipeline;
pub mod retry;
pub mod source;

pub use chunker::{Chunk, chunk_snippets};
pub use client::{CompletionClient, OllamaClient};
pub use extractor::{ExtractedEntry, Extractor, VideoContext};
pub use pipeline::{
    IngestEvent, IngestPipeline, IngestSummary, ProgressSink, RegisterSummary, SilentProgress,
};
pub use retry::with_backoff;
pub use source::{ChannelSource, TranscriptSource};
