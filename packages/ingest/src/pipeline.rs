//! End-to-end ingestion: channel registration and the per-video state machine
//! (pending → transcript_fetched → analyzed, with skipped/failed terminals).

use tracing::{info, instrument, warn};
use uuid::Uuid;
use vidlore_shared::{
    ChunkConfig, ErrorKind, IngestStatus, KnowledgeEntry, Result, RetryConfig, VidloreError,
};
use vidlore_storage::Storage;

use crate::chunker::chunk_snippets;
use crate::client::CompletionClient;
use crate::extractor::{ExtractedEntry, Extractor, VideoContext};
use crate::source::{ChannelSource, TranscriptSource};

/// Progress events emitted during an ingestion batch.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    BatchStart {
        total: usize,
    },
    VideoStart {
        video_id: String,
        title: String,
    },
    TranscriptFetched {
        video_id: String,
        language: String,
        word_count: i64,
    },
    Skipped {
        video_id: String,
        reason: String,
    },
    Analyzed {
        video_id: String,
        entry_count: usize,
    },
    Failed {
        video_id: String,
        reason: String,
    },
    BatchComplete {
        processed: usize,
        analyzed: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Synchronous progress callback for ingestion.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: &IngestEvent);
}

/// No-op sink for headless/test usage.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn event(&self, _event: &IngestEvent) {}
}

/// Result of registering a channel.
#[derive(Debug)]
pub struct RegisterSummary {
    pub channel_id: String,
    pub channel_name: String,
    pub total_videos: usize,
    pub new_videos: usize,
}

/// Result of an ingestion batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub processed: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Orchestrates discovery, transcript fetch, and extraction against storage.
pub struct IngestPipeline<'a, S, T, C> {
    storage: &'a Storage,
    channels: &'a S,
    transcripts: &'a T,
    client: &'a C,
    chunking: ChunkConfig,
    retry: RetryConfig,
}

impl<'a, S, T, C> IngestPipeline<'a, S, T, C>
where
    S: ChannelSource,
    T: TranscriptSource,
    C: CompletionClient,
{
    pub fn new(
        storage: &'a Storage,
        channels: &'a S,
        transcripts: &'a T,
        client: &'a C,
        chunking: ChunkConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            storage,
            channels,
            transcripts,
            client,
            chunking,
            retry,
        }
    }

    /// Resolve a channel reference, upsert the channel, and store its videos.
    #[instrument(skip_all, fields(reference))]
    pub async fn register_channel(&self, reference: &str) -> Result<RegisterSummary> {
        let info = self.channels.resolve_channel(reference).await?;
        let channel_id = self.storage.upsert_channel(&info).await?;
        let videos = self.channels.list_videos(&info.external_id).await?;
        let new_videos = self.storage.insert_videos_batch(&channel_id, &videos).await?;

        info!(
            channel = %info.name,
            total = videos.len(),
            new = new_videos,
            "channel registered"
        );
        Ok(RegisterSummary {
            channel_id,
            channel_name: info.name,
            total_videos: videos.len(),
            new_videos,
        })
    }

    /// Ingest pending/failed videos, newest first.
    ///
    /// Per-video failures mark that video failed and continue; an upstream
    /// hard block aborts immediately, leaving the rest of the batch pending.
    #[instrument(skip_all, fields(channel = channel.unwrap_or("all")))]
    pub async fn ingest(
        &self,
        channel: Option<&str>,
        limit: Option<u32>,
        progress: &dyn ProgressSink,
    ) -> Result<IngestSummary> {
        let pending = self.storage.list_pending(channel, limit).await?;
        progress.event(&IngestEvent::BatchStart {
            total: pending.len(),
        });

        let mut summary = IngestSummary::default();
        for video in &pending {
            summary.processed += 1;
            progress.event(&IngestEvent::VideoStart {
                video_id: video.id.clone(),
                title: video.title.clone(),
            });

            // --- Transcript fetch ---
            let transcript = match self.transcripts.fetch(&video.external_id).await {
                Ok(Some(transcript)) => transcript,
                Ok(None) => {
                    let reason = "no transcript available";
                    self.storage
                        .set_video_status(&video.id, IngestStatus::Skipped, Some(reason))
                        .await?;
                    self.storage
                        .log_processing_step(&video.id, "transcript", "skipped", Some(reason), None, None)
                        .await?;
                    progress.event(&IngestEvent::Skipped {
                        video_id: video.id.clone(),
                        reason: reason.into(),
                    });
                    summary.skipped += 1;
                    continue;
                }
                Err(err) if err.kind() == ErrorKind::HardBlock => {
                    // The video stays pending; so does everything after it.
                    warn!(video = %video.external_id, error = %err, "source blocked, aborting batch");
                    self.storage
                        .log_processing_step(
                            &video.id,
                            "transcript",
                            "blocked",
                            Some(&err.to_string()),
                            None,
                            None,
                        )
                        .await?;
                    return Err(err);
                }
                Err(err) => {
                    self.fail_video(video, "transcript", &err, progress).await?;
                    summary.failed += 1;
                    continue;
                }
            };

            // Persist before announcing the transition.
            self.storage.insert_transcript(&video.id, &transcript).await?;
            self.storage
                .set_video_status(&video.id, IngestStatus::TranscriptFetched, None)
                .await?;
            self.storage
                .log_processing_step(&video.id, "transcript", "ok", Some(&transcript.language_code), None, None)
                .await?;
            progress.event(&IngestEvent::TranscriptFetched {
                video_id: video.id.clone(),
                language: transcript.language_code.clone(),
                word_count: transcript.word_count,
            });

            // --- Extraction ---
            let chunks = chunk_snippets(&transcript.snippets, &self.chunking);
            let extractor = Extractor::new(self.client, self.retry);
            let context = VideoContext {
                title: &video.title,
                channel_name: &video.channel_name,
                description: video.description.as_deref(),
            };
            let mut extracted: Vec<ExtractedEntry> = Vec::new();
            let mut analysis_failed = false;

            for chunk in &chunks {
                match extractor.extract_chunk(&context, chunk).await {
                    Ok(entries) => extracted.extend(entries),
                    Err(err) => {
                        self.fail_video(video, "analysis", &err, progress).await?;
                        summary.failed += 1;
                        analysis_failed = true;
                        break;
                    }
                }
            }
            if analysis_failed {
                continue;
            }

            // Persist entries and taxonomy before announcing completion.
            let entry_count = extracted.len();
            for entry in extracted {
                self.persist_entry(&video.id, entry).await?;
            }
            self.storage
                .set_video_status(&video.id, IngestStatus::Analyzed, None)
                .await?;
            self.storage
                .log_processing_step(
                    &video.id,
                    "analysis",
                    "ok",
                    Some(&format!("{entry_count} entries from {} chunks", chunks.len())),
                    None,
                    None,
                )
                .await?;
            progress.event(&IngestEvent::Analyzed {
                video_id: video.id.clone(),
                entry_count,
            });
            summary.analyzed += 1;
        }

        progress.event(&IngestEvent::BatchComplete {
            processed: summary.processed,
            analyzed: summary.analyzed,
            skipped: summary.skipped,
            failed: summary.failed,
        });
        info!(
            processed = summary.processed,
            analyzed = summary.analyzed,
            skipped = summary.skipped,
            failed = summary.failed,
            "ingestion batch complete"
        );
        Ok(summary)
    }

    async fn fail_video(
        &self,
        video: &vidlore_shared::PendingVideo,
        step: &str,
        err: &VidloreError,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let reason = err.to_string();
        warn!(video = %video.external_id, step, error = %reason, "video failed");
        self.storage
            .set_video_status(&video.id, IngestStatus::Failed, Some(&reason))
            .await?;
        self.storage
            .log_processing_step(&video.id, step, "failed", Some(&reason), None, None)
            .await?;
        progress.event(&IngestEvent::Failed {
            video_id: video.id.clone(),
            reason,
        });
        Ok(())
    }

    /// Store one extracted entry plus its category/tag links.
    async fn persist_entry(&self, video_id: &str, extracted: ExtractedEntry) -> Result<()> {
        let entry = KnowledgeEntry {
            id: Uuid::now_v7().to_string(),
            video_id: video_id.to_string(),
            entry_type: extracted.entry_type,
            title: extracted.title,
            content: extracted.content,
            source_quote: extracted.source_quote,
            source_start_time: Some(extracted.start_time),
            source_end_time: Some(extracted.end_time),
            confidence: extracted.confidence,
            chunk_index: Some(extracted.chunk_index),
        };
        self.storage.insert_entry(&entry).await?;

        for name in &extracted.categories {
            match self.storage.get_or_create_category(name).await {
                Ok(category) => {
                    self.storage.link_entry_category(&entry.id, &category.id).await?;
                }
                Err(e) => warn!(name, error = %e, "skipping unusable category name"),
            }
        }
        for name in &extracted.tags {
            match self.storage.get_or_create_tag(name).await {
                Ok(tag) => {
                    self.storage.link_entry_tag(&entry.id, &tag.id).await?;
                }
                Err(e) => warn!(name, error = %e, "skipping unusable tag name"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;
    use chrono::{Duration, Utc};
    use vidlore_shared::{ChannelInfo, RawVideo, Snippet, TranscriptData};

    // --- Stubs -----------------------------------------------------------

    struct StubChannels {
        videos: Vec<RawVideo>,
    }

    impl ChannelSource for StubChannels {
        fn resolve_channel(&self, reference: &str) -> impl Future<Output = Result<ChannelInfo>> + Send {
            let reference = reference.to_string();
            async move {
                Ok(ChannelInfo {
                    external_id: format!("chan-{reference}"),
                    name: "Stub Channel".into(),
                    url: format!("https://videos.example/{reference}"),
                    description: None,
                    subscriber_count: None,
                    video_count: None,
                    thumbnail_url: None,
                })
            }
        }

        fn list_videos(&self, _channel: &str) -> impl Future<Output = Result<Vec<RawVideo>>> + Send {
            let videos = self.videos.clone();
            async move { Ok(videos) }
        }
    }

    #[derive(Clone, Copy)]
    enum TranscriptOutcome {
        Available,
        Missing,
        Fails,
        Blocked,
    }

    struct StubTranscripts {
        outcomes: HashMap<String, TranscriptOutcome>,
    }

    impl StubTranscripts {
        fn new(outcomes: &[(&str, TranscriptOutcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(id, o)| (id.to_string(), *o))
                    .collect(),
            }
        }
    }

    impl TranscriptSource for StubTranscripts {
        fn fetch(
            &self,
            video_external_id: &str,
        ) -> impl Future<Output = Result<Option<TranscriptData>>> + Send {
            let outcome = self
                .outcomes
                .get(video_external_id)
                .copied()
                .unwrap_or(TranscriptOutcome::Available);
            async move {
                match outcome {
                    TranscriptOutcome::Available => Ok(Some(TranscriptData {
                        language_code: "en".into(),
                        is_generated: true,
                        snippets: vec![Snippet {
                            text: "always check your arrow spine before hunting season".into(),
                            start: 0.0,
                            duration: 6.0,
                        }],
                        full_text: "always check your arrow spine before hunting season".into(),
                        word_count: 8,
                    })),
                    TranscriptOutcome::Missing => Ok(None),
                    TranscriptOutcome::Fails => Err(VidloreError::transcript("parse failure")),
                    TranscriptOutcome::Blocked => Err(VidloreError::SourceBlocked {
                        message: "too many requests from this ip".into(),
                    }),
                }
            }
        }
    }

    struct StubClient {
        response: String,
    }

    impl CompletionClient for StubClient {
        fn complete(
            &self,
            _system: &str,
            _user: &str,
            _json_mode: bool,
        ) -> impl Future<Output = Result<String>> + Send {
            let response = self.response.clone();
            async move { Ok(response) }
        }
    }

    struct FailingClient;

    impl CompletionClient for FailingClient {
        fn complete(
            &self,
            _system: &str,
            _user: &str,
            _json_mode: bool,
        ) -> impl Future<Output = Result<String>> + Send {
            async move {
                Err(VidloreError::Completion {
                    message: "model not loaded".into(),
                    status: Some(404),
                    retry_after_secs: None,
                })
            }
        }
    }

    /// Records every event for order assertions.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn event(&self, event: &IngestEvent) {
            let label = match event {
                IngestEvent::BatchStart { total } => format!("start:{total}"),
                IngestEvent::VideoStart { .. } => "video".into(),
                IngestEvent::TranscriptFetched { .. } => "transcript".into(),
                IngestEvent::Skipped { .. } => "skipped".into(),
                IngestEvent::Analyzed { entry_count, .. } => format!("analyzed:{entry_count}"),
                IngestEvent::Failed { .. } => "failed".into(),
                IngestEvent::BatchComplete { .. } => "complete".into(),
            };
            self.events.lock().unwrap().push(label);
        }
    }

    // --- Helpers ---------------------------------------------------------

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("vidlore_test_{}.db", uuid::Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn raw_videos(ids: &[&str]) -> Vec<RawVideo> {
        // Reverse chronological: earlier slice position = newer video, so
        // list_pending keeps the given order.
        ids.iter()
            .enumerate()
            .map(|(i, id)| RawVideo {
                external_id: id.to_string(),
                title: format!("Video {id}"),
                description: None,
                published_at: Some(Utc::now() - Duration::days(i as i64)),
                thumbnail_url: None,
            })
            .collect()
    }

    fn one_entry_response() -> String {
        r#"{"entries": [{
            "entry_type": "tip",
            "title": "Check arrow spine",
            "content": "Verify arrow spine matches draw weight before season.",
            "confidence": 0.85,
            "categories": ["Gear Tuning"],
            "tags": ["arrows"]
        }]}"#
            .to_string()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            base_delay_secs: 0.001,
            max_delay_secs: 0.01,
        }
    }

    // --- Tests -----------------------------------------------------------

    #[tokio::test]
    async fn register_channel_stores_channel_and_videos() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["v1", "v2"]),
        };
        let transcripts = StubTranscripts::new(&[]);
        let client = StubClient {
            response: one_entry_response(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );

        let summary = pipeline.register_channel("stubs").await.expect("register");
        assert_eq!(summary.total_videos, 2);
        assert_eq!(summary.new_videos, 2);
        assert_eq!(summary.channel_name, "Stub Channel");

        // Re-registration finds nothing new.
        let again = pipeline.register_channel("stubs").await.expect("re-register");
        assert_eq!(again.new_videos, 0);
        assert_eq!(again.channel_id, summary.channel_id);
    }

    #[tokio::test]
    async fn full_ingest_persists_entries_and_taxonomy() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["v1"]),
        };
        let transcripts = StubTranscripts::new(&[("v1", TranscriptOutcome::Available)]);
        let client = StubClient {
            response: one_entry_response(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let sink = RecordingSink::default();
        let summary = pipeline.ingest(None, None, &sink).await.expect("ingest");
        assert_eq!(
            summary,
            IngestSummary {
                processed: 1,
                analyzed: 1,
                skipped: 0,
                failed: 0
            }
        );

        // Transcript is announced before analysis completes.
        let events = sink.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["start:1", "video", "transcript", "analyzed:1", "complete"]
        );

        assert_eq!(storage.count_entries().await.unwrap(), 1);
        let hits = storage.search_knowledge("arrow spine", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].entry.chunk_index.is_some());

        let tags = storage.tags_with_counts().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "arrows");

        // Nothing left pending.
        assert!(storage.list_pending(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_transcript_skips_video() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["v1"]),
        };
        let transcripts = StubTranscripts::new(&[("v1", TranscriptOutcome::Missing)]);
        let client = StubClient {
            response: one_entry_response(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let summary = pipeline.ingest(None, None, &SilentProgress).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.analyzed, 0);

        let stats = storage.ingestion_stats().await.unwrap();
        assert_eq!(stats.videos_by_status.get("skipped"), Some(&1));
    }

    #[tokio::test]
    async fn transcript_error_fails_video_and_continues() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["bad", "good"]),
        };
        let transcripts = StubTranscripts::new(&[
            ("bad", TranscriptOutcome::Fails),
            ("good", TranscriptOutcome::Available),
        ]);
        let client = StubClient {
            response: one_entry_response(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let summary = pipeline.ingest(None, None, &SilentProgress).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.analyzed, 1);

        // Failed videos stay eligible for a later retry pass.
        let pending = storage.list_pending(None, None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].external_id, "bad");
    }

    #[tokio::test]
    async fn source_block_halts_batch_leaving_rest_pending() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["blocked", "later"]),
        };
        let transcripts = StubTranscripts::new(&[
            ("blocked", TranscriptOutcome::Blocked),
            ("later", TranscriptOutcome::Available),
        ]);
        let client = StubClient {
            response: one_entry_response(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let err = pipeline
            .ingest(None, None, &SilentProgress)
            .await
            .expect_err("hard block aborts");
        assert_eq!(err.kind(), ErrorKind::HardBlock);

        // Both videos are still pending, including the one that hit the block.
        let pending = storage.list_pending(None, None).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn malformed_extraction_still_completes_with_zero_entries() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["v1"]),
        };
        let transcripts = StubTranscripts::new(&[("v1", TranscriptOutcome::Available)]);
        let client = StubClient {
            response: "the model rambled instead of emitting json".into(),
        };
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let summary = pipeline.ingest(None, None, &SilentProgress).await.unwrap();
        assert_eq!(summary.analyzed, 1);
        assert_eq!(storage.count_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn extraction_exhaustion_fails_the_video() {
        let storage = test_storage().await;
        let channels = StubChannels {
            videos: raw_videos(&["v1"]),
        };
        let transcripts = StubTranscripts::new(&[("v1", TranscriptOutcome::Available)]);
        let client = FailingClient;
        let pipeline = IngestPipeline::new(
            &storage,
            &channels,
            &transcripts,
            &client,
            ChunkConfig::default(),
            fast_retry(),
        );
        pipeline.register_channel("stubs").await.unwrap();

        let summary = pipeline.ingest(None, None, &SilentProgress).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.analyzed, 0);

        let stats = storage.ingestion_stats().await.unwrap();
        assert_eq!(stats.videos_by_status.get("failed"), Some(&1));
    }
}
