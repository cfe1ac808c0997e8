//! Knowledge-base optimization.
//!
//! Safe phases run automatically: tag normalization, category/tag fill, and
//! cross-video confidence rescoring. Anything destructive — deleting entries,
//! resetting videos for re-ingestion — only ever becomes a pending queue item
//! and is executed separately once approved.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use vidlore_shared::{
    ActionSeverity, CurationThresholds, IngestStatus, KnowledgeEntry, NewQueueItem, QueueItem,
    QueueStatus, Result, RetryConfig, VidloreError,
};
use vidlore_storage::Storage;

use vidlore_ingest::{CompletionClient, with_backoff};

const ACTION_DELETE_ENTRY: &str = "delete_entry";
const ACTION_RE_INGEST: &str = "re_ingest";

const FILL_CATEGORIES_PROMPT: &str = "\
You assign topical categories to knowledge entries. Prefer the existing
category names given; invent a new broad category only when nothing fits.

Return JSON: {\"assignments\": [{\"index\": 0, \"categories\": [\"...\"]}]}.
Give each entry one or two categories.";

const FILL_TAGS_PROMPT: &str = "\
You assign short lowercase keyword tags to knowledge entries.

Return JSON: {\"assignments\": [{\"index\": 0, \"tags\": [\"...\"]}]}.
Give each entry two to five tags.";

/// Progress events emitted during optimization.
#[derive(Debug, Clone)]
pub enum OptimizeEvent {
    Phase { name: &'static str },
    Result { name: &'static str, detail: String },
    Skip { name: &'static str, reason: String },
    AutoComplete { summary: AutoSummary },
    SuggestionsComplete { created: usize },
}

/// Synchronous progress callback for optimization.
pub trait OptimizeSink: Send + Sync {
    fn event(&self, event: &OptimizeEvent);
}

/// No-op sink for headless/test usage.
pub struct SilentOptimize;

impl OptimizeSink for SilentOptimize {
    fn event(&self, _event: &OptimizeEvent) {}
}

/// Counts from the automatic phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoSummary {
    pub tags_merged: usize,
    pub categories_filled: usize,
    pub tags_filled: usize,
    pub entries_rescored: usize,
}

/// Counts from executing approved queue items.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct RawAssignment {
    index: Option<usize>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Runs safe optimization phases and manages the destructive-action queue.
pub struct Optimizer<'a, C> {
    storage: &'a Storage,
    client: &'a C,
    retry: RetryConfig,
    thresholds: CurationThresholds,
}

impl<'a, C: CompletionClient> Optimizer<'a, C> {
    pub fn new(
        storage: &'a Storage,
        client: &'a C,
        retry: RetryConfig,
        thresholds: CurationThresholds,
    ) -> Self {
        Self {
            storage,
            client,
            retry,
            thresholds,
        }
    }

    /// Run every safe phase in order.
    #[instrument(skip_all)]
    pub async fn run_auto(&self, sink: &dyn OptimizeSink) -> Result<AutoSummary> {
        let mut summary = AutoSummary::default();

        sink.event(&OptimizeEvent::Phase {
            name: "normalize_tags",
        });
        summary.tags_merged = self.normalize_tags(sink).await?;

        sink.event(&OptimizeEvent::Phase {
            name: "fill_categories",
        });
        summary.categories_filled = self.fill_categories(sink).await?;

        sink.event(&OptimizeEvent::Phase { name: "fill_tags" });
        summary.tags_filled = self.fill_tags(sink).await?;

        sink.event(&OptimizeEvent::Phase {
            name: "rescore_confidence",
        });
        summary.entries_rescored = self.rescore_confidence(sink).await?;

        sink.event(&OptimizeEvent::AutoComplete { summary });
        info!(?summary, "auto optimization complete");
        Ok(summary)
    }

    // -- normalize_tags -----------------------------------------------------

    /// Merge tags whose names normalize identically, keeping the most-used
    /// spelling.
    async fn normalize_tags(&self, sink: &dyn OptimizeSink) -> Result<usize> {
        let tags = self.storage.tags_with_counts().await?;

        // tags_with_counts is ordered by usage desc, so the first member of
        // each group is the keeper.
        let mut groups: BTreeMap<String, Vec<vidlore_shared::TagUsage>> = BTreeMap::new();
        for tag in tags {
            groups.entry(normalize_tag(&tag.name)).or_default().push(tag);
        }

        let mut merged = 0usize;
        for (normalized, group) in groups {
            if group.len() < 2 {
                continue;
            }
            let keep = &group[0];
            let losers: Vec<String> = group[1..].iter().map(|t| t.id.clone()).collect();
            let loser_names: Vec<&str> = group[1..].iter().map(|t| t.name.as_str()).collect();

            self.storage.merge_tags(&keep.id, &losers).await?;
            self.storage
                .log_curation(
                    "normalize_tags",
                    Some(&format!(
                        "merged {loser_names:?} into '{}' (normalized '{normalized}')",
                        keep.name
                    )),
                )
                .await?;
            merged += losers.len();
            sink.event(&OptimizeEvent::Result {
                name: "normalize_tags",
                detail: format!("{loser_names:?} -> '{}'", keep.name),
            });
        }
        Ok(merged)
    }

    // -- fill_categories / fill_tags ----------------------------------------

    async fn fill_categories(&self, sink: &dyn OptimizeSink) -> Result<usize> {
        let entries = self
            .storage
            .entries_without_categories(u32::MAX)
            .await?;
        if entries.is_empty() {
            sink.event(&OptimizeEvent::Skip {
                name: "fill_categories",
                reason: "every entry already categorized".into(),
            });
            return Ok(0);
        }

        let existing = self.storage.category_names().await?;
        let context = format!("Existing categories: {existing:?}");
        let mut filled = 0usize;

        for batch in entries.chunks(self.thresholds.fill_batch_size.max(1)) {
            // One bad batch never aborts the phase.
            match self
                .request_assignments(FILL_CATEGORIES_PROMPT, &context, batch)
                .await
            {
                Ok(assignments) => {
                    for (entry, names) in resolve_assignments(batch, &assignments, |a| &a.categories)
                    {
                        for name in names {
                            match self.storage.get_or_create_category(name).await {
                                Ok(category) => {
                                    self.storage
                                        .link_entry_category(&entry.id, &category.id)
                                        .await?;
                                }
                                Err(e) => warn!(name, error = %e, "unusable category name"),
                            }
                        }
                        filled += 1;
                    }
                }
                Err(e) => {
                    warn!(batch = batch.len(), error = %e, "category fill batch failed, continuing");
                }
            }
        }

        sink.event(&OptimizeEvent::Result {
            name: "fill_categories",
            detail: format!("{filled} of {} entries", entries.len()),
        });
        Ok(filled)
    }

    async fn fill_tags(&self, sink: &dyn OptimizeSink) -> Result<usize> {
        let entries = self.storage.entries_without_tags(u32::MAX).await?;
        if entries.is_empty() {
            sink.event(&OptimizeEvent::Skip {
                name: "fill_tags",
                reason: "every entry already tagged".into(),
            });
            return Ok(0);
        }

        let mut filled = 0usize;
        for batch in entries.chunks(self.thresholds.fill_batch_size.max(1)) {
            match self.request_assignments(FILL_TAGS_PROMPT, "", batch).await {
                Ok(assignments) => {
                    for (entry, names) in resolve_assignments(batch, &assignments, |a| &a.tags) {
                        for name in names {
                            match self.storage.get_or_create_tag(name).await {
                                Ok(tag) => {
                                    self.storage.link_entry_tag(&entry.id, &tag.id).await?;
                                }
                                Err(e) => warn!(name, error = %e, "unusable tag name"),
                            }
                        }
                        filled += 1;
                    }
                }
                Err(e) => {
                    warn!(batch = batch.len(), error = %e, "tag fill batch failed, continuing");
                }
            }
        }

        sink.event(&OptimizeEvent::Result {
            name: "fill_tags",
            detail: format!("{filled} of {} entries", entries.len()),
        });
        Ok(filled)
    }

    async fn request_assignments(
        &self,
        system: &str,
        context: &str,
        batch: &[KnowledgeEntry],
    ) -> Result<Vec<RawAssignment>> {
        let mut user_prompt = String::new();
        if !context.is_empty() {
            user_prompt.push_str(context);
            user_prompt.push('\n');
        }
        for (i, entry) in batch.iter().enumerate() {
            user_prompt.push_str(&format!("\n[{i}] {}: {}\n", entry.title, entry.content));
        }

        let response = with_backoff(&self.retry, "fill_assignments", || {
            self.client.complete(system, &user_prompt, true)
        })
        .await?;

        let value: serde_json::Value = serde_json::from_str(response.trim())
            .map_err(|e| VidloreError::malformed(format!("assignment response: {e}")))?;
        let items = value
            .get("assignments")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| VidloreError::malformed("assignment response has no assignments array"))?;

        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    // -- rescore_confidence -------------------------------------------------

    /// Boost confidence of claims corroborated across multiple videos.
    /// Confidence only ever moves up here, capped at the ceiling.
    async fn rescore_confidence(&self, sink: &dyn OptimizeSink) -> Result<usize> {
        let entries = self.storage.entries_for_comparison().await?;

        let mut groups: BTreeMap<String, Vec<&vidlore_storage::ComparisonEntry>> = BTreeMap::new();
        for entry in &entries {
            if let Some(key) = corroboration_key(&entry.title) {
                groups.entry(key).or_default().push(entry);
            }
        }

        let mut rescored = 0usize;
        for group in groups.values() {
            if group.len() < 2 {
                continue;
            }
            let videos: BTreeSet<&str> = group.iter().map(|e| e.video_id.as_str()).collect();
            if videos.len() < 2 {
                continue;
            }

            let boost = (self.thresholds.boost_per_video * videos.len() as f64)
                .min(self.thresholds.max_boost);
            for entry in group {
                let new_confidence =
                    (entry.confidence + boost).min(self.thresholds.confidence_ceiling);
                if new_confidence > entry.confidence {
                    self.storage
                        .update_entry_confidence(&entry.entry_id, new_confidence)
                        .await?;
                    rescored += 1;
                }
            }
            self.storage
                .log_curation(
                    "rescore_confidence",
                    Some(&format!(
                        "boosted {} entries corroborated by {} videos (+{boost:.2})",
                        group.len(),
                        videos.len()
                    )),
                )
                .await?;
        }

        sink.event(&OptimizeEvent::Result {
            name: "rescore_confidence",
            detail: format!("{rescored} entries boosted"),
        });
        Ok(rescored)
    }

    // -- suggestions --------------------------------------------------------

    /// Queue destructive suggestions (pending, never auto-executed).
    #[instrument(skip_all)]
    pub async fn run_suggestions(&self, sink: &dyn OptimizeSink) -> Result<usize> {
        let mut created = 0usize;

        let weak = self
            .storage
            .videos_with_low_entry_stats(
                self.thresholds.min_entries,
                self.thresholds.min_avg_confidence,
            )
            .await?;
        for video in weak {
            self.storage
                .insert_queue_item(&NewQueueItem {
                    action_type: ACTION_RE_INGEST.into(),
                    severity: ActionSeverity::Destructive,
                    target_type: "video".into(),
                    target_id: Some(video.video_id.clone()),
                    description: format!(
                        "Re-ingest '{}': {} entries, avg confidence {:.2}",
                        video.title, video.entry_count, video.avg_confidence
                    ),
                    details: serde_json::json!({
                        "entry_count": video.entry_count,
                        "avg_confidence": video.avg_confidence,
                    }),
                })
                .await?;
            created += 1;
        }

        let garbage = self
            .storage
            .low_quality_entries(
                self.thresholds.garbage_confidence,
                self.thresholds.garbage_content_len,
            )
            .await?;
        for entry in garbage {
            self.storage
                .insert_queue_item(&NewQueueItem {
                    action_type: ACTION_DELETE_ENTRY.into(),
                    severity: ActionSeverity::Destructive,
                    target_type: "knowledge_entry".into(),
                    target_id: Some(entry.id.clone()),
                    description: format!(
                        "Delete low-quality entry '{}' (confidence {:.2})",
                        entry.title, entry.confidence
                    ),
                    details: serde_json::json!({
                        "confidence": entry.confidence,
                        "content_len": entry.content.len(),
                    }),
                })
                .await?;
            created += 1;
        }

        sink.event(&OptimizeEvent::SuggestionsComplete { created });
        info!(created, "suggestion pass complete");
        Ok(created)
    }

    // -- execution ----------------------------------------------------------

    /// Execute every approved queue item, isolating failures per item.
    #[instrument(skip_all)]
    pub async fn execute_approved(&self) -> Result<ExecutionSummary> {
        let items = self.storage.approved_queue_items().await?;
        let mut summary = ExecutionSummary::default();

        for item in items {
            match self.execute_item(&item).await {
                Ok(detail) => {
                    self.storage
                        .set_queue_status(&item.id, QueueStatus::Executed, Some("optimizer"))
                        .await?;
                    self.storage
                        .log_curation(&item.action_type, Some(&detail))
                        .await?;
                    summary.executed += 1;
                }
                Err(e) => {
                    warn!(item = %item.id, action = %item.action_type, error = %e, "queue item failed");
                    self.storage
                        .set_queue_status(&item.id, QueueStatus::Failed, Some("optimizer"))
                        .await?;
                    summary.failed += 1;
                }
            }
        }

        info!(
            executed = summary.executed,
            failed = summary.failed,
            "queue execution complete"
        );
        Ok(summary)
    }

    async fn execute_item(&self, item: &QueueItem) -> Result<String> {
        let target_id = item
            .target_id
            .as_deref()
            .ok_or_else(|| VidloreError::validation("queue item has no target"))?;

        match item.action_type.as_str() {
            ACTION_DELETE_ENTRY => {
                if self.storage.get_entry(target_id).await?.is_none() {
                    return Err(VidloreError::validation(format!(
                        "entry {target_id} no longer exists"
                    )));
                }
                self.storage.delete_entry(target_id).await?;
                Ok(format!("deleted entry {target_id}"))
            }
            ACTION_RE_INGEST => {
                if self.storage.get_video(target_id).await?.is_none() {
                    return Err(VidloreError::validation(format!(
                        "video {target_id} no longer exists"
                    )));
                }
                self.storage
                    .set_video_status(target_id, IngestStatus::Pending, None)
                    .await?;
                Ok(format!("reset video {target_id} to pending"))
            }
            other => Err(VidloreError::validation(format!(
                "unknown queue action '{other}'"
            ))),
        }
    }
}

/// Normalize a tag name for duplicate grouping: lowercase, hyphens and
/// underscores become spaces, whitespace squeezed.
pub fn normalize_tag(name: &str) -> String {
    let lowered = name.to_lowercase().replace(['-', '_'], " ");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Grouping key for cross-video corroboration: the first four (sorted,
/// deduplicated) title words of at least four letters. `None` when fewer
/// than two such words exist. The policy is deliberately isolated here so it
/// can be tuned without touching the rescoring loop.
pub fn corroboration_key(title: &str) -> Option<String> {
    // Alphabetic runs only; numbers and punctuation never corroborate.
    let word_re = Regex::new(r"[a-z]+").ok()?;
    let lowered = title.to_lowercase();
    let words: BTreeSet<&str> = word_re
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= 4)
        .collect();
    if words.len() < 2 {
        return None;
    }
    Some(words.into_iter().take(4).collect::<Vec<_>>().join("|"))
}

/// Pair batch entries with their assigned names, skipping bad indexes.
fn resolve_assignments<'b>(
    batch: &'b [KnowledgeEntry],
    assignments: &'b [RawAssignment],
    names: impl Fn(&'b RawAssignment) -> &'b Vec<String>,
) -> Vec<(&'b KnowledgeEntry, &'b Vec<String>)> {
    assignments
        .iter()
        .filter_map(|assignment| {
            let index = assignment.index?;
            let entry = batch.get(index)?;
            let assigned = names(assignment);
            (!assigned.is_empty()).then_some((entry, assigned))
        })
        .collect()
}
