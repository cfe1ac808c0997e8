//! Knowledge extraction from transcript chunks.
//!
//! One completion call per chunk, retried on transient failures. The model's
//! output is treated as untrusted: code fences are stripped, unparseable JSON
//! yields zero entries (logged, never fatal), and every entry passes through
//! validation before it reaches storage.

use serde::Deserialize;
use tracing::warn;
use vidlore_shared::{EntryType, Result, RetryConfig};

use crate::chunker::Chunk;
use crate::client::CompletionClient;
use crate::retry::with_backoff;

const MAX_TITLE_CHARS: usize = 200;
const MAX_QUOTE_CHARS: usize = 500;
const MAX_DESCRIPTION_CHARS: usize = 300;
const DEFAULT_CONFIDENCE: f64 = 0.8;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract atomic, reusable knowledge from video transcript excerpts.

Return JSON: {\"entries\": [...]}. Each entry has:
- entry_type: one of insight, tip, concept, technique, warning, resource, quote
- title: short descriptive title
- content: the claim or advice, self-contained and specific
- source_quote: the transcript phrasing it came from (optional)
- confidence: 0.0-1.0, how clearly the transcript supports it
- categories: broad topic names (optional)
- tags: short lowercase keywords (optional)

Only extract substantive knowledge. Skip filler, greetings, and sponsor reads.
Return {\"entries\": []} when an excerpt has nothing worth keeping.";

/// A validated entry extracted from one chunk, not yet persisted.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    pub entry_type: EntryType,
    pub title: String,
    pub content: String,
    pub source_quote: Option<String>,
    pub confidence: f64,
    pub chunk_index: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Raw model output for one entry, before validation.
///
/// `confidence` stays a raw JSON value: models emit numbers, numeric strings,
/// and the occasional word, and none of those may cost us the entry.
#[derive(Debug, Deserialize)]
struct RawEntry {
    entry_type: Option<String>,
    title: Option<String>,
    content: Option<String>,
    source_quote: Option<String>,
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Video metadata handed to the model alongside each chunk.
#[derive(Debug, Clone, Copy)]
pub struct VideoContext<'a> {
    pub title: &'a str,
    pub channel_name: &'a str,
    pub description: Option<&'a str>,
}

/// Per-chunk knowledge extractor over a [`CompletionClient`].
pub struct Extractor<'a, C> {
    client: &'a C,
    retry: RetryConfig,
}

impl<'a, C: CompletionClient> Extractor<'a, C> {
    pub fn new(client: &'a C, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Extract entries from one chunk.
    ///
    /// Returns an error only when the completion call itself fails after
    /// retries; a response that fails to parse yields `Ok(vec![])`.
    pub async fn extract_chunk(
        &self,
        video: &VideoContext<'_>,
        chunk: &Chunk,
    ) -> Result<Vec<ExtractedEntry>> {
        let description = video
            .description
            .filter(|d| !d.trim().is_empty())
            .map(|d| cap_chars(d, MAX_DESCRIPTION_CHARS))
            .unwrap_or_else(|| "N/A".into());
        let user_prompt = format!(
            "Video: \"{}\"\nChannel: {}\nDescription: {description}\nExcerpt ({:.0}s-{:.0}s):\n\n{}",
            video.title, video.channel_name, chunk.start_time, chunk.end_time, chunk.text
        );

        let response = with_backoff(&self.retry, "extract_chunk", || {
            self.client
                .complete(EXTRACTION_SYSTEM_PROMPT, &user_prompt, true)
        })
        .await?;

        Ok(parse_entries(&response, chunk))
    }
}

/// Parse and validate a model response into entries. Tolerant: anything
/// unusable is dropped (and logged), never surfaced as an error.
fn parse_entries(response: &str, chunk: &Chunk) -> Vec<ExtractedEntry> {
    let cleaned = strip_code_fences(response);
    let value: serde_json::Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            warn!(chunk = chunk.index, error = %e, "unparseable extraction response, keeping zero entries");
            return Vec::new();
        }
    };

    // Accept either {"entries": [...]} or a bare array.
    let items = match &value {
        serde_json::Value::Object(map) => map.get("entries").and_then(|v| v.as_array()).cloned(),
        serde_json::Value::Array(items) => Some(items.clone()),
        _ => None,
    };
    let Some(items) = items else {
        warn!(chunk = chunk.index, "extraction response has no entries array");
        return Vec::new();
    };

    let mut entries = Vec::new();
    for item in items {
        let raw: RawEntry = match serde_json::from_value(item) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(chunk = chunk.index, error = %e, "dropping malformed entry");
                continue;
            }
        };
        if let Some(entry) = validate_entry(raw, chunk) {
            entries.push(entry);
        }
    }
    entries
}

/// Apply the per-entry validation rules. Missing title or content discards
/// the entry; everything else is normalized in place.
fn validate_entry(raw: RawEntry, chunk: &Chunk) -> Option<ExtractedEntry> {
    let title = raw.title.as_deref().map(str::trim).unwrap_or_default();
    let content = raw.content.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() || content.is_empty() {
        warn!(chunk = chunk.index, "dropping entry without title or content");
        return None;
    }

    let entry_type = EntryType::coerce(raw.entry_type.as_deref().unwrap_or_default());
    let confidence = raw
        .confidence
        .as_ref()
        .and_then(numeric_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    Some(ExtractedEntry {
        entry_type,
        title: cap_chars(title, MAX_TITLE_CHARS),
        content: content.to_string(),
        source_quote: raw
            .source_quote
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| cap_chars(q, MAX_QUOTE_CHARS)),
        confidence,
        chunk_index: chunk.index,
        start_time: chunk.start_time,
        end_time: chunk.end_time,
        categories: raw.categories,
        tags: raw.tags,
    })
}

fn cap_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Accept a number or a numeric string; anything else means "not given".
fn numeric_confidence(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strip a surrounding Markdown code fence (with optional `json` tag).
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
