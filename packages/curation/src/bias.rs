//! Commercial bias scanning.
//!
//! A two-pass design: cheap regex heuristics prefilter each batch, and only
//! suspicious entries go to the generative pass. When the generative call
//! fails or returns garbage, the heuristic findings themselves become flags,
//! so a scan always terminates with every entry examined.

use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use vidlore_shared::{
    BiasSeverity, BiasType, CurationThresholds, KnowledgeEntry, NewBiasFlag, Result, RetryConfig,
    VidloreError,
};
use vidlore_storage::Storage;

use vidlore_ingest::{CompletionClient, with_backoff};

/// Detector identity recorded on flags produced by the generative pass.
const DETECTOR_AGENT: &str = "bias_agent";
/// Detector identity recorded on heuristic fallback flags.
const DETECTOR_FALLBACK: &str = "heuristic_fallback";

const BRAND_PATTERNS: &[&str] = &[
    r"\b(hoyt|mathews|prime|bowtech|elite)\b",
    r"\b(sitka|kuiu|first ?lite)\b",
    r"\b(vortex|leupold|swarovski|maven)\b",
    r"\b(yeti|mystery ranch|stone glacier|exo)\b",
    r"\b(rage|sevr|grim reaper|iron ?will)\b",
    r"\b(ozonics|scentlok|scent crusher)\b",
    r"\b(garmin|onx|basemap|gohunt)\b",
    r"\b(federal|hornady|barnes|nosler)\b",
    r"\b(mtn ops|wilderness athlete)\b",
];

const AFFILIATE_PATTERNS: &[&str] = &[
    r"use (?:my |the )?code",
    r"discount code",
    r"promo code",
    r"link in (?:the )?description",
    r"affiliate",
    r"sponsored by",
    r"this video is sponsored",
    r"% ?off",
    r"percent off",
];

const PROMOTIONAL_PATTERNS: &[&str] = &[
    r"hands down the best",
    r"the best .{0,20}(?:on the market|ever made|out there)",
    r"game ?changer",
    r"absolutely love",
    r"can'?t live without",
    r"blows .{0,20}out of the water",
    r"nothing else comes close",
];

const SCAN_SYSTEM_PROMPT: &str = "\
You review knowledge entries extracted from video transcripts for commercial
bias. For each numbered entry decide whether it is biased and how.

Return JSON: {\"flags\": [...]}. Each flag has:
- index: the entry's number
- bias_type: brand_promotion, affiliate, sponsored, product_placement,
  or unsubstantiated_claim
- severity: low, medium, or high
- brand_names: brand names involved, if any
- notes: one short sentence of justification

Only flag genuine commercial bias. Mentioning a product neutrally while
explaining a technique is not bias. Return {\"flags\": []} when all entries
are clean.";

/// Compiled heuristic pattern families. Built per scanner; no process-wide
/// state.
pub struct HeuristicPatterns {
    brands: Vec<Regex>,
    affiliate: Vec<Regex>,
    promotional: Vec<Regex>,
}

/// What the heuristics saw in one entry's text.
#[derive(Debug, Clone, Default)]
pub struct HeuristicFindings {
    pub brands: Vec<String>,
    pub affiliate: bool,
    pub promotional: bool,
}

impl HeuristicFindings {
    pub fn is_suspicious(&self) -> bool {
        self.affiliate || self.promotional || !self.brands.is_empty()
    }
}

impl HeuristicPatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            brands: compile_family(BRAND_PATTERNS)?,
            affiliate: compile_family(AFFILIATE_PATTERNS)?,
            promotional: compile_family(PROMOTIONAL_PATTERNS)?,
        })
    }

    /// Run every pattern family over one text.
    pub fn scan_text(&self, text: &str) -> HeuristicFindings {
        let mut findings = HeuristicFindings::default();
        for pattern in &self.brands {
            if let Some(m) = pattern.find(text) {
                findings.brands.push(m.as_str().to_lowercase());
            }
        }
        findings.affiliate = self.affiliate.iter().any(|p| p.is_match(text));
        findings.promotional = self.promotional.iter().any(|p| p.is_match(text));
        findings
    }
}

fn compile_family(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}"))
                .map_err(|e| VidloreError::config(format!("bad bias pattern '{p}': {e}")))
        })
        .collect()
}

/// Derive a flag directly from heuristic findings when the generative pass is
/// unavailable. Priority: affiliate language beats promotional superlatives
/// beats bare brand mentions.
pub fn fallback_flag(entry_id: &str, findings: &HeuristicFindings) -> Option<NewBiasFlag> {
    if findings.affiliate {
        return Some(NewBiasFlag {
            entry_id: entry_id.to_string(),
            bias_type: BiasType::Affiliate,
            severity: BiasSeverity::Medium,
            brand_names: findings.brands.clone(),
            notes: "affiliate or discount-code language detected".into(),
            detected_by: DETECTOR_FALLBACK.into(),
        });
    }
    if findings.promotional {
        return Some(NewBiasFlag {
            entry_id: entry_id.to_string(),
            bias_type: BiasType::UnsubstantiatedClaim,
            severity: BiasSeverity::Medium,
            brand_names: findings.brands.clone(),
            notes: "promotional superlative without supporting evidence".into(),
            detected_by: DETECTOR_FALLBACK.into(),
        });
    }
    if !findings.brands.is_empty() {
        return Some(NewBiasFlag {
            entry_id: entry_id.to_string(),
            bias_type: BiasType::BrandPromotion,
            severity: BiasSeverity::Low,
            brand_names: findings.brands.clone(),
            notes: "brand mention detected".into(),
            detected_by: DETECTOR_FALLBACK.into(),
        });
    }
    None
}

/// Progress events emitted during a scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Start {
        total: usize,
    },
    Progress {
        processed: usize,
        total: usize,
        flagged: usize,
        batch_suspicious: usize,
    },
    Complete {
        total: usize,
        flagged: usize,
    },
}

/// Synchronous progress callback for scanning.
pub trait ScanSink: Send + Sync {
    fn event(&self, event: &ScanEvent);
}

/// No-op sink for headless/test usage.
pub struct SilentScan;

impl ScanSink for SilentScan {
    fn event(&self, _event: &ScanEvent) {}
}

/// Totals for a completed scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub flagged: usize,
}

/// One flag in the generative pass's response.
#[derive(Debug, Deserialize)]
struct RawFlag {
    index: Option<usize>,
    bias_type: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    brand_names: Vec<String>,
    #[serde(default)]
    notes: String,
}

/// Batched two-pass bias scanner over unflagged entries.
pub struct BiasScanner<'a, C> {
    storage: &'a Storage,
    client: &'a C,
    patterns: HeuristicPatterns,
    retry: RetryConfig,
    batch_size: usize,
}

impl<'a, C: CompletionClient> BiasScanner<'a, C> {
    pub fn new(
        storage: &'a Storage,
        client: &'a C,
        retry: RetryConfig,
        thresholds: &CurationThresholds,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            client,
            patterns: HeuristicPatterns::new()?,
            retry,
            batch_size: thresholds.scan_batch_size.max(1),
        })
    }

    /// Scan every unflagged entry, batch by batch.
    #[instrument(skip_all)]
    pub async fn scan(&self, sink: &dyn ScanSink) -> Result<ScanSummary> {
        let entries = self.storage.unflagged_entries().await?;
        let total = entries.len();
        if total == 0 {
            sink.event(&ScanEvent::Complete { total: 0, flagged: 0 });
            return Ok(ScanSummary::default());
        }

        sink.event(&ScanEvent::Start { total });
        let mut summary = ScanSummary {
            total,
            ..ScanSummary::default()
        };
        let mut processed = 0usize;

        for batch in entries.chunks(self.batch_size) {
            processed += batch.len();

            // Heuristic prefilter: only suspicious entries cost a completion.
            let suspicious: Vec<(&KnowledgeEntry, HeuristicFindings)> = batch
                .iter()
                .filter_map(|entry| {
                    let findings = self.patterns.scan_text(&entry_text(entry));
                    findings.is_suspicious().then_some((entry, findings))
                })
                .collect();

            if !suspicious.is_empty() {
                summary.flagged += self.flag_suspicious(&suspicious).await?;
            }

            sink.event(&ScanEvent::Progress {
                processed,
                total,
                flagged: summary.flagged,
                batch_suspicious: suspicious.len(),
            });
        }

        sink.event(&ScanEvent::Complete {
            total,
            flagged: summary.flagged,
        });
        info!(total, flagged = summary.flagged, "bias scan complete");
        Ok(summary)
    }

    /// Generative pass over one batch's suspicious entries, with heuristic
    /// fallback. Returns how many flags were actually inserted.
    async fn flag_suspicious(
        &self,
        suspicious: &[(&KnowledgeEntry, HeuristicFindings)],
    ) -> Result<usize> {
        let flags = match self.generative_flags(suspicious).await {
            Ok(flags) => flags,
            Err(err) => {
                warn!(error = %err, "generative bias pass failed, using heuristic fallback");
                suspicious
                    .iter()
                    .filter_map(|(entry, findings)| fallback_flag(&entry.id, findings))
                    .collect()
            }
        };

        let mut inserted = 0usize;
        for flag in &flags {
            if self.storage.insert_bias_flag(flag).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn generative_flags(
        &self,
        suspicious: &[(&KnowledgeEntry, HeuristicFindings)],
    ) -> Result<Vec<NewBiasFlag>> {
        let mut user_prompt = String::from("Entries to review:\n");
        for (i, (entry, findings)) in suspicious.iter().enumerate() {
            user_prompt.push_str(&format!(
                "\n[{i}] title: {}\ncontent: {}\nheuristic hits: brands={:?} affiliate={} promotional={}\n",
                entry.title, entry.content, findings.brands, findings.affiliate, findings.promotional
            ));
        }

        let response = with_backoff(&self.retry, "bias_scan", || {
            self.client.complete(SCAN_SYSTEM_PROMPT, &user_prompt, true)
        })
        .await?;

        let value: serde_json::Value = serde_json::from_str(response.trim())
            .map_err(|e| VidloreError::malformed(format!("bias response: {e}")))?;
        let items = value
            .get("flags")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| VidloreError::malformed("bias response has no flags array"))?;

        let mut flags = Vec::new();
        for item in items {
            let raw: RawFlag = match serde_json::from_value(item) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "dropping malformed bias flag");
                    continue;
                }
            };
            let Some(index) = raw.index.filter(|i| *i < suspicious.len()) else {
                warn!(index = ?raw.index, "bias flag index out of range");
                continue;
            };
            let (entry, _) = suspicious[index];
            flags.push(NewBiasFlag {
                entry_id: entry.id.clone(),
                bias_type: BiasType::coerce(raw.bias_type.as_deref().unwrap_or_default()),
                severity: BiasSeverity::coerce(raw.severity.as_deref().unwrap_or_default()),
                brand_names: raw.brand_names,
                notes: raw.notes,
                detected_by: DETECTOR_AGENT.into(),
            });
        }
        Ok(flags)
    }
}

/// The searchable text of an entry for heuristic purposes.
fn entry_text(entry: &KnowledgeEntry) -> String {
    match &entry.source_quote {
        Some(quote) => format!("{} {} {quote}", entry.title, entry.content),
        None => format!("{} {}", entry.title, entry.content),
    }
}
