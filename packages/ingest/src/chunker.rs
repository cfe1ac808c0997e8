//! Transcript chunking.
//!
//! Splits a timestamped transcript into word-bounded chunks sized for a
//! single extraction call, with a trailing-word overlap carried into the next
//! chunk so claims spanning a boundary are not lost.

use vidlore_shared::{ChunkConfig, Snippet};

/// Overlap window, in seconds, applied when deriving the next chunk's start
/// time from the previous chunk's end time.
const TIME_OVERLAP_SECS: f64 = 10.0;

/// One extraction-sized slice of a transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Zero-based position within the transcript.
    pub index: i64,
    pub text: String,
    /// Start offset in seconds (overlaps the previous chunk's tail).
    pub start_time: f64,
    /// End offset in seconds.
    pub end_time: f64,
    pub word_count: usize,
}

/// Split snippets into chunks of roughly `target_words` words.
///
/// Words accumulate snippet by snippet; once the target is reached the chunk
/// closes at that snippet's end time. The last `overlap_words` words seed the
/// next chunk, whose start time is the previous end minus ten seconds
/// (floored at zero). A trailing partial chunk is always flushed; empty input
/// yields no chunks.
pub fn chunk_snippets(snippets: &[Snippet], config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut chunk_start = 0.0f64;
    let mut last_end = 0.0f64;
    let mut started = false;

    for snippet in snippets {
        if !started {
            chunk_start = snippet.start;
            started = true;
        }
        words.extend(snippet.text.split_whitespace());
        last_end = snippet.start + snippet.duration;

        if words.len() >= config.target_words {
            chunks.push(Chunk {
                index: chunks.len() as i64,
                text: words.join(" "),
                start_time: chunk_start,
                end_time: last_end,
                word_count: words.len(),
            });

            let tail_from = words.len().saturating_sub(config.overlap_words);
            words = words.split_off(tail_from);
            chunk_start = (last_end - TIME_OVERLAP_SECS).max(0.0);
        }
    }

    if !words.is_empty() {
        chunks.push(Chunk {
            index: chunks.len() as i64,
            text: words.join(" "),
            start_time: chunk_start,
            end_time: last_end,
            word_count: words.len(),
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(text: &str, start: f64, duration: f64) -> Snippet {
        Snippet {
            text: text.into(),
            start,
            duration,
        }
    }

    fn config(target: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            target_words: target,
            overlap_words: overlap,
        }
    }

    /// A snippet with exactly `n` distinct words.
    fn words_snippet(n: usize, prefix: &str, start: f64, duration: f64) -> Snippet {
        let text = (0..n)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        snippet(&text, start, duration)
    }

    #[test]
    fn empty_transcript_yields_no_chunks() {
        assert!(chunk_snippets(&[], &config(2000, 100)).is_empty());
    }

    #[test]
    fn short_transcript_is_one_partial_chunk() {
        let snippets = vec![
            snippet("hello there everyone", 0.0, 2.0),
            snippet("welcome back to the channel", 2.0, 3.0),
        ];
        let chunks = chunk_snippets(&snippets, &config(2000, 100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].word_count, 8);
        assert!((chunks[0].start_time - 0.0).abs() < f64::EPSILON);
        assert!((chunks[0].end_time - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn splits_at_target_and_seeds_overlap() {
        let snippets = vec![
            words_snippet(10, "a", 0.0, 30.0),
            words_snippet(10, "b", 30.0, 30.0),
            words_snippet(5, "c", 60.0, 15.0),
        ];
        let chunks = chunk_snippets(&snippets, &config(20, 4));
        assert_eq!(chunks.len(), 2);

        // First chunk closes at the snippet that crossed the target.
        assert_eq!(chunks[0].word_count, 20);
        assert!((chunks[0].end_time - 60.0).abs() < f64::EPSILON);

        // Second chunk starts with the carried tail plus the remaining words.
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].word_count, 9);
        assert!(chunks[1].text.starts_with("b6 b7 b8 b9"));
        assert!((chunks[1].start_time - 50.0).abs() < f64::EPSILON);
        assert!((chunks[1].end_time - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn next_start_is_floored_at_zero() {
        let snippets = vec![
            words_snippet(6, "a", 0.0, 4.0),
            words_snippet(6, "b", 4.0, 4.0),
        ];
        let chunks = chunk_snippets(&snippets, &config(6, 2));
        // Two full chunks plus the flushed overlap tail.
        assert_eq!(chunks.len(), 3);
        // 4.0 - 10.0 would be negative
        assert!((chunks[1].start_time - 0.0).abs() < f64::EPSILON);
        assert_eq!(chunks[2].word_count, 2);
    }

    #[test]
    fn determinism() {
        let snippets: Vec<Snippet> = (0..50)
            .map(|i| words_snippet(7, &format!("s{i}w"), i as f64 * 5.0, 5.0))
            .collect();
        let cfg = config(40, 10);
        let first = chunk_snippets(&snippets, &cfg);
        let second = chunk_snippets(&snippets, &cfg);
        assert_eq!(first, second);
        assert!(first.len() > 1);
        for pair in first.windows(2) {
            assert_eq!(pair[1].index, pair[0].index + 1);
            assert!(pair[1].start_time <= pair[0].end_time);
        }
    }
}
