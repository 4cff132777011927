//! Log line extractors for the engine and scheduler containers.
//!
//! Both services write plain text logs; the dashboard scrapes a bounded tail
//! of each and pulls out three kinds of structured records:
//!
//! - `preprocess:` queue lines from the engine (ordered track titles),
//! - `NEXT | title="…" | playlist="…"` decisions from the scheduler,
//! - `BUS STREAM_START … src=playbin` transition markers from the engine.
//!
//! The line grammar is kept as a tagged [`ParsedLine`] variant so a fourth
//! convention gets its own arm instead of more inline string surgery. Lines
//! are scanned top to bottom, so results come out oldest first (logs are
//! appended).

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use crate::normalize::{final_path_segment, normalize, space_underscores, strip_audio_extension};

/// Timestamp format both services emit: `2024-05-01 12:30:45,123`.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// One scheduler "NEXT" announcement, in log-append order within a scan.
/// Ordering reflects time of announcement, not necessarily time of play;
/// re-announcements of the same title are expected and are deduplicated by
/// the resolver, not here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextEntry {
    /// Parsed announcement time; `None` when the line's timestamp was absent
    /// or malformed (the entry is still kept; title and playlist remain
    /// useful without it).
    pub timestamp: Option<NaiveDateTime>,
    pub timestamp_raw: String,
    pub title_raw: String,
    pub title_normalized: String,
    pub playlist: String,
}

/// Most recent low-level track-transition signal from the engine log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStartHint {
    pub line: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub age_seconds: Option<i64>,
    pub is_recent: bool,
}

/// One classified log line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Engine preprocessing-queue line, cleaned to display form.
    PreprocessTitle(String),
    /// Scheduler "NEXT" decision.
    SchedulerNext(NextEntry),
    /// Engine stream-start marker (full line kept for display).
    StreamStart(String),
    Unmatched,
}

/// Compiled patterns for the three line conventions. Built once per scan;
/// the patterns are literals, so construction cannot fail at runtime.
pub struct LineClassifier {
    re_preprocess: Regex,
    re_next: Regex,
    re_timestamp: Regex,
    re_index: Regex,
    re_trailing_paren: Regex,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    pub fn new() -> Self {
        Self {
            re_preprocess: Regex::new(r"(?i)preprocess:\s*(.*)$").expect("preprocess pattern"),
            re_next: Regex::new(r#"NEXT\s*\|\s*title="([^"]*)"\s*\|\s*playlist="([^"]*)""#)
                .expect("next pattern"),
            re_timestamp: Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3}")
                .expect("timestamp pattern"),
            re_index: Regex::new(r"^\s*\d+[.)]\s*").expect("index pattern"),
            re_trailing_paren: Regex::new(r"\s*\([^()]*\)\s*$").expect("paren pattern"),
        }
    }

    /// Classify one log line.
    pub fn classify(&self, line: &str) -> ParsedLine {
        if let Some(caps) = self.re_next.captures(line) {
            let title_raw = caps[1].to_string();
            let timestamp_raw = self
                .re_timestamp
                .find(line)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let timestamp =
                NaiveDateTime::parse_from_str(&timestamp_raw, LOG_TIMESTAMP_FORMAT).ok();
            return ParsedLine::SchedulerNext(NextEntry {
                timestamp,
                timestamp_raw,
                title_normalized: normalize(&title_raw),
                title_raw,
                playlist: caps[2].to_string(),
            });
        }

        if let Some(caps) = self.re_preprocess.captures(line) {
            match self.clean_preprocess_payload(&caps[1]) {
                Some(title) => return ParsedLine::PreprocessTitle(title),
                None => return ParsedLine::Unmatched,
            }
        }

        let folded = line.to_ascii_lowercase();
        if folded.contains("bus stream_start") && folded.contains("src=playbin") {
            return ParsedLine::StreamStart(line.trim().to_string());
        }

        ParsedLine::Unmatched
    }

    /// Cleanup pipeline for a `preprocess:` payload. Display case is kept;
    /// only the comparison key gets lowercased, elsewhere.
    fn clean_preprocess_payload(&self, payload: &str) -> Option<String> {
        let mut s = payload.trim();

        // Leading queue index: "1. foo" / "12) foo".
        if let Some(m) = self.re_index.find(s) {
            s = &s[m.end()..];
        }
        // Rename/transform lines keep only the source side.
        if let Some(pos) = s.find("->") {
            s = s[..pos].trim_end();
        }
        // Trailing annotation: "title (3.2s)" / "title (cached)".
        let without_paren = self.re_trailing_paren.replace(s, "");

        let segment = final_path_segment(without_paren.trim());
        let stem = strip_audio_extension(segment);
        let cleaned = space_underscores(stem);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    /// Parse the leading timestamp of an arbitrary line, if one is present.
    fn line_timestamp(&self, line: &str) -> Option<NaiveDateTime> {
        let m = self.re_timestamp.find(line)?;
        NaiveDateTime::parse_from_str(m.as_str(), LOG_TIMESTAMP_FORMAT).ok()
    }
}

/// Scan an engine log tail for preprocessing-queue titles, oldest first.
pub fn scan_preprocess_titles(tail: &str) -> Vec<String> {
    let classifier = LineClassifier::new();
    tail.lines()
        .filter_map(|line| match classifier.classify(line) {
            ParsedLine::PreprocessTitle(title) => Some(title),
            _ => None,
        })
        .collect()
}

/// Scan a scheduler log tail for NEXT decisions, oldest first.
pub fn scan_next_entries(tail: &str) -> Vec<NextEntry> {
    let classifier = LineClassifier::new();
    tail.lines()
        .filter_map(|line| match classifier.classify(line) {
            ParsedLine::SchedulerNext(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

/// Most recent stream-start marker in an engine log tail, with recency
/// relative to `now`. A negative age (timestamp from the future, clock skew)
/// is not recent; neither is a marker whose timestamp failed to parse.
pub fn scan_stream_start(
    tail: &str,
    now: NaiveDateTime,
    recent_window_secs: i64,
) -> StreamStartHint {
    let classifier = LineClassifier::new();
    let last = tail
        .lines()
        .filter_map(|line| match classifier.classify(line) {
            ParsedLine::StreamStart(l) => Some(l),
            _ => None,
        })
        .last();

    let Some(line) = last else {
        return StreamStartHint::default();
    };

    let timestamp = classifier.line_timestamp(&line);
    let age_seconds = timestamp.map(|ts| (now - ts).num_seconds());
    let is_recent = age_seconds
        .map(|age| (0..=recent_window_secs).contains(&age))
        .unwrap_or(false);

    StreamStartHint {
        line: Some(line),
        timestamp,
        age_seconds,
        is_recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, LOG_TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_classify_next_line() {
        let classifier = LineClassifier::new();
        let line = r#"2024-05-01 12:30:45,123 INFO sched: NEXT | title="vanzo_-_me_and_you" | playlist="morning""#;
        match classifier.classify(line) {
            ParsedLine::SchedulerNext(entry) => {
                assert_eq!(entry.title_raw, "vanzo_-_me_and_you");
                assert_eq!(entry.title_normalized, "vanzo - me and you");
                assert_eq!(entry.playlist, "morning");
                assert_eq!(entry.timestamp_raw, "2024-05-01 12:30:45,123");
                assert_eq!(entry.timestamp, Some(ts("2024-05-01 12:30:45,123")));
            }
            other => panic!("expected SchedulerNext, got {:?}", other),
        }
    }

    #[test]
    fn test_next_line_without_timestamp_is_kept() {
        let entries =
            scan_next_entries(r#"NEXT | title="radio_jingle" | playlist="station_ids""#);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].timestamp.is_none());
        assert_eq!(entries[0].timestamp_raw, "");
        assert_eq!(entries[0].title_normalized, "radio jingle");
    }

    #[test]
    fn test_scan_next_entries_in_order() {
        let tail = r#"2024-05-01 12:00:00,000 NEXT | title="a" | playlist="p"
noise line
2024-05-01 12:03:00,000 NEXT | title="b" | playlist="p"
"#;
        let titles: Vec<_> = scan_next_entries(tail)
            .into_iter()
            .map(|e| e.title_raw)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    // Table of observed preprocess payload variants.
    #[test]
    fn test_preprocess_payload_variants() {
        let cases = [
            ("engine: preprocess: 1. /music/vanzo_-_me_and_you.mp3", "vanzo - me and you"),
            ("PREPROCESS: 2) radio_jingle.wav", "radio jingle"),
            (
                "preprocess: /in/Artist_-_Track.mp3 -> /cache/abc.wav",
                "Artist - Track",
            ),
            ("preprocess: Artist_-_Track.mp3 (4.2s)", "Artist - Track"),
            ("preprocess: plain title", "plain title"),
        ];
        for (line, want) in cases {
            let got = scan_preprocess_titles(line);
            assert_eq!(got, vec![want.to_string()], "line: {}", line);
        }
    }

    #[test]
    fn test_preprocess_case_preserved() {
        // Display form keeps its case; only the comparison key lowercases.
        let got = scan_preprocess_titles("preprocess: My_Track.mp3");
        assert_eq!(got, vec!["My Track"]);
    }

    #[test]
    fn test_preprocess_empty_payload_discarded() {
        assert!(scan_preprocess_titles("preprocess: ").is_empty());
        assert!(scan_preprocess_titles("preprocess: 1. (skipped)").is_empty());
    }

    #[test]
    fn test_non_matching_lines_yield_nothing() {
        let tail = "plain noise\n2024-05-01 12:00:00,000 INFO something else\n";
        assert!(scan_preprocess_titles(tail).is_empty());
        assert!(scan_next_entries(tail).is_empty());
        let hint = scan_stream_start(tail, ts("2024-05-01 12:00:10,000"), 10);
        assert_eq!(hint, StreamStartHint::default());
    }

    #[test]
    fn test_stream_start_keeps_last_marker() {
        let tail = "2024-05-01 12:00:00,000 bus stream_start src=playbin\n\
                    2024-05-01 12:05:00,000 BUS STREAM_START src=playbin uri=file:///a.mp3\n";
        let now = ts("2024-05-01 12:05:05,000");
        let hint = scan_stream_start(tail, now, 10);
        assert_eq!(hint.timestamp, Some(ts("2024-05-01 12:05:00,000")));
        assert_eq!(hint.age_seconds, Some(5));
        assert!(hint.is_recent);
        assert!(hint.line.unwrap().contains("uri=file:///a.mp3"));
    }

    #[test]
    fn test_stream_start_requires_playbin_source() {
        let tail = "2024-05-01 12:00:00,000 BUS STREAM_START src=decodebin\n";
        let hint = scan_stream_start(tail, ts("2024-05-01 12:00:01,000"), 10);
        assert!(hint.line.is_none());
        assert!(!hint.is_recent);
    }

    #[test]
    fn test_recency_boundaries() {
        let start = ts("2024-05-01 12:00:00,000");
        let tail = "2024-05-01 12:00:00,000 BUS STREAM_START src=playbin\n";
        let window = 10;

        // Exactly at the window edge: recent.
        let hint = scan_stream_start(tail, start + Duration::seconds(10), window);
        assert_eq!(hint.age_seconds, Some(10));
        assert!(hint.is_recent);

        // One past the edge: not recent.
        let hint = scan_stream_start(tail, start + Duration::seconds(11), window);
        assert_eq!(hint.age_seconds, Some(11));
        assert!(!hint.is_recent);

        // Timestamp from the future (clock skew): not recent.
        let hint = scan_stream_start(tail, start - Duration::seconds(1), window);
        assert_eq!(hint.age_seconds, Some(-1));
        assert!(!hint.is_recent);
    }

    #[test]
    fn test_stream_start_unparsable_timestamp() {
        let tail = "BUS STREAM_START src=playbin (no timestamp)\n";
        let hint = scan_stream_start(tail, ts("2024-05-01 12:00:00,000"), 10);
        assert!(hint.line.is_some());
        assert!(hint.timestamp.is_none());
        assert!(hint.age_seconds.is_none());
        assert!(!hint.is_recent);
    }

    #[test]
    fn test_malformed_next_timestamp_kept_as_none() {
        // Month 13 matches the digit pattern but fails to parse.
        let tail = r#"2024-13-01 12:00:00,000 NEXT | title="x" | playlist="p""#;
        let entries = scan_next_entries(tail);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].timestamp.is_none());
        assert_eq!(entries[0].timestamp_raw, "2024-13-01 12:00:00,000");
    }
}
