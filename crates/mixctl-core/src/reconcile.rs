//! Now-playing reconciliation.
//!
//! Three unreliable, asynchronously-updated sources describe what the stream
//! is doing: Icecast mount metadata (the observed title), the scheduler log
//! (announced NEXT decisions), and the engine log (preprocess queue and
//! stream-start markers). Nothing here blocks or holds state; each call is
//! a pure mapping from already-fetched text to a result structure, safe to
//! run concurrently per request.
//!
//! Failure policy: upstream trouble is encoded in `ok`/`error` fields and
//! degrades to empty values. The dashboard never hard-fails on a flaky
//! upstream, so nothing in this module returns `Err` or panics.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::logscan::{self, NextEntry, StreamStartHint};
use crate::normalize::normalize;

/// Resolver source tags, so callers can tell "anchored after the current
/// track" from "no match, generous tail window".
pub const SOURCE_AFTER_CURRENT: &str = "scheduler_logs_after_current";
pub const SOURCE_FALLBACK_TAIL: &str = "scheduler_logs_fallback_tail";

/// Observed-title provenance in a [`NowSnapshot`].
pub const OBSERVED_ICECAST: &str = "icecast";
pub const OBSERVED_ENGINE_LOGS: &str = "engine_logs";

/// When the current title is not found in the NEXT log, fall back to the
/// last `limit * FALLBACK_WINDOW_FACTOR` announcements.
const FALLBACK_WINDOW_FACTOR: usize = 6;

/// One upcoming track as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingTrack {
    pub title: String,
    pub playlist: String,
    pub timestamp: Option<NaiveDateTime>,
    pub timestamp_raw: String,
}

impl From<&NextEntry> for UpcomingTrack {
    fn from(entry: &NextEntry) -> Self {
        Self {
            title: entry.title_raw.clone(),
            playlist: entry.playlist.clone(),
            timestamp: entry.timestamp,
            timestamp_raw: entry.timestamp_raw.clone(),
        }
    }
}

/// Result of [`resolve_upcoming`].
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingView {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    pub current_title_found: bool,
    pub upcoming: Vec<UpcomingTrack>,
}

impl UpcomingView {
    /// A failed upstream fetch, degraded to an empty view.
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            source: None,
            current_title_found: false,
            upcoming: Vec::new(),
        }
    }
}

/// Index of the most recent entry announcing `normalized_title`.
/// An empty normalized title never matches anything.
fn find_last_by_normalized(entries: &[NextEntry], normalized_title: &str) -> Option<usize> {
    if normalized_title.is_empty() {
        return None;
    }
    entries
        .iter()
        .rposition(|e| e.title_normalized == normalized_title)
}

/// What plays after `current_title`, according to the scheduler's NEXT log.
///
/// The anchor is the *last* announcement of the current title: schedulers
/// re-announce tracks, and only the most recent announcement tells us what
/// comes immediately after. Without an anchor the last `limit * 6` entries
/// serve as a generous fallback window, flagged via `source`. The walk
/// skips empty normalized titles and dedups by normalized title, first
/// occurrence wins (including its playlist tag).
pub fn resolve_upcoming(
    current_title: Option<&str>,
    entries: &[NextEntry],
    limit: usize,
) -> UpcomingView {
    if entries.is_empty() {
        return UpcomingView {
            ok: false,
            error: Some("no scheduler NEXT entries found".to_string()),
            source: None,
            current_title_found: false,
            upcoming: Vec::new(),
        };
    }

    let current_norm = normalize(current_title.unwrap_or(""));
    let anchor = find_last_by_normalized(entries, &current_norm);
    let (candidates, source, current_title_found) = match anchor {
        Some(idx) => (&entries[idx + 1..], SOURCE_AFTER_CURRENT, true),
        None => {
            let start = entries.len().saturating_sub(limit * FALLBACK_WINDOW_FACTOR);
            (&entries[start..], SOURCE_FALLBACK_TAIL, false)
        }
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut upcoming = Vec::new();
    for entry in candidates {
        if entry.title_normalized.is_empty() {
            continue;
        }
        if !seen.insert(entry.title_normalized.as_str()) {
            continue;
        }
        upcoming.push(UpcomingTrack::from(entry));
        if upcoming.len() >= limit {
            break;
        }
    }

    UpcomingView {
        ok: true,
        error: None,
        source: Some(source),
        current_title_found,
        upcoming,
    }
}

/// Resolve upcoming tracks straight from a scheduler log fetch outcome.
/// A failed fetch degrades to `ok: false` with an empty list.
pub fn upcoming_from_tail(
    tail: Result<&str, &str>,
    current_title: Option<&str>,
    limit: usize,
) -> UpcomingView {
    match tail {
        Ok(text) => resolve_upcoming(current_title, &logscan::scan_next_entries(text), limit),
        Err(error) => UpcomingView::unavailable(error),
    }
}

/// Result of [`promote`].
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub effective_now: Option<UpcomingTrack>,
    pub effective_upcoming: Vec<UpcomingTrack>,
    pub promoted: bool,
}

/// Correct the one-track lag of the observed metadata source.
///
/// Icecast keeps reporting the previous track for a while after a
/// transition. When the scheduler's freshest announcement does not match the
/// observed title, the announced track is assumed to be on air already and
/// is promoted to "effective now", shifting the upcoming list by one.
///
/// This assumes the lag is exactly one track. A two-track lag, or metadata
/// that is simply wrong rather than stale, misfires this rule the same way;
/// nothing observable distinguishes those cases, so the heuristic is applied
/// as-is rather than guessed around.
pub fn promote(title_observed: Option<&str>, upcoming: &[UpcomingTrack]) -> Promotion {
    let Some(first) = upcoming.first() else {
        return Promotion {
            effective_now: None,
            effective_upcoming: upcoming.to_vec(),
            promoted: false,
        };
    };

    let observed_norm = normalize(title_observed.unwrap_or(""));
    let first_norm = normalize(&first.title);
    let mismatch = !first_norm.is_empty() && first_norm != observed_norm;

    if observed_norm.is_empty() || mismatch {
        Promotion {
            effective_now: Some(first.clone()),
            effective_upcoming: upcoming[1..].to_vec(),
            promoted: true,
        }
    } else {
        Promotion {
            effective_now: None,
            effective_upcoming: upcoming.to_vec(),
            promoted: false,
        }
    }
}

/// How the effective title was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NowMode {
    Observed,
    PromotedFromUpcoming,
}

/// The reconciled "now + upcoming" view returned to the dashboard.
/// Recomputed from live inputs on every call; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct NowSnapshot {
    pub title_observed: Option<String>,
    /// Where the observed title came from (`icecast` or, when Icecast had
    /// nothing, the engine log's preprocess queue).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_source: Option<&'static str>,
    pub title_effective: Option<String>,
    pub playlist_observed: Option<String>,
    pub playlist_effective: Option<String>,
    pub now_mode: NowMode,
    pub current_title_found: bool,
    pub predicted_next: Option<UpcomingTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upcoming_source: Option<&'static str>,
    pub upcoming: Vec<UpcomingTrack>,
    pub stream_start_hint: StreamStartHint,
}

/// Reconcile one request's worth of inputs into the now-playing snapshot.
///
/// `observed_title` is the Icecast title when available; `scheduler_tail`
/// and `engine_tail` are the raw log fetch outcomes. Either tail may have
/// failed; the snapshot degrades to whatever the remaining sources support.
pub fn reconcile_now(
    observed_title: Option<&str>,
    scheduler_tail: Result<&str, &str>,
    engine_tail: Result<&str, &str>,
    now: NaiveDateTime,
    limit: usize,
    recent_window_secs: i64,
) -> NowSnapshot {
    let (title_observed, observed_source) = match observed_title.map(str::trim) {
        Some(t) if !t.is_empty() => (Some(t.to_string()), Some(OBSERVED_ICECAST)),
        _ => match engine_tail {
            Ok(text) => match logscan::scan_preprocess_titles(text).pop() {
                Some(t) => (Some(t), Some(OBSERVED_ENGINE_LOGS)),
                None => (None, None),
            },
            Err(_) => (None, None),
        },
    };

    let (view, playlist_observed) = match scheduler_tail {
        Ok(text) => {
            let entries = logscan::scan_next_entries(text);
            let observed_norm = normalize(title_observed.as_deref().unwrap_or(""));
            let playlist = find_last_by_normalized(&entries, &observed_norm)
                .map(|idx| entries[idx].playlist.clone());
            (
                resolve_upcoming(title_observed.as_deref(), &entries, limit),
                playlist,
            )
        }
        Err(error) => (UpcomingView::unavailable(error), None),
    };

    let stream_start_hint = match engine_tail {
        Ok(text) => logscan::scan_stream_start(text, now, recent_window_secs),
        Err(_) => StreamStartHint::default(),
    };

    let promotion = promote(title_observed.as_deref(), &view.upcoming);

    match promotion.effective_now {
        Some(current) => NowSnapshot {
            title_effective: Some(current.title.clone()),
            playlist_effective: Some(current.playlist.clone()),
            now_mode: NowMode::PromotedFromUpcoming,
            predicted_next: promotion.effective_upcoming.first().cloned(),
            upcoming: promotion.effective_upcoming,
            title_observed,
            observed_source,
            playlist_observed,
            current_title_found: view.current_title_found,
            upcoming_source: view.source,
            stream_start_hint,
        },
        None => NowSnapshot {
            title_effective: title_observed.clone(),
            playlist_effective: playlist_observed.clone(),
            now_mode: NowMode::Observed,
            predicted_next: view.upcoming.first().cloned(),
            upcoming: promotion.effective_upcoming,
            title_observed,
            observed_source,
            playlist_observed,
            current_title_found: view.current_title_found,
            upcoming_source: view.source,
            stream_start_hint,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, playlist: &str) -> NextEntry {
        NextEntry {
            timestamp: None,
            timestamp_raw: String::new(),
            title_raw: title.to_string(),
            title_normalized: normalize(title),
            playlist: playlist.to_string(),
        }
    }

    fn track(title: &str) -> UpcomingTrack {
        UpcomingTrack {
            title: title.to_string(),
            playlist: "p".to_string(),
            timestamp: None,
            timestamp_raw: String::new(),
        }
    }

    #[test]
    fn test_resolver_anchors_on_last_occurrence() {
        // [A, B, A, C, D] with current = A must anchor on the second A.
        let entries = vec![
            entry("a", "p"),
            entry("b", "p"),
            entry("a", "p"),
            entry("c", "p"),
            entry("d", "p"),
        ];
        let view = resolve_upcoming(Some("A"), &entries, 10);
        assert!(view.ok);
        assert!(view.current_title_found);
        assert_eq!(view.source, Some(SOURCE_AFTER_CURRENT));
        let titles: Vec<_> = view.upcoming.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "d"]);
    }

    #[test]
    fn test_resolver_fallback_dedup_first_wins() {
        let entries = vec![entry("x", "P1"), entry("y", "P2"), entry("x", "P3")];
        let view = resolve_upcoming(Some("unknown"), &entries, 10);
        assert!(view.ok);
        assert!(!view.current_title_found);
        assert_eq!(view.source, Some(SOURCE_FALLBACK_TAIL));
        assert_eq!(view.upcoming.len(), 2);
        assert_eq!(view.upcoming[0].title, "x");
        assert_eq!(view.upcoming[0].playlist, "P1");
        assert_eq!(view.upcoming[1].title, "y");
    }

    #[test]
    fn test_resolver_empty_entries_fails() {
        let view = resolve_upcoming(Some("a"), &[], 10);
        assert!(!view.ok);
        assert_eq!(
            view.error.as_deref(),
            Some("no scheduler NEXT entries found")
        );
        assert!(view.upcoming.is_empty());
    }

    #[test]
    fn test_resolver_matches_across_title_forms() {
        // File-path form in the log, display form observed.
        let entries = vec![
            entry("vanzo_-_me_and_you.mp3", "morning"),
            entry("radio_jingle", "ids"),
        ];
        let view = resolve_upcoming(Some("Vanzo - Me And You"), &entries, 10);
        assert!(view.current_title_found);
        assert_eq!(view.upcoming.len(), 1);
        assert_eq!(view.upcoming[0].title, "radio_jingle");
    }

    #[test]
    fn test_resolver_limit_and_empty_titles() {
        let mut entries = vec![entry("", "p"), entry("   ", "p")];
        for i in 0..8 {
            entries.push(entry(&format!("t{}", i), "p"));
        }
        let view = resolve_upcoming(None, &entries, 3);
        assert_eq!(view.upcoming.len(), 3);
        let titles: Vec<_> = view.upcoming.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["t0", "t1", "t2"]);
    }

    #[test]
    fn test_resolver_fallback_window_is_bounded() {
        // 20 entries, limit 2 → fallback window is the last 12.
        let entries: Vec<_> = (0..20).map(|i| entry(&format!("t{}", i), "p")).collect();
        let view = resolve_upcoming(None, &entries, 2);
        assert_eq!(view.upcoming[0].title, "t8");
    }

    #[test]
    fn test_upcoming_from_tail_degrades_on_fetch_error() {
        let view = upcoming_from_tail(Err("docker error: no such container"), Some("a"), 10);
        assert!(!view.ok);
        assert!(view.upcoming.is_empty());
        assert_eq!(
            view.error.as_deref(),
            Some("docker error: no such container")
        );
    }

    #[test]
    fn test_promote_on_mismatch() {
        let upcoming = vec![track("New Song"), track("Third")];
        let p = promote(Some("Old Song"), &upcoming);
        assert!(p.promoted);
        assert_eq!(p.effective_now.unwrap().title, "New Song");
        assert_eq!(p.effective_upcoming.len(), 1);
        assert_eq!(p.effective_upcoming[0].title, "Third");
    }

    #[test]
    fn test_no_promote_on_match() {
        let upcoming = vec![track("new_song"), track("Third")];
        let p = promote(Some("New Song"), &upcoming);
        assert!(!p.promoted);
        assert!(p.effective_now.is_none());
        assert_eq!(p.effective_upcoming, upcoming);
    }

    #[test]
    fn test_promote_on_empty_observed() {
        let upcoming = vec![track("Anything")];
        for observed in [None, Some(""), Some("   ")] {
            let p = promote(observed, &upcoming);
            assert!(p.promoted, "observed {:?} must promote", observed);
            assert_eq!(p.effective_now.as_ref().unwrap().title, "Anything");
        }
    }

    #[test]
    fn test_no_promote_on_empty_upcoming() {
        let p = promote(Some("Something"), &[]);
        assert!(!p.promoted);
        assert!(p.effective_now.is_none());
        assert!(p.effective_upcoming.is_empty());
    }

    #[test]
    fn test_reconcile_now_scheduler_unavailable() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let snap = reconcile_now(
            Some("Observed Song"),
            Err("docker error: timeout"),
            Ok(""),
            now,
            10,
            12,
        );
        assert_eq!(snap.title_observed.as_deref(), Some("Observed Song"));
        assert_eq!(snap.title_effective.as_deref(), Some("Observed Song"));
        assert_eq!(snap.now_mode, NowMode::Observed);
        assert!(snap.predicted_next.is_none());
        assert!(snap.upcoming.is_empty());
    }

    #[test]
    fn test_reconcile_now_engine_log_fallback_for_observed() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let engine_tail = "preprocess: 1. first_track.mp3\npreprocess: 2. second_track.mp3\n";
        let snap = reconcile_now(None, Err("unavailable"), Ok(engine_tail), now, 10, 12);
        assert_eq!(snap.observed_source, Some(OBSERVED_ENGINE_LOGS));
        assert_eq!(snap.title_observed.as_deref(), Some("second track"));
    }
}
