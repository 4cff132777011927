//! End-to-end reconciliation over raw log text, the way the daemon drives it:
//! scheduler tail → NEXT entries → resolver → promoter → snapshot.

use chrono::NaiveDateTime;
use mixctl_core::logscan::{self, LOG_TIMESTAMP_FORMAT};
use mixctl_core::reconcile::{
    self, NowMode, SOURCE_AFTER_CURRENT,
};

const SCHEDULER_TAIL: &str = r#"2024-05-01 12:00:01,000 INFO mixd.scheduler: NEXT | title="vanzo_-_me_and_you" | playlist="morning_mix"
2024-05-01 12:03:30,500 INFO mixd.scheduler: NEXT | title="radio_jingle" | playlist="station_ids"
2024-05-01 12:04:02,250 INFO mixd.scheduler: NEXT | title="artist_-_track2" | playlist="morning_mix"
"#;

const ENGINE_TAIL: &str = r#"2024-05-01 11:59:58,000 INFO mixd.engine: preprocess: 1. /music/vanzo_-_me_and_you.mp3
2024-05-01 12:03:29,000 INFO mixd.engine: preprocess: 2. /music/radio_jingle.mp3
2024-05-01 12:03:31,000 INFO mixd.engine: BUS STREAM_START src=playbin uri=file:///cache/radio_jingle.wav
"#;

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, LOG_TIMESTAMP_FORMAT).unwrap()
}

#[test]
fn upcoming_after_current_display_title() {
    let entries = logscan::scan_next_entries(SCHEDULER_TAIL);
    assert_eq!(entries.len(), 3);

    let view = reconcile::resolve_upcoming(Some("Vanzo - Me And You"), &entries, 10);
    assert!(view.ok);
    assert!(view.current_title_found);
    assert_eq!(view.source, Some(SOURCE_AFTER_CURRENT));

    let titles: Vec<_> = view.upcoming.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["radio_jingle", "artist_-_track2"]);
    assert_eq!(view.upcoming[0].playlist, "station_ids");
    assert_eq!(
        view.upcoming[0].timestamp,
        Some(at("2024-05-01 12:03:30,500"))
    );
}

#[test]
fn stale_icecast_title_is_promoted() {
    // Icecast still reports the previous track; the scheduler has already
    // announced the jingle, and the engine logged a stream start seconds ago.
    let now = at("2024-05-01 12:03:35,000");
    let snap = reconcile::reconcile_now(
        Some("Vanzo - Me And You"),
        Ok(SCHEDULER_TAIL),
        Ok(ENGINE_TAIL),
        now,
        10,
        12,
    );

    assert_eq!(snap.observed_source, Some(reconcile::OBSERVED_ICECAST));
    assert_eq!(snap.title_observed.as_deref(), Some("Vanzo - Me And You"));
    assert_eq!(snap.playlist_observed.as_deref(), Some("morning_mix"));

    assert_eq!(snap.now_mode, NowMode::PromotedFromUpcoming);
    assert_eq!(snap.title_effective.as_deref(), Some("radio_jingle"));
    assert_eq!(snap.playlist_effective.as_deref(), Some("station_ids"));
    assert_eq!(
        snap.predicted_next.as_ref().map(|t| t.title.as_str()),
        Some("artist_-_track2")
    );
    assert_eq!(snap.upcoming.len(), 1);

    let hint = &snap.stream_start_hint;
    assert_eq!(hint.age_seconds, Some(4));
    assert!(hint.is_recent);
}

#[test]
fn matching_observed_title_stays_observed() {
    // Anchor on the last NEXT entry: nothing upcoming, nothing to promote.
    let now = at("2024-05-01 12:05:00,000");
    let snap = reconcile::reconcile_now(
        Some("Artist - Track2"),
        Ok(SCHEDULER_TAIL),
        Ok(ENGINE_TAIL),
        now,
        10,
        12,
    );

    assert_eq!(snap.now_mode, NowMode::Observed);
    assert_eq!(snap.title_effective.as_deref(), Some("Artist - Track2"));
    assert_eq!(snap.playlist_effective.as_deref(), Some("morning_mix"));
    assert!(snap.current_title_found);
    assert!(snap.predicted_next.is_none());
    assert!(snap.upcoming.is_empty());
    // The stream-start marker is long past by now.
    assert!(!snap.stream_start_hint.is_recent);
}

#[test]
fn both_tails_failing_yield_empty_snapshot() {
    let now = at("2024-05-01 12:00:00,000");
    let snap = reconcile::reconcile_now(
        None,
        Err("docker error: engine down"),
        Err("docker error: engine down"),
        now,
        10,
        12,
    );

    assert!(snap.title_observed.is_none());
    assert!(snap.title_effective.is_none());
    assert_eq!(snap.now_mode, NowMode::Observed);
    assert!(snap.upcoming.is_empty());
    assert!(snap.predicted_next.is_none());
    assert_eq!(snap.stream_start_hint, Default::default());
}

#[test]
fn snapshot_serializes_with_snake_case_mode() {
    let now = at("2024-05-01 12:03:35,000");
    let snap = reconcile::reconcile_now(
        Some("Vanzo - Me And You"),
        Ok(SCHEDULER_TAIL),
        Ok(ENGINE_TAIL),
        now,
        10,
        12,
    );
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["now_mode"], "promoted_from_upcoming");
    assert_eq!(json["title_effective"], "radio_jingle");
    assert_eq!(json["stream_start_hint"]["is_recent"], true);
}
