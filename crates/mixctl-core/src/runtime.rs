//! Container runtime summary for the dashboard header.
//!
//! The container-status collaborator hands over raw per-container facts;
//! this module folds them into the per-role summary the UI renders. No
//! retries here, and a lookup failure for one role must never hide the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw facts about one container, as reported by the runtime collaborator.
/// Timestamps stay RFC 3339 strings until summarized; Docker emits them with
/// nanosecond precision and we only ever need whole seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerFacts {
    pub image: String,
    pub status: String,
    pub health: Option<String>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
}

/// Summary for one stack role (engine or scheduler).
#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
    pub present: bool,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSummary {
    pub engine: RoleStatus,
    pub scheduler: RoleStatus,
}

/// Seconds elapsed from an RFC 3339 timestamp to `now`; `None` when the
/// source string is absent or unparsable.
fn seconds_since(now: DateTime<Utc>, timestamp: Option<&str>) -> Option<i64> {
    let raw = timestamp?;
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    Some((now - parsed.with_timezone(&Utc)).num_seconds())
}

fn role_status(now: DateTime<Utc>, name: &str, facts: Option<&ContainerFacts>) -> RoleStatus {
    let Some(facts) = facts else {
        return RoleStatus {
            present: false,
            name: name.to_string(),
            status: "missing".to_string(),
            image: None,
            health: None,
            age_seconds: None,
            uptime_seconds: None,
        };
    };

    RoleStatus {
        present: true,
        name: name.to_string(),
        status: facts.status.clone(),
        image: Some(facts.image.clone()),
        health: facts.health.clone(),
        age_seconds: seconds_since(now, facts.created_at.as_deref()),
        uptime_seconds: seconds_since(now, facts.started_at.as_deref()),
    }
}

/// Fold both roles' container facts into the runtime summary.
pub fn summarize(
    now: DateTime<Utc>,
    engine: (&str, Option<&ContainerFacts>),
    scheduler: (&str, Option<&ContainerFacts>),
) -> RuntimeSummary {
    RuntimeSummary {
        engine: role_status(now, engine.0, engine.1),
        scheduler: role_status(now, scheduler.0, scheduler.1),
    }
}
