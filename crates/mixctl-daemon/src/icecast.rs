//! Read-only Icecast status poller.
//!
//! Icecast's `status-json.xsl` is JSON despite the extension, and its shape
//! shifts with version and mount count: `icestats.source` may be absent, a
//! single object, or an array. Failures never surface as errors to the
//! caller; the snapshot carries `ok: false` and the dashboard renders a
//! placeholder.

use std::time::Duration;

use mixctl_core::config::IcecastConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Snapshot of currently-playing metadata for one mount.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MountStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub mount: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub listeners: Option<i64>,
    pub listener_peak: Option<i64>,
    pub bitrate: Option<i64>,
    pub server_name: Option<String>,
    pub genre: Option<String>,
}

impl MountStatus {
    fn failed(mount: &str, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            mount: mount.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct IcecastClient {
    client: reqwest::Client,
    config: IcecastConfig,
}

impl IcecastClient {
    pub fn new(config: IcecastConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(2500))
            .connect_timeout(Duration::from_millis(1500))
            .build()
            .expect("failed to build reqwest client for icecast");
        Self { client, config }
    }

    /// Best-effort now-playing snapshot for the configured mount.
    pub async fn now_playing(&self) -> MountStatus {
        let mount = self.config.mount_path();
        let url = self.config.status_url();

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return MountStatus::failed(&mount, format!("icecast unreachable: {}", e)),
        };
        if !response.status().is_success() {
            return MountStatus::failed(&mount, format!("icecast returned {}", response.status()));
        }
        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return MountStatus::failed(&mount, format!("icecast status not JSON: {}", e)),
        };

        let sources = iter_sources(&payload);
        let Some(source) = find_mount(&sources, &mount) else {
            let available: Vec<String> = sources.iter().copied().map(source_label).collect();
            debug!("[icecast] mount {} not in status (have: {:?})", mount, available);
            return MountStatus::failed(
                &mount,
                format!("mount not found in status (available: {})", available.join(", ")),
            );
        };

        // "title" is what most sources set (often "Artist - Track");
        // yp_currently_playing is the fallback some versions use.
        let title = source["title"]
            .as_str()
            .or_else(|| source["yp_currently_playing"].as_str())
            .map(|s| s.to_string());

        MountStatus {
            ok: true,
            error: None,
            mount,
            title,
            artist: source["artist"].as_str().map(|s| s.to_string()),
            listeners: source["listeners"].as_i64(),
            listener_peak: source["listener_peak"].as_i64(),
            bitrate: source["bitrate"].as_i64(),
            server_name: source["server_name"].as_str().map(|s| s.to_string()),
            genre: source["genre"].as_str().map(|s| s.to_string()),
        }
    }
}

/// `icestats.source` as a uniform list, whatever shape the server sent.
fn iter_sources(payload: &Value) -> Vec<&Value> {
    match &payload["icestats"]["source"] {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![&payload["icestats"]["source"]],
        _ => Vec::new(),
    }
}

/// Match by explicit `mount` field, else by `listenurl` suffix; which of
/// the two is present depends on Icecast version and config.
fn find_mount<'a>(sources: &[&'a Value], mount: &str) -> Option<&'a Value> {
    sources
        .iter()
        .find(|s| match s["mount"].as_str() {
            Some(m) => m == mount,
            None => s["listenurl"]
                .as_str()
                .map(|u| u.ends_with(mount))
                .unwrap_or(false),
        })
        .copied()
}

fn source_label(source: &Value) -> String {
    source["mount"]
        .as_str()
        .or_else(|| source["listenurl"].as_str())
        .unwrap_or("unknown")
        .to_string()
}
