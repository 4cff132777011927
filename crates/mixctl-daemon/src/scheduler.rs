//! Proxy client for the scheduler's HTTP API.
//!
//! Scheduler builds vary in which routes they expose for the upcoming
//! queue, so this client probes tolerantly: `/next?n=N`, then `/nextN`,
//! then `/next1`. Responses are passed through as JSON envelopes; non-JSON
//! bodies are wrapped rather than rejected.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

#[derive(Clone)]
pub struct SchedulerClient {
    client: reqwest::Client,
    base_url: String,
}

impl SchedulerClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(2500))
            .connect_timeout(Duration::from_millis(1500))
            .build()
            .expect("failed to build reqwest client for scheduler");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Value {
        match self.try_get(&format!("{}/health", self.base_url)).await {
            Some(data) => json!({"ok": true, "data": data}),
            None => json!({"ok": false, "error": "scheduler health endpoint unreachable"}),
        }
    }

    /// Best-effort upcoming queue, probing the known route variants.
    pub async fn upcoming(&self, n: u32) -> Value {
        let candidates = [
            format!("/next?n={}", n),
            format!("/next{}", n),
            "/next1".to_string(),
        ];
        for path in &candidates {
            let url = format!("{}{}", self.base_url, path);
            if let Some(data) = self.try_get(&url).await {
                return json!({"ok": true, "source": path, "data": data});
            }
        }
        json!({
            "ok": false,
            "source": Value::Null,
            "error": "no upcoming endpoint found on scheduler",
        })
    }

    /// GET one URL; any failure (connect, HTTP >= 400) yields `None` so the
    /// caller can fall through to the next candidate route.
    async fn try_get(&self, url: &str) -> Option<Value> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("[scheduler] GET {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("[scheduler] GET {} returned {}", url, response.status());
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response.text().await.ok()?;

        if content_type.contains("application/json") {
            match serde_json::from_str(&body) {
                Ok(v) => Some(v),
                Err(_) => Some(json!({"raw_text": body})),
            }
        } else {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                Some(json!({}))
            } else {
                Some(json!({"raw_text": trimmed}))
            }
        }
    }
}
