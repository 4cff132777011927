//! Read-only wrapper around the `docker` CLI.
//!
//! The daemon only ever introspects the stack's containers: status, health
//! and log tails. Mutations go through docker compose (see `compose`). Every
//! invocation is time-bounded; a hung Docker daemon degrades a dashboard
//! request, it must not wedge it.

use std::time::Duration;

use mixctl_core::runtime::ContainerFacts;
use tokio::process::Command;
use tracing::{debug, warn};

const DOCKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure talking to the Docker daemon. The dashboard only ever renders
/// the message; the variants exist so callers can log them apart.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker error: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("docker error: `docker {0}` timed out")]
    Timeout(String),
    #[error("docker error: {context}: {detail}")]
    Failed { context: String, detail: String },
}

#[derive(Debug, Clone, Default)]
pub struct DockerCli;

/// Captured output of one docker invocation.
struct DockerOutput {
    status_ok: bool,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<DockerOutput, DockerError> {
        let child = Command::new("docker")
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(DOCKER_TIMEOUT, child).await {
            Ok(result) => result?,
            Err(_) => return Err(DockerError::Timeout(args.join(" "))),
        };

        Ok(DockerOutput {
            status_ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Is the Docker daemon reachable at all?
    pub async fn ping(&self) -> bool {
        match self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(out) => out.status_ok,
            Err(e) => {
                debug!("[docker] ping failed: {}", e);
                false
            }
        }
    }

    /// Facts about one container; `None` when it does not exist or the
    /// daemon is unreachable (the two are indistinguishable to the operator
    /// and both render as "missing").
    pub async fn inspect(&self, name: &str) -> Option<ContainerFacts> {
        let out = match self
            .run(&["inspect", "--type", "container", "--format", "{{json .}}", name])
            .await
        {
            Ok(out) => out,
            Err(e) => {
                warn!("[docker] inspect {} failed: {}", name, e);
                return None;
            }
        };
        if !out.status_ok {
            debug!("[docker] inspect {}: {}", name, out.stderr.trim());
            return None;
        }

        match serde_json::from_str(out.stdout.trim()) {
            Ok(doc) => Some(facts_from_inspect_json(&doc)),
            Err(e) => {
                warn!("[docker] inspect {}: bad JSON: {}", name, e);
                None
            }
        }
    }

    /// Last `tail` lines of a container's combined output, oldest first.
    /// Failures come back as an error value, never a panic; the
    /// reconciliation core turns them into an `ok: false` view.
    pub async fn log_tail(&self, name: &str, tail: u32) -> Result<String, DockerError> {
        let tail_arg = tail.to_string();
        let out = self.run(&["logs", "--tail", &tail_arg, name]).await?;
        if !out.status_ok {
            return Err(DockerError::Failed {
                context: format!("logs {}", name),
                detail: out.stderr.trim().to_string(),
            });
        }
        // Services log to stderr (stdlib logging) or stdout; docker keeps the
        // streams separate, so re-join them with stdout first.
        let mut combined = out.stdout;
        combined.push_str(&out.stderr);
        Ok(combined)
    }
}

/// Pull container facts out of a `docker inspect` JSON document.
fn facts_from_inspect_json(doc: &serde_json::Value) -> ContainerFacts {
    let state = &doc["State"];
    ContainerFacts {
        image: doc["Config"]["Image"].as_str().unwrap_or("").to_string(),
        status: state["Status"].as_str().unwrap_or("unknown").to_string(),
        health: state["Health"]["Status"].as_str().map(|s| s.to_string()),
        created_at: doc["Created"].as_str().map(|s| s.to_string()),
        started_at: state["StartedAt"].as_str().map(|s| s.to_string()),
    }
}
