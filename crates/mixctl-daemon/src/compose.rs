//! docker compose subprocess control for the stack lifecycle.
//!
//! The mutating dashboard actions all funnel through here: `up`, `down`,
//! recreate, and purging a cached engine image. Each run captures the full
//! stdout/stderr for the operator. No retries, no interpretation; the raw
//! transcript is the product.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

/// Compose operations can pull images; give them room before declaring a
/// hang. Image removal is local and quick.
const COMPOSE_TIMEOUT: Duration = Duration::from_secs(180);
const IMAGE_RM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackOp {
    Up,
    Down,
    Recreate,
}

impl StackOp {
    fn compose_args(&self) -> &'static [&'static str] {
        match self {
            StackOp::Up => &["up", "-d"],
            StackOp::Down => &["down"],
            StackOp::Recreate => &["up", "-d", "--force-recreate"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StackOp::Up => "stack up",
            StackOp::Down => "stack down",
            StackOp::Recreate => "stack recreate",
        }
    }
}

/// Record of one subprocess run, JSON-able and renderable as plain text.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeRun {
    pub ok: bool,
    pub command: String,
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl ComposeRun {
    /// Operator-facing plain-text transcript.
    pub fn transcript(&self, title: &str) -> String {
        let exit = self
            .return_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "killed".to_string());
        let mut out = format!(
            "== {} ==\n$ {}\nexit: {} ({} ms)\n",
            title, self.command, exit, self.duration_ms
        );
        if !self.stdout.trim().is_empty() {
            out.push_str("\n--- stdout ---\n");
            out.push_str(self.stdout.trim_end());
            out.push('\n');
        }
        if !self.stderr.trim().is_empty() {
            out.push_str("\n--- stderr ---\n");
            out.push_str(self.stderr.trim_end());
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ComposeRunner {
    compose_file: PathBuf,
    env_file: PathBuf,
}

impl ComposeRunner {
    pub fn new(compose_file: PathBuf, env_file: PathBuf) -> Self {
        Self {
            compose_file,
            env_file,
        }
    }

    /// Run one stack operation to completion, capturing everything.
    pub async fn run(&self, op: StackOp) -> ComposeRun {
        let mut args: Vec<String> = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.display().to_string(),
            "--env-file".to_string(),
            self.env_file.display().to_string(),
        ];
        args.extend(op.compose_args().iter().map(|s| s.to_string()));
        info!("[compose] {}", op.label());
        run_docker(&args, COMPOSE_TIMEOUT).await
    }

    /// Remove a cached image by full reference (`repo:tag`), so the next
    /// `up` pulls it fresh.
    pub async fn remove_image(&self, image_ref: &str) -> ComposeRun {
        let args = vec![
            "image".to_string(),
            "rm".to_string(),
            image_ref.to_string(),
        ];
        info!("[compose] purge image {}", image_ref);
        run_docker(&args, IMAGE_RM_TIMEOUT).await
    }
}

async fn run_docker(args: &[String], timeout: Duration) -> ComposeRun {
    let command = format!("docker {}", args.join(" "));
    let started_at = Utc::now();

    let child = Command::new("docker")
        .args(args)
        .kill_on_drop(true)
        .output();

    let (ok, return_code, stdout, stderr) = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => (
            output.status.success(),
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ),
        Ok(Err(e)) => {
            warn!("[compose] spawn failed: {}", e);
            (false, None, String::new(), format!("spawn failed: {}", e))
        }
        Err(_) => {
            warn!("[compose] `{}` timed out after {:?}", command, timeout);
            (
                false,
                None,
                String::new(),
                format!("timed out after {} s", timeout.as_secs()),
            )
        }
    };

    let ended_at = Utc::now();
    ComposeRun {
        ok,
        command,
        return_code,
        stdout,
        stderr,
        started_at,
        ended_at,
        duration_ms: (ended_at - started_at).num_milliseconds(),
    }
}
