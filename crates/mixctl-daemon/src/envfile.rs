//! The stack's `.env` file, the only durable state this dashboard touches.
//!
//! docker compose reads it as flat `KEY=VALUE` lines. Writes merge: updated
//! keys are rewritten in place, comments and unrelated lines are preserved
//! verbatim, and new keys are appended at the end. Changes only take effect
//! once the stack is recreated, which is the caller's problem (it raises
//! the need-restart flag).

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Current variables, sorted by key. A missing file is an error; the
    /// compose stack could not work without it either.
    pub async fn read(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading env file {}", self.path.display()))?;
        Ok(parse_env(&content))
    }

    /// Merge `updates` into the file. Returns the number of keys whose
    /// value actually changed (or was added).
    pub async fn write(&self, updates: &BTreeMap<String, String>) -> anyhow::Result<usize> {
        let content = tokio::fs::read_to_string(&self.path).await.unwrap_or_default();
        let (merged, changed) = merge_env(&content, updates);
        tokio::fs::write(&self.path, merged)
            .await
            .with_context(|| format!("writing env file {}", self.path.display()))?;
        Ok(changed)
    }
}

fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    vars
}

/// Rewrite `content` with `updates` applied; unknown lines pass through
/// untouched, new keys land at the end. Returns (new content, changed count).
fn merge_env(content: &str, updates: &BTreeMap<String, String>) -> (String, usize) {
    let mut remaining = updates.clone();
    let mut changed = 0;
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        let key = if trimmed.is_empty() || trimmed.starts_with('#') {
            None
        } else {
            trimmed.split_once('=').map(|(k, _)| k.trim().to_string())
        };

        match key.and_then(|k| remaining.remove_entry(&k)) {
            Some((k, v)) => {
                let old_value = trimmed.split_once('=').map(|(_, val)| val).unwrap_or("");
                if old_value != v {
                    changed += 1;
                }
                lines.push(format!("{}={}", k, v));
            }
            None => lines.push(line.to_string()),
        }
    }

    for (k, v) in remaining {
        lines.push(format!("{}={}", k, v));
        changed += 1;
    }

    let mut merged = lines.join("\n");
    if !merged.is_empty() {
        merged.push('\n');
    }
    (merged, changed)
}
