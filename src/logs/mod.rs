use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{PollSummary, SkippedUnit};
use crate::poll::PollLimits;

const MAX_ERROR_BYTES: usize = 16 * 1024;

#[derive(Debug, Serialize)]
struct PollLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    dry_run: bool,
    limits: PollLimits,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PollLogSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PollLogSummary {
    created: u64,
    updated: u64,
    failed: u64,
    artifacts: u64,
    artifacts_merged: u64,
    domains_available: u64,
    domains_scanned: u64,
    limit_reached: bool,
    message: String,
}

/// How a poll ended, as recorded in its run log.
#[derive(Debug, Clone, Copy)]
pub enum PollRunOutcome<'a> {
    Finished(&'a PollSummary),
    Failed(&'a anyhow::Error),
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/bhpoll/logs")
}

pub fn write_poll_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    limits: PollLimits,
    dry_run: bool,
    outcome: PollRunOutcome<'_>,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let path = dir.join(format!("poll-{pid}-{ts}.json"));

    let (status, summary, skipped, error) = match outcome {
        PollRunOutcome::Finished(s) => {
            let status = if s.is_partial() {
                "partial_error"
            } else {
                "ok"
            };
            let summary = PollLogSummary {
                created: s.created,
                updated: s.updated,
                failed: s.failed,
                artifacts: s.artifacts,
                artifacts_merged: s.artifacts_merged,
                domains_available: s.domains_available,
                domains_scanned: s.domains_scanned,
                limit_reached: s.limit_reached,
                message: s.message.clone(),
            };
            (status, Some(summary), s.skipped.clone(), None)
        }
        PollRunOutcome::Failed(err) => (
            "error",
            None,
            Vec::new(),
            Some(truncate_string(&format!("{err:#}"), MAX_ERROR_BYTES)),
        ),
    };

    let log = PollLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "poll",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        dry_run,
        limits,
        status,
        summary,
        skipped,
        error,
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

/// `~/...` form of a path under the home directory, for messages.
pub fn display_path(path: &Path, home_dir: &Path) -> String {
    let Ok(stripped) = path.strip_prefix(home_dir) else {
        return path.display().to_string();
    };
    let stripped = stripped.display().to_string();
    if stripped.is_empty() {
        "~".to_string()
    } else {
        format!("~/{stripped}")
    }
}

fn truncate_string(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}\n...(truncated, total={} bytes)", s.len())
}
