use anyhow::Error;
use serde_json::Value;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::asset::AssetInformation;
use crate::core::{PollSummary, SkippedUnit};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stderr_is_tty: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 有効な設定は `bhpoll config --show` で確認できます"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Partial,
    Missing,
}

fn format_status(status: Status, color: bool) -> String {
    let s = match status {
        Status::Ok => "OK",
        Status::Partial => "一部失敗",
        Status::Missing => "なし",
    };
    if !color {
        return s.to_string();
    }
    let code = match status {
        Status::Ok => "32",
        Status::Partial => "33",
        Status::Missing => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

pub fn print_connectivity(version: &Value, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "接続テスト: {}", format_status(Status::Ok, cfg.color));
    if let Some(server) = version
        .pointer("/data/server_version")
        .and_then(Value::as_str)
    {
        let _ = writeln!(out, "サーバーバージョン: {server}");
    }
}

pub fn print_poll_summary(summary: &PollSummary, log_hint: Option<&str>, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let status = if summary.is_partial() {
        Status::Partial
    } else {
        Status::Ok
    };

    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", summary.message);
    let _ = writeln!(
        out,
        "状態: {}  作成={}  更新={}  失敗={}  アーティファクト={}（更新分 {}）",
        format_status(status, cfg.color),
        summary.created,
        summary.updated,
        summary.failed,
        summary.artifacts,
        summary.artifacts_merged
    );
    let _ = writeln!(
        out,
        "ドメイン: {}/{} 件を走査",
        summary.domains_scanned, summary.domains_available
    );
    if summary.limit_reached {
        let _ = writeln!(out, "上限に達したため途中で終了しました");
    }

    if !summary.skipped.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "スキップ（{}件）:", summary.skipped.len());
        print_skipped_table(&mut out, &summary.skipped, cfg.verbose);
    }

    if let Some(log_hint) = log_hint {
        let _ = writeln!(out, "ログ: {log_hint}");
    }
}

fn print_skipped_table(out: &mut dyn Write, skipped: &[SkippedUnit], verbose: bool) {
    let label_domain = "ドメイン";
    let label_type = "種別";
    let label_error = "エラー";

    let domain_w = skipped
        .iter()
        .map(|s| visible_width(&s.domain_name))
        .max()
        .unwrap_or(0)
        .max(visible_width(label_domain));
    let type_w = skipped
        .iter()
        .map(|s| visible_width(s.finding_type.as_deref().unwrap_or("-")))
        .max()
        .unwrap_or(0)
        .max(visible_width(label_type));

    let _ = writeln!(
        out,
        "{}  {}  {}",
        pad_end_display(label_domain, domain_w),
        pad_end_display(label_type, type_w),
        label_error
    );
    let _ = writeln!(
        out,
        "{}  {}  {}",
        "-".repeat(domain_w),
        "-".repeat(type_w),
        "-".repeat(visible_width(label_error))
    );
    for unit in skipped {
        let error = if verbose {
            unit.error.clone()
        } else {
            truncate_end(first_line(&unit.error), 80)
        };
        let _ = writeln!(
            out,
            "{}  {}  {}",
            pad_end_display(&unit.domain_name, domain_w),
            pad_end_display(unit.finding_type.as_deref().unwrap_or("-"), type_w),
            error
        );
    }
}

pub fn print_asset(object_id: &str, info: Option<&AssetInformation>, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let Some(info) = info else {
        let _ = writeln!(
            out,
            "オブジェクト {object_id}: {}",
            format_status(Status::Missing, cfg.color)
        );
        return;
    };
    let _ = writeln!(out, "オブジェクト {}（{}）", info.object_id, info.kind);
    let pretty = serde_json::to_string_pretty(&info.response).unwrap_or_default();
    let _ = writeln!(out, "{pretty}");
    for note in &info.notes {
        let _ = writeln!(out, "- {note}");
    }
}

pub fn print_path_exists(start_node: &str, end_node: &str, exists: bool, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let status = if exists { Status::Ok } else { Status::Missing };
    let _ = writeln!(
        io::stdout().lock(),
        "{start_node} -> {end_node}: 経路 {}",
        format_status(status, cfg.color)
    );
}

pub fn print_object_id(name: &str, object_id: Option<&str>, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    match object_id {
        Some(id) => {
            let _ = writeln!(out, "{id}");
        }
        None => {
            let _ = writeln!(
                out,
                "{name}: {}",
                format_status(Status::Missing, cfg.color)
            );
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn truncate_end(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{head}...")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn visible_width(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
