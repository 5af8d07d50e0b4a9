//! 로그/에러 내보내기 파일 생성.

use chrono::{DateTime, Local, Utc};
use linkwatch_core::models::chat::Document;
use linkwatch_core::models::incident::PendingStatus;
use linkwatch_core::models::log::{LogEntry, LogType};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::status_store::StatusSnapshot;

fn full_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn file_stamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string()
}

/// 로그 내보내기 본문
pub fn logs_export(title: &str, logs: &[LogEntry], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title} - Logs Export");
    let _ = writeln!(out, "# Generated: {}", full_time(now));
    let _ = writeln!(out, "# Total logs: {}\n", logs.len());

    let mut counts: BTreeMap<LogType, usize> = BTreeMap::new();
    for entry in logs {
        *counts.entry(entry.log_type).or_default() += 1;
    }
    out.push_str("## Log Summary\n");
    for (log_type, count) in &counts {
        let _ = writeln!(out, "- {log_type}: {count} entries");
    }
    out.push('\n');

    out.push_str("## All Logs (Chronological)\n\n");
    for entry in logs {
        let _ = writeln!(
            out,
            "[{}] {} - {}: {}",
            entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            entry.log_type,
            entry.source,
            entry.message
        );
    }
    out
}

/// 에러 내보내기 본문
pub fn errors_export(title: &str, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title} - Errors Export");
    let _ = writeln!(out, "# Generated: {}", full_time(now));
    let _ = writeln!(out, "# Recent errors: {}", snapshot.confirmed.len());
    let _ = writeln!(out, "# Pending history: {}", snapshot.history.len());
    let _ = writeln!(out, "# Current pending: {}\n", snapshot.pending.len());

    if !snapshot.confirmed.is_empty() {
        let _ = writeln!(
            out,
            "## Recent Confirmed Errors ({})\n",
            snapshot.confirmed.len()
        );
        for error in &snapshot.confirmed {
            let _ = writeln!(
                out,
                "[{}] ERROR - {}: {}",
                full_time(error.timestamp),
                error.source,
                error.message
            );
        }
        out.push('\n');
    }

    if !snapshot.history.is_empty() {
        let _ = writeln!(
            out,
            "## Connection Issues History ({})\n",
            snapshot.history.len()
        );
        for entry in &snapshot.history {
            let status = match entry.status {
                PendingStatus::Pending => "PENDING",
                PendingStatus::Resolved => "RESOLVED",
                PendingStatus::Confirmed => "CONFIRMED",
            };
            let _ = write!(
                out,
                "[{}] {status} - {}: {}",
                full_time(entry.timestamp),
                entry.source,
                entry.message
            );
            if let (PendingStatus::Resolved, Some(latency)) = (entry.status, entry.resolution) {
                let _ = write!(out, " (recovered in {:.1}s)", latency.as_secs_f64());
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !snapshot.pending.is_empty() {
        let _ = writeln!(
            out,
            "## Current Pending Errors ({})\n",
            snapshot.pending.len()
        );
        for pending in &snapshot.pending {
            let _ = writeln!(
                out,
                "[{}] PENDING - {}: {}",
                full_time(pending.first_seen),
                pending.source,
                pending.message
            );
        }
        out.push('\n');
    }

    out.push_str("## Error Statistics\n\n### Errors by Source\n");
    let mut by_source: HashMap<&str, usize> = HashMap::new();
    for error in &snapshot.confirmed {
        *by_source.entry(error.source.as_str()).or_default() += 1;
    }
    for entry in &snapshot.history {
        *by_source.entry(entry.source.as_str()).or_default() += 1;
    }
    let mut sources: Vec<_> = by_source.into_iter().collect();
    sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (source, count) in sources {
        let _ = writeln!(out, "- {source}: {count} errors");
    }
    out
}

/// 로그 내보내기 첨부 파일
pub fn logs_document(title: &str, logs: &[LogEntry], now: DateTime<Utc>) -> Document {
    Document {
        file_name: format!("linkwatch_logs_{}.txt", file_stamp(now)),
        content: logs_export(title, logs, now).into_bytes(),
        caption: Some(format!(
            "📋 Monitoring Logs Export\n\nGenerated: {}\nTotal logs: {}",
            full_time(now),
            logs.len()
        )),
    }
}

/// 에러 내보내기 첨부 파일
pub fn errors_document(title: &str, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Document {
    Document {
        file_name: format!("linkwatch_errors_{}.txt", file_stamp(now)),
        content: errors_export(title, snapshot, now).into_bytes(),
        caption: Some(format!(
            "🚨 Errors Export\n\nGenerated: {}\nRecent errors: {}\nPending history: {}",
            full_time(now),
            snapshot.confirmed.len(),
            snapshot.history.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwatch_core::models::incident::{
        ConfirmedError, ConfirmedErrorKind, PendingError, PendingHistoryEntry,
    };
    use std::time::Duration;

    fn log(log_type: LogType, source: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            log_type,
            source: source.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn logs_export_lists_summary_and_entries() {
        let logs = vec![
            log(LogType::Connecting, "Price", "Connecting to wss://x"),
            log(LogType::Success, "Price", "Connected successfully"),
            log(LogType::Message, "Price", "Received: tick"),
        ];
        let text = logs_export("Feed Monitor", &logs, Utc::now());

        assert!(text.starts_with("# Feed Monitor - Logs Export\n"));
        assert!(text.contains("# Total logs: 3"));
        assert!(text.contains("- SUCCESS: 1 entries"));
        let first = text.find("CONNECTING - Price: Connecting").unwrap();
        let last = text.find("MESSAGE - Price: Received: tick").unwrap();
        assert!(first < last);
    }

    #[test]
    fn errors_export_sections_and_stats() {
        let now = Utc::now();
        let history = |source: &str, status, resolution| PendingHistoryEntry {
            timestamp: now,
            source: source.to_string(),
            message: "Connection reset".to_string(),
            status,
            resolution,
        };
        let snapshot = StatusSnapshot {
            streams: vec![],
            apis: vec![],
            total_messages: 0,
            total_api_calls: 0,
            started_at: now,
            confirmed: vec![ConfirmedError {
                timestamp: now,
                source: "WebSocket Feed".to_string(),
                message: "invalid token".to_string(),
                kind: ConfirmedErrorKind::Immediate,
            }],
            pending: vec![PendingError {
                source: "WebSocket Price".to_string(),
                message: "Connection closed".to_string(),
                first_seen: now,
            }],
            history: vec![
                history(
                    "WebSocket Feed",
                    PendingStatus::Resolved,
                    Some(Duration::from_millis(5_000)),
                ),
                history("WebSocket Feed", PendingStatus::Confirmed, None),
                history("WebSocket Price", PendingStatus::Pending, None),
            ],
        };

        let text = errors_export("Feed Monitor", &snapshot, now);
        assert!(text.contains("# Current pending: 1"));
        assert!(text.contains("ERROR - WebSocket Feed: invalid token"));
        assert!(text.contains("RESOLVED - WebSocket Feed: Connection reset (recovered in 5.0s)"));
        assert!(text.contains("CONFIRMED - WebSocket Feed: Connection reset\n"));
        assert!(text.contains("PENDING - WebSocket Price: Connection closed"));

        let feed = text.find("- WebSocket Feed: 3 errors").unwrap();
        let price = text.find("- WebSocket Price: 1 errors").unwrap();
        assert!(feed < price);
    }

    #[test]
    fn document_names_carry_timestamp() {
        let doc = logs_document("Feed Monitor", &[], Utc::now());
        assert!(doc.file_name.starts_with("linkwatch_logs_"));
        assert!(doc.file_name.ends_with(".txt"));
        assert!(doc.caption.unwrap().contains("Total logs: 0"));
    }
}
