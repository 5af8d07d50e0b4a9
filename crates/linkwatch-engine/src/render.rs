//! 화면 렌더링.
//!
//! 상태 스냅샷 → 채팅 메시지 (본문 + 인라인 키보드).
//! 대시보드는 현재 시각을 포함하지 않으므로 상태가 같으면 결과도 같다.
//! 전달 중복 제거는 [`fingerprint`]로 비교한다.

use chrono::{DateTime, Local, Utc};
use linkwatch_core::config::{AppConfig, EmojiConfig};
use linkwatch_core::models::chat::{Button, CallbackAction, Keyboard, OutgoingMessage, ParseMode};
use linkwatch_core::models::endpoint::{EndpointState, EndpointStatus};
use linkwatch_core::models::incident::{PendingHistoryEntry, PendingStatus};
use linkwatch_core::models::log::{LogEntry, LogType};
use linkwatch_core::models::session::{ChatTarget, SessionView};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::sessions::Session;
use crate::status_store::StatusSnapshot;

/// 잘린 메시지 끝에 붙는 표시
const TRUNCATED_MARKER: &str = "\n… (truncated)";

/// 로그 화면에 보여줄 최근 항목 수
const LOG_VIEW_ENTRIES: usize = 20;

/// 에러 필터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFilter {
    Api,
    WebSocket,
}

impl ErrorFilter {
    fn matches(&self, source: &str) -> bool {
        match self {
            ErrorFilter::Api => source.contains("API"),
            ErrorFilter::WebSocket => source.contains("WebSocket"),
        }
    }
}

/// 렌더링 설정
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub title: String,
    pub emoji: EmojiConfig,
    pub update_interval_secs: u64,
    pub max_len: usize,
    pub grace_period_secs: u64,
    /// 도움말/환영 화면에 표시할 감시 대상
    pub stream_names: Vec<String>,
    pub api_paths: Vec<String>,
}

impl RenderContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            title: config.bot.title.clone(),
            emoji: config.emoji.clone(),
            update_interval_secs: config.bot.update_interval_secs,
            max_len: config.bot.max_message_length,
            grace_period_secs: config.incidents.grace_period_secs,
            stream_names: config.enabled_streams().map(|s| s.name.clone()).collect(),
            api_paths: config.api.endpoints.clone(),
        }
    }
}

/// 렌더링 결과 지문 (서식 + 본문 + 키보드)
pub fn fingerprint(message: &OutgoingMessage) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(message.parse_mode.as_api_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.text.as_bytes());
    for row in &message.keyboard {
        hasher.update([0u8]);
        for button in row {
            hasher.update(button.label.as_bytes());
            hasher.update(button.action.as_data().as_bytes());
        }
    }
    hasher.finalize().to_vec()
}

/// legacy Markdown 특수문자 이스케이프
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 코드 구간(`` `...` ``) 안에 넣을 텍스트. 백틱만 치환한다
fn code(text: &str) -> String {
    text.replace('`', "'")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 문자 수 제한. 넘치면 마지막 줄바꿈에서 자르고 표시를 붙인다
pub fn fit_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(TRUNCATED_MARKER.chars().count());
    let head: String = text.chars().take(budget).collect();
    let cut = match head.rfind('\n') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head.as_str(),
    };
    format!("{cut}{TRUNCATED_MARKER}")
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn clock(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M:%S").to_string()
}

// ============================================================
// 키보드
// ============================================================

/// 메인 키보드 (세션 유무에 따라)
pub fn main_keyboard(has_session: bool) -> Keyboard {
    if has_session {
        vec![
            vec![
                Button::new("🔄 Refresh Status", CallbackAction::Refresh),
                Button::new("🚨 All Errors", CallbackAction::AllErrors),
            ],
            vec![
                Button::new("📋 Logs", CallbackAction::Logs),
                Button::new("🧹 Clear Errors", CallbackAction::Clear),
            ],
            vec![
                Button::new("📥 Download Logs", CallbackAction::DownloadLogs),
                Button::new("📥 Download Errors", CallbackAction::DownloadErrors),
            ],
            vec![Button::new("❓ Help", CallbackAction::Help)],
        ]
    } else {
        vec![vec![
            Button::new("▶️ Start Monitoring", CallbackAction::Start),
            Button::new("❓ Help", CallbackAction::Help),
        ]]
    }
}

pub fn errors_keyboard() -> Keyboard {
    vec![
        vec![
            Button::new("🌐 API Errors", CallbackAction::ApiErrors),
            Button::new("📡 WS Errors", CallbackAction::WsErrors),
        ],
        vec![
            Button::new("📥 Download All Errors", CallbackAction::DownloadErrors),
            Button::new("🔙 Back", CallbackAction::Back),
        ],
    ]
}

fn filtered_keyboard(filter: ErrorFilter) -> Keyboard {
    let other = match filter {
        ErrorFilter::Api => Button::new("📡 WS Errors", CallbackAction::WsErrors),
        ErrorFilter::WebSocket => Button::new("🌐 API Errors", CallbackAction::ApiErrors),
    };
    vec![
        vec![other, Button::new("🚨 All Errors", CallbackAction::AllErrors)],
        vec![Button::new("🔙 Back", CallbackAction::Back)],
    ]
}

fn logs_keyboard() -> Keyboard {
    vec![vec![
        Button::new("📥 Download Logs", CallbackAction::DownloadLogs),
        Button::new("🔙 Back", CallbackAction::Back),
    ]]
}

fn back_keyboard() -> Keyboard {
    vec![vec![Button::new("🔙 Back", CallbackAction::Back)]]
}

// ============================================================
// 화면
// ============================================================

/// 화면 렌더러
#[derive(Debug, Clone)]
pub struct Renderer {
    ctx: RenderContext,
}

impl Renderer {
    pub fn new(ctx: RenderContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    fn finish(&self, text: String, parse_mode: ParseMode, keyboard: Keyboard) -> OutgoingMessage {
        OutgoingMessage {
            text: fit_length(&text, self.ctx.max_len),
            parse_mode,
            keyboard,
        }
    }

    fn state_emoji(&self, state: EndpointState) -> &str {
        let e = &self.ctx.emoji;
        match state {
            EndpointState::Connected => &e.connected,
            EndpointState::Active => &e.active,
            EndpointState::Success => &e.success,
            EndpointState::Error => &e.error,
            EndpointState::Disconnected => &e.disconnected,
            EndpointState::Waiting => &e.waiting,
            EndpointState::Connecting => &e.warning,
        }
    }

    /// 세션의 현재 화면
    pub fn view(
        &self,
        view: SessionView,
        snapshot: &StatusSnapshot,
        logs: &[LogEntry],
        target: &ChatTarget,
        session: &Session,
        active_sessions: usize,
    ) -> OutgoingMessage {
        match view {
            SessionView::Dashboard => self.dashboard(snapshot, target, session, active_sessions),
            SessionView::Logs => self.logs(logs),
            SessionView::AllErrors => self.all_errors(snapshot),
            SessionView::ApiErrors => self.filtered_errors(snapshot, ErrorFilter::Api),
            SessionView::WsErrors => self.filtered_errors(snapshot, ErrorFilter::WebSocket),
            SessionView::Help => self.help(),
        }
    }

    /// 대시보드
    pub fn dashboard(
        &self,
        snapshot: &StatusSnapshot,
        target: &ChatTarget,
        session: &Session,
        active_sessions: usize,
    ) -> OutgoingMessage {
        let e = &self.ctx.emoji;
        let mut text = String::new();

        let _ = writeln!(text, "{} *{}*", e.robot, escape_markdown(&self.ctx.title));
        let _ = writeln!(
            text,
            "{} Started: {}",
            e.time,
            snapshot
                .started_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(text, "👤 Chat ID: `{target}`");
        if session.restored {
            text.push_str("🔄 Session restored after bot restart\n");
        }
        text.push('\n');

        let _ = writeln!(text, "{} *WebSocket Connections:*", e.websocket);
        for stream in &snapshot.streams {
            self.write_stream(&mut text, stream);
        }

        let _ = writeln!(text, "{} *API Endpoints:*", e.api);
        for api in &snapshot.apis {
            self.write_api(&mut text, api);
        }

        text.push_str("📊 *Statistics:*\n");
        let _ = writeln!(text, "📨 Total Messages: {}", snapshot.total_messages);
        let _ = writeln!(text, "🌐 Total API Calls: {}", snapshot.total_api_calls);
        let _ = writeln!(text, "👥 Active Users: {active_sessions}");
        let _ = writeln!(text, "🔄 Auto-refresh: {}s\n", self.ctx.update_interval_secs);

        if !snapshot.confirmed.is_empty() {
            let _ = writeln!(
                text,
                "🔴 *Recent Errors (Last {}):*",
                snapshot.confirmed.len()
            );
            for error in &snapshot.confirmed {
                let _ = writeln!(
                    text,
                    "`{}` {}: {}",
                    clock(error.timestamp),
                    escape_markdown(&error.source),
                    escape_markdown(&error.message)
                );
            }
            text.push('\n');
        }

        if !snapshot.pending.is_empty() {
            text.push_str("⏳ *Pending Issues (recovering...):*\n");
            for pending in &snapshot.pending {
                let _ = writeln!(
                    text,
                    "`{}` {}: {}",
                    clock(pending.first_seen),
                    escape_markdown(&pending.source),
                    escape_markdown(&pending.message)
                );
            }
            text.push('\n');
        }

        text.push_str("💡 *Use buttons below for quick actions*");
        self.finish(text, ParseMode::Markdown, main_keyboard(true))
    }

    fn write_stream(&self, text: &mut String, stream: &EndpointStatus) {
        let _ = writeln!(text, "{} `{}`", self.state_emoji(stream.state), code(&stream.name));
        let _ = writeln!(
            text,
            "   Status: *{}* | Messages: {}",
            stream.state, stream.message_count
        );
        let _ = writeln!(text, "   Last: {}\n", clock(stream.last_update));
    }

    fn write_api(&self, text: &mut String, api: &EndpointStatus) {
        let e = &self.ctx.emoji;
        let avg = api
            .average_response_ms()
            .map(|ms| format!(" | {} {ms:.0}ms", e.speed))
            .unwrap_or_default();
        let _ = writeln!(text, "{} `{}`", self.state_emoji(api.state), code(&api.name));
        let _ = writeln!(
            text,
            "   {} {} | {} {}{avg}",
            e.success, api.success_count, e.error, api.error_count
        );
        let _ = writeln!(text, "   Last: {}\n", clock(api.last_update));
    }

    /// 로그 화면 (HTML)
    pub fn logs(&self, logs: &[LogEntry]) -> OutgoingMessage {
        let mut text = format!(
            "📋 <b>{} Logs</b>\n\n",
            escape_html(&self.ctx.title)
        );

        if logs.is_empty() {
            text.push_str("📝 <b>No logs yet!</b>\n");
            text.push_str("Logs will appear here as monitoring activity occurs.\n");
            return self.finish(text, ParseMode::Html, logs_keyboard());
        }

        let mut counts: BTreeMap<LogType, usize> = BTreeMap::new();
        for entry in logs {
            *counts.entry(entry.log_type).or_default() += 1;
        }
        let _ = writeln!(
            text,
            "📊 <b>Log Summary (Last {} entries):</b>",
            logs.len()
        );
        for (log_type, count) in &counts {
            let _ = writeln!(text, "{} {log_type}: {count}", log_type.icon());
        }
        text.push('\n');

        let recent = &logs[logs.len().saturating_sub(LOG_VIEW_ENTRIES)..];
        let _ = writeln!(
            text,
            "🕒 <b>Recent Activity (Last {}):</b>",
            recent.len()
        );
        for entry in recent {
            let _ = write!(
                text,
                "<code>{}</code> {} <b>{}</b>\n{}\n\n",
                clock(entry.timestamp),
                entry.log_type.icon(),
                escape_html(&entry.source),
                escape_html(&clip(&entry.message, 60))
            );
        }

        self.finish(text, ParseMode::Html, logs_keyboard())
    }

    /// 전체 에러 화면
    pub fn all_errors(&self, snapshot: &StatusSnapshot) -> OutgoingMessage {
        let mut text = format!("🚨 *{} Errors Overview*\n\n", escape_markdown(&self.ctx.title));

        let count = |filter: ErrorFilter| {
            snapshot
                .confirmed
                .iter()
                .filter(|e| filter.matches(&e.source))
                .count()
        };
        let pending_ws = snapshot
            .pending
            .iter()
            .filter(|p| ErrorFilter::WebSocket.matches(&p.source))
            .count();

        text.push_str("📊 *Error Summary:*\n");
        let _ = writeln!(text, "🌐 API Errors: {}", count(ErrorFilter::Api));
        let _ = writeln!(text, "📡 WebSocket Errors: {}", count(ErrorFilter::WebSocket));
        let _ = writeln!(text, "⏳ Pending WS Errors: {pending_ws}\n");

        if snapshot.confirmed.is_empty() {
            text.push_str("✅ *No recent errors!*\n");
        } else {
            let _ = writeln!(
                text,
                "🕒 *Recent Errors (Last {}):*",
                snapshot.confirmed.len()
            );
            for error in &snapshot.confirmed {
                let _ = writeln!(
                    text,
                    "• `{}` - {}: {}",
                    clock(error.timestamp),
                    escape_markdown(&error.source),
                    escape_markdown(&clip(&error.message, 50))
                );
            }
        }

        if !snapshot.pending.is_empty() {
            let _ = writeln!(
                text,
                "\n⏳ *Current Pending Errors ({}):*",
                snapshot.pending.len()
            );
            for pending in snapshot.pending.iter().rev().take(5).rev() {
                let _ = writeln!(
                    text,
                    "• `{}` - {}: {}",
                    clock(pending.first_seen),
                    escape_markdown(&pending.source),
                    escape_markdown(&clip(&pending.message, 50))
                );
            }
        }

        if !snapshot.history.is_empty() {
            let _ = writeln!(
                text,
                "\n📋 *Connection Issues History ({}):*",
                snapshot.history.len()
            );
            let skip = snapshot.history.len().saturating_sub(10);
            for entry in &snapshot.history[skip..] {
                let _ = writeln!(text, "• {}", history_line(entry, 50));
            }
        }

        text.push_str("\n💡 Use filter buttons below to view specific error types.");
        self.finish(text, ParseMode::Markdown, errors_keyboard())
    }

    /// 출처별 에러 화면
    pub fn filtered_errors(&self, snapshot: &StatusSnapshot, filter: ErrorFilter) -> OutgoingMessage {
        let title = match filter {
            ErrorFilter::Api => format!("🌐 *{} API Errors*", escape_markdown(&self.ctx.title)),
            ErrorFilter::WebSocket => {
                format!("📡 *{} WebSocket Errors*", escape_markdown(&self.ctx.title))
            }
        };
        let mut text = format!("{title}\n\n");

        let confirmed: Vec<_> = snapshot
            .confirmed
            .iter()
            .filter(|e| filter.matches(&e.source))
            .collect();
        // API 점검 실패는 보류 단계를 거치지 않는다
        let (pending, history): (Vec<_>, Vec<_>) = match filter {
            ErrorFilter::Api => (Vec::new(), Vec::new()),
            ErrorFilter::WebSocket => (
                snapshot
                    .pending
                    .iter()
                    .filter(|p| filter.matches(&p.source))
                    .collect(),
                snapshot
                    .history
                    .iter()
                    .filter(|h| filter.matches(&h.source))
                    .collect(),
            ),
        };

        if !confirmed.is_empty() {
            let _ = writeln!(text, "🔴 *Confirmed Errors ({}):*", confirmed.len());
            for error in &confirmed {
                let _ = write!(
                    text,
                    "• `{}`\n  {}: {}\n\n",
                    clock(error.timestamp),
                    escape_markdown(&error.source),
                    escape_markdown(&clip(&error.message, 80))
                );
            }
        }

        if !history.is_empty() {
            let _ = writeln!(text, "📋 *Connection Issues History ({}):*", history.len());
            let skip = history.len().saturating_sub(15);
            for entry in &history[skip..] {
                let _ = write!(text, "• {}\n\n", history_line(entry, 80));
            }
        }

        if confirmed.is_empty() && history.is_empty() {
            text.push_str("✅ *No errors of this type!*\n\n");
        }

        if !pending.is_empty() {
            let _ = writeln!(text, "⏳ *Pending Errors ({}):*", pending.len());
            let _ = writeln!(
                text,
                "_(Will become confirmed if not resolved in {}s)_\n",
                self.ctx.grace_period_secs
            );
            for p in &pending {
                let _ = write!(
                    text,
                    "• `{}`\n  {}: {}\n\n",
                    clock(p.first_seen),
                    escape_markdown(&p.source),
                    escape_markdown(&clip(&p.message, 80))
                );
            }
        }

        self.finish(text, ParseMode::Markdown, filtered_keyboard(filter))
    }

    /// 도움말
    pub fn help(&self) -> OutgoingMessage {
        let e = &self.ctx.emoji;
        let mut text = format!("{} *{}*\n\n", e.robot, escape_markdown(&self.ctx.title));
        text.push_str("This bot monitors WebSocket connections and API endpoints in real-time.\n\n");
        text.push_str("*Features:*\n");
        text.push_str("• Real-time WebSocket monitoring\n");
        let _ = writeln!(
            text,
            "• Live dashboard updates every {}s (no spam!)",
            self.ctx.update_interval_secs
        );
        text.push_str("• Sessions survive bot restarts\n");
        text.push_str("• Interactive buttons for easy control\n\n");
        self.write_targets(&mut text);
        text.push_str("*Commands:*\n");
        text.push_str("/start - Begin your session\n");
        text.push_str("/status - Send a fresh dashboard\n");
        text.push_str("/clear - Reset error history\n");
        text.push_str("/stop - End your session\n\n");
        text.push_str("*Button Controls:*\n");
        text.push_str("🔄 Refresh Status - Force update display\n");
        text.push_str("🧹 Clear Errors - Reset error history\n");
        text.push_str("📥 Download - Export logs or errors as a file\n");
        self.finish(text, ParseMode::Markdown, back_keyboard())
    }

    /// 세션이 없는 채팅의 환영 화면
    pub fn welcome(&self) -> OutgoingMessage {
        let mut text = format!("👋 *Welcome to {}!*\n\n", escape_markdown(&self.ctx.title));
        text.push_str("This bot monitors WebSocket connections and API endpoints in real-time.\n\n");
        text.push_str("Press *Start Monitoring* to begin tracking:\n");
        self.write_targets(&mut text);
        text.push_str("Your monitoring session will persist across bot restarts!");
        self.finish(text, ParseMode::Markdown, main_keyboard(false))
    }

    fn write_targets(&self, text: &mut String) {
        let e = &self.ctx.emoji;
        text.push_str("*Monitored Services:*\n");
        if !self.ctx.stream_names.is_empty() {
            let _ = writeln!(
                text,
                "{} WebSocket: {}",
                e.websocket,
                escape_markdown(&self.ctx.stream_names.join(", "))
            );
        }
        if !self.ctx.api_paths.is_empty() {
            let _ = writeln!(
                text,
                "{} API: {}",
                e.api,
                escape_markdown(&self.ctx.api_paths.join(", "))
            );
        }
        text.push('\n');
    }

    /// /start 응답
    pub fn start_greeting(&self, display_name: &str, target: &ChatTarget) -> OutgoingMessage {
        let text = format!(
            "🎉 Welcome {}!\n\nYour monitoring session has started.\nChat ID: `{target}`\n\n\
             You will receive live updates every {} seconds.\n\nUse the buttons below for easy control!",
            escape_markdown(display_name),
            self.ctx.update_interval_secs
        );
        self.finish(text, ParseMode::Markdown, Vec::new())
    }
}

fn history_line(entry: &PendingHistoryEntry, max_chars: usize) -> String {
    let ts = clock(entry.timestamp);
    let source = escape_markdown(&entry.source);
    let msg = escape_markdown(&clip(&entry.message, max_chars));
    match entry.status {
        PendingStatus::Resolved => {
            let secs = entry.resolution.map(|d| d.as_secs_f64()).unwrap_or_default();
            format!("`{ts}` ✅ {source}: {msg} (recovered in {secs:.1}s)")
        }
        PendingStatus::Confirmed => format!("`{ts}` ❌ {source}: {msg} (confirmed)"),
        PendingStatus::Pending => format!("`{ts}` ⏳ {source}: {msg} (pending)"),
    }
}
