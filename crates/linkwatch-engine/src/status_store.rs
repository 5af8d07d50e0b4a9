//! 집계 상태 저장소.
//!
//! 감시기/폴러 결과, 장애 기록, 운영 로그를 한곳에 모은다.
//! 잠금은 논리 키별로 나뉜다:
//! - 엔드포인트마다 하나 (해당 감시기/폴러만 기록)
//! - 장애 기록 하나
//! - 로그 링 하나
//!
//! 어떤 잠금도 `.await`를 넘겨 보유하지 않으며, 두 잠금을 동시에 잡지 않는다.

use chrono::{DateTime, Utc};
use linkwatch_core::config::AppConfig;
use linkwatch_core::models::endpoint::{EndpointKind, EndpointState, EndpointStatus};
use linkwatch_core::models::incident::{ConfirmedError, PendingError, PendingHistoryEntry};
use linkwatch_core::models::log::{LogEntry, LogType};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::incidents::IncidentBook;

/// 버퍼 크기 제한
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    /// 스트림 메시지 미리보기 길이 (문자)
    pub snippet_chars: usize,
    /// 응답 시간 이동 윈도우 크기
    pub response_window: usize,
    /// 확정 장애 링 크기
    pub confirmed_capacity: usize,
    /// 보류 이력 크기
    pub history_capacity: usize,
    /// 로그 링 크기
    pub log_capacity: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            snippet_chars: 50,
            response_window: 10,
            confirmed_capacity: 5,
            history_capacity: 50,
            log_capacity: 100,
        }
    }
}

impl StoreLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            snippet_chars: config.monitor.snippet_chars,
            response_window: config.monitor.response_window,
            confirmed_capacity: config.incidents.confirmed_capacity,
            history_capacity: config.incidents.history_capacity,
            log_capacity: config.incidents.log_capacity,
        }
    }
}

/// 렌더링용 상태 스냅샷
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub streams: Vec<EndpointStatus>,
    pub apis: Vec<EndpointStatus>,
    pub total_messages: u64,
    pub total_api_calls: u64,
    pub started_at: DateTime<Utc>,
    /// 최신순
    pub confirmed: Vec<ConfirmedError>,
    /// 발생 시각순
    pub pending: Vec<PendingError>,
    /// 오래된 순
    pub history: Vec<PendingHistoryEntry>,
}

/// 집계 상태 저장소
pub struct StatusStore {
    /// 설정 순서 유지
    streams: Vec<(String, Mutex<EndpointStatus>)>,
    apis: Vec<(String, Mutex<EndpointStatus>)>,
    incidents: Mutex<IncidentBook>,
    logs: Mutex<VecDeque<LogEntry>>,
    total_messages: AtomicU64,
    total_api_calls: AtomicU64,
    started_at: DateTime<Utc>,
    limits: StoreLimits,
}

impl StatusStore {
    /// 설정의 활성 스트림/API 목록으로 생성
    pub fn new(config: &AppConfig) -> Self {
        let streams = config.enabled_streams().map(|s| s.name.clone()).collect();
        let apis = config.api.endpoints.clone();
        Self::with_endpoints(streams, apis, StoreLimits::from_config(config))
    }

    pub fn with_endpoints(streams: Vec<String>, apis: Vec<String>, limits: StoreLimits) -> Self {
        Self {
            streams: streams
                .into_iter()
                .map(|name| {
                    let status = EndpointStatus::new(name.clone(), EndpointKind::WebSocket);
                    (name, Mutex::new(status))
                })
                .collect(),
            apis: apis
                .into_iter()
                .map(|path| {
                    let status = EndpointStatus::new(path.clone(), EndpointKind::Api);
                    (path, Mutex::new(status))
                })
                .collect(),
            incidents: Mutex::new(IncidentBook::new(
                limits.confirmed_capacity,
                limits.history_capacity,
            )),
            logs: Mutex::new(VecDeque::with_capacity(limits.log_capacity)),
            total_messages: AtomicU64::new(0),
            total_api_calls: AtomicU64::new(0),
            started_at: Utc::now(),
            limits,
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn incidents(&self) -> MutexGuard<'_, IncidentBook> {
        self.incidents.lock()
    }

    fn find<'a>(
        entries: &'a [(String, Mutex<EndpointStatus>)],
        name: &str,
    ) -> Option<&'a Mutex<EndpointStatus>> {
        entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    fn update_stream(&self, name: &str, f: impl FnOnce(&mut EndpointStatus)) {
        match Self::find(&self.streams, name) {
            Some(entry) => {
                let mut status = entry.lock();
                f(&mut status);
                status.last_update = Utc::now();
            }
            None => debug!("등록되지 않은 스트림: {name}"),
        }
    }

    fn update_api(&self, path: &str, f: impl FnOnce(&mut EndpointStatus)) {
        match Self::find(&self.apis, path) {
            Some(entry) => {
                let mut status = entry.lock();
                f(&mut status);
                status.last_update = Utc::now();
            }
            None => debug!("등록되지 않은 API: {path}"),
        }
    }

    fn snippet(&self, text: &str) -> String {
        text.chars().take(self.limits.snippet_chars).collect()
    }

    // ============================================================
    // 스트림 상태
    // ============================================================

    pub fn set_stream_state(&self, name: &str, state: EndpointState) {
        self.update_stream(name, |s| s.state = state);
    }

    /// 수신 메시지 반영: ACTIVE, 카운터 증가, 미리보기 저장
    pub fn record_stream_message(&self, name: &str, text: &str) {
        let snippet = self.snippet(text);
        self.update_stream(name, |s| {
            s.state = EndpointState::Active;
            s.message_count += 1;
            s.last_message = Some(snippet);
        });
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self, name: &str, message: &str) {
        let snippet = self.snippet(message);
        self.update_stream(name, |s| {
            s.state = EndpointState::Error;
            s.last_message = Some(snippet);
        });
    }

    // ============================================================
    // API 상태
    // ============================================================

    /// 점검 결과 반영. 성공 시에만 응답 시간 윈도우에 추가
    pub fn record_api_result(&self, path: &str, success: bool, response_ms: Option<f64>) {
        let window = self.limits.response_window;
        self.update_api(path, |s| {
            s.last_response_ms = response_ms;
            if success {
                s.state = EndpointState::Success;
                s.success_count += 1;
                if let Some(ms) = response_ms {
                    s.response_times.push_back(ms);
                    while s.response_times.len() > window {
                        s.response_times.pop_front();
                    }
                }
            } else {
                s.state = EndpointState::Error;
                s.error_count += 1;
            }
        });
        self.total_api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_api_state(&self, path: &str, state: EndpointState) {
        self.update_api(path, |s| s.state = state);
    }

    pub fn stream_status(&self, name: &str) -> Option<EndpointStatus> {
        Self::find(&self.streams, name).map(|e| e.lock().clone())
    }

    pub fn api_status(&self, path: &str) -> Option<EndpointStatus> {
        Self::find(&self.apis, path).map(|e| e.lock().clone())
    }

    // ============================================================
    // 운영 로그
    // ============================================================

    /// 로그 링에 추가 (초과 시 가장 오래된 항목 제거) + tracing 출력
    pub fn add_log(&self, log_type: LogType, source: &str, message: impl Into<String>) {
        let message = message.into();
        match log_type {
            LogType::Error => warn!("[{source}] {message}"),
            LogType::Health | LogType::System => info!("[{source}] {message}"),
            _ => debug!("[{log_type}] [{source}] {message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            log_type,
            source: source.to_string(),
            message,
        };
        let mut logs = self.logs.lock();
        logs.push_back(entry);
        while logs.len() > self.limits.log_capacity {
            logs.pop_front();
        }
    }

    /// 오래된 순
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().iter().cloned().collect()
    }

    // ============================================================
    // 스냅샷
    // ============================================================

    pub fn snapshot(&self) -> StatusSnapshot {
        let streams = self.streams.iter().map(|(_, e)| e.lock().clone()).collect();
        let apis = self.apis.iter().map(|(_, e)| e.lock().clone()).collect();
        let (confirmed, pending, history) = {
            let book = self.incidents.lock();
            (book.confirmed(), book.pending(), book.history())
        };

        StatusSnapshot {
            streams,
            apis,
            total_messages: self.total_messages.load(Ordering::Relaxed),
            total_api_calls: self.total_api_calls.load(Ordering::Relaxed),
            started_at: self.started_at,
            confirmed,
            pending,
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StatusStore {
        StatusStore::with_endpoints(
            vec!["Price".to_string(), "Feed".to_string()],
            vec!["/api/channels".to_string()],
            StoreLimits::default(),
        )
    }

    #[test]
    fn stream_message_updates_counters_and_snippet() {
        let store = store();
        let long = "x".repeat(120);
        store.record_stream_message("Price", &long);
        store.record_stream_message("Price", "tick");

        let status = store.stream_status("Price").unwrap();
        assert_eq!(status.state, EndpointState::Active);
        assert_eq!(status.message_count, 2);
        assert_eq!(status.last_message.as_deref(), Some("tick"));
        assert_eq!(store.snapshot().total_messages, 2);

        store.record_stream_message("Feed", &long);
        let feed = store.stream_status("Feed").unwrap();
        assert_eq!(feed.last_message.unwrap().chars().count(), 50);
    }

    #[test]
    fn api_response_window_is_bounded() {
        let store = store();
        for i in 0..15 {
            store.record_api_result("/api/channels", true, Some(i as f64));
        }
        store.record_api_result("/api/channels", false, Some(900.0));

        let status = store.api_status("/api/channels").unwrap();
        assert_eq!(status.response_times.len(), 10);
        assert_eq!(status.response_times.front(), Some(&5.0));
        assert_eq!(status.success_count, 15);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.state, EndpointState::Error);
        assert_eq!(store.snapshot().total_api_calls, 16);
    }

    #[test]
    fn log_ring_evicts_oldest() {
        let store = store();
        for i in 0..130 {
            store.add_log(LogType::Message, "Price", format!("msg {i}"));
        }
        let logs = store.logs();
        assert_eq!(logs.len(), 100);
        assert_eq!(logs[0].message, "msg 30");
        assert_eq!(logs[99].message, "msg 129");
    }

    #[test]
    fn unknown_endpoint_is_ignored() {
        let store = store();
        store.record_stream_message("Nope", "x");
        assert!(store.stream_status("Nope").is_none());
        assert_eq!(store.snapshot().streams.len(), 2);
    }

    #[test]
    fn snapshot_keeps_configured_order() {
        let store = store();
        store.set_stream_state("Feed", EndpointState::Connecting);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.streams[0].name, "Price");
        assert_eq!(snapshot.streams[1].state, EndpointState::Connecting);
        assert_eq!(snapshot.apis[0].state, EndpointState::Waiting);
    }
}
