//! 보류/확정 장애 관리.
//!
//! 일시 장애는 먼저 보류로 기록되고, 유예 시간(기본 20초) 안에 같은 출처가
//! 회복하면 SUCCESS 로그만 남긴 채 사라진다. 회복하지 못하면 정확히 한 번
//! 확정 장애로 승격되어 대시보드와 헬스 카운터에 반영된다.
//!
//! 모든 연산은 `*_at(now)` 변형을 가진다 (유예 시간 테스트용).

use chrono::{DateTime, Utc};
use linkwatch_core::models::incident::{
    ConfirmedError, ConfirmedErrorKind, PendingError, PendingHistoryEntry, PendingStatus,
};
use linkwatch_core::models::log::LogType;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::classifier::{classify, health_category_for, FailureClass};
use crate::health::HealthMonitor;
use crate::status_store::StatusStore;

/// 장애 기록 (StatusStore의 단일 잠금 아래에 있음)
#[derive(Debug)]
pub struct IncidentBook {
    pending: HashMap<String, PendingError>,
    /// 앞쪽이 최신
    confirmed: VecDeque<ConfirmedError>,
    /// 뒤쪽이 최신
    history: VecDeque<PendingHistoryEntry>,
    confirmed_capacity: usize,
    history_capacity: usize,
}

impl IncidentBook {
    pub fn new(confirmed_capacity: usize, history_capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            confirmed: VecDeque::with_capacity(confirmed_capacity),
            history: VecDeque::with_capacity(history_capacity),
            confirmed_capacity,
            history_capacity,
        }
    }

    fn push_history(&mut self, entry: PendingHistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// 같은 출처의 열린 `pending` 이력을 모두 닫는다
    fn mark_history(
        &mut self,
        pending: &PendingError,
        status: PendingStatus,
        resolution: Option<Duration>,
    ) {
        for entry in self.history.iter_mut().filter(|e| {
            e.status == PendingStatus::Pending && e.source == pending.source
        }) {
            entry.status = status;
            entry.resolution = resolution;
        }
    }

    /// 보류 기록. 이미 보류 중인 출처는 열린 이력 한 건을 갱신한다
    fn upsert_pending(&mut self, pending: PendingError) {
        if self.pending.contains_key(&pending.source) {
            if let Some(entry) = self.history.iter_mut().rev().find(|e| {
                e.status == PendingStatus::Pending && e.source == pending.source
            }) {
                entry.timestamp = pending.first_seen;
                entry.message = pending.message.clone();
                self.pending.insert(pending.source.clone(), pending);
                return;
            }
        }
        self.push_history(PendingHistoryEntry {
            timestamp: pending.first_seen,
            source: pending.source.clone(),
            message: pending.message.clone(),
            status: PendingStatus::Pending,
            resolution: None,
        });
        self.pending.insert(pending.source.clone(), pending);
    }

    fn resolve(&mut self, source: &str, now: DateTime<Utc>) -> Option<(PendingError, Duration)> {
        let pending = self.pending.remove(source)?;
        let latency = pending.age_at(now);
        self.mark_history(&pending, PendingStatus::Resolved, Some(latency));
        Some((pending, latency))
    }

    /// 보류 항목을 확정 처리로 넘긴다 (이력 `confirmed`, 항목 제거)
    fn supersede(&mut self, source: &str) -> Option<PendingError> {
        let pending = self.pending.remove(source)?;
        self.mark_history(&pending, PendingStatus::Confirmed, None);
        Some(pending)
    }

    fn take_expired(&mut self, now: DateTime<Utc>, grace: Duration) -> Vec<PendingError> {
        let mut expired: Vec<String> = self
            .pending
            .values()
            .filter(|p| p.age_at(now) > grace)
            .map(|p| p.source.clone())
            .collect();
        expired.sort();
        expired
            .iter()
            .filter_map(|source| self.supersede(source))
            .collect()
    }

    fn push_confirmed(&mut self, entry: ConfirmedError) {
        self.confirmed.push_front(entry);
        self.confirmed.truncate(self.confirmed_capacity);
    }

    fn clear_confirmed(&mut self) -> usize {
        let cleared = self.confirmed.len();
        self.confirmed.clear();
        cleared
    }

    pub fn is_pending(&self, source: &str) -> bool {
        self.pending.contains_key(source)
    }

    pub fn confirmed(&self) -> Vec<ConfirmedError> {
        self.confirmed.iter().cloned().collect()
    }

    pub fn pending(&self) -> Vec<PendingError> {
        let mut pending: Vec<PendingError> = self.pending.values().cloned().collect();
        pending.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.source.cmp(&b.source))
        });
        pending
    }

    pub fn history(&self) -> Vec<PendingHistoryEntry> {
        self.history.iter().cloned().collect()
    }
}

/// 보류/확정 장애 추적기
pub struct IncidentTracker {
    status: Arc<StatusStore>,
    health: Arc<HealthMonitor>,
    grace_period: Duration,
    message_limit: usize,
}

impl IncidentTracker {
    pub fn new(
        status: Arc<StatusStore>,
        health: Arc<HealthMonitor>,
        grace_period: Duration,
        message_limit: usize,
    ) -> Self {
        Self {
            status,
            health,
            grace_period,
            message_limit,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn confirmed(&self) -> Vec<ConfirmedError> {
        self.status.incidents().confirmed()
    }

    fn truncate(&self, message: &str) -> String {
        message.chars().take(self.message_limit).collect()
    }

    /// 분류 후 보류 또는 확정으로 기록
    pub fn report_failure(&self, source: &str, message: &str) -> FailureClass {
        self.report_failure_at(source, message, Utc::now())
    }

    pub fn report_failure_at(&self, source: &str, message: &str, now: DateTime<Utc>) -> FailureClass {
        let class = classify(message);
        match class {
            FailureClass::Recoverable => self.add_pending_at(source, message, now),
            FailureClass::Immediate => self.record_confirmed_at(source, message, now),
        }
        class
    }

    pub fn add_pending(&self, source: &str, message: &str) {
        self.add_pending_at(source, message, Utc::now());
    }

    /// 보류 장애 기록 (같은 출처는 덮어씀)
    pub fn add_pending_at(&self, source: &str, message: &str, now: DateTime<Utc>) {
        let pending = PendingError {
            source: source.to_string(),
            message: self.truncate(message),
            first_seen: now,
        };
        self.status.incidents().upsert_pending(pending);
        info!("보류 장애 [{}] {source}: {message}", now.format("%H:%M:%S"));
    }

    pub fn resolve_pending(&self, source: &str) -> Option<Duration> {
        self.resolve_pending_at(source, Utc::now())
    }

    /// 회복 처리. 보류 항목이 있었으면 회복 소요 시간 반환
    pub fn resolve_pending_at(&self, source: &str, now: DateTime<Utc>) -> Option<Duration> {
        let (pending, latency) = self.status.incidents().resolve(source, now)?;
        self.status.add_log(
            LogType::Success,
            source,
            format!(
                "Connection recovered after {:.1}s (was: {})",
                latency.as_secs_f64(),
                pending.message
            ),
        );
        info!("회복 [{source}] {:.1}초 만에 재연결", latency.as_secs_f64());
        Some(latency)
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// 유예 시간을 넘긴 보류 장애를 확정으로 승격
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired = self.status.incidents().take_expired(now, self.grace_period);
        for pending in &expired {
            let message = format!(
                "{} (connection failed for >{}s)",
                pending.message,
                self.grace_period.as_secs()
            );
            self.push_confirmed(&pending.source, &message, ConfirmedErrorKind::Promoted, now);
        }
        expired.len()
    }

    pub fn record_confirmed(&self, source: &str, message: &str) {
        self.record_confirmed_at(source, message, Utc::now());
    }

    /// 즉시 확정 장애 기록. 같은 출처의 보류 항목은 확정으로 대체된다
    pub fn record_confirmed_at(&self, source: &str, message: &str, now: DateTime<Utc>) {
        self.status.incidents().supersede(source);
        self.push_confirmed(source, message, ConfirmedErrorKind::Immediate, now);
    }

    fn push_confirmed(
        &self,
        source: &str,
        message: &str,
        kind: ConfirmedErrorKind,
        now: DateTime<Utc>,
    ) {
        let message = self.truncate(message);
        error!("확정 장애 [{}] {source}: {message}", now.format("%H:%M:%S"));

        self.status.incidents().push_confirmed(ConfirmedError {
            timestamp: now,
            source: source.to_string(),
            message: message.clone(),
            kind,
        });

        if let Some(category) = health_category_for(source, &message) {
            self.health
                .record_error_at(category, &format!("{source}: {message}"), now);
        }
    }

    /// 확정 장애 목록 비우기 (운영자 요청)
    pub fn clear_confirmed(&self) -> usize {
        let cleared = self.status.incidents().clear_confirmed();
        info!("확정 장애 {cleared}건 삭제");
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_store::StoreLimits;
    use chrono::Duration as ChronoDuration;
    use linkwatch_core::config::HealthConfig;
    use linkwatch_core::models::health::HealthCategory;
    use tokio::sync::mpsc;

    struct Fixture {
        status: Arc<StatusStore>,
        health: Arc<HealthMonitor>,
        tracker: IncidentTracker,
        _restart_rx: mpsc::UnboundedReceiver<linkwatch_core::models::health::RestartRequest>,
    }

    fn fixture() -> Fixture {
        let status = Arc::new(StatusStore::with_endpoints(
            vec!["WS-A".to_string()],
            vec![],
            StoreLimits::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let health = Arc::new(HealthMonitor::new(HealthConfig::default(), tx));
        let tracker = IncidentTracker::new(
            status.clone(),
            health.clone(),
            Duration::from_secs(20),
            100,
        );
        Fixture {
            status,
            health,
            tracker,
            _restart_rx: rx,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn transient_failure_recovers_without_confirmed_error() {
        let f = fixture();
        let class = f
            .tracker
            .report_failure_at("WS-A", "connection closed", t0());
        assert_eq!(class, FailureClass::Recoverable);
        assert!(f.status.incidents().is_pending("WS-A"));

        let latency = f
            .tracker
            .resolve_pending_at("WS-A", t0() + ChronoDuration::seconds(5))
            .unwrap();
        assert_eq!(latency, Duration::from_secs(5));

        let snapshot = f.status.snapshot();
        assert!(snapshot.pending.is_empty());
        assert!(snapshot.confirmed.is_empty());
        assert_eq!(snapshot.history[0].status, PendingStatus::Resolved);
        assert_eq!(snapshot.history[0].resolution, Some(Duration::from_secs(5)));

        let log = f.status.logs().pop().unwrap();
        assert_eq!(log.log_type, LogType::Success);
        assert_eq!(
            log.message,
            "Connection recovered after 5.0s (was: connection closed)"
        );

        // 회복된 보류 장애는 이후 스윕에서 승격되지 않는다
        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(60)),
            0
        );
        assert!(f.status.snapshot().confirmed.is_empty());
    }

    #[test]
    fn unresolved_pending_is_promoted_exactly_once() {
        let f = fixture();
        f.tracker.add_pending_at("WS-A", "connection lost", t0());

        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(20)),
            0
        );
        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(21)),
            1
        );
        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(26)),
            0
        );

        let snapshot = f.status.snapshot();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.confirmed.len(), 1);
        assert_eq!(
            snapshot.confirmed[0].message,
            "connection lost (connection failed for >20s)"
        );
        assert_eq!(snapshot.confirmed[0].kind, ConfirmedErrorKind::Promoted);
        assert_eq!(snapshot.history[0].status, PendingStatus::Confirmed);
        assert_eq!(f.tracker.resolve_pending_at("WS-A", t0()), None);
    }

    #[test]
    fn immediate_failure_is_confirmed_and_counted() {
        let f = fixture();
        let class = f
            .tracker
            .report_failure_at("WebSocket WS-B", "invalid token", t0());
        assert_eq!(class, FailureClass::Immediate);

        let snapshot = f.status.snapshot();
        assert_eq!(snapshot.confirmed.len(), 1);
        assert_eq!(snapshot.confirmed[0].kind, ConfirmedErrorKind::Immediate);
        assert!(snapshot.pending.is_empty());
        assert_eq!(
            f.health
                .window_count_at(HealthCategory::WatcherFailures, t0()),
            1
        );
    }

    #[test]
    fn confirmed_error_supersedes_open_pending() {
        let f = fixture();
        f.tracker
            .add_pending_at("WebSocket WS-A", "connection reset", t0());
        f.tracker.record_confirmed_at(
            "WebSocket WS-A",
            "HTTP error: 401 Unauthorized",
            t0() + ChronoDuration::seconds(3),
        );

        let snapshot = f.status.snapshot();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.confirmed.len(), 1);
        assert_eq!(snapshot.history[0].status, PendingStatus::Confirmed);
    }

    #[test]
    fn repeated_failure_then_recovery_closes_history() {
        let f = fixture();
        f.tracker
            .add_pending_at("WebSocket Price", "Connection refused", t0());
        f.tracker.add_pending_at(
            "WebSocket Price",
            "Connection refused",
            t0() + ChronoDuration::seconds(5),
        );
        assert_eq!(f.status.snapshot().pending.len(), 1);

        let latency = f
            .tracker
            .resolve_pending_at("WebSocket Price", t0() + ChronoDuration::seconds(8))
            .unwrap();
        // 덮어쓰기는 first_seen을 다시 잡는다
        assert_eq!(latency, Duration::from_secs(3));

        let snapshot = f.status.snapshot();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.history.len(), 1);
        assert!(snapshot
            .history
            .iter()
            .all(|e| e.status == PendingStatus::Resolved));
    }

    #[test]
    fn repeated_failure_then_promotion_closes_history() {
        let f = fixture();
        f.tracker.add_pending_at("WebSocket Price", "timeout", t0());
        f.tracker.add_pending_at(
            "WebSocket Price",
            "connection reset",
            t0() + ChronoDuration::seconds(10),
        );

        // 두 번째 기록 기준으로 유예 시간이 흐른다
        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(25)),
            0
        );
        assert_eq!(
            f.tracker
                .sweep_expired_at(t0() + ChronoDuration::seconds(31)),
            1
        );

        let snapshot = f.status.snapshot();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.confirmed.len(), 1);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].status, PendingStatus::Confirmed);
        assert_eq!(snapshot.history[0].message, "connection reset");
    }

    #[test]
    fn new_incident_after_recovery_gets_own_history() {
        let f = fixture();
        f.tracker.add_pending_at("WS-A", "timeout", t0());
        f.tracker
            .resolve_pending_at("WS-A", t0() + ChronoDuration::seconds(2));
        f.tracker
            .add_pending_at("WS-A", "timeout", t0() + ChronoDuration::seconds(9));

        let statuses: Vec<_> = f
            .status
            .snapshot()
            .history
            .iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses, vec![PendingStatus::Resolved, PendingStatus::Pending]);
    }

    #[test]
    fn rings_are_bounded() {
        let f = fixture();
        for i in 0..8 {
            f.tracker
                .record_confirmed_at(&format!("API /p{i}"), "HTTP 500", t0());
        }
        for i in 0..60 {
            f.tracker
                .add_pending_at(&format!("WebSocket S{i}"), "timeout", t0());
        }

        let snapshot = f.status.snapshot();
        assert_eq!(snapshot.confirmed.len(), 5);
        assert_eq!(snapshot.confirmed[0].source, "API /p7");
        assert_eq!(snapshot.history.len(), 50);
        assert_eq!(snapshot.history[0].source, "WebSocket S10");
    }

    #[test]
    fn pending_message_is_truncated() {
        let f = fixture();
        let long = format!("timeout {}", "x".repeat(200));
        f.tracker.add_pending_at("WS-A", &long, t0());
        assert_eq!(f.status.snapshot().pending[0].message.chars().count(), 100);
    }

    #[test]
    fn clear_confirmed_keeps_pending() {
        let f = fixture();
        f.tracker.record_confirmed_at("API /x", "HTTP 500", t0());
        f.tracker.add_pending_at("WS-A", "timeout", t0());
        assert_eq!(f.tracker.clear_confirmed(), 1);

        let snapshot = f.status.snapshot();
        assert!(snapshot.confirmed.is_empty());
        assert_eq!(snapshot.pending.len(), 1);
    }
}
