//! 프로세스 헬스 모니터.
//!
//! 범주별 슬라이딩 윈도우로 확정 장애 빈도를 추적하고, 임계값을 넘으면
//! 재시작 요청을 한 번만 발행한다 (래치). 주기 점검에서는 메모리 사용량과
//! 세션 저장소 연결을 확인하고, 10분마다 HEALTH 로그를 남긴다.
//!
//! 재시작 실행은 [`crate::supervisor::Supervisor`]가 담당한다.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use linkwatch_core::config::{HealthConfig, Threshold};
use linkwatch_core::models::health::{HealthCategory, RestartKind, RestartRequest};
use linkwatch_core::models::log::LogType;
use linkwatch_core::ports::resource::ResourceProbe;
use linkwatch_core::ports::session_store::SessionStore;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::status_store::StatusStore;

/// 재시작 대기 사다리에서 n번째(1부터) 재시작의 대기 시간
pub fn restart_delay(restart_number: u32, ladder: &[u64]) -> Duration {
    if ladder.is_empty() {
        return Duration::ZERO;
    }
    let index = (restart_number.max(1) as usize - 1).min(ladder.len() - 1);
    Duration::from_secs(ladder[index])
}

/// `now` 이후 처음 오는 `hour`시 정각까지 남은 시간 (지났으면 다음 날)
pub fn duration_until_hour(hour: u32, now: NaiveDateTime) -> Duration {
    let today = now.date();
    let target = today.and_hms_opt(hour.min(23), 0, 0).unwrap_or(now);
    let target = if now >= target {
        target + chrono::Duration::days(1)
    } else {
        target
    };
    (target - now).to_std().unwrap_or_default()
}

/// 주기 점검 결과
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub memory_mb: Option<f64>,
    pub store_ok: bool,
    pub restart_requested: bool,
}

#[derive(Debug)]
struct RestartCounter {
    today: NaiveDate,
    count: u32,
}

/// 헬스 모니터
pub struct HealthMonitor {
    config: HealthConfig,
    windows: Mutex<HashMap<HealthCategory, VecDeque<DateTime<Utc>>>>,
    restarts: Mutex<RestartCounter>,
    last_summary: Mutex<Option<DateTime<Utc>>>,
    /// 프로세스당 재시작 시퀀스 1회
    restart_latched: AtomicBool,
    restart_tx: mpsc::UnboundedSender<RestartRequest>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, restart_tx: mpsc::UnboundedSender<RestartRequest>) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            restarts: Mutex::new(RestartCounter {
                today: Local::now().date_naive(),
                count: 0,
            }),
            last_summary: Mutex::new(None),
            restart_latched: AtomicBool::new(false),
            restart_tx,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn threshold(&self, category: HealthCategory) -> Threshold {
        let t = &self.config.thresholds;
        match category {
            HealthCategory::Network => t.network,
            HealthCategory::ChatClient => t.chat_client,
            HealthCategory::WatcherFailures => t.watcher,
            HealthCategory::Store => t.store,
        }
    }

    fn purge(window: &mut VecDeque<DateTime<Utc>>, threshold: Threshold, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(threshold.window_secs as i64);
        while window.front().is_some_and(|t| *t <= cutoff) {
            window.pop_front();
        }
    }

    pub fn record_error(&self, category: HealthCategory, detail: &str) -> bool {
        self.record_error_at(category, detail, Utc::now())
    }

    /// 확정 장애 1건 기록. 임계값 도달로 재시작을 요청했으면 `true`
    pub fn record_error_at(&self, category: HealthCategory, detail: &str, now: DateTime<Utc>) -> bool {
        let threshold = self.threshold(category);
        let count = {
            let mut windows = self.windows.lock();
            let window = windows.entry(category).or_default();
            window.push_back(now);
            Self::purge(window, threshold, now);
            window.len()
        };
        debug!("헬스 오류 [{category}] {count}/{}: {detail}", threshold.count);

        if count >= threshold.count {
            return self.request_error_restart(&format!("Too many {category} errors"));
        }
        false
    }

    /// 현재 윈도우 안의 오류 수 (만료 항목 정리 후)
    pub fn window_count_at(&self, category: HealthCategory, now: DateTime<Utc>) -> usize {
        let threshold = self.threshold(category);
        let mut windows = self.windows.lock();
        let window = windows.entry(category).or_default();
        Self::purge(window, threshold, now);
        window.len()
    }

    pub fn restarts_today(&self) -> u32 {
        self.restarts.lock().count
    }

    /// 날짜가 바뀌었으면 오늘 재시작 횟수 초기화
    pub fn roll_date(&self, today: NaiveDate) {
        let mut restarts = self.restarts.lock();
        if restarts.today != today {
            info!("날짜 변경: 재시작 횟수 초기화 ({} → {today})", restarts.today);
            restarts.today = today;
            restarts.count = 0;
        }
    }

    pub fn is_restart_pending(&self) -> bool {
        self.restart_latched.load(Ordering::SeqCst)
    }

    fn latch(&self) -> bool {
        !self.restart_latched.swap(true, Ordering::SeqCst)
    }

    fn send(&self, request: RestartRequest) -> bool {
        if self.restart_tx.send(request).is_err() {
            warn!("재시작 요청 수신자가 없음");
            return false;
        }
        true
    }

    /// 장애 기반 재시작 요청 (오늘 재시작 횟수에 포함)
    pub fn request_error_restart(&self, reason: &str) -> bool {
        if !self.latch() {
            debug!("재시작이 이미 진행 중: 요청 무시: {reason}");
            return false;
        }

        self.roll_date(Local::now().date_naive());
        let restart_number = {
            let mut restarts = self.restarts.lock();
            restarts.count += 1;
            restarts.count
        };
        let delay = restart_delay(restart_number, &self.config.restart_delays_secs);
        warn!("재시작 요청: {reason} (오늘 {restart_number}번째, {}초 후)", delay.as_secs());

        self.send(RestartRequest {
            kind: RestartKind::ErrorRecovery { restart_number },
            reason: reason.to_string(),
            delay,
        })
    }

    /// 정기 점검 재시작 요청 (횟수에 포함하지 않음)
    pub fn request_maintenance(&self) -> bool {
        if !self.latch() {
            return false;
        }
        info!("정기 점검 재시작 요청");
        self.send(RestartRequest {
            kind: RestartKind::Maintenance,
            reason: "Scheduled daily maintenance".to_string(),
            delay: Duration::from_secs(self.config.maintenance_delay_secs),
        })
    }

    /// 다음 정기 점검까지 남은 시간
    pub fn until_maintenance(&self, now: NaiveDateTime) -> Duration {
        duration_until_hour(self.config.maintenance_hour, now)
    }

    fn summary_due(&self, now: DateTime<Utc>) -> bool {
        let interval = chrono::Duration::seconds(self.config.summary_interval_secs as i64);
        let mut last = self.last_summary.lock();
        match *last {
            Some(prev) if now - prev < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// 주기 점검 1회
    ///
    /// 1. 메모리 사용량: 한도 초과 시 재시작 요청 후 종료
    /// 2. 세션 저장소 ping: 실패 시 store 범주 오류
    /// 3. 날짜 변경 확인
    /// 4. 요약 로그 (summary_interval마다)
    pub async fn check(
        &self,
        resource: &dyn ResourceProbe,
        store: &dyn SessionStore,
        status: &StatusStore,
        session_count: usize,
    ) -> HealthReport {
        let now = Utc::now();
        let memory_bytes = resource.resident_memory_bytes();
        let memory_mb = memory_bytes.map(|b| b as f64 / 1024.0 / 1024.0);

        if let (Some(bytes), Some(mb)) = (memory_bytes, memory_mb) {
            if bytes > self.config.memory_limit_bytes() {
                let reason = format!(
                    "High memory usage: {mb:.1}MB (threshold: {}MB)",
                    self.config.memory_limit_mb
                );
                let restart_requested = self.request_error_restart(&reason);
                return HealthReport {
                    memory_mb,
                    store_ok: true,
                    restart_requested,
                };
            }
        }

        let mut restart_requested = false;
        let store_ok = match store.ping().await {
            Ok(()) => true,
            Err(e) => {
                restart_requested = self.record_error_at(
                    HealthCategory::Store,
                    &format!("Store connection failed: {}", e.detail()),
                    now,
                );
                false
            }
        };

        self.roll_date(Local::now().date_naive());

        if self.summary_due(now) {
            let memory = match memory_mb {
                Some(mb) => format!("Memory usage OK: {mb:.1}MB"),
                None => "Memory usage unknown".to_string(),
            };
            status.add_log(
                LogType::Health,
                "Monitor",
                format!(
                    "Health Check - {memory}, Store: {} ({}), Sessions: {session_count}, Restarts today: {}",
                    store.backend_name(),
                    if store_ok { "ok" } else { "failing" },
                    self.restarts_today()
                ),
            );
        }

        HealthReport {
            memory_mb,
            store_ok,
            restart_requested,
        }
    }
}
