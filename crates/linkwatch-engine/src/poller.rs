//! HTTP API 폴러.
//!
//! 전용 OS 스레드에서 동기 점검을 돌린다. 엔드포인트를 차례로 점검한 뒤
//! 폴링 주기만큼 1초 단위로 플래그를 확인하며 대기한다.

use linkwatch_core::models::endpoint::EndpointState;
use linkwatch_core::models::log::LogType;
use linkwatch_core::ports::http_probe::HttpProbe;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::incidents::IncidentTracker;
use crate::lifecycle::MonitoringFlag;
use crate::status_store::StatusStore;

/// 정상 응답 코드
const HTTP_OK: u16 = 200;

/// 점검 대상 (경로, 전체 URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    pub path: String,
    pub url: String,
}

/// HTTP API 폴러
pub struct ApiPoller {
    targets: Vec<ApiTarget>,
    probe: Arc<dyn HttpProbe>,
    status: Arc<StatusStore>,
    incidents: Arc<IncidentTracker>,
    flag: MonitoringFlag,
    interval: Duration,
}

impl ApiPoller {
    pub fn new(
        targets: Vec<ApiTarget>,
        probe: Arc<dyn HttpProbe>,
        status: Arc<StatusStore>,
        incidents: Arc<IncidentTracker>,
        flag: MonitoringFlag,
        interval: Duration,
    ) -> Self {
        Self {
            targets,
            probe,
            status,
            incidents,
            flag,
            interval,
        }
    }

    /// 플래그가 해제될 때까지 폴링 (블로킹)
    pub fn run(self) {
        info!("API 폴러 시작: {}개 엔드포인트", self.targets.len());
        while self.flag.is_active() {
            self.poll_once();
            if !self.flag.sleep_blocking(self.interval) {
                break;
            }
        }
        info!("API 폴러 종료");
    }

    /// 전체 엔드포인트 1회 점검. 점검한 개수 반환
    pub fn poll_once(&self) -> usize {
        let mut checked = 0;
        for target in &self.targets {
            if !self.flag.is_active() {
                break;
            }
            self.check(target);
            checked += 1;
        }
        checked
    }

    fn check(&self, target: &ApiTarget) {
        let source = format!("API {}", target.path);
        self.status
            .add_log(LogType::Info, &source, format!("Checking {}", target.url));

        match self.probe.probe(&target.url) {
            Ok(response) if response.status == HTTP_OK => {
                let ms = response.elapsed_ms();
                self.status.record_api_result(&target.path, true, Some(ms));
                self.status
                    .add_log(LogType::Success, &source, format!("OK ({ms:.1}ms)"));
            }
            Ok(response) => {
                let ms = response.elapsed_ms();
                self.status.record_api_result(&target.path, false, Some(ms));
                self.status.add_log(
                    LogType::Error,
                    &source,
                    format!("HTTP {} ({ms:.1}ms)", response.status),
                );
            }
            Err(e) => {
                let detail = e.detail();
                // 전송 실패는 보류 단계 없이 바로 확정
                self.incidents.record_confirmed(&source, &detail);
                self.status
                    .add_log(LogType::Error, &source, format!("Exception: {detail}"));
                self.status.record_api_result(&target.path, false, None);
                self.status.set_api_state(&target.path, EndpointState::Error);
            }
        }
    }
}
