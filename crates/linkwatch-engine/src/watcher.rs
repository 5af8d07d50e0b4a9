//! 스트림 감시기.
//!
//! 엔드포인트 하나에 대해 연결 → 수신 → 실패 시 대기 후 재연결을 반복한다.
//! 감시 플래그가 해제되면 진행 중인 연결/수신/대기를 즉시 끝내고 종료한다.
//! 어떤 실패도 프로세스를 끝내지 않고 상태/로그/장애 기록으로 바뀐다.

use linkwatch_core::config::StreamEndpointConfig;
use linkwatch_core::models::endpoint::EndpointState;
use linkwatch_core::models::log::LogType;
use linkwatch_core::ports::stream::StreamConnector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::incidents::IncidentTracker;
use crate::lifecycle::MonitoringFlag;
use crate::status_store::StatusStore;

/// 원격 정상 종료 메시지 (일시 장애로 분류됨)
const REMOTE_CLOSE: &str = "connection closed by remote";

/// 스트림 엔드포인트 감시기
pub struct StreamWatcher {
    endpoint: StreamEndpointConfig,
    connector: Arc<dyn StreamConnector>,
    status: Arc<StatusStore>,
    incidents: Arc<IncidentTracker>,
    flag: MonitoringFlag,
    reconnect_delay: Duration,
}

impl StreamWatcher {
    pub fn new(
        endpoint: StreamEndpointConfig,
        connector: Arc<dyn StreamConnector>,
        status: Arc<StatusStore>,
        incidents: Arc<IncidentTracker>,
        flag: MonitoringFlag,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            endpoint,
            connector,
            status,
            incidents,
            flag,
            reconnect_delay,
        }
    }

    fn name(&self) -> &str {
        &self.endpoint.name
    }

    /// 장애 출처명
    pub fn source(&self) -> String {
        format!("WebSocket {}", self.endpoint.name)
    }

    /// 플래그가 해제될 때까지 감시
    pub async fn run(self) {
        info!("스트림 감시 시작: {} ({})", self.name(), self.endpoint.url);

        while self.flag.is_active() {
            self.attempt().await;
            if !self.flag.sleep(self.reconnect_delay).await {
                break;
            }
        }

        self.status
            .set_stream_state(self.name(), EndpointState::Disconnected);
        info!("스트림 감시 종료: {}", self.name());
    }

    /// 연결 1회. 실패하거나 플래그가 해제되면 반환
    async fn attempt(&self) {
        let name = self.name();
        self.status.set_stream_state(name, EndpointState::Connecting);
        self.status.add_log(
            LogType::Connecting,
            name,
            format!("Connecting to {}", self.endpoint.url),
        );

        let connected = tokio::select! {
            result = self.connector.connect(&self.endpoint) => result,
            _ = self.flag.stopped() => return,
        };
        let mut session = match connected {
            Ok(session) => session,
            Err(e) => {
                self.fail(&e.detail());
                return;
            }
        };

        self.incidents.resolve_pending(&self.source());
        self.status.set_stream_state(name, EndpointState::Connected);
        self.status
            .add_log(LogType::Success, name, "Connected successfully");

        loop {
            let next = tokio::select! {
                next = session.next_message() => next,
                _ = self.flag.stopped() => {
                    debug!("감시 중단으로 연결 해제: {name}");
                    return;
                }
            };
            match next {
                Some(Ok(text)) => {
                    self.status.record_stream_message(name, &text);
                    let snippet: String = text
                        .chars()
                        .take(self.status.limits().snippet_chars)
                        .collect();
                    self.status
                        .add_log(LogType::Message, name, format!("Received: {snippet}"));
                }
                Some(Err(e)) => {
                    self.fail(&e.detail());
                    return;
                }
                None => {
                    self.fail(REMOTE_CLOSE);
                    return;
                }
            }
        }
    }

    fn fail(&self, message: &str) {
        let name = self.name();
        self.status
            .add_log(LogType::Error, name, format!("Error: {message}"));
        self.incidents.report_failure(&self.source(), message);
        self.status.record_stream_error(name, message);
    }
}
