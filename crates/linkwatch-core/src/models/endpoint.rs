//! 감시 대상 엔드포인트 상태.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// 엔드포인트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// 스트림 연결 (WebSocket / Socket.IO)
    WebSocket,
    /// HTTP API
    Api,
}

/// 엔드포인트 상태값.
///
/// 스트림은 한 번의 연결 시도 안에서 WAITING → CONNECTING → CONNECTED →
/// ACTIVE | ERROR 순으로 움직이고, 재연결마다 CONNECTING으로 돌아간다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointState {
    Waiting,
    Connecting,
    Connected,
    Active,
    Success,
    Error,
    Disconnected,
}

impl EndpointState {
    /// 대문자 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointState::Waiting => "WAITING",
            EndpointState::Connecting => "CONNECTING",
            EndpointState::Connected => "CONNECTED",
            EndpointState::Active => "ACTIVE",
            EndpointState::Success => "SUCCESS",
            EndpointState::Error => "ERROR",
            EndpointState::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 엔드포인트 하나의 집계 상태.
///
/// 해당 watcher/poller만 변경하고, 렌더링은 스냅샷 복제본을 읽는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    /// 표시 이름 (스트림 이름 또는 API 경로)
    pub name: String,
    /// 종류
    pub kind: EndpointKind,
    /// 현재 상태
    pub state: EndpointState,
    /// 마지막 상태 변경 시각
    pub last_update: DateTime<Utc>,
    /// 수신 메시지 수 (스트림)
    pub message_count: u64,
    /// 성공 횟수 (API)
    pub success_count: u64,
    /// 실패 횟수 (API)
    pub error_count: u64,
    /// 최근 응답 시간 (ms, 최대 `response_window`개)
    pub response_times: VecDeque<f64>,
    /// 마지막 응답 시간 (ms)
    pub last_response_ms: Option<f64>,
    /// 마지막 수신 메시지 앞부분
    pub last_message: Option<String>,
}

impl EndpointStatus {
    /// WAITING 상태로 생성
    pub fn new(name: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: EndpointState::Waiting,
            last_update: Utc::now(),
            message_count: 0,
            success_count: 0,
            error_count: 0,
            response_times: VecDeque::new(),
            last_response_ms: None,
            last_message: None,
        }
    }

    /// 평균 응답 시간 (ms)
    pub fn average_response_ms(&self) -> Option<f64> {
        if self.response_times.is_empty() {
            return None;
        }
        Some(self.response_times.iter().sum::<f64>() / self.response_times.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_empty_window_is_none() {
        let status = EndpointStatus::new("/api/channels", EndpointKind::Api);
        assert_eq!(status.state, EndpointState::Waiting);
        assert!(status.average_response_ms().is_none());
    }

    #[test]
    fn average_response() {
        let mut status = EndpointStatus::new("/api/channels", EndpointKind::Api);
        status.response_times.extend([100.0, 200.0, 300.0]);
        assert_eq!(status.average_response_ms(), Some(200.0));
    }

    #[test]
    fn state_serializes_uppercase() {
        let json = serde_json::to_string(&EndpointState::Disconnected).unwrap();
        assert_eq!(json, "\"DISCONNECTED\"");
        assert_eq!(EndpointState::Connecting.to_string(), "CONNECTING");
    }
}
