//! 장애 기록 모델: 보류 장애, 확정 장애, 보류 이력.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 회복 가능성이 있어 유예 중인 장애.
///
/// 같은 소스에 대해 하나만 존재하며, 회복되거나 유예 시간이 지나 확정되면 제거된다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingError {
    /// 장애 소스 (예: "WebSocket Price Feed")
    pub source: String,
    /// 에러 메시지 (최대 100자)
    pub message: String,
    /// 최초 관측 시각
    pub first_seen: DateTime<Utc>,
}

impl PendingError {
    /// `now` 기준 경과 시간
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.first_seen).to_std().unwrap_or_default()
    }
}

/// 확정 장애 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmedErrorKind {
    /// 즉시 확정 (회복 불가 유형)
    Immediate,
    /// 유예 시간 초과로 승격
    Promoted,
}

/// 사용자에게 노출되는 확정 장애
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedError {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
    pub kind: ConfirmedErrorKind,
}

/// 보류 이력 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    /// 유예 중
    Pending,
    /// 회복됨
    Resolved,
    /// 확정 장애로 승격됨
    Confirmed,
}

/// 보류 장애 수명주기 이력 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingHistoryEntry {
    /// 보류 등록 시각
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
    pub status: PendingStatus,
    /// 회복까지 걸린 시간 (Resolved만)
    pub resolution: Option<Duration>,
}
