//! 헬스 범주 및 재시작 요청.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 헬스 카운터 범주
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthCategory {
    /// 네트워크 에러 (기본 범주)
    Network,
    /// 채팅 플랫폼 클라이언트 에러
    ChatClient,
    /// 스트림 감시 실패
    WatcherFailures,
    /// 세션 저장소 에러
    Store,
}

impl HealthCategory {
    /// 전체 범주
    pub const ALL: [HealthCategory; 4] = [
        HealthCategory::Network,
        HealthCategory::ChatClient,
        HealthCategory::WatcherFailures,
        HealthCategory::Store,
    ];

    /// 로그/알림용 이름
    pub fn label(&self) -> &'static str {
        match self {
            HealthCategory::Network => "network",
            HealthCategory::ChatClient => "telegram",
            HealthCategory::WatcherFailures => "websocket",
            HealthCategory::Store => "store",
        }
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 재시작 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartKind {
    /// 헬스 임계값 초과: 당일 재시작 횟수에 포함, 단계별 대기
    ErrorRecovery {
        /// 당일 몇 번째 재시작인지 (1부터)
        restart_number: u32,
    },
    /// 정기 점검: 횟수에 포함하지 않음
    Maintenance,
}

/// 재시작 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub kind: RestartKind,
    /// 사유 (예: "Too many network errors")
    pub reason: String,
    /// 종료 전 대기
    pub delay: Duration,
}
