//! HTTP 점검 포트.
//!
//! 전용 OS 스레드의 폴러가 호출하므로 동기 인터페이스다.
//! 구현: `linkwatch-network` crate (reqwest::blocking)

use std::time::Duration;

use crate::error::CoreError;

/// 점검 응답
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResponse {
    /// HTTP 상태 코드
    pub status: u16,
    /// 응답까지 걸린 시간
    pub elapsed: Duration,
}

impl ProbeResponse {
    /// 응답 시간 (ms)
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// HTTP GET 점검
pub trait HttpProbe: Send + Sync {
    /// URL에 GET 요청. 전송 실패(연결, 타임아웃)만 `Err`.
    fn probe(&self, url: &str) -> Result<ProbeResponse, CoreError>;
}
