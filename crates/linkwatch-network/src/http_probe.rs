//! 동기 HTTP 점검 클라이언트.
//!
//! `HttpProbe` 포트 구현. 폴러 전용 스레드에서 호출되므로 `reqwest::blocking`을 쓴다.
//! tokio 런타임 안에서 생성/해제하면 안 된다.

use linkwatch_core::error::CoreError;
use linkwatch_core::ports::http_probe::{HttpProbe, ProbeResponse};
use std::time::{Duration, Instant};
use tracing::debug;

/// blocking reqwest 점검기: `HttpProbe` 포트 구현
pub struct BlockingHttpProbe {
    client: reqwest::blocking::Client,
}

impl BlockingHttpProbe {
    /// 새 점검기 생성
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self { client })
    }
}

/// reqwest 에러를 장애 분류가 가능한 메시지로 변환
fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        return "request timeout".to_string();
    }
    if e.is_connect() {
        let cause = std::error::Error::source(e)
            .map(|s| s.to_string())
            .unwrap_or_default();
        return format!("connection failed: {cause}").trim_end_matches(": ").to_string();
    }
    e.to_string()
}

impl HttpProbe for BlockingHttpProbe {
    fn probe(&self, url: &str) -> Result<ProbeResponse, CoreError> {
        let started = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| CoreError::Network(describe_error(&e)))?;
        let elapsed = started.elapsed();
        let status = resp.status().as_u16();
        debug!("점검 응답: {url} → {status} ({elapsed:?})");

        Ok(ProbeResponse { status, elapsed })
    }
}
