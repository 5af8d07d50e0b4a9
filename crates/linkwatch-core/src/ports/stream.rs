//! 스트림 연결 포트.
//!
//! 구현: `linkwatch-network` crate (tokio-tungstenite)

use async_trait::async_trait;

use crate::config::StreamEndpointConfig;
use crate::error::CoreError;

/// 스트림 연결 수립
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// 엔드포인트 연결. 실패 메시지는 장애 분류에 그대로 쓰인다.
    async fn connect(
        &self,
        endpoint: &StreamEndpointConfig,
    ) -> Result<Box<dyn StreamSession>, CoreError>;
}

/// 수립된 스트림 연결
#[async_trait]
pub trait StreamSession: Send {
    /// 다음 수신 단위 (텍스트 표현).
    ///
    /// `None`은 원격 정상 종료, `Err`은 연결 실패.
    async fn next_message(&mut self) -> Option<Result<String, CoreError>>;
}
