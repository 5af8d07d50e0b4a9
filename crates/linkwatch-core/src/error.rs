//! linkwatch 핵심 에러 타입.
//!
//! 어댑터는 외부 에러를 `map_err`로 [`CoreError`]에 매핑한다.
//! 채팅 플랫폼 호출 실패는 전달 정책이 종류별로 다르므로 [`ChatError`]로 분리한다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Session")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 스트림 연결/수신 실패.
    ///
    /// 메시지 원문이 그대로 장애 분류에 쓰이므로 접두어를 붙이지 않는다.
    #[error("{0}")]
    Stream(String),

    /// 세션 저장소 에러
    #[error("저장소 에러: {0}")]
    Store(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// 접두어 없는 원문 메시지 (대시보드/장애 분류용)
    pub fn detail(&self) -> String {
        match self {
            CoreError::Network(msg)
            | CoreError::Stream(msg)
            | CoreError::Store(msg)
            | CoreError::Config(msg)
            | CoreError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// 채팅 클라이언트 호출 실패 분류.
///
/// Telegram Bot API 오류 설명을 전달 정책 단위로 정규화한 것.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// 기존 메시지를 편집할 수 없음 (삭제됨, 너무 오래됨 등): 새로 전송해야 함
    #[error("편집 불가: {0}")]
    NotEditable(String),

    /// 내용이 동일해 편집이 무시됨
    #[error("변경 없음")]
    NotModified,

    /// 플랫폼 전송 한도 초과
    #[error("전송 한도 초과 (flood control), {retry_after_secs}초 후 재시도")]
    RateLimited {
        /// 플랫폼이 제시한 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 구독자에게 더 이상 도달할 수 없음 (chat not found, bot was blocked)
    #[error("구독자 도달 불가: {0}")]
    Unreachable(String),

    /// 콜백 쿼리가 만료됨 (query is too old)
    #[error("콜백 만료: {0}")]
    CallbackExpired(String),

    /// 전송 계층 실패 (연결, 타임아웃)
    #[error("network error: {0}")]
    Network(String),

    /// 요청 자체가 거부됨 (4xx Bad Request 등): 같은 요청은 다시 보내도 실패
    #[error("요청 거부: {0}")]
    Rejected(String),

    /// 그 외 API 오류 (5xx, 응답 파싱 실패)
    #[error("telegram api error: {0}")]
    Api(String),
}

impl ChatError {
    /// 재시도 대상 여부 (네트워크/서버 오류)
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Api(_))
    }
}
