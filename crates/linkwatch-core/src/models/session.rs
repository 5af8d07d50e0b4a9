//! 구독 세션 식별 및 영속 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// 메시지 전달 대상 (채팅 + 선택적 포럼 토픽)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatTarget {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
}

impl ChatTarget {
    /// 토픽 없는 대상
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: None,
        }
    }

    /// 포럼 토픽 대상
    pub fn thread(chat_id: i64, thread_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: Some(thread_id),
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(thread) => write!(f, "{}_{}", self.chat_id, thread),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

/// `-1001234567890_423` → (chat -1001234567890, thread 423), `-100123` → (chat -100123)
pub fn parse_chat_target(raw: &str) -> Result<ChatTarget, CoreError> {
    let raw = raw.trim();
    let invalid = || CoreError::Validation {
        field: "chat_id".to_string(),
        message: format!("채팅 ID 형식 오류: {raw}"),
    };

    match raw.split_once('_') {
        Some((chat, thread)) => {
            let chat_id = chat.parse().map_err(|_| invalid())?;
            let thread_id = thread.parse().map_err(|_| invalid())?;
            Ok(ChatTarget::thread(chat_id, thread_id))
        }
        None => Ok(ChatTarget::chat(raw.parse().map_err(|_| invalid())?)),
    }
}

/// 세션 키.
///
/// 대화형 사용자 세션은 채팅 ID로, 설정된 방송 수신자는 대상 전체로 식별된다.
/// 실제 전달 대상은 `SessionRegistry::resolve_target` 한 곳에서만 계산한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    /// /start로 등록한 사용자(또는 그룹) 세션
    User(i64),
    /// 설정 파일의 방송 수신자
    Broadcast(ChatTarget),
}

impl SessionKey {
    /// 채팅 ID
    pub fn chat_id(&self) -> i64 {
        match self {
            SessionKey::User(chat_id) => *chat_id,
            SessionKey::Broadcast(target) => target.chat_id,
        }
    }

    /// 영속 대상 여부 (사용자 세션만 저장)
    pub fn is_persistent(&self) -> bool {
        matches!(self, SessionKey::User(_))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::User(chat_id) => write!(f, "user:{chat_id}"),
            SessionKey::Broadcast(target) => write!(f, "broadcast:{target}"),
        }
    }
}

/// 세션이 현재 보고 있는 화면
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionView {
    /// 주기 갱신 대시보드
    #[default]
    Dashboard,
    Logs,
    AllErrors,
    ApiErrors,
    WsErrors,
    Help,
}

/// 저장소에 남기는 세션 필드.
///
/// 메시지 핸들은 재시작 후 무효이므로 저장하지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub thread_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_chat_id() {
        let target = parse_chat_target("-1001234567890").unwrap();
        assert_eq!(target, ChatTarget::chat(-1001234567890));
    }

    #[test]
    fn parse_forum_topic() {
        let target = parse_chat_target(" -1001234567890_423 ").unwrap();
        assert_eq!(target.chat_id, -1001234567890);
        assert_eq!(target.thread_id, Some(423));
        assert_eq!(target.to_string(), "-1001234567890_423");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_chat_target("general").is_err());
        assert!(parse_chat_target("-100_topic").is_err());
    }

    #[test]
    fn only_user_sessions_persist() {
        assert!(SessionKey::User(42).is_persistent());
        assert!(!SessionKey::Broadcast(ChatTarget::chat(42)).is_persistent());
        assert_eq!(SessionKey::Broadcast(ChatTarget::thread(-5, 7)).chat_id(), -5);
    }
}
