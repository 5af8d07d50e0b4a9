//! 채팅 플랫폼 클라이언트 포트.
//!
//! 구현: `linkwatch-network` crate (Telegram Bot API)

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::chat::{Document, MessageHandle, OutgoingMessage};
use crate::models::session::ChatTarget;

/// 채팅 메시지 송신/편집
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// 새 메시지 전송
    async fn send_message(
        &self,
        target: &ChatTarget,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, ChatError>;

    /// 기존 메시지 편집
    async fn edit_message(
        &self,
        target: &ChatTarget,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;

    /// 파일 전송
    async fn send_document(
        &self,
        target: &ChatTarget,
        document: &Document,
    ) -> Result<MessageHandle, ChatError>;

    /// 콜백 쿼리 응답 (`alert`이면 팝업)
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChatError>;
}
