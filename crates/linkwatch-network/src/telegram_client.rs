//! Telegram Bot API 클라이언트.
//!
//! `ChatClient` 포트 구현 + 명령 수신용 `getUpdates` long-polling.

use async_trait::async_trait;
use linkwatch_core::error::ChatError;
use linkwatch_core::models::chat::{
    ChatKind, Document, InboundEvent, Keyboard, MessageHandle, OutgoingMessage,
};
use linkwatch_core::models::session::ChatTarget;
use linkwatch_core::ports::chat::ChatClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::telegram_errors::classify_api_error;

/// long-polling 여유 시간 (요청 타임아웃 = 대기 + 여유)
const POLL_SLACK: Duration = Duration::from_secs(10);

// ============================================================
// Bot API 응답 타입
// ============================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message_thread_id: Option<i64>,
    #[serde(default)]
    is_topic_message: Option<bool>,
}

impl TgMessage {
    fn target(&self) -> ChatTarget {
        let thread_id = if self.is_topic_message.unwrap_or(false) {
            self.message_thread_id
        } else {
            None
        };
        ChatTarget {
            chat_id: self.chat.id,
            thread_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Option<String>,
}

impl TgChat {
    fn chat_kind(&self) -> ChatKind {
        match self.kind.as_str() {
            "private" => ChatKind::Private,
            "channel" => ChatKind::Channel,
            _ => ChatKind::Group,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TgUser {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TgUser {
    fn display_name(&self) -> String {
        let full = match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        };
        let full = full.trim().to_string();
        if !full.is_empty() {
            return full;
        }
        self.username
            .clone()
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgBotUser {
    #[serde(default)]
    username: Option<String>,
}

/// getUpdates 결과
#[derive(Debug, Default)]
pub struct UpdateBatch {
    /// 다음 요청에 쓸 offset (마지막 update_id + 1)
    pub next_offset: Option<i64>,
    /// 해석된 이벤트 (명령/콜백 외 업데이트는 제외)
    pub events: Vec<InboundEvent>,
}

// ============================================================
// 클라이언트
// ============================================================

/// Telegram Bot API 클라이언트: `ChatClient` 포트 구현
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// 새 클라이언트 생성
    ///
    /// `api_base`: 예) `https://api.telegram.org`
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// 응답 본문 해석
    async fn parse_response<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ChatError> {
        let body: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| ChatError::Api(format!("응답 파싱 실패: {e}")))?;

        if body.ok {
            return body
                .result
                .ok_or_else(|| ChatError::Api("result 필드 누락".to_string()));
        }

        let description = body.description.unwrap_or_default();
        let retry_after = body.parameters.and_then(|p| p.retry_after);
        Err(classify_api_error(body.error_code, &description, retry_after))
    }

    /// JSON 본문 메서드 호출
    async fn call<T: DeserializeOwned>(&self, method: &str, payload: Value) -> Result<T, ChatError> {
        self.call_with_timeout(method, payload, None).await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChatError> {
        let mut request = self.client.post(self.method_url(method)).json(&payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Self::parse_response(resp).await
    }

    /// 토큰 확인: 봇 사용자명 반환
    pub async fn get_me(&self) -> Result<String, ChatError> {
        let me: TgBotUser = self.call("getMe", json!({})).await?;
        Ok(me.username.unwrap_or_default())
    }

    /// 업데이트 long-polling
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<UpdateBatch, ChatError> {
        let mut payload = json!({
            "timeout": wait.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }

        let updates: Vec<TgUpdate> = self
            .call_with_timeout("getUpdates", payload, Some(wait + POLL_SLACK))
            .await?;

        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        let events = updates.into_iter().filter_map(parse_update).collect();

        Ok(UpdateBatch {
            next_offset,
            events,
        })
    }
}

/// 인라인 키보드 → reply_markup
fn reply_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.action.as_data() }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// 업데이트 → 명령/콜백 이벤트
fn parse_update(update: TgUpdate) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message.as_ref()?;
        return Some(InboundEvent::Callback {
            callback_id: query.id,
            target: message.target(),
            chat_kind: message.chat.chat_kind(),
            chat_title: message.chat.title.clone(),
            message: Some(MessageHandle(message.message_id)),
            from_name: query.from.display_name(),
            data: query.data.unwrap_or_default(),
        });
    }

    let message = update.message?;
    let text = message.text.as_deref()?.trim();
    let command = text.strip_prefix('/')?;
    let command = command
        .split_whitespace()
        .next()?
        .split('@')
        .next()?
        .to_lowercase();

    Some(InboundEvent::Command {
        target: message.target(),
        chat_kind: message.chat.chat_kind(),
        chat_title: message.chat.title.clone(),
        from_name: message
            .from
            .as_ref()
            .map(TgUser::display_name)
            .unwrap_or_else(|| "Unknown".to_string()),
        command,
    })
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_message(
        &self,
        target: &ChatTarget,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, ChatError> {
        let mut payload = json!({
            "chat_id": target.chat_id,
            "text": message.text,
            "parse_mode": message.parse_mode.as_api_str(),
            "disable_web_page_preview": true,
        });
        if let Some(thread_id) = target.thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
        if !message.keyboard.is_empty() {
            payload["reply_markup"] = reply_markup(&message.keyboard);
        }

        let sent: TgMessage = self.call("sendMessage", payload).await?;
        debug!("메시지 전송: chat={} id={}", target, sent.message_id);
        Ok(MessageHandle(sent.message_id))
    }

    async fn edit_message(
        &self,
        target: &ChatTarget,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        let mut payload = json!({
            "chat_id": target.chat_id,
            "message_id": handle.0,
            "text": message.text,
            "parse_mode": message.parse_mode.as_api_str(),
            "disable_web_page_preview": true,
        });
        if !message.keyboard.is_empty() {
            payload["reply_markup"] = reply_markup(&message.keyboard);
        }

        // 성공 시 result는 Message 또는 true
        let _: Value = self.call("editMessageText", payload).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        target: &ChatTarget,
        document: &Document,
    ) -> Result<MessageHandle, ChatError> {
        let part = reqwest::multipart::Part::bytes(document.content.clone())
            .file_name(document.file_name.clone());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", target.chat_id.to_string())
            .part("document", part);
        if let Some(thread_id) = target.thread_id {
            form = form.text("message_thread_id", thread_id.to_string());
        }
        if let Some(caption) = &document.caption {
            form = form.text("caption", caption.clone());
        }

        let resp = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        let sent: TgMessage = Self::parse_response(resp).await?;
        Ok(MessageHandle(sent.message_id))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChatError> {
        let mut payload = json!({
            "callback_query_id": callback_id,
            "show_alert": alert,
        });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }

        match self.call::<Value>("answerCallbackQuery", payload).await {
            Ok(_) => Ok(()),
            Err(ChatError::CallbackExpired(desc)) => {
                debug!("만료된 콜백 응답 무시: {desc}");
                Ok(())
            }
            Err(e) => {
                warn!("콜백 응답 실패: {e}");
                Err(e)
            }
        }
    }
}
