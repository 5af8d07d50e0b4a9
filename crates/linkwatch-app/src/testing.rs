//! 앱 테스트용 가짜 어댑터

use async_trait::async_trait;
use linkwatch_core::config::StreamEndpointConfig;
use linkwatch_core::error::{ChatError, CoreError};
use linkwatch_core::models::chat::{Document, MessageHandle, OutgoingMessage};
use linkwatch_core::models::session::ChatTarget;
use linkwatch_core::ports::chat::ChatClient;
use linkwatch_core::ports::http_probe::{HttpProbe, ProbeResponse};
use linkwatch_core::ports::resource::ResourceProbe;
use linkwatch_core::ports::stream::{StreamConnector, StreamSession};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

pub use linkwatch_storage::sqlite::SqliteSessionStore;

/// 보낸 메시지를 기록하는 채팅 클라이언트
#[derive(Default)]
pub struct RecordingChat {
    pub sends: AtomicU32,
    pub edits: AtomicU32,
    pub texts: Mutex<Vec<(ChatTarget, String)>>,
    next_handle: AtomicI64,
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(
        &self,
        target: &ChatTarget,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, ChatError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push((*target, message.text.clone()));
        Ok(MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn edit_message(
        &self,
        target: &ChatTarget,
        _handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push((*target, message.text.clone()));
        Ok(())
    }

    async fn send_document(
        &self,
        _target: &ChatTarget,
        _document: &Document,
    ) -> Result<MessageHandle, ChatError> {
        Ok(MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        _text: Option<&str>,
        _alert: bool,
    ) -> Result<(), ChatError> {
        Ok(())
    }
}

/// 연결 후 아무것도 보내지 않는 스트림
pub struct IdleConnector;

struct IdleSession;

#[async_trait]
impl StreamConnector for IdleConnector {
    async fn connect(
        &self,
        _endpoint: &StreamEndpointConfig,
    ) -> Result<Box<dyn StreamSession>, CoreError> {
        Ok(Box::new(IdleSession))
    }
}

#[async_trait]
impl StreamSession for IdleSession {
    async fn next_message(&mut self) -> Option<Result<String, CoreError>> {
        std::future::pending().await
    }
}

/// 항상 200을 돌려주는 점검기
pub struct OkProbe;

impl HttpProbe for OkProbe {
    fn probe(&self, _url: &str) -> Result<ProbeResponse, CoreError> {
        Ok(ProbeResponse {
            status: 200,
            elapsed: Duration::from_millis(12),
        })
    }
}

/// 고정 메모리 사용량
pub struct FixedResource(pub Option<u64>);

impl ResourceProbe for FixedResource {
    fn resident_memory_bytes(&self) -> Option<u64> {
        self.0
    }
}

/// 인메모리 SQLite 세션 저장소
pub fn memory_store() -> SqliteSessionStore {
    SqliteSessionStore::open_in_memory().unwrap()
}
