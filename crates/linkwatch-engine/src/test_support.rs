//! 엔진 테스트 공용 목(mock) 포트와 조립 헬퍼

use async_trait::async_trait;
use chrono::Utc;
use linkwatch_core::config::{AppConfig, HealthConfig};
use linkwatch_core::error::{ChatError, CoreError};
use linkwatch_core::models::chat::{Document, MessageHandle, OutgoingMessage};
use linkwatch_core::models::health::RestartRequest;
use linkwatch_core::models::session::{ChatTarget, StoredSession};
use linkwatch_core::ports::chat::ChatClient;
use linkwatch_core::ports::session_store::SessionStore;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::health::HealthMonitor;
use crate::incidents::IncidentTracker;
use crate::render::{RenderContext, Renderer};
use crate::sessions::SessionRegistry;
use crate::status_store::{StatusStore, StoreLimits};

/// 메모리 세션 저장소
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<HashMap<i64, StoredSession>>,
    pub fail: AtomicBool,
}

impl MemoryStore {
    fn check(&self) -> Result<(), CoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Store("disk I/O error".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, chat_id: i64, session: &StoredSession, _: u64) -> Result<(), CoreError> {
        self.check()?;
        self.saved.lock().insert(chat_id, session.clone());
        Ok(())
    }

    async fn load(&self, chat_id: i64) -> Result<Option<StoredSession>, CoreError> {
        self.check()?;
        Ok(self.saved.lock().get(&chat_id).cloned())
    }

    async fn load_all(&self) -> Result<HashMap<i64, StoredSession>, CoreError> {
        self.check()?;
        Ok(self.saved.lock().clone())
    }

    async fn delete(&self, chat_id: i64) -> Result<bool, CoreError> {
        self.check()?;
        Ok(self.saved.lock().remove(&chat_id).is_some())
    }

    async fn sweep_older_than(&self, max_age_hours: u64) -> Result<usize, CoreError> {
        self.check()?;
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours as i64);
        let mut saved = self.saved.lock();
        let before = saved.len();
        saved.retain(|_, s| s.start_time >= cutoff);
        Ok(before - saved.len())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// 호출 횟수를 세고, 예약된 오류를 순서대로 돌려주는 채팅 클라이언트
#[derive(Default)]
pub struct MockChat {
    pub sends: AtomicU32,
    pub edits: AtomicU32,
    pub documents: AtomicU32,
    pub answers: Mutex<Vec<(Option<String>, bool)>>,
    /// 전송/편집된 메시지 (대상, 본문)
    pub delivered: Mutex<Vec<(ChatTarget, String)>>,
    /// 다음 send/edit 호출이 돌려줄 오류
    pub script: Mutex<VecDeque<ChatError>>,
    next_handle: AtomicI64,
}

impl MockChat {
    pub fn fail_next(&self, errors: impl IntoIterator<Item = ChatError>) {
        self.script.lock().extend(errors);
    }

    pub fn network_calls(&self) -> u32 {
        self.sends.load(Ordering::SeqCst) + self.edits.load(Ordering::SeqCst)
    }

    fn scripted(&self) -> Result<(), ChatError> {
        match self.script.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn send_message(
        &self,
        target: &ChatTarget,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, ChatError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.scripted()?;
        self.delivered.lock().push((*target, message.text.clone()));
        Ok(MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 100))
    }

    async fn edit_message(
        &self,
        target: &ChatTarget,
        _handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        self.scripted()?;
        self.delivered.lock().push((*target, message.text.clone()));
        Ok(())
    }

    async fn send_document(
        &self,
        _target: &ChatTarget,
        _document: &Document,
    ) -> Result<MessageHandle, ChatError> {
        self.documents.fetch_add(1, Ordering::SeqCst);
        Ok(MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 100))
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChatError> {
        self.answers.lock().push((text.map(str::to_string), alert));
        Ok(())
    }
}

/// 엔진 구성 요소 묶음
pub struct Harness {
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
    pub chat: Arc<MockChat>,
    pub status: Arc<StatusStore>,
    pub health: Arc<HealthMonitor>,
    pub incidents: Arc<IncidentTracker>,
    pub registry: Arc<SessionRegistry>,
    pub renderer: Arc<Renderer>,
    pub restart_rx: mpsc::UnboundedReceiver<RestartRequest>,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = AppConfig::default_config();
        config.api.endpoints = vec!["/api/channels".to_string()];
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let chat = Arc::new(MockChat::default());
        let status = Arc::new(StatusStore::with_endpoints(
            vec!["Price".to_string()],
            config.api.endpoints.clone(),
            StoreLimits::default(),
        ));
        let (tx, restart_rx) = mpsc::unbounded_channel();
        let health = Arc::new(HealthMonitor::new(HealthConfig::default(), tx));
        let incidents = Arc::new(IncidentTracker::new(
            status.clone(),
            health.clone(),
            config.incidents.grace_period(),
            config.incidents.message_limit,
        ));
        let registry = Arc::new(SessionRegistry::new(
            store.clone(),
            incidents.clone(),
            &config.store,
        ));
        let renderer = Arc::new(Renderer::new(RenderContext::from_config(&config)));
        Self {
            config,
            store,
            chat,
            status,
            health,
            incidents,
            registry,
            renderer,
            restart_rx,
        }
    }
}
