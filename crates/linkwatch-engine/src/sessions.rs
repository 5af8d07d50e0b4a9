//! 구독 세션 레지스트리.
//!
//! 사용자 세션(`SessionKey::User`)과 설정 수신자 세션(`SessionKey::Broadcast`)을
//! 하나의 맵으로 관리하고, 전달 대상은 [`SessionRegistry::resolve_target`]으로만
//! 결정한다. 사용자 세션만 세션 저장소에 영속화된다.

use chrono::{DateTime, Utc};
use linkwatch_core::config::StoreConfig;
use linkwatch_core::error::CoreError;
use linkwatch_core::models::chat::MessageHandle;
use linkwatch_core::models::session::{ChatTarget, SessionKey, SessionView, StoredSession};
use linkwatch_core::ports::session_store::SessionStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::incidents::IncidentTracker;

/// 세션 저장소 장애 출처명
const STORE_SOURCE: &str = "Session Store";

/// 구독 세션
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub display_name: String,
    pub started_at: DateTime<Utc>,
    /// 마지막으로 전달한 메시지 (편집 대상)
    pub handle: Option<MessageHandle>,
    /// 포럼 토픽 ID
    pub thread_id: Option<i64>,
    /// 재시작 후 복원된 세션
    pub restored: bool,
    pub view: SessionView,
    /// 마지막으로 전달한 렌더링 결과의 해시
    pub last_hash: Option<Vec<u8>>,
    /// 마지막 전달 시도 시각
    pub last_edit: Option<Instant>,
    /// 전달 진행 중
    pub in_flight: bool,
    /// 직전 전달이 플랫폼에 거부됨 (확정 장애는 연속 거부 중 한 번만)
    pub rejected: bool,
}

impl Session {
    pub fn new(display_name: impl Into<String>, thread_id: Option<i64>) -> Self {
        Self {
            display_name: display_name.into(),
            started_at: Utc::now(),
            handle: None,
            thread_id,
            restored: false,
            view: SessionView::Dashboard,
            last_hash: None,
            last_edit: None,
            in_flight: false,
            rejected: false,
        }
    }

    fn restored_from(stored: StoredSession) -> Self {
        Self {
            started_at: stored.start_time,
            restored: true,
            ..Self::new(stored.user_name, stored.thread_id)
        }
    }

    fn to_stored(&self) -> StoredSession {
        StoredSession {
            user_name: self.display_name.clone(),
            start_time: self.started_at,
            thread_id: self.thread_id,
        }
    }

    /// 다음 전달을 강제 (중복 제거/스로틀 해제)
    pub fn invalidate(&mut self) {
        self.last_hash = None;
        self.last_edit = None;
    }
}

/// 구독 세션 레지스트리
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    store: Arc<dyn SessionStore>,
    incidents: Arc<IncidentTracker>,
    ttl_hours: u64,
    max_age_hours: u64,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        incidents: Arc<IncidentTracker>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            incidents,
            ttl_hours: config.ttl_hours,
            max_age_hours: config.max_age_hours,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn report_store_error(&self, action: &str, e: &CoreError) {
        warn!("세션 저장소 {action} 실패: {e}");
        self.incidents
            .record_confirmed(STORE_SOURCE, &format!("{action} failed: {}", e.detail()));
    }

    // ============================================================
    // 조회
    // ============================================================

    /// 세션 키 → 전달 대상
    pub fn resolve_target(&self, key: &SessionKey) -> Option<ChatTarget> {
        match key {
            SessionKey::User(chat_id) => {
                let sessions = self.sessions.read();
                let session = sessions.get(key)?;
                Some(ChatTarget {
                    chat_id: *chat_id,
                    thread_id: session.thread_id,
                })
            }
            SessionKey::Broadcast(target) => {
                self.sessions.read().contains_key(key).then_some(*target)
            }
        }
    }

    /// 채팅에서 온 이벤트가 가리키는 세션 (사용자 세션 우선)
    pub fn key_for(&self, target: &ChatTarget) -> Option<SessionKey> {
        let sessions = self.sessions.read();
        let user = SessionKey::User(target.chat_id);
        if sessions.contains_key(&user) {
            return Some(user);
        }
        let broadcast = SessionKey::Broadcast(*target);
        sessions.contains_key(&broadcast).then_some(broadcast)
    }

    pub fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.read().get(key).cloned()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn has_user_session(&self, chat_id: i64) -> bool {
        self.sessions.read().contains_key(&SessionKey::User(chat_id))
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.read().keys().copied().collect()
    }

    /// 대시보드 화면을 보고 있는 세션 (전달 주기 대상)
    pub fn dashboard_keys(&self) -> Vec<SessionKey> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, s)| s.view == SessionView::Dashboard)
            .map(|(k, _)| *k)
            .collect()
    }

    /// 세션 수정. 세션이 없으면 `None`
    pub fn update<R>(&self, key: &SessionKey, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.write().get_mut(key).map(f)
    }

    // ============================================================
    // 구독 / 해지
    // ============================================================

    /// 세션 생성 (같은 키의 기존 세션은 교체). 사용자 세션은 즉시 저장
    pub async fn subscribe(&self, key: SessionKey, session: Session) {
        let stored = session.to_stored();
        self.sessions.write().insert(key, session);
        info!("세션 시작: {key} ({})", stored.user_name);

        if let SessionKey::User(chat_id) = key {
            if let Err(e) = self.store.save(chat_id, &stored, self.ttl_hours).await {
                self.report_store_error("save", &e);
            }
        }
    }

    /// 세션 제거 (영속 사본 포함)
    pub async fn unsubscribe(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.write().remove(key).is_some();
        if removed {
            info!("세션 종료: {key}");
        }

        if let SessionKey::User(chat_id) = key {
            if let Err(e) = self.store.delete(*chat_id).await {
                self.report_store_error("delete", &e);
            }
        }
        removed
    }

    // ============================================================
    // 영속화
    // ============================================================

    /// 사용자 세션 전체 저장. 저장한 개수 반환
    pub async fn persist_all(&self) -> usize {
        let users: Vec<(i64, StoredSession)> = self
            .sessions
            .read()
            .iter()
            .filter_map(|(key, session)| match key {
                SessionKey::User(chat_id) => Some((*chat_id, session.to_stored())),
                SessionKey::Broadcast(_) => None,
            })
            .collect();

        let mut saved = 0;
        for (chat_id, stored) in &users {
            match self.store.save(*chat_id, stored, self.ttl_hours).await {
                Ok(()) => saved += 1,
                Err(e) => self.report_store_error("save", &e),
            }
        }
        info!("세션 {saved}/{}개 저장 ({})", users.len(), self.store.backend_name());
        saved
    }

    /// 저장소에서 세션 복원. 오래된 항목은 먼저 정리한다
    pub async fn restore(&self) -> usize {
        match self.store.sweep_older_than(self.max_age_hours).await {
            Ok(0) => {}
            Ok(swept) => info!("오래된 세션 {swept}개 정리"),
            Err(e) => self.report_store_error("sweep", &e),
        }

        let stored = match self.store.load_all().await {
            Ok(stored) => stored,
            Err(e) => {
                self.report_store_error("load", &e);
                return 0;
            }
        };

        let mut sessions = self.sessions.write();
        let mut restored = 0;
        for (chat_id, stored) in stored {
            debug!("세션 복원: {chat_id} ({})", stored.user_name);
            sessions.insert(SessionKey::User(chat_id), Session::restored_from(stored));
            restored += 1;
        }
        if restored > 0 {
            info!("세션 {restored}개 복원");
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use linkwatch_core::models::health::HealthCategory;

    fn fixture() -> Harness {
        Harness::new()
    }

    #[tokio::test]
    async fn user_session_is_persisted_and_resolved() {
        let f = fixture();
        f.registry
            .subscribe(SessionKey::User(-100), Session::new("Ops Topic 7", Some(7)))
            .await;

        assert_eq!(
            f.registry.resolve_target(&SessionKey::User(-100)),
            Some(ChatTarget::thread(-100, 7))
        );
        assert_eq!(f.store.saved.lock()[&-100].user_name, "Ops Topic 7");
        assert_eq!(f.registry.key_for(&ChatTarget::thread(-100, 7)), Some(SessionKey::User(-100)));
    }

    #[tokio::test]
    async fn broadcast_session_is_not_persisted() {
        let f = fixture();
        let key = SessionKey::Broadcast(ChatTarget::thread(-5, 3));
        f.registry.subscribe(key, Session::new("Configured", Some(3))).await;
        assert_eq!(f.registry.resolve_target(&key), Some(ChatTarget::thread(-5, 3)));
        assert_eq!(f.registry.persist_all().await, 0);
        assert!(f.store.saved.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_key_has_no_target() {
        let f = fixture();
        assert_eq!(f.registry.resolve_target(&SessionKey::User(1)), None);
        assert_eq!(
            f.registry
                .resolve_target(&SessionKey::Broadcast(ChatTarget::chat(1))),
            None
        );
    }

    #[tokio::test]
    async fn restore_marks_sessions_and_drops_stale() {
        let f = fixture();
        f.store.saved.lock().insert(
            1,
            StoredSession {
                user_name: "fresh".to_string(),
                start_time: Utc::now() - chrono::Duration::hours(2),
                thread_id: None,
            },
        );
        f.store.saved.lock().insert(
            2,
            StoredSession {
                user_name: "stale".to_string(),
                start_time: Utc::now() - chrono::Duration::hours(72),
                thread_id: None,
            },
        );

        assert_eq!(f.registry.restore().await, 1);
        let session = f.registry.get(&SessionKey::User(1)).unwrap();
        assert!(session.restored);
        assert!(session.handle.is_none());
        assert_eq!(session.view, SessionView::Dashboard);
        assert!(!f.registry.contains(&SessionKey::User(2)));
    }

    #[tokio::test]
    async fn store_failure_becomes_store_incident() {
        let f = fixture();
        f.store
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);
        f.registry
            .subscribe(SessionKey::User(9), Session::new("x", None))
            .await;

        // 저장 실패에도 메모리 세션은 유지
        assert!(f.registry.contains(&SessionKey::User(9)));
        let snapshot = f.status.snapshot();
        assert_eq!(snapshot.confirmed[0].source, "Session Store");
        assert_eq!(
            f.health.window_count_at(HealthCategory::Store, Utc::now()),
            1
        );
    }

    #[tokio::test]
    async fn dashboard_keys_skip_sub_views() {
        let f = fixture();
        f.registry
            .subscribe(SessionKey::User(1), Session::new("a", None))
            .await;
        f.registry
            .subscribe(SessionKey::User(2), Session::new("b", None))
            .await;
        f.registry
            .update(&SessionKey::User(2), |s| s.view = SessionView::Logs);

        assert_eq!(f.registry.dashboard_keys(), vec![SessionKey::User(1)]);
        assert!(f.registry.unsubscribe(&SessionKey::User(1)).await);
        assert!(f.registry.dashboard_keys().is_empty());
        assert!(!f.store.saved.lock().contains_key(&1));
    }
}
