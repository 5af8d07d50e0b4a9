//! 설정 수신자 알림.
//!
//! 재시작/점검 알림은 설정 파일의 수신자 채팅에만 보낸다. 같은 채팅에
//! 사용자 세션이 있으면 중복을 피하려 건너뛴다.

use futures::future::join_all;
use linkwatch_core::models::chat::OutgoingMessage;
use linkwatch_core::models::session::{parse_chat_target, ChatTarget, SessionKey};
use linkwatch_core::ports::chat::ChatClient;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::sessions::{Session, SessionRegistry};

/// 설정 예시에 들어 있는 자리표시자
const PLACEHOLDER: &str = "your_chat_id_here";

/// 수신자 문자열 목록 파싱. 형식이 잘못된 항목은 경고 후 제외
pub fn parse_recipients(raw: &[String]) -> Vec<ChatTarget> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != PLACEHOLDER)
        .filter_map(|s| match parse_chat_target(s) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!("수신자 무시: {e}");
                None
            }
        })
        .collect()
}

/// 설정 수신자 알림 발송기
pub struct Broadcaster {
    chat: Arc<dyn ChatClient>,
    registry: Arc<SessionRegistry>,
    recipients: Vec<ChatTarget>,
}

impl Broadcaster {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        registry: Arc<SessionRegistry>,
        recipients: Vec<ChatTarget>,
    ) -> Self {
        Self {
            chat,
            registry,
            recipients,
        }
    }

    pub fn recipients(&self) -> &[ChatTarget] {
        &self.recipients
    }

    /// 수신자 전체에 동시 발송. 성공 건수 반환
    pub async fn notify(&self, text: &str) -> usize {
        let targets: Vec<ChatTarget> = self
            .recipients
            .iter()
            .filter(|target| {
                let skip = self.registry.has_user_session(target.chat_id);
                if skip {
                    debug!("알림 생략 {target}: 사용자 세션 존재");
                }
                !skip
            })
            .copied()
            .collect();

        if targets.is_empty() {
            debug!("알림 대상 수신자 없음");
            return 0;
        }

        let message = OutgoingMessage::markdown(text);
        let results = join_all(
            targets
                .iter()
                .map(|target| self.chat.send_message(target, &message)),
        )
        .await;

        let mut sent = 0;
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(_) => sent += 1,
                Err(e) => warn!("알림 실패 {target}: {e}"),
            }
        }
        info!("수신자 알림 {sent}/{}건 전송", targets.len());
        sent
    }

    /// 사용자 세션이 없는 수신자마다 대시보드 세션 보장. 새로 만든 개수 반환
    pub async fn sync_dashboards(&self) -> usize {
        let mut created = 0;
        for target in &self.recipients {
            let key = SessionKey::Broadcast(*target);
            if self.registry.has_user_session(target.chat_id) {
                if self.registry.contains(&key) {
                    self.registry.unsubscribe(&key).await;
                }
                continue;
            }
            if self.registry.contains(&key) {
                continue;
            }
            let session = Session::new(format!("Configured chat {target}"), target.thread_id);
            self.registry.subscribe(key, session).await;
            created += 1;
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use linkwatch_core::error::ChatError;
    use std::sync::atomic::Ordering;

    fn broadcaster(h: &Harness, raw: &[&str]) -> Broadcaster {
        let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        Broadcaster::new(h.chat.clone(), h.registry.clone(), parse_recipients(&raw))
    }

    #[test]
    fn recipients_skip_placeholder_and_garbage() {
        let raw = vec![
            "-1001_42".to_string(),
            "your_chat_id_here".to_string(),
            "general".to_string(),
            " 77 ".to_string(),
        ];
        assert_eq!(
            parse_recipients(&raw),
            vec![ChatTarget::thread(-1001, 42), ChatTarget::chat(77)]
        );
    }

    #[tokio::test]
    async fn notify_skips_chats_with_user_session() {
        let h = Harness::new();
        let b = broadcaster(&h, &["-1001_42", "77"]);
        h.registry
            .subscribe(SessionKey::User(77), Session::new("ops", None))
            .await;

        assert_eq!(b.notify("🔄 *Bot Restart Scheduled*").await, 1);
        let delivered = h.chat.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, ChatTarget::thread(-1001, 42));
    }

    #[tokio::test]
    async fn notify_counts_only_successes() {
        let h = Harness::new();
        let b = broadcaster(&h, &["1", "2"]);
        h.chat.fail_next([ChatError::Network("timeout".into())]);
        assert_eq!(b.notify("hello").await, 1);
        assert_eq!(h.chat.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dashboard_sessions_follow_user_sessions() {
        let h = Harness::new();
        let b = broadcaster(&h, &["-5_3", "9"]);
        assert_eq!(b.sync_dashboards().await, 2);
        assert_eq!(b.sync_dashboards().await, 0);
        // 방송 세션은 저장하지 않는다
        assert!(h.store.saved.lock().is_empty());

        h.registry
            .subscribe(SessionKey::User(9), Session::new("ops", None))
            .await;
        b.sync_dashboards().await;
        assert!(!h
            .registry
            .contains(&SessionKey::Broadcast(ChatTarget::chat(9))));
        assert!(h
            .registry
            .contains(&SessionKey::Broadcast(ChatTarget::thread(-5, 3))));
    }
}
