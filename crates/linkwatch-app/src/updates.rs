//! 채팅 업데이트 루프.
//!
//! `getUpdates` long-polling으로 명령/버튼 이벤트를 받아 명령 처리기에 넘긴다.
//! 이벤트는 받은 순서대로 하나씩 처리한다.

use linkwatch_core::error::ChatError;
use linkwatch_engine::commands::CommandHandler;
use linkwatch_network::telegram_client::TelegramClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;

/// 일반 오류 후 재요청 대기
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// 업데이트 수신 루프
pub struct UpdateLoop {
    client: Arc<TelegramClient>,
    handler: Arc<CommandHandler>,
    scheduler: Arc<Scheduler>,
    wait: Duration,
    offset: Option<i64>,
}

impl UpdateLoop {
    pub fn new(
        client: Arc<TelegramClient>,
        handler: Arc<CommandHandler>,
        scheduler: Arc<Scheduler>,
        wait: Duration,
    ) -> Self {
        Self {
            client,
            handler,
            scheduler,
            wait,
            offset: None,
        }
    }

    /// 종료 신호까지 수신
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("업데이트 수신 시작 (long-polling {}초)", self.wait.as_secs());
        loop {
            let result = tokio::select! {
                result = self.poll_once() => result,
                _ = shutdown_rx.changed() => break,
            };
            let backoff = match result {
                Ok(_) => continue,
                Err(ChatError::RateLimited { retry_after_secs }) => {
                    Duration::from_secs(retry_after_secs)
                }
                Err(e) => {
                    warn!("업데이트 수신 실패: {e}");
                    ERROR_BACKOFF
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.changed() => break,
            }
        }
        info!("업데이트 수신 종료");
    }

    /// 한 번 수신해 처리. 처리한 이벤트 수 반환
    pub async fn poll_once(&mut self) -> Result<usize, ChatError> {
        let batch = self.client.get_updates(self.offset, self.wait).await?;
        if let Some(next) = batch.next_offset {
            self.offset = Some(next);
        }

        let count = batch.events.len();
        for event in batch.events {
            let handled = self.handler.handle(event).await;
            if handled.monitoring_requested && self.scheduler.start_monitoring() {
                debug!("명령으로 감시 시작");
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Adapters, App};
    use crate::testing::{memory_store, FixedResource, IdleConnector, OkProbe};
    use linkwatch_core::config::AppConfig;
    use linkwatch_core::models::session::SessionKey;
    use linkwatch_engine::supervisor::ProcessExit;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn start_command_creates_session_and_starts_monitoring() {
        let mut server = mockito::Server::new_async().await;
        let updates = server
            .mock("POST", "/bot123:abc/getUpdates")
            .with_body(
                json!({
                    "ok": true,
                    "result": [{
                        "update_id": 10,
                        "message": {
                            "message_id": 1,
                            "chat": {"id": 42, "type": "private"},
                            "from": {"first_name": "Dana"},
                            "text": "/start@linkwatch_bot"
                        }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::PartialJson(json!({"chat_id": 42})))
            .with_body(
                json!({
                    "ok": true,
                    "result": {"message_id": 7, "chat": {"id": 42, "type": "private"}}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = Arc::new(
            TelegramClient::new(&server.url(), "123:abc", Duration::from_secs(5)).unwrap(),
        );
        let config = AppConfig::default_config();
        let (app, _restart_rx) = App::assemble(
            &config,
            Adapters {
                chat: client.clone(),
                store: Arc::new(memory_store()),
                connector: Arc::new(IdleConnector),
                probe: Arc::new(OkProbe),
                resource: Arc::new(FixedResource(None)),
                terminator: Arc::new(ProcessExit),
            },
        );

        let mut updates_loop = UpdateLoop::new(
            client,
            app.handler.clone(),
            app.scheduler.clone(),
            Duration::from_secs(0),
        );
        assert_eq!(updates_loop.poll_once().await.unwrap(), 1);
        assert_eq!(updates_loop.offset, Some(11));
        updates.assert_async().await;

        let session = app.registry.get(&SessionKey::User(42)).unwrap();
        assert_eq!(session.display_name, "Dana");
        assert!(app.scheduler.is_monitoring());

        app.scheduler.stop_monitoring().await;
    }
}
