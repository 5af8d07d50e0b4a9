//! 운영자 명령 처리.
//!
//! 채팅 명령(`/start`, `/status`, `/clear`, `/help`, `/stop`)과 인라인 버튼을
//! 렌더링/상태 변경 연산으로 연결하는 얇은 계층이다.

use chrono::Utc;
use linkwatch_core::config::CommandConfig;
use linkwatch_core::error::ChatError;
use linkwatch_core::models::chat::{
    CallbackAction, ChatKind, InboundEvent, MessageHandle, OutgoingMessage,
};
use linkwatch_core::models::log::LogType;
use linkwatch_core::models::session::{ChatTarget, SessionKey, SessionView};
use linkwatch_core::ports::chat::ChatClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::export::{errors_document, logs_document};
use crate::incidents::IncidentTracker;
use crate::lifecycle::MonitoringFlag;
use crate::render::{fingerprint, Renderer};
use crate::sessions::{Session, SessionRegistry};
use crate::status_store::StatusStore;

const NO_SESSION_REPLY: &str =
    "❌ You don't have an active monitoring session.\nUse /start to begin monitoring.";
const NO_SESSION_ALERT: &str = "❌ No active session.";
const FAILURE_ALERT: &str = "❌ Error processing request. Please try again.";

/// 이벤트 처리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandledEvent {
    /// 세션이 생겼고 감시가 꺼져 있음 (호출자가 감시를 시작해야 함)
    pub monitoring_requested: bool,
}

/// 콜백 응답
struct Answer {
    text: Option<String>,
    alert: bool,
}

impl Answer {
    fn silent() -> Self {
        Self {
            text: None,
            alert: false,
        }
    }

    fn toast(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            alert: false,
        }
    }

    fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            alert: true,
        }
    }
}

/// 쿨다운 설정
#[derive(Debug, Clone, Copy)]
pub struct Cooldowns {
    pub refresh: Duration,
    pub clear: Duration,
}

impl From<&CommandConfig> for Cooldowns {
    fn from(config: &CommandConfig) -> Self {
        Self {
            refresh: Duration::from_secs(config.refresh_cooldown_secs),
            clear: Duration::from_secs(config.clear_cooldown_secs),
        }
    }
}

/// 명령/버튼 처리기
pub struct CommandHandler {
    chat: Arc<dyn ChatClient>,
    registry: Arc<SessionRegistry>,
    status: Arc<StatusStore>,
    incidents: Arc<IncidentTracker>,
    dispatcher: Arc<Dispatcher>,
    renderer: Arc<Renderer>,
    flag: MonitoringFlag,
    cooldowns: Cooldowns,
}

impl CommandHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        registry: Arc<SessionRegistry>,
        status: Arc<StatusStore>,
        incidents: Arc<IncidentTracker>,
        dispatcher: Arc<Dispatcher>,
        renderer: Arc<Renderer>,
        flag: MonitoringFlag,
        cooldowns: Cooldowns,
    ) -> Self {
        Self {
            chat,
            registry,
            status,
            incidents,
            dispatcher,
            renderer,
            flag,
            cooldowns,
        }
    }

    /// 수신 이벤트 처리
    pub async fn handle(&self, event: InboundEvent) -> HandledEvent {
        match event {
            InboundEvent::Command {
                target,
                chat_kind,
                chat_title,
                from_name,
                command,
            } => {
                let display_name = display_name(chat_kind, chat_title.as_deref(), &from_name, &target);
                self.on_command(&command, target, display_name).await
            }
            InboundEvent::Callback {
                callback_id,
                target,
                chat_kind,
                chat_title,
                message,
                from_name,
                data,
            } => {
                let display_name = display_name(chat_kind, chat_title.as_deref(), &from_name, &target);
                self.on_callback(&callback_id, target, message, display_name, &data)
                    .await
            }
        }
    }

    // ============================================================
    // 명령
    // ============================================================

    async fn on_command(&self, command: &str, target: ChatTarget, display_name: String) -> HandledEvent {
        debug!("명령 수신 /{command} ({target})");
        let key = SessionKey::User(target.chat_id);

        let result = match command {
            "start" | "monitor" => {
                let greeting = self.renderer.start_greeting(&display_name, &target);
                if let Err(e) = self.chat.send_message(&target, &greeting).await {
                    warn!("시작 인사 전송 실패 {target}: {e}");
                }
                return self.start_session(target, display_name).await;
            }
            "status" => {
                if self.registry.contains(&key) {
                    self.registry.update(&key, |s| {
                        s.view = SessionView::Dashboard;
                        s.handle = None;
                    });
                    self.dispatcher.force_deliver(key).await;
                    Ok(())
                } else {
                    self.reply(&target, NO_SESSION_REPLY).await
                }
            }
            "clear" => {
                if self.registry.contains(&key) {
                    let cleared = self.incidents.clear_confirmed();
                    info!("에러 기록 {cleared}건 초기화 ({target})");
                    self.reply(&target, "✅ Error history cleared!\nRecent errors list has been reset.")
                        .await
                } else {
                    self.reply(&target, NO_SESSION_REPLY).await
                }
            }
            "help" => self
                .chat
                .send_message(&target, &self.renderer.help())
                .await
                .map(|_| ()),
            "stop" => {
                if self.registry.unsubscribe(&key).await {
                    self.status.add_log(
                        LogType::System,
                        "Bot",
                        format!("Session {target} stopped monitoring"),
                    );
                    self.reply(&target, "🛑 Monitoring session stopped.\nUse /start to begin again.")
                        .await
                } else {
                    self.reply(&target, NO_SESSION_REPLY).await
                }
            }
            other => {
                debug!("알 수 없는 명령 무시: /{other}");
                Ok(())
            }
        };

        if let Err(e) = result {
            self.incidents
                .record_confirmed(&format!("Command /{command}"), &e.to_string());
        }
        HandledEvent::default()
    }

    async fn reply(&self, target: &ChatTarget, text: &str) -> Result<(), ChatError> {
        self.chat
            .send_message(target, &OutgoingMessage::markdown(text))
            .await
            .map(|_| ())
    }

    /// 사용자 세션 생성 (같은 채팅의 기존 세션은 교체)
    async fn start_session(&self, target: ChatTarget, display_name: String) -> HandledEvent {
        let key = SessionKey::User(target.chat_id);
        self.registry
            .subscribe(key, Session::new(display_name.clone(), target.thread_id))
            .await;
        self.status.add_log(
            LogType::System,
            "Bot",
            format!("User {display_name} started monitoring"),
        );
        HandledEvent {
            monitoring_requested: !self.flag.is_active(),
        }
    }

    // ============================================================
    // 버튼
    // ============================================================

    async fn on_callback(
        &self,
        callback_id: &str,
        target: ChatTarget,
        message: Option<MessageHandle>,
        display_name: String,
        data: &str,
    ) -> HandledEvent {
        let Some(action) = CallbackAction::from_data(data) else {
            debug!("알 수 없는 버튼 무시: {data}");
            self.answer(callback_id, Answer::silent()).await;
            return HandledEvent::default();
        };

        if action == CallbackAction::Start {
            self.answer(callback_id, Answer::silent()).await;
            return self.start_session(target, display_name).await;
        }

        let answer = match self.on_action(action, target, message).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("버튼 처리 실패 {data} ({target}): {e}");
                self.incidents
                    .record_confirmed(&format!("Button {data}"), &e.to_string());
                Answer::alert(FAILURE_ALERT)
            }
        };
        self.answer(callback_id, answer).await;
        HandledEvent::default()
    }

    async fn answer(&self, callback_id: &str, answer: Answer) {
        if let Err(e) = self
            .chat
            .answer_callback(callback_id, answer.text.as_deref(), answer.alert)
            .await
        {
            debug!("콜백 응답 실패: {e}");
        }
    }

    async fn on_action(
        &self,
        action: CallbackAction,
        target: ChatTarget,
        message: Option<MessageHandle>,
    ) -> Result<Answer, ChatError> {
        let key = self.registry.key_for(&target);

        match (action, key) {
            (CallbackAction::Help, key) => {
                self.present(key, &target, message, SessionView::Help).await?;
                Ok(Answer::silent())
            }
            (CallbackAction::Back, None) => {
                self.edit_or_send(&target, message, &self.renderer.welcome())
                    .await?;
                Ok(Answer::silent())
            }
            (_, None) => Ok(Answer::alert(NO_SESSION_ALERT)),
            (CallbackAction::Refresh, Some(key)) => {
                if let Some(remaining) = self.cooldown_remaining(&key, self.cooldowns.refresh) {
                    return Ok(Answer::alert(format!(
                        "⏳ Please wait {:.1}s before refreshing again",
                        remaining.as_secs_f64()
                    )));
                }
                self.show_dashboard(key, message).await;
                Ok(Answer::toast("🔄 Status refreshed!"))
            }
            (CallbackAction::Clear, Some(key)) => {
                if let Some(remaining) = self.cooldown_remaining(&key, self.cooldowns.clear) {
                    return Ok(Answer::alert(format!(
                        "⏳ Please wait {:.1}s before clearing again",
                        remaining.as_secs_f64()
                    )));
                }
                self.incidents.clear_confirmed();
                self.show_dashboard(key, message).await;
                Ok(Answer::toast("✅ Error history cleared!"))
            }
            (CallbackAction::Back, Some(key)) => {
                self.show_dashboard(key, message).await;
                Ok(Answer::silent())
            }
            (CallbackAction::Logs, key) => {
                self.present(key, &target, message, SessionView::Logs).await?;
                Ok(Answer::silent())
            }
            (CallbackAction::AllErrors, key) => {
                self.present(key, &target, message, SessionView::AllErrors)
                    .await?;
                Ok(Answer::silent())
            }
            (CallbackAction::ApiErrors, key) => {
                self.present(key, &target, message, SessionView::ApiErrors)
                    .await?;
                Ok(Answer::silent())
            }
            (CallbackAction::WsErrors, key) => {
                self.present(key, &target, message, SessionView::WsErrors)
                    .await?;
                Ok(Answer::silent())
            }
            (CallbackAction::DownloadLogs, Some(key)) => {
                let document = logs_document(
                    &self.renderer.context().title,
                    &self.status.logs(),
                    Utc::now(),
                );
                match self.chat.send_document(&target, &document).await {
                    Ok(_) => {
                        self.detach(&key);
                        Ok(Answer::toast("📥 Logs file sent!"))
                    }
                    Err(e) => {
                        warn!("로그 파일 전송 실패 {target}: {e}");
                        Ok(Answer::alert("❌ Error generating logs file"))
                    }
                }
            }
            (CallbackAction::DownloadErrors, Some(key)) => {
                let document = errors_document(
                    &self.renderer.context().title,
                    &self.status.snapshot(),
                    Utc::now(),
                );
                match self.chat.send_document(&target, &document).await {
                    Ok(_) => {
                        self.detach(&key);
                        Ok(Answer::toast("📥 Errors file sent!"))
                    }
                    Err(e) => {
                        warn!("에러 파일 전송 실패 {target}: {e}");
                        Ok(Answer::alert("❌ Error generating errors file"))
                    }
                }
            }
            (CallbackAction::Start, Some(_)) => Ok(Answer::silent()),
        }
    }

    /// 마지막 전달 후 쿨다운이 남아 있으면 남은 시간
    fn cooldown_remaining(&self, key: &SessionKey, cooldown: Duration) -> Option<Duration> {
        let last = self.registry.get(key)?.last_edit?;
        let elapsed = last.elapsed();
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// 대시보드로 복귀해 클릭된 메시지에 즉시 전달
    async fn show_dashboard(&self, key: SessionKey, message: Option<MessageHandle>) {
        self.registry.update(&key, |s| {
            s.view = SessionView::Dashboard;
            if message.is_some() {
                s.handle = message;
            }
        });
        self.dispatcher.force_deliver(key).await;
    }

    /// 파일 전송 후 다음 대시보드는 새 메시지로
    fn detach(&self, key: &SessionKey) {
        self.registry.update(key, |s| {
            s.handle = None;
            s.invalidate();
        });
    }

    /// 보조 화면 표시. 세션이 있으면 화면 전환을 기록한다 (전달 주기에서 제외됨)
    async fn present(
        &self,
        key: Option<SessionKey>,
        target: &ChatTarget,
        message: Option<MessageHandle>,
        view: SessionView,
    ) -> Result<(), ChatError> {
        let session = key
            .and_then(|k| self.registry.get(&k))
            .unwrap_or_else(|| Session::new("", target.thread_id));
        let snapshot = self.status.snapshot();
        let logs = if view == SessionView::Logs {
            self.status.logs()
        } else {
            Vec::new()
        };
        let rendered = self.renderer.view(
            view,
            &snapshot,
            &logs,
            target,
            &session,
            self.registry.len(),
        );

        let handle = self.edit_or_send(target, message, &rendered).await?;
        if let Some(key) = key {
            let hash = fingerprint(&rendered);
            self.registry.update(&key, |s| {
                s.view = view;
                s.handle = Some(handle);
                s.last_hash = Some(hash);
                s.last_edit = Some(Instant::now());
            });
        }
        Ok(())
    }

    async fn edit_or_send(
        &self,
        target: &ChatTarget,
        message: Option<MessageHandle>,
        rendered: &OutgoingMessage,
    ) -> Result<MessageHandle, ChatError> {
        if let Some(handle) = message {
            match self.chat.edit_message(target, handle, rendered).await {
                Ok(()) | Err(ChatError::NotModified) => return Ok(handle),
                Err(ChatError::NotEditable(_)) | Err(ChatError::Rejected(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.chat.send_message(target, rendered).await
    }
}

/// 채팅 종류별 세션 표시 이름
pub fn display_name(
    chat_kind: ChatKind,
    chat_title: Option<&str>,
    from_name: &str,
    target: &ChatTarget,
) -> String {
    match chat_kind {
        ChatKind::Private => from_name.to_string(),
        ChatKind::Group | ChatKind::Channel => {
            let group = chat_title.unwrap_or("Group");
            match target.thread_id {
                Some(thread) => format!("{group} Topic {thread} (started by {from_name})"),
                None => format!("{group} (started by {from_name})"),
            }
        }
    }
}
