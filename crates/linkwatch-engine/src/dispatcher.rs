//! 대시보드 전달.
//!
//! 세션마다 렌더링 → 지문 비교(중복 제거) → 편집 간격 확인(스로틀) → 편집/전송.
//! 전달 실패는 종류별로 처리한다:
//! - 편집 불가: 새 메시지 전송 후 핸들 교체
//! - 변경 없음: 전달된 것으로 간주
//! - 전송 한도 초과: 이번 주기 포기
//! - 도달 불가: 세션과 영속 사본 삭제
//! - 일반/네트워크 오류: 선형 대기 후 재시도, 마지막 시도 실패 시 확정 장애 1건

use futures::future::join_all;
use linkwatch_core::config::DispatchConfig;
use linkwatch_core::error::ChatError;
use linkwatch_core::models::chat::{MessageHandle, OutgoingMessage};
use linkwatch_core::models::session::{ChatTarget, SessionKey, SessionView};
use linkwatch_core::ports::chat::ChatClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::incidents::IncidentTracker;
use crate::render::{fingerprint, Renderer};
use crate::sessions::SessionRegistry;
use crate::status_store::StatusStore;

/// 전달 실패 확정 장애 출처
const DELIVERY_SOURCE: &str = "Telegram API";

/// 전달 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 새 메시지 전송
    Sent,
    /// 기존 메시지 편집 (변경 없음 응답 포함)
    Edited,
    /// 렌더링 결과가 마지막 전달과 같음
    Unchanged,
    /// 최소 편집 간격 이내
    Throttled,
    /// 같은 세션의 전달이 진행 중
    InFlight,
    /// 전송 한도 초과로 이번 주기 포기
    RateLimited,
    /// 구독자 도달 불가로 세션 삭제
    Removed,
    /// 플랫폼이 요청을 거부함 (재시도 없음)
    Rejected,
    /// 재시도 소진
    Failed,
    /// 세션 없음
    NoSession,
}

impl DeliveryOutcome {
    /// 네트워크로 실제 전달되었는지
    pub fn delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent | DeliveryOutcome::Edited)
    }
}

enum Gate {
    Proceed(Option<MessageHandle>),
    Skip(DeliveryOutcome),
}

/// 세션별 대시보드 전달기
pub struct Dispatcher {
    chat: Arc<dyn ChatClient>,
    registry: Arc<SessionRegistry>,
    status: Arc<StatusStore>,
    incidents: Arc<IncidentTracker>,
    renderer: Arc<Renderer>,
    min_edit_interval: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        registry: Arc<SessionRegistry>,
        status: Arc<StatusStore>,
        incidents: Arc<IncidentTracker>,
        renderer: Arc<Renderer>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            chat,
            registry,
            status,
            incidents,
            renderer,
            min_edit_interval: Duration::from_secs(config.min_edit_interval_secs),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    fn render(&self, key: &SessionKey, target: &ChatTarget) -> Option<OutgoingMessage> {
        let session = self.registry.get(key)?;
        let snapshot = self.status.snapshot();
        let logs = if session.view == SessionView::Logs {
            self.status.logs()
        } else {
            Vec::new()
        };
        Some(self.renderer.view(
            session.view,
            &snapshot,
            &logs,
            target,
            &session,
            self.registry.len(),
        ))
    }

    /// 세션 하나에 현재 화면 전달
    pub async fn deliver(&self, key: SessionKey) -> DeliveryOutcome {
        let Some(target) = self.registry.resolve_target(&key) else {
            return DeliveryOutcome::NoSession;
        };
        let Some(message) = self.render(&key, &target) else {
            return DeliveryOutcome::NoSession;
        };
        let hash = fingerprint(&message);
        let min_interval = self.min_edit_interval;

        let gate = self.registry.update(&key, |session| {
            if session.in_flight {
                return Gate::Skip(DeliveryOutcome::InFlight);
            }
            if session.last_hash.as_deref() == Some(hash.as_slice()) {
                return Gate::Skip(DeliveryOutcome::Unchanged);
            }
            // 첫 전달(핸들 없음)은 스로틀하지 않는다
            if session.handle.is_some()
                && session
                    .last_edit
                    .is_some_and(|at| at.elapsed() < min_interval)
            {
                return Gate::Skip(DeliveryOutcome::Throttled);
            }
            session.in_flight = true;
            session.last_edit = Some(Instant::now());
            Gate::Proceed(session.handle)
        });

        let handle = match gate {
            None => return DeliveryOutcome::NoSession,
            Some(Gate::Skip(outcome)) => {
                debug!("전달 생략 {key}: {outcome:?}");
                return outcome;
            }
            Some(Gate::Proceed(handle)) => handle,
        };

        let result = self.transmit(&target, handle, &message).await;
        self.settle(key, &target, hash, result).await
    }

    /// 스로틀/중복 제거를 해제하고 즉시 전달
    pub async fn force_deliver(&self, key: SessionKey) -> DeliveryOutcome {
        self.registry.update(&key, |session| session.invalidate());
        self.deliver(key).await
    }

    /// 대시보드 세션 전체 동시 전달. 모든 전달이 끝날 때까지 기다린다
    pub async fn dispatch_cycle(&self) -> Vec<(SessionKey, DeliveryOutcome)> {
        let keys = self.registry.dashboard_keys();
        let outcomes = join_all(keys.iter().map(|key| self.deliver(*key))).await;
        let results: Vec<_> = keys.into_iter().zip(outcomes).collect();

        let delivered = results.iter().filter(|(_, o)| o.delivered()).count();
        if delivered > 0 {
            debug!("전달 주기 완료: {delivered}/{}건 전달", results.len());
        }
        results
    }

    /// 편집 또는 전송. 재시도 가능한 오류는 선형 대기 후 재시도
    async fn transmit(
        &self,
        target: &ChatTarget,
        handle: Option<MessageHandle>,
        message: &OutgoingMessage,
    ) -> Result<(DeliveryOutcome, MessageHandle), ChatError> {
        let mut handle = handle;
        let mut attempt = 1;
        loop {
            match self.attempt(target, &mut handle, message).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.retry_delay * attempt;
                    warn!(
                        "전달 실패 {target} ({attempt}/{}): {e}, {}초 후 재시도",
                        self.max_attempts,
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn attempt(
        &self,
        target: &ChatTarget,
        handle: &mut Option<MessageHandle>,
        message: &OutgoingMessage,
    ) -> Result<(DeliveryOutcome, MessageHandle), ChatError> {
        if let Some(current) = *handle {
            match self.chat.edit_message(target, current, message).await {
                Ok(()) | Err(ChatError::NotModified) => {
                    return Ok((DeliveryOutcome::Edited, current));
                }
                // 이후 재시도는 편집 없이 바로 전송
                Err(ChatError::NotEditable(reason)) | Err(ChatError::Rejected(reason)) => {
                    debug!("편집 불가 {target} ({reason}), 새 메시지 전송");
                    *handle = None;
                }
                Err(e) => return Err(e),
            }
        }
        let handle = self.chat.send_message(target, message).await?;
        Ok((DeliveryOutcome::Sent, handle))
    }

    /// 결과를 세션에 반영
    async fn settle(
        &self,
        key: SessionKey,
        target: &ChatTarget,
        hash: Vec<u8>,
        result: Result<(DeliveryOutcome, MessageHandle), ChatError>,
    ) -> DeliveryOutcome {
        let release = |session: &mut crate::sessions::Session| session.in_flight = false;

        match result {
            Ok((outcome, handle)) => {
                self.registry.update(&key, |session| {
                    release(session);
                    session.handle = Some(handle);
                    session.last_hash = Some(hash);
                    session.rejected = false;
                });
                outcome
            }
            Err(ChatError::RateLimited { retry_after_secs }) => {
                self.registry.update(&key, release);
                warn!("전송 한도 초과 {target}: {retry_after_secs}초 대기 요청, 이번 주기 생략");
                DeliveryOutcome::RateLimited
            }
            Err(ChatError::Rejected(reason)) => {
                // 같은 화면은 다시 보내지 않는다. 내용이 바뀌면 다음 주기에 재시도
                let first = self
                    .registry
                    .update(&key, |session| {
                        release(session);
                        session.last_hash = Some(hash);
                        !std::mem::replace(&mut session.rejected, true)
                    })
                    .unwrap_or(false);
                if first {
                    self.incidents.record_confirmed(
                        DELIVERY_SOURCE,
                        &format!("Message rejected for {target}: {reason}"),
                    );
                } else {
                    warn!("전달 거부 반복 {target}: {reason}");
                }
                DeliveryOutcome::Rejected
            }
            Err(ChatError::Unreachable(reason)) => {
                info!("구독자 도달 불가 {target} ({reason}), 세션 삭제");
                self.registry.unsubscribe(&key).await;
                DeliveryOutcome::Removed
            }
            Err(e) => {
                self.registry.update(&key, release);
                self.incidents.record_confirmed(
                    DELIVERY_SOURCE,
                    &format!(
                        "Failed to deliver to {target} after {} attempts: {e}",
                        self.max_attempts
                    ),
                );
                DeliveryOutcome::Failed
            }
        }
    }
}
