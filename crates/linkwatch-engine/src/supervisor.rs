//! 재시작 절차.
//!
//! 사전 알림 → 대기 → 세션 저장 → 감시 중단 → 완료 알림 → 전달 유예 → 프로세스 종료.
//! 종료 후 재기동은 외부 서비스 관리자(systemd 등)의 몫이다.

use chrono::Local;
use linkwatch_core::models::health::{RestartKind, RestartRequest};
use linkwatch_core::models::log::LogType;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::lifecycle::MonitoringFlag;
use crate::render::escape_markdown;
use crate::sessions::SessionRegistry;
use crate::status_store::StatusStore;

/// 프로세스 종료 계약.
///
/// 재시작은 "정상 종료 후 외부 관리자가 재기동"으로만 이뤄진다.
pub trait ProcessTerminator: Send + Sync {
    /// 종료 코드 0으로 프로세스 종료
    fn exit_for_supervisor_restart(&self);
}

/// 실제 프로세스 종료
pub struct ProcessExit;

impl ProcessTerminator for ProcessExit {
    fn exit_for_supervisor_restart(&self) {
        info!("재시작을 위해 프로세스 종료");
        std::process::exit(0);
    }
}

/// 재시작 절차 실행기
pub struct Supervisor {
    broadcaster: Arc<Broadcaster>,
    registry: Arc<SessionRegistry>,
    status: Arc<StatusStore>,
    flag: MonitoringFlag,
    terminator: Arc<dyn ProcessTerminator>,
    shutdown_grace: Duration,
}

impl Supervisor {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        registry: Arc<SessionRegistry>,
        status: Arc<StatusStore>,
        flag: MonitoringFlag,
        terminator: Arc<dyn ProcessTerminator>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            broadcaster,
            registry,
            status,
            flag,
            terminator,
            shutdown_grace,
        }
    }

    fn advance_notice(request: &RestartRequest) -> String {
        let now = Local::now().format("%H:%M:%S");
        let delay = request.delay.as_secs();
        match request.kind {
            RestartKind::ErrorRecovery { restart_number } => format!(
                "🔄 *Bot Restart Scheduled*\n\n\
                 *Reason:* {}\n\
                 *Restart in:* {delay} seconds\n\
                 *Time:* {now}\n\
                 *Restart #:* {restart_number} today\n\n\
                 ✅ Your session will be automatically restored after restart.",
                escape_markdown(&request.reason)
            ),
            RestartKind::Maintenance => format!(
                "🔄 *Daily Maintenance Restart*\n\n\
                 *Time:* {now}\n\
                 *Reason:* {}\n\
                 *Restart in:* {delay} seconds\n\n\
                 ✅ This is a routine restart to keep the bot healthy.\n\
                 ✅ Your session will be automatically restored.",
                escape_markdown(&request.reason)
            ),
        }
    }

    fn completion_notice(request: &RestartRequest) -> String {
        format!(
            "✅ *Bot Restarted*\n\n*Reason:* {}\n*Time:* {}\n\n🔄 Monitoring will resume automatically...",
            escape_markdown(&request.reason),
            Local::now().format("%H:%M:%S")
        )
    }

    /// 재시작 절차 실행. 마지막 단계에서 프로세스를 끝낸다
    pub async fn execute(&self, request: RestartRequest) {
        warn!(
            "재시작 절차 시작: {} ({}초 후)",
            request.reason,
            request.delay.as_secs()
        );
        self.status.add_log(
            LogType::System,
            "Supervisor",
            format!(
                "Restart scheduled in {}s: {}",
                request.delay.as_secs(),
                request.reason
            ),
        );

        self.broadcaster
            .notify(&Self::advance_notice(&request))
            .await;
        tokio::time::sleep(request.delay).await;

        let saved = self.registry.persist_all().await;
        info!("재시작 전 세션 {saved}개 저장");

        self.flag.stop();
        self.status
            .add_log(LogType::System, "Supervisor", "Monitoring stopped for restart");

        self.broadcaster
            .notify(&Self::completion_notice(&request))
            .await;
        tokio::time::sleep(self.shutdown_grace).await;

        self.terminator.exit_for_supervisor_restart();
    }
}
