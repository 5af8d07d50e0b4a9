//! DI 와이어링.
//!
//! 어댑터 묶음과 설정으로 엔진의 `Arc` 그래프를 한 번에 조립한다.
//! 전역 상태는 두지 않고, 조립 결과를 각 루프가 나눠 갖는다.

use linkwatch_core::config::AppConfig;
use linkwatch_core::models::health::RestartRequest;
use linkwatch_core::ports::chat::ChatClient;
use linkwatch_core::ports::http_probe::HttpProbe;
use linkwatch_core::ports::resource::ResourceProbe;
use linkwatch_core::ports::session_store::SessionStore;
use linkwatch_core::ports::stream::StreamConnector;
use linkwatch_engine::broadcast::{parse_recipients, Broadcaster};
use linkwatch_engine::commands::{CommandHandler, Cooldowns};
use linkwatch_engine::dispatcher::Dispatcher;
use linkwatch_engine::health::HealthMonitor;
use linkwatch_engine::incidents::IncidentTracker;
use linkwatch_engine::lifecycle::MonitoringFlag;
use linkwatch_engine::render::{RenderContext, Renderer};
use linkwatch_engine::sessions::SessionRegistry;
use linkwatch_engine::status_store::StatusStore;
use linkwatch_engine::supervisor::{ProcessTerminator, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::scheduler::{Scheduler, SchedulerConfig};

/// 외부 협력자 (포트 구현체)
pub struct Adapters {
    pub chat: Arc<dyn ChatClient>,
    pub store: Arc<dyn SessionStore>,
    pub connector: Arc<dyn StreamConnector>,
    pub probe: Arc<dyn HttpProbe>,
    pub resource: Arc<dyn ResourceProbe>,
    pub terminator: Arc<dyn ProcessTerminator>,
}

/// 조립된 봇
pub struct App {
    pub status: Arc<StatusStore>,
    pub incidents: Arc<IncidentTracker>,
    pub health: Arc<HealthMonitor>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub supervisor: Arc<Supervisor>,
    pub handler: Arc<CommandHandler>,
    pub scheduler: Arc<Scheduler>,
}

impl App {
    /// 그래프 조립. 재시작 요청 수신단은 호출자가 코디네이터로 넘긴다
    pub fn assemble(
        config: &AppConfig,
        adapters: Adapters,
    ) -> (Self, mpsc::UnboundedReceiver<RestartRequest>) {
        let flag = MonitoringFlag::new();
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();

        let status = Arc::new(StatusStore::new(config));
        let health = Arc::new(HealthMonitor::new(config.health.clone(), restart_tx));
        let incidents = Arc::new(IncidentTracker::new(
            status.clone(),
            health.clone(),
            config.incidents.grace_period(),
            config.incidents.message_limit,
        ));
        let registry = Arc::new(SessionRegistry::new(
            adapters.store,
            incidents.clone(),
            &config.store,
        ));
        let renderer = Arc::new(Renderer::new(RenderContext::from_config(config)));
        let dispatcher = Arc::new(Dispatcher::new(
            adapters.chat.clone(),
            registry.clone(),
            status.clone(),
            incidents.clone(),
            renderer.clone(),
            &config.dispatch,
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            adapters.chat.clone(),
            registry.clone(),
            parse_recipients(&config.bot.broadcast_chats),
        ));
        let supervisor = Arc::new(Supervisor::new(
            broadcaster.clone(),
            registry.clone(),
            status.clone(),
            flag.clone(),
            adapters.terminator,
            Duration::from_secs(config.health.shutdown_grace_secs),
        ));
        let handler = Arc::new(CommandHandler::new(
            adapters.chat,
            registry.clone(),
            status.clone(),
            incidents.clone(),
            dispatcher.clone(),
            renderer,
            flag.clone(),
            Cooldowns::from(&config.commands),
        ));
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig::from_config(config),
            flag.clone(),
            status.clone(),
            incidents.clone(),
            health.clone(),
            registry.clone(),
            dispatcher,
            broadcaster.clone(),
            adapters.connector,
            adapters.probe,
            adapters.resource,
        ));

        let app = Self {
            status,
            incidents,
            health,
            registry,
            broadcaster,
            supervisor,
            handler,
            scheduler,
        };
        (app, restart_rx)
    }

    /// 재시작 요청을 받아 재시작 절차를 실행하는 코디네이터
    pub fn spawn_restart_coordinator(
        &self,
        mut restart_rx: mpsc::UnboundedReceiver<RestartRequest>,
    ) -> tokio::task::JoinHandle<()> {
        let supervisor = self.supervisor.clone();
        tokio::spawn(async move {
            // 헬스 모니터의 래치 때문에 실제로는 한 번만 들어온다
            while let Some(request) = restart_rx.recv().await {
                supervisor.execute(request).await;
            }
        })
    }
}
