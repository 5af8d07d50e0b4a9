//! 감시 스케줄러.
//!
//! 감시가 켜지면 다음을 띄운다.
//! - 스트림마다 감시 태스크
//! - 전용 OS 스레드의 HTTP API 폴러
//! - 대시보드 전달 루프 (update_interval)
//! - 제어 루프: 보류 장애 점검(5초)과 헬스 점검(60초)을 한 태스크에서 직렬로
//!
//! 모든 루프는 `MonitoringFlag` 해제를 1초 안에 관찰하고 스스로 끝난다.
//! 정기 점검 재시작 태스크는 감시 여부와 무관하게 프로세스 수명 동안 돈다.

use chrono::Local;
use linkwatch_core::config::{AppConfig, StreamEndpointConfig};
use linkwatch_core::models::log::LogType;
use linkwatch_core::ports::http_probe::HttpProbe;
use linkwatch_core::ports::resource::ResourceProbe;
use linkwatch_core::ports::stream::StreamConnector;
use linkwatch_engine::broadcast::Broadcaster;
use linkwatch_engine::dispatcher::Dispatcher;
use linkwatch_engine::health::HealthMonitor;
use linkwatch_engine::incidents::IncidentTracker;
use linkwatch_engine::lifecycle::MonitoringFlag;
use linkwatch_engine::poller::{ApiPoller, ApiTarget};
use linkwatch_engine::sessions::SessionRegistry;
use linkwatch_engine::status_store::StatusStore;
use linkwatch_engine::watcher::StreamWatcher;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 스케줄러 설정
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 대시보드 전달 주기
    pub update_interval: Duration,
    /// 보류 장애 점검 주기
    pub sweep_interval: Duration,
    /// 헬스 점검 주기
    pub health_interval: Duration,
    /// 스트림 재연결 대기
    pub reconnect_delay: Duration,
    /// API 폴링 주기
    pub poll_interval: Duration,
    /// 설정 수신자 대시보드 유지
    pub broadcast_dashboard: bool,
    pub streams: Vec<StreamEndpointConfig>,
    pub api_targets: Vec<ApiTarget>,
}

impl SchedulerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            update_interval: config.update_interval(),
            sweep_interval: Duration::from_secs(config.incidents.sweep_interval_secs),
            health_interval: Duration::from_secs(config.health.check_interval_secs),
            reconnect_delay: Duration::from_secs(config.monitor.reconnect_delay_secs),
            poll_interval: Duration::from_secs(config.api.poll_interval_secs),
            broadcast_dashboard: config.bot.broadcast_dashboard,
            streams: config.enabled_streams().cloned().collect(),
            api_targets: config
                .api_targets()
                .into_iter()
                .map(|(path, url)| ApiTarget { path, url })
                .collect(),
        }
    }
}

/// 감시 스케줄러
pub struct Scheduler {
    config: SchedulerConfig,
    flag: MonitoringFlag,
    status: Arc<StatusStore>,
    incidents: Arc<IncidentTracker>,
    health: Arc<HealthMonitor>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<Broadcaster>,
    connector: Arc<dyn StreamConnector>,
    probe: Arc<dyn HttpProbe>,
    resource: Arc<dyn ResourceProbe>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        flag: MonitoringFlag,
        status: Arc<StatusStore>,
        incidents: Arc<IncidentTracker>,
        health: Arc<HealthMonitor>,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        broadcaster: Arc<Broadcaster>,
        connector: Arc<dyn StreamConnector>,
        probe: Arc<dyn HttpProbe>,
        resource: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            config,
            flag,
            status,
            incidents,
            health,
            registry,
            dispatcher,
            broadcaster,
            connector,
            probe,
            resource,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.flag.is_active()
    }

    /// 감시 시작. 이미 감시 중이면 `false`
    pub fn start_monitoring(&self) -> bool {
        if !self.flag.start() {
            return false;
        }
        info!(
            "감시 시작: 스트림 {}개, API {}개, 전달 주기 {}초",
            self.config.streams.len(),
            self.config.api_targets.len(),
            self.config.update_interval.as_secs()
        );
        self.status
            .add_log(LogType::System, "Bot", "Monitoring started");

        let mut tasks = Vec::with_capacity(self.config.streams.len() + 2);
        for endpoint in &self.config.streams {
            let watcher = StreamWatcher::new(
                endpoint.clone(),
                self.connector.clone(),
                self.status.clone(),
                self.incidents.clone(),
                self.flag.clone(),
                self.config.reconnect_delay,
            );
            tasks.push(tokio::spawn(watcher.run()));
        }
        self.spawn_poller();
        tasks.push(self.spawn_dispatch_loop());
        tasks.push(self.spawn_control_loop());

        self.tasks.lock().extend(tasks);
        true
    }

    /// 감시 중단 후 태스크 종료 대기 (폴러 스레드는 1초 안에 스스로 끝남)
    pub async fn stop_monitoring(&self) {
        if self.flag.stop() {
            info!("감시 중단");
            self.status
                .add_log(LogType::System, "Bot", "Monitoring stopped");
        }
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("감시 태스크 비정상 종료: {e}");
            }
        }
    }

    fn spawn_poller(&self) {
        if self.config.api_targets.is_empty() {
            debug!("API 엔드포인트 없음, 폴러 생략");
            return;
        }
        let poller = ApiPoller::new(
            self.config.api_targets.clone(),
            self.probe.clone(),
            self.status.clone(),
            self.incidents.clone(),
            self.flag.clone(),
            self.config.poll_interval,
        );
        if let Err(e) = std::thread::Builder::new()
            .name("linkwatch-api-poller".to_string())
            .spawn(move || poller.run())
        {
            warn!("API 폴러 스레드 생성 실패: {e}");
            self.incidents
                .record_confirmed("API Poller", &format!("thread spawn failed: {e}"));
        }
    }

    fn spawn_dispatch_loop(&self) -> JoinHandle<()> {
        let flag = self.flag.clone();
        let dispatcher = self.dispatcher.clone();
        let broadcaster = self.broadcaster.clone();
        let broadcast_dashboard = self.config.broadcast_dashboard;
        let period = self.config.update_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if broadcast_dashboard {
                            broadcaster.sync_dashboards().await;
                        }
                        dispatcher.dispatch_cycle().await;
                    }
                    _ = flag.stopped() => break,
                }
            }
            debug!("전달 루프 종료");
        })
    }

    fn spawn_control_loop(&self) -> JoinHandle<()> {
        let flag = self.flag.clone();
        let incidents = self.incidents.clone();
        let health = self.health.clone();
        let status = self.status.clone();
        let registry = self.registry.clone();
        let resource = self.resource.clone();
        let sweep_period = self.config.sweep_interval;
        let health_period = self.config.health_interval;

        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(sweep_period);
            let mut check = tokio::time::interval(health_period);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            check.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 첫 헬스 점검은 한 주기 뒤에
            check.tick().await;

            loop {
                tokio::select! {
                    _ = sweep.tick() => {
                        incidents.sweep_expired();
                    }
                    _ = check.tick() => {
                        let report = health
                            .check(
                                resource.as_ref(),
                                registry.store().as_ref(),
                                &status,
                                registry.len(),
                            )
                            .await;
                        debug!("헬스 점검: {report:?}");
                    }
                    _ = flag.stopped() => break,
                }
            }
            debug!("제어 루프 종료");
        })
    }
}

/// 매일 정기 점검 시각에 재시작을 요청하는 태스크
pub fn spawn_maintenance(
    health: Arc<HealthMonitor>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if !health.config().maintenance_enabled {
        info!("정기 점검 재시작 비활성화");
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            let wait = health.until_maintenance(Local::now().naive_local());
            info!("다음 정기 점검까지 {}분", wait.as_secs() / 60);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if health.request_maintenance() {
                        break;
                    }
                    // 이미 다른 재시작이 진행 중이면 다음 날로 넘긴다
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Adapters, App};
    use crate::testing::{memory_store, FixedResource, IdleConnector, OkProbe, RecordingChat};
    use linkwatch_core::config::StreamProtocol;
    use linkwatch_core::models::endpoint::EndpointState;
    use linkwatch_core::models::session::SessionKey;
    use linkwatch_engine::sessions::Session;
    use linkwatch_engine::supervisor::ProcessExit;
    use std::sync::atomic::Ordering;

    fn config() -> AppConfig {
        let mut config = AppConfig::default_config();
        config.bot.token = "123:abc".to_string();
        config.api.base_url = "https://api.example.org".to_string();
        config.api.endpoints = vec!["/api/channels".to_string()];
        config.streams = vec![StreamEndpointConfig {
            key: "price".to_string(),
            name: "Price".to_string(),
            url: "wss://stream.example.org/ws".to_string(),
            enabled: true,
            protocol: StreamProtocol::Websocket,
        }];
        config
    }

    fn app(config: &AppConfig, chat: Arc<RecordingChat>) -> App {
        let adapters = Adapters {
            chat,
            store: Arc::new(memory_store()),
            connector: Arc::new(IdleConnector),
            probe: Arc::new(OkProbe),
            resource: Arc::new(FixedResource(Some(64 * 1024 * 1024))),
            terminator: Arc::new(ProcessExit),
        };
        App::assemble(config, adapters).0
    }

    #[test]
    fn scheduler_config_uses_enabled_streams_and_full_urls() {
        let mut config = config();
        config.streams.push(StreamEndpointConfig {
            enabled: false,
            ..config.streams[0].clone()
        });
        let sc = SchedulerConfig::from_config(&config);
        assert_eq!(sc.streams.len(), 1);
        assert_eq!(sc.api_targets[0].url, "https://api.example.org/api/channels");
        assert_eq!(sc.update_interval, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_dispatches_and_stops() {
        let config = config();
        let chat = Arc::new(RecordingChat::default());
        let app = app(&config, chat.clone());
        app.registry
            .subscribe(SessionKey::User(42), Session::new("ops", None))
            .await;

        assert!(app.scheduler.start_monitoring());
        assert!(!app.scheduler.start_monitoring());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(chat.sends.load(Ordering::SeqCst), 1);
        assert_eq!(
            app.status.stream_status("Price").unwrap().state,
            EndpointState::Connected
        );

        app.scheduler.stop_monitoring().await;
        assert!(!app.scheduler.is_monitoring());
        assert_eq!(
            app.status.stream_status("Price").unwrap().state,
            EndpointState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_dashboard_sessions_join_dispatch() {
        let mut config = config();
        config.api.endpoints.clear();
        config.bot.broadcast_chats = vec!["-1001_7".to_string()];
        config.bot.broadcast_dashboard = true;
        let chat = Arc::new(RecordingChat::default());
        let app = app(&config, chat.clone());

        app.scheduler.start_monitoring();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(app.registry.len(), 1);
        assert_eq!(chat.sends.load(Ordering::SeqCst), 1);
        app.scheduler.stop_monitoring().await;
    }
}
