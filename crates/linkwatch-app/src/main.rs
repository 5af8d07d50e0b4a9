//! # linkwatch-app
//!
//! linkwatch 봇 바이너리 진입점.
//! 설정 로드, 로깅 초기화, DI 와이어링, 세션 복원, 루프 오케스트레이션.

mod app;
mod lifecycle;
mod scheduler;
#[cfg(test)]
mod testing;
mod updates;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use linkwatch_core::config::{AppConfig, StoreConfig};
use linkwatch_core::config_manager::{validate, ConfigManager};
use linkwatch_core::models::log::LogType;
use linkwatch_engine::supervisor::ProcessExit;
use linkwatch_monitor::process::SysInfoResourceProbe;
use linkwatch_network::http_probe::BlockingHttpProbe;
use linkwatch_network::telegram_client::TelegramClient;
use linkwatch_network::ws_client::WsStreamConnector;
use linkwatch_storage::open_session_store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::app::{Adapters, App};
use crate::lifecycle::LifecycleManager;
use crate::scheduler::spawn_maintenance;
use crate::updates::UpdateLoop;

/// Bot API 요청 타임아웃 (long-polling은 요청별로 늘어남)
const CHAT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 로그 필터 대상 crate
const LOG_TARGETS: [&str; 7] = [
    "linkwatch",
    "linkwatch_app",
    "linkwatch_core",
    "linkwatch_engine",
    "linkwatch_network",
    "linkwatch_storage",
    "linkwatch_monitor",
];

/// WebSocket/HTTP 엔드포인트 감시 대시보드 봇
#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (json/toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error), 설정 파일보다 우선
    #[arg(long, short = 'l')]
    log_level: Option<String>,

    /// 일별 로그 파일 디렉토리 (설정 파일보다 우선)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 설정 검증만 하고 종료
    #[arg(long)]
    check_config: bool,
}

/// tracing 초기화. 파일 출력을 켜면 flush 가드를 돌려준다
fn init_tracing(level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "linkwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// 세션 저장소 경로 결정 (설정값 또는 플랫폼별 데이터 디렉토리)
///
/// - macOS: `~/Library/Application Support/org.linkwatch.linkwatch/`
/// - Linux: `~/.local/share/linkwatch/`
fn resolve_store_paths(store: &StoreConfig) -> (PathBuf, PathBuf) {
    let data_dir = ProjectDirs::from("org", "linkwatch", "linkwatch")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let db_path = store
        .db_path
        .clone()
        .unwrap_or_else(|| data_dir.join("sessions.db"));
    let fallback_path = store
        .fallback_path
        .clone()
        .unwrap_or_else(|| data_dir.join("sessions.json"));
    (db_path, fallback_path)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("디렉토리 생성 실패: {}", parent.display()))?;
    }
    Ok(())
}

fn print_summary(config: &AppConfig) {
    println!("✅ 설정 검증 통과");
    println!("   제목: {}", config.bot.title);
    println!(
        "   스트림: {}",
        config
            .enabled_streams()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   API: {}", config.api.endpoints.join(", "));
    println!("   수신자: {}개", config.bot.broadcast_chats.len());
    println!("   전달 주기: {}초", config.bot.update_interval_secs);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("⚠️  .env 읽기 실패: {e}");
        }
    }

    let config = ConfigManager::load(args.config.as_deref())
        .map_err(|e| anyhow!("설정 로드 실패: {e}"))?
        .into_config();
    validate(&config).map_err(|e| anyhow!("설정 검증 실패: {e}"))?;

    if args.check_config {
        print_summary(&config);
        return Ok(());
    }

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_dir = args.log_dir.clone().or_else(|| config.logging.log_dir.clone());
    let _log_guard = init_tracing(&level, log_dir.as_deref());

    info!("linkwatch 시작: {}", config.bot.title);
    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    // ── 어댑터 생성 ──
    let telegram = Arc::new(
        TelegramClient::new(
            &config.bot.api_base,
            &config.bot.token,
            CHAT_REQUEST_TIMEOUT,
        )
        .map_err(|e| anyhow!("Telegram 클라이언트 생성 실패: {e}"))?,
    );
    let bot_name = telegram
        .get_me()
        .await
        .map_err(|e| anyhow!("봇 토큰 확인 실패: {e}"))?;
    info!("봇 계정: @{bot_name}");

    let (db_path, fallback_path) = resolve_store_paths(&config.store);
    ensure_parent(&db_path)?;
    ensure_parent(&fallback_path)?;
    let selection = open_session_store(&db_path, &fallback_path)
        .map_err(|e| anyhow!("세션 저장소를 열 수 없음: {e}"))?;

    // blocking 클라이언트는 런타임 밖에서 만든다
    let timeout = config.api.timeout();
    let probe = tokio::task::spawn_blocking(move || BlockingHttpProbe::new(timeout))
        .await
        .context("HTTP 점검기 생성 태스크 실패")?
        .map_err(|e| anyhow!("HTTP 점검기 생성 실패: {e}"))?;
    let connector = WsStreamConnector::new(
        Duration::from_secs(config.monitor.ping_interval_secs),
        Duration::from_secs(config.monitor.ping_timeout_secs),
    );

    let (app, restart_rx) = App::assemble(
        &config,
        Adapters {
            chat: telegram.clone(),
            store: selection.store,
            connector: Arc::new(connector),
            probe: Arc::new(probe),
            resource: Arc::new(SysInfoResourceProbe::new()),
            terminator: Arc::new(ProcessExit),
        },
    );

    if let Some(reason) = selection.degraded {
        app.incidents.record_confirmed(
            "Session Store",
            &format!("SQLite store unavailable, using file fallback: {reason}"),
        );
    }

    // ── 태스크 시작 ──
    let lifecycle = Arc::new(LifecycleManager::new());
    app.spawn_restart_coordinator(restart_rx);
    spawn_maintenance(app.health.clone(), lifecycle.subscribe());

    // 재시작 전 세션 복원
    let restored = app.registry.restore().await;
    if restored > 0 {
        info!("세션 {restored}개 복원, 감시 재개");
        app.status.add_log(
            LogType::System,
            "Bot",
            format!("Restored {restored} sessions after restart"),
        );
    }
    if config.bot.broadcast_dashboard {
        app.broadcaster.sync_dashboards().await;
    }
    if !app.registry.is_empty() {
        app.scheduler.start_monitoring();
    }

    let updates = UpdateLoop::new(
        telegram,
        app.handler.clone(),
        app.scheduler.clone(),
        Duration::from_secs(config.commands.updates_timeout_secs),
    );
    let updates_task = tokio::spawn(updates.run(lifecycle.subscribe()));

    lifecycle.wait_for_signal().await;

    // ── 정상 종료 ──
    let saved = app.registry.persist_all().await;
    info!("종료 전 세션 {saved}개 저장");
    app.scheduler.stop_monitoring().await;
    if let Err(e) = updates_task.await {
        warn!("업데이트 루프 비정상 종료: {e}");
    }
    info!("linkwatch 종료");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_overrides() {
        let args = Args::parse_from([
            "linkwatch",
            "--config",
            "bot.toml",
            "-l",
            "debug",
            "--check-config",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("bot.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.log_dir.is_none());
        assert!(args.check_config);
    }

    #[test]
    fn configured_store_paths_win() {
        let store = StoreConfig {
            db_path: Some(PathBuf::from("/var/lib/linkwatch/s.db")),
            fallback_path: Some(PathBuf::from("/var/lib/linkwatch/s.json")),
            ..StoreConfig::default()
        };
        let (db, fallback) = resolve_store_paths(&store);
        assert_eq!(db, PathBuf::from("/var/lib/linkwatch/s.db"));
        assert_eq!(fallback, PathBuf::from("/var/lib/linkwatch/s.json"));
    }

    #[test]
    fn default_store_paths_share_directory() {
        let (db, fallback) = resolve_store_paths(&StoreConfig::default());
        assert_eq!(db.file_name().unwrap(), "sessions.db");
        assert_eq!(db.parent(), fallback.parent());
    }
}
