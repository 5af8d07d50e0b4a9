//! 애플리케이션 설정 구조체.
//!
//! 봇 토큰/수신자, 감시 대상(스트림, API), 장애 분류 윈도우, 전달 정책,
//! 헬스 임계값, 세션 저장소 경로 등 런타임 설정을 정의한다.
//! [`crate::config_manager::ConfigManager`]가 파일/환경변수에서 로드한다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 채팅 봇 설정
    #[serde(default)]
    pub bot: BotConfig,
    /// 감시할 스트림 엔드포인트 목록
    #[serde(default)]
    pub streams: Vec<StreamEndpointConfig>,
    /// HTTP API 폴링 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 감시 루프 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// 장애 분류 및 상태 저장소 설정
    #[serde(default)]
    pub incidents: IncidentConfig,
    /// 대시보드 전달 설정
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// 운영자 명령 설정
    #[serde(default)]
    pub commands: CommandConfig,
    /// 헬스 모니터 설정
    #[serde(default)]
    pub health: HealthConfig,
    /// 세션 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 상태 표시 이모지
    #[serde(default)]
    pub emoji: EmojiConfig,
}

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 대시보드 전달 주기
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.bot.update_interval_secs)
    }

    /// 활성화된 스트림 엔드포인트
    pub fn enabled_streams(&self) -> impl Iterator<Item = &StreamEndpointConfig> {
        self.streams.iter().filter(|s| s.enabled)
    }

    /// API 엔드포인트 전체 URL 목록 (`(경로, URL)` 쌍)
    pub fn api_targets(&self) -> Vec<(String, String)> {
        let base = self.api.base_url.trim_end_matches('/');
        self.api
            .endpoints
            .iter()
            .map(|path| (path.clone(), format!("{base}{path}")))
            .collect()
    }
}

// ============================================================
// 봇 설정
// ============================================================

/// 채팅 봇 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot API 토큰
    #[serde(default)]
    pub token: String,
    /// 재시작/점검 알림을 받을 채팅 (`chat_id` 또는 `chat_id_thread_id`)
    #[serde(default)]
    pub broadcast_chats: Vec<String>,
    /// 수신자 채팅에도 대시보드 세션을 유지할지 여부 (사용자 세션이 있는 채팅은 제외)
    #[serde(default)]
    pub broadcast_dashboard: bool,
    /// 대시보드 갱신 주기 (초)
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    /// 메시지 최대 길이 (플랫폼 제한)
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// 대시보드 제목
    #[serde(default = "default_title")]
    pub title: String,
    /// Bot API 주소
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            broadcast_chats: Vec::new(),
            broadcast_dashboard: false,
            update_interval_secs: default_update_interval_secs(),
            max_message_length: default_max_message_length(),
            title: default_title(),
            api_base: default_api_base(),
        }
    }
}

fn default_update_interval_secs() -> u64 {
    5
}

fn default_max_message_length() -> usize {
    4096
}

fn default_title() -> String {
    "WebSocket & API Monitor".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

// ============================================================
// 감시 대상 설정
// ============================================================

/// 스트림 프로토콜
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    /// 일반 WebSocket
    #[default]
    Websocket,
    /// Socket.IO (Engine.IO v4 over WebSocket)
    Socketio,
}

/// 스트림 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEndpointConfig {
    /// 설정 키 (예: "price_ws")
    pub key: String,
    /// 표시 이름 (예: "Price WebSocket")
    pub name: String,
    /// 연결 URL (ws:// 또는 wss://)
    pub url: String,
    /// 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 프로토콜
    #[serde(default)]
    pub protocol: StreamProtocol,
}

/// HTTP API 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 기본 URL
    #[serde(default)]
    pub base_url: String,
    /// 점검할 경로 목록
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// 폴링 주기 (초)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoints: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// 요청 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    10
}

/// 감시 루프 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 재연결 대기 (초)
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// 메시지 미리보기 길이 (문자)
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// 응답 시간 이동 윈도우 크기
    #[serde(default = "default_response_window")]
    pub response_window: usize,
    /// keepalive ping 주기 (초)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// pong 대기 한도 (초)
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            snippet_chars: default_snippet_chars(),
            response_window: default_response_window(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_snippet_chars() -> usize {
    50
}

fn default_response_window() -> usize {
    10
}

fn default_ping_interval_secs() -> u64 {
    20
}

fn default_ping_timeout_secs() -> u64 {
    10
}

// ============================================================
// 장애 분류 설정
// ============================================================

/// 장애 분류 및 기록 보존 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentConfig {
    /// 보류 장애 유예 시간 (초)
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// 보류 장애 점검 주기 (초)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// 보류 장애 메시지 최대 길이
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// 확정 장애 링 크기
    #[serde(default = "default_confirmed_capacity")]
    pub confirmed_capacity: usize,
    /// 보류 장애 이력 크기
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// 운영 로그 링 크기
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            message_limit: default_message_limit(),
            confirmed_capacity: default_confirmed_capacity(),
            history_capacity: default_history_capacity(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl IncidentConfig {
    /// 유예 시간
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

fn default_grace_period_secs() -> u64 {
    20
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_message_limit() -> usize {
    100
}

fn default_confirmed_capacity() -> usize {
    5
}

fn default_history_capacity() -> usize {
    50
}

fn default_log_capacity() -> usize {
    100
}

// ============================================================
// 전달 설정
// ============================================================

/// 대시보드 전달 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 같은 메시지 재편집 최소 간격 (초)
    #[serde(default = "default_min_edit_interval_secs")]
    pub min_edit_interval_secs: u64,
    /// 일반/네트워크 오류 시 최대 시도 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 재시도 기본 대기 (초): n번째 재시도는 `n * retry_delay`
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_edit_interval_secs: default_min_edit_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_min_edit_interval_secs() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

/// 운영자 명령 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// 수동 새로고침 쿨다운 (초)
    #[serde(default = "default_refresh_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
    /// 에러 초기화 쿨다운 (초)
    #[serde(default = "default_clear_cooldown_secs")]
    pub clear_cooldown_secs: u64,
    /// getUpdates long-polling 대기 (초)
    #[serde(default = "default_updates_timeout_secs")]
    pub updates_timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            refresh_cooldown_secs: default_refresh_cooldown_secs(),
            clear_cooldown_secs: default_clear_cooldown_secs(),
            updates_timeout_secs: default_updates_timeout_secs(),
        }
    }
}

fn default_refresh_cooldown_secs() -> u64 {
    5
}

fn default_clear_cooldown_secs() -> u64 {
    3
}

fn default_updates_timeout_secs() -> u64 {
    30
}

// ============================================================
// 헬스 모니터 설정
// ============================================================

/// 범주별 에러 임계값: `window_secs` 안에 `count`건이면 재시작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    /// 허용 건수
    pub count: usize,
    /// 윈도우 (초)
    pub window_secs: u64,
}

impl Threshold {
    /// 임계값 생성
    pub const fn new(count: usize, window_secs: u64) -> Self {
        Self { count, window_secs }
    }

    /// 윈도우 길이
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// 범주별 임계값 묶음
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// 네트워크 에러
    #[serde(default = "default_network_threshold")]
    pub network: Threshold,
    /// 채팅 클라이언트 에러
    #[serde(default = "default_chat_client_threshold")]
    pub chat_client: Threshold,
    /// 스트림 감시 실패
    #[serde(default = "default_watcher_threshold")]
    pub watcher: Threshold,
    /// 세션 저장소 에러
    #[serde(default = "default_store_threshold")]
    pub store: Threshold,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            network: default_network_threshold(),
            chat_client: default_chat_client_threshold(),
            watcher: default_watcher_threshold(),
            store: default_store_threshold(),
        }
    }
}

fn default_network_threshold() -> Threshold {
    Threshold::new(10, 300)
}

fn default_chat_client_threshold() -> Threshold {
    Threshold::new(5, 180)
}

fn default_watcher_threshold() -> Threshold {
    Threshold::new(20, 600)
}

fn default_store_threshold() -> Threshold {
    Threshold::new(3, 60)
}

/// 헬스 모니터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// 헬스 점검 주기 (초)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// 프로세스 메모리 한도 (MB)
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// 재시작 대기 단계 (초): 당일 N번째 재시작은 `min(N-1, len-1)` 단계
    #[serde(default = "default_restart_delays_secs")]
    pub restart_delays_secs: Vec<u64>,
    /// 정기 점검 재시작 사용 여부
    #[serde(default = "default_true")]
    pub maintenance_enabled: bool,
    /// 정기 점검 시각 (로컬 시, 0-23)
    #[serde(default = "default_maintenance_hour")]
    pub maintenance_hour: u32,
    /// 정기 점검 사전 알림 대기 (초)
    #[serde(default = "default_maintenance_delay_secs")]
    pub maintenance_delay_secs: u64,
    /// 종료 직전 알림 전달 유예 (초)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// 헬스 요약 로그 주기 (초)
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
    /// 범주별 임계값
    #[serde(default)]
    pub thresholds: HealthThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            memory_limit_mb: default_memory_limit_mb(),
            restart_delays_secs: default_restart_delays_secs(),
            maintenance_enabled: true,
            maintenance_hour: default_maintenance_hour(),
            maintenance_delay_secs: default_maintenance_delay_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            summary_interval_secs: default_summary_interval_secs(),
            thresholds: HealthThresholds::default(),
        }
    }
}

impl HealthConfig {
    /// 메모리 한도 (바이트)
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_memory_limit_mb() -> u64 {
    500
}

fn default_restart_delays_secs() -> Vec<u64> {
    vec![60, 120, 300, 600, 1800]
}

fn default_maintenance_hour() -> u32 {
    3
}

fn default_maintenance_delay_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    2
}

fn default_summary_interval_secs() -> u64 {
    600
}

// ============================================================
// 저장소 / 로깅 / 표시 설정
// ============================================================

/// 세션 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite 파일 경로 (None이면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// SQLite를 열 수 없을 때 사용할 JSON 파일 경로
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,
    /// 세션 TTL (시간)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// 시작 시 정리할 세션 나이 (시간)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            fallback_path: None,
            ttl_hours: default_ttl_hours(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_max_age_hours() -> u64 {
    48
}

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 일별 로그 파일 디렉토리 (None이면 stdout만)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 상태 표시 이모지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiConfig {
    pub connected: String,
    pub disconnected: String,
    pub error: String,
    pub warning: String,
    pub success: String,
    pub waiting: String,
    pub active: String,
    pub api: String,
    pub websocket: String,
    pub time: String,
    pub speed: String,
    pub robot: String,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            connected: "🟢".to_string(),
            disconnected: "🔴".to_string(),
            error: "❌".to_string(),
            warning: "⚠️".to_string(),
            success: "✅".to_string(),
            waiting: "⏳".to_string(),
            active: "🔥".to_string(),
            api: "🌐".to_string(),
            websocket: "📡".to_string(),
            time: "⏰".to_string(),
            speed: "⚡".to_string(),
            robot: "🤖".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}
