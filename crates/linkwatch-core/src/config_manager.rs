//! 설정 로드.
//!
//! `config` crate로 설정 파일(json/toml)과 `LINKWATCH__SECTION__FIELD` 환경변수를
//! 병합한 뒤, 기존 배포에서 쓰던 `BOT_TOKEN` / `CHAT_ID` / `UPDATE_INTERVAL` /
//! `EMOJI_*` 변수를 덮어쓴다.

use crate::config::AppConfig;
use crate::error::CoreError;
use crate::models::session::parse_chat_target;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 환경변수 접두어
const ENV_PREFIX: &str = "LINKWATCH";

/// 토큰 미설정 시 배포 템플릿에 남아 있는 값
const PLACEHOLDER_TOKEN: &str = "your_bot_token_here";

/// 설정 관리자
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 파일 + 프로세스 환경변수로 설정 로드
    pub fn load(config_path: Option<&Path>) -> Result<Self, CoreError> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// 레거시 변수 조회 함수를 지정해 로드 (테스트용)
    pub fn load_with<F>(config_path: Option<&Path>, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(CoreError::Config(format!(
                    "설정 파일 없음: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
            debug!("설정 파일 추가: {}", path.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("bot.broadcast_chats")
                .with_list_parse_key("api.endpoints"),
        );

        let mut app_config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CoreError::Config(format!("설정 파싱 실패: {e}")))?;

        apply_legacy_env(&mut app_config, &lookup)?;

        info!(
            "설정 로드 완료: 스트림 {}개, API {}개",
            app_config.enabled_streams().count(),
            app_config.api.endpoints.len()
        );

        Ok(Self {
            config: app_config,
            config_path: config_path.map(Path::to_path_buf),
        })
    }

    /// 현재 설정
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// 설정 소유권 반환
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 설정 파일 경로
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// 레거시 환경변수 적용
fn apply_legacy_env<F>(config: &mut AppConfig, lookup: &F) -> Result<(), CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.bot.token = token.trim().to_string();
    }

    if let Some(chat_ids) = lookup("CHAT_ID") {
        config.bot.broadcast_chats = chat_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(interval) = lookup("UPDATE_INTERVAL") {
        config.bot.update_interval_secs =
            interval.trim().parse().map_err(|_| CoreError::Validation {
                field: "UPDATE_INTERVAL".to_string(),
                message: format!("정수가 아님: {interval}"),
            })?;
    }

    let emoji = &mut config.emoji;
    let slots: [(&str, &mut String); 12] = [
        ("EMOJI_CONNECTED", &mut emoji.connected),
        ("EMOJI_DISCONNECTED", &mut emoji.disconnected),
        ("EMOJI_ERROR", &mut emoji.error),
        ("EMOJI_WARNING", &mut emoji.warning),
        ("EMOJI_SUCCESS", &mut emoji.success),
        ("EMOJI_WAITING", &mut emoji.waiting),
        ("EMOJI_ACTIVE", &mut emoji.active),
        ("EMOJI_API", &mut emoji.api),
        ("EMOJI_WEBSOCKET", &mut emoji.websocket),
        ("EMOJI_TIME", &mut emoji.time),
        ("EMOJI_SPEED", &mut emoji.speed),
        ("EMOJI_ROBOT", &mut emoji.robot),
    ];
    for (key, slot) in slots {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }

    Ok(())
}

/// 실행 가능한 설정인지 검증
pub fn validate(config: &AppConfig) -> Result<(), CoreError> {
    let token = config.bot.token.trim();
    if token.is_empty() || token == PLACEHOLDER_TOKEN {
        return Err(CoreError::Validation {
            field: "bot.token".to_string(),
            message: "Bot API 토큰이 설정되지 않음 (BOT_TOKEN)".to_string(),
        });
    }

    let positive = [
        ("bot.update_interval_secs", config.bot.update_interval_secs),
        ("api.poll_interval_secs", config.api.poll_interval_secs),
        ("api.timeout_secs", config.api.timeout_secs),
        (
            "incidents.sweep_interval_secs",
            config.incidents.sweep_interval_secs,
        ),
        (
            "health.check_interval_secs",
            config.health.check_interval_secs,
        ),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(CoreError::Validation {
                field: field.to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }
    }

    if config.health.restart_delays_secs.is_empty() {
        return Err(CoreError::Validation {
            field: "health.restart_delays_secs".to_string(),
            message: "재시작 대기 단계가 비어 있음".to_string(),
        });
    }

    if config.health.maintenance_hour > 23 {
        return Err(CoreError::Validation {
            field: "health.maintenance_hour".to_string(),
            message: format!("0-23 범위 밖: {}", config.health.maintenance_hour),
        });
    }

    if config.dispatch.max_attempts == 0 {
        return Err(CoreError::Validation {
            field: "dispatch.max_attempts".to_string(),
            message: "최소 1회 시도 필요".to_string(),
        });
    }

    for raw in &config.bot.broadcast_chats {
        parse_chat_target(raw)?;
    }

    Ok(())
}
