//! 운영 로그 항목.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 운영 로그 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Info,
    Success,
    Warning,
    Error,
    Connecting,
    Message,
    System,
    Health,
}

impl LogType {
    /// 대문자 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "INFO",
            LogType::Success => "SUCCESS",
            LogType::Warning => "WARNING",
            LogType::Error => "ERROR",
            LogType::Connecting => "CONNECTING",
            LogType::Message => "MESSAGE",
            LogType::System => "SYSTEM",
            LogType::Health => "HEALTH",
        }
    }

    /// 로그 뷰 아이콘
    pub fn icon(&self) -> &'static str {
        match self {
            LogType::Info => "ℹ️",
            LogType::Success => "✅",
            LogType::Warning => "⚠️",
            LogType::Error => "❌",
            LogType::Connecting => "🔄",
            LogType::Message => "📨",
            LogType::System => "⚙️",
            LogType::Health => "🩺",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 운영 로그 항목 (링 버퍼 100개)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub log_type: LogType,
    pub source: String,
    pub message: String,
}
