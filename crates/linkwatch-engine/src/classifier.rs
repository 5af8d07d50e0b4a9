//! 장애 메시지 분류.
//!
//! - 연결 계열 일시 장애 → 보류 (유예 시간 안에 회복될 수 있음)
//! - 그 외 (인증, 프로토콜, 잘못된 응답) → 즉시 확정
//!
//! 확정 장애는 출처/메시지로 헬스 범주에 대응시킨다.

use linkwatch_core::models::health::HealthCategory;

/// 일시 장애로 보는 메시지 패턴 (소문자)
const TRANSIENT_PATTERNS: &[&str] = &[
    "no close frame",
    "connection closed",
    "connection lost",
    "connection reset",
    "timeout",
    "timed out",
    "network",
    "unreachable",
    "refused",
];

/// 헬스 카운터에 반영하지 않는 메시지 (구독자 쪽 사정)
const IGNORED_PATTERNS: &[&str] = &["chat not found", "bot was blocked", "user deactivated"];

const CHAT_CLIENT_PATTERNS: &[&str] = &["flood control", "rate limit", "telegram"];

/// 장애 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 보류: 유예 시간 내 회복 가능
    Recoverable,
    /// 즉시 확정
    Immediate,
}

/// 장애 메시지 분류 (대소문자 무시)
pub fn classify(text: &str) -> FailureClass {
    let lower = text.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureClass::Recoverable
    } else {
        FailureClass::Immediate
    }
}

/// 확정 장애 → 헬스 범주. `None`이면 카운트하지 않는다.
pub fn health_category_for(source: &str, message: &str) -> Option<HealthCategory> {
    let source = source.to_lowercase();
    let message = message.to_lowercase();

    if IGNORED_PATTERNS.iter().any(|p| message.contains(p)) {
        return None;
    }
    if source.contains("store") || message.contains("store") {
        return Some(HealthCategory::Store);
    }
    if source.contains("telegram") || CHAT_CLIENT_PATTERNS.iter().any(|p| message.contains(p)) {
        return Some(HealthCategory::ChatClient);
    }
    if is_stream_source(&source) {
        return Some(HealthCategory::WatcherFailures);
    }
    Some(HealthCategory::Network)
}

/// "websocket" 포함 또는 "ws" 단어가 있는 출처 ("/api/news" 같은 경로는 제외)
fn is_stream_source(source: &str) -> bool {
    source.contains("websocket")
        || source
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_connection_errors_are_recoverable() {
        for text in [
            "Connection closed by remote",
            "no close frame received or sent",
            "IO error: Connection reset by peer (os error 104)",
            "keepalive ping timeout",
            "Operation timed out",
            "Network is unreachable",
            "IO error: Connection refused (os error 111)",
        ] {
            assert_eq!(classify(text), FailureClass::Recoverable, "{text}");
        }
    }

    #[test]
    fn other_errors_are_immediate() {
        assert_eq!(classify("invalid token"), FailureClass::Immediate);
        assert_eq!(
            classify("HTTP error: 403 Forbidden"),
            FailureClass::Immediate
        );
        assert_eq!(classify(""), FailureClass::Immediate);
    }

    #[test]
    fn subscriber_side_errors_are_not_counted() {
        assert_eq!(
            health_category_for("Telegram API", "Bad Request: chat not found"),
            None
        );
        assert_eq!(
            health_category_for("Telegram API", "Forbidden: bot was blocked by the user"),
            None
        );
    }

    #[test]
    fn category_mapping_order() {
        assert_eq!(
            health_category_for("Session Store", "database is locked"),
            Some(HealthCategory::Store)
        );
        assert_eq!(
            health_category_for("Telegram API", "delivery failed"),
            Some(HealthCategory::ChatClient)
        );
        assert_eq!(
            health_category_for("Button refresh", "Flood control exceeded"),
            Some(HealthCategory::ChatClient)
        );
        assert_eq!(
            health_category_for("WebSocket WS-B", "invalid token"),
            Some(HealthCategory::WatcherFailures)
        );
        assert_eq!(
            health_category_for("WS feed", "handshake rejected"),
            Some(HealthCategory::WatcherFailures)
        );
        assert_eq!(
            health_category_for("API /api/news", "dns error"),
            Some(HealthCategory::Network)
        );
    }
}
