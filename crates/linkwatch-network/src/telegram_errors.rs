//! Bot API 오류 분류.
//!
//! Telegram은 오류를 `error_code` + 자유 형식 `description`으로 돌려준다.
//! 전달 정책은 설명 문구로 결정되므로 여기서 한 번만 해석한다.

use linkwatch_core::error::ChatError;

/// 재시도 대기 기본값 (retry_after 누락 시)
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

const NOT_EDITABLE: &[&str] = &[
    "message to edit not found",
    "message can't be edited",
    "there is no text in the message to edit",
    "no text",
    "too old",
];

const UNREACHABLE: &[&str] = &[
    "chat not found",
    "bot was blocked",
    "user is deactivated",
    "bot was kicked",
];

const CALLBACK_EXPIRED: &[&str] = &["query is too old", "query id is invalid"];

/// 오류 응답 → [`ChatError`]
pub fn classify_api_error(
    error_code: Option<i64>,
    description: &str,
    retry_after: Option<u64>,
) -> ChatError {
    let lower = description.to_lowercase();
    let contains_any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if lower.contains("message is not modified") {
        return ChatError::NotModified;
    }
    if error_code == Some(429) || lower.contains("flood control") || lower.contains("too many requests")
    {
        return ChatError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        };
    }
    if contains_any(UNREACHABLE) {
        return ChatError::Unreachable(description.to_string());
    }
    // "query is too old"가 아래 "too old"에 걸리지 않도록 먼저 검사
    if contains_any(CALLBACK_EXPIRED) {
        return ChatError::CallbackExpired(description.to_string());
    }
    if contains_any(NOT_EDITABLE) {
        return ChatError::NotEditable(description.to_string());
    }
    if lower.starts_with("bad request") || error_code.is_some_and(|code| (400..500).contains(&code)) {
        return ChatError::Rejected(description.to_string());
    }
    ChatError::Api(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn not_modified() {
        assert_eq!(
            classify_api_error(
                Some(400),
                "Bad Request: message is not modified: specified new message content and reply markup are exactly the same",
                None
            ),
            ChatError::NotModified
        );
    }

    #[test]
    fn flood_control_uses_retry_after() {
        assert_eq!(
            classify_api_error(Some(429), "Too Many Requests: retry after 17", Some(17)),
            ChatError::RateLimited {
                retry_after_secs: 17
            }
        );
        assert_matches!(
            classify_api_error(None, "Flood control exceeded", None),
            ChatError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        );
    }

    #[test]
    fn unreachable_subscribers() {
        assert_matches!(
            classify_api_error(Some(400), "Bad Request: chat not found", None),
            ChatError::Unreachable(_)
        );
        assert_matches!(
            classify_api_error(Some(403), "Forbidden: bot was blocked by the user", None),
            ChatError::Unreachable(_)
        );
    }

    #[test]
    fn callback_expired_before_not_editable() {
        assert_matches!(
            classify_api_error(
                Some(400),
                "Bad Request: query is too old and response timeout expired or query ID is invalid",
                None
            ),
            ChatError::CallbackExpired(_)
        );
    }

    #[test]
    fn not_editable_variants() {
        for desc in [
            "Bad Request: message to edit not found",
            "Bad Request: message can't be edited",
            "Bad Request: there is no text in the message to edit",
        ] {
            assert_matches!(
                classify_api_error(Some(400), desc, None),
                ChatError::NotEditable(_)
            );
        }
    }

    #[test]
    fn client_errors_are_rejected() {
        for (code, desc) in [
            (Some(400), "Bad Request: can't parse entities: Can't find end of the entity"),
            (Some(400), "Bad Request: message thread not found"),
            (None, "Bad Request: message text is empty"),
            (Some(401), "Unauthorized"),
        ] {
            let err = classify_api_error(code, desc, None);
            assert_matches!(err, ChatError::Rejected(_));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn server_errors_stay_retryable() {
        let err = classify_api_error(Some(502), "Bad Gateway", None);
        assert_matches!(err, ChatError::Api(_));
        assert!(err.is_retryable());
    }
}
