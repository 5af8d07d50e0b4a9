//! 채팅 플랫폼 메시지 모델: 송신 메시지, 인라인 키보드, 수신 이벤트.

use serde::{Deserialize, Serialize};

use super::session::ChatTarget;

/// 전송된 메시지 핸들 (편집 대상)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub i64);

/// 본문 서식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[default]
    Markdown,
    Html,
}

impl ParseMode {
    /// Bot API `parse_mode` 값
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
            ParseMode::Html => "HTML",
        }
    }
}

/// 인라인 버튼 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackAction {
    Start,
    Refresh,
    AllErrors,
    Logs,
    Clear,
    DownloadLogs,
    DownloadErrors,
    Help,
    ApiErrors,
    WsErrors,
    Back,
}

impl CallbackAction {
    /// 콜백 데이터 문자열
    pub fn as_data(&self) -> &'static str {
        match self {
            CallbackAction::Start => "start",
            CallbackAction::Refresh => "refresh",
            CallbackAction::AllErrors => "all_errors",
            CallbackAction::Logs => "logs",
            CallbackAction::Clear => "clear",
            CallbackAction::DownloadLogs => "download_logs",
            CallbackAction::DownloadErrors => "download_errors",
            CallbackAction::Help => "help",
            CallbackAction::ApiErrors => "api_errors",
            CallbackAction::WsErrors => "ws_errors",
            CallbackAction::Back => "back",
        }
    }

    /// 콜백 데이터 파싱
    pub fn from_data(data: &str) -> Option<Self> {
        let action = match data {
            "start" => CallbackAction::Start,
            "refresh" => CallbackAction::Refresh,
            "all_errors" => CallbackAction::AllErrors,
            "logs" => CallbackAction::Logs,
            "clear" => CallbackAction::Clear,
            "download_logs" => CallbackAction::DownloadLogs,
            "download_errors" => CallbackAction::DownloadErrors,
            "help" => CallbackAction::Help,
            "api_errors" => CallbackAction::ApiErrors,
            "ws_errors" => CallbackAction::WsErrors,
            "back" => CallbackAction::Back,
            _ => return None,
        };
        Some(action)
    }
}

/// 인라인 버튼
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// 인라인 키보드 (행 단위)
pub type Keyboard = Vec<Vec<Button>>;

/// 송신 메시지
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: ParseMode,
    pub keyboard: Keyboard,
}

impl OutgoingMessage {
    /// Markdown 메시지
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Markdown,
            keyboard: Vec::new(),
        }
    }

    /// 키보드 첨부
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// 첨부 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub content: Vec<u8>,
    pub caption: Option<String>,
}

/// 채팅 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

/// 수신 이벤트 (getUpdates 결과를 정규화)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `/command` 텍스트
    Command {
        target: ChatTarget,
        chat_kind: ChatKind,
        chat_title: Option<String>,
        from_name: String,
        /// 명령 이름 (슬래시, @봇이름 제외, 소문자)
        command: String,
    },
    /// 인라인 버튼 클릭
    Callback {
        callback_id: String,
        target: ChatTarget,
        chat_kind: ChatKind,
        chat_title: Option<String>,
        message: Option<MessageHandle>,
        from_name: String,
        data: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_data_roundtrip_for_all_actions() {
        let actions = [
            CallbackAction::Start,
            CallbackAction::Refresh,
            CallbackAction::AllErrors,
            CallbackAction::Logs,
            CallbackAction::Clear,
            CallbackAction::DownloadLogs,
            CallbackAction::DownloadErrors,
            CallbackAction::Help,
            CallbackAction::ApiErrors,
            CallbackAction::WsErrors,
            CallbackAction::Back,
        ];
        for action in actions {
            assert_eq!(CallbackAction::from_data(action.as_data()), Some(action));
        }
        assert_eq!(CallbackAction::from_data("reboot"), None);
    }

    #[test]
    fn parse_mode_api_names() {
        assert_eq!(ParseMode::Markdown.as_api_str(), "Markdown");
        assert_eq!(ParseMode::Html.as_api_str(), "HTML");
    }
}
