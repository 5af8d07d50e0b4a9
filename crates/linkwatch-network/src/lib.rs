//! # linkwatch-network
//!
//! 네트워크 어댑터.
//!
//! ## 모듈
//! - `ws_client`: WebSocket / Socket.IO 스트림 연결 (StreamConnector 구현)
//! - `http_probe`: 동기 HTTP GET 점검 (HttpProbe 구현)
//! - `telegram_client`: Telegram Bot API (ChatClient 구현 + getUpdates)
//! - `telegram_errors`: Bot API 오류 설명 → [`linkwatch_core::error::ChatError`] 분류

pub mod http_probe;
pub mod telegram_client;
pub mod telegram_errors;
pub mod ws_client;
