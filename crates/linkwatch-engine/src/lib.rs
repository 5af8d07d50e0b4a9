//! # linkwatch-engine
//!
//! 감시/집계/알림 엔진. 포트(trait) 구현체는 앱 crate에서 주입받는다.
//!
//! ## 구조
//!
//! - [`watcher`], [`poller`]: 스트림 감시와 HTTP API 폴링
//! - [`status_store`], [`incidents`], [`classifier`]: 상태 집계와 보류→확정 장애 승격
//! - [`health`], [`supervisor`]: 헬스 점검과 재시작 절차
//! - [`sessions`], [`dispatcher`], [`render`], [`export`]: 구독 세션과 대시보드 전달
//! - [`commands`], [`broadcast`]: 운영자 명령 처리와 설정 수신자 알림
//! - [`lifecycle`]: 감시 활성 플래그

pub mod broadcast;
pub mod classifier;
pub mod commands;
pub mod dispatcher;
pub mod export;
pub mod health;
pub mod incidents;
pub mod lifecycle;
pub mod poller;
pub mod render;
pub mod sessions;
pub mod status_store;
pub mod supervisor;
pub mod watcher;

#[cfg(test)]
mod test_support;
