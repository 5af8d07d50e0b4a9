//! 도메인 모델.

pub mod chat;
pub mod endpoint;
pub mod health;
pub mod incident;
pub mod log;
pub mod session;
