//! Hexagonal Architecture 포트 인터페이스.
//!
//! 어댑터 crate가 구현하고, 엔진은 `Arc<dyn Trait>`으로만 의존한다.

pub mod chat;
pub mod http_probe;
pub mod resource;
pub mod session_store;
pub mod stream;
