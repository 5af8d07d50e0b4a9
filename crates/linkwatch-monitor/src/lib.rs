//! # linkwatch-monitor
//!
//! 프로세스 자원 측정 어댑터.
//! 헬스 모니터가 메모리 한도 초과를 판단할 때 사용한다.
//!
//! ## 모듈
//! - `process`: 현재 프로세스 RSS (ResourceProbe 구현)

pub mod process;
