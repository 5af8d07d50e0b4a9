//! 프로세스 자원 측정 포트.
//!
//! 구현: `linkwatch-monitor` crate (sysinfo)

/// 현재 프로세스 자원 사용량
pub trait ResourceProbe: Send + Sync {
    /// 상주 메모리 (바이트). 측정 불가 시 None.
    fn resident_memory_bytes(&self) -> Option<u64>;
}
