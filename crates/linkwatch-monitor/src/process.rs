//! 현재 프로세스 메모리 측정.
//!
//! `ResourceProbe` 포트 구현.

use linkwatch_core::ports::resource::ResourceProbe;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

/// sysinfo 기반 자원 측정기: `ResourceProbe` 포트 구현
pub struct SysInfoResourceProbe {
    sys: Mutex<System>,
    pid: Option<Pid>,
}

impl SysInfoResourceProbe {
    /// 현재 프로세스 측정기 생성
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!("현재 PID 조회 실패: {e}"))
            .ok();
        Self {
            sys: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysInfoResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysInfoResourceProbe {
    fn resident_memory_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut sys = self.sys.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(|p| p.memory())
    }
}
