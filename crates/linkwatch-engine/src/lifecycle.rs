//! 감시 활성 플래그.
//!
//! 모든 루프의 유일한 협조적 취소 신호. `tokio::sync::watch` 기반이라
//! 비동기 루프는 `select!`로 즉시 관찰하고, 블로킹 폴러는 1초 단위로 확인한다.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 블로킹 대기 시 플래그 확인 주기
const POLL_QUANTUM: Duration = Duration::from_secs(1);

/// 감시 활성 플래그 (복제 시 같은 채널 공유)
#[derive(Clone)]
pub struct MonitoringFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for MonitoringFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringFlag {
    /// 비활성 상태로 생성
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    /// 활성화. 이미 활성이면 `false`
    pub fn start(&self) -> bool {
        self.tx.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    /// 비활성화. 이미 비활성이면 `false`
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|active| {
            if *active {
                *active = false;
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// 플래그가 해제될 때까지 대기 (이미 해제 상태면 즉시 반환)
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // 송신측은 self가 보유하므로 채널이 닫히지 않는다
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// `duration` 동안 대기. 도중에 플래그가 해제되면 `false`
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_active(),
            _ = self.stopped() => false,
        }
    }

    /// 블로킹 스레드용 대기: 1초 단위로 플래그 확인
    pub fn sleep_blocking(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if !self.is_active() {
                return false;
            }
            let step = remaining.min(POLL_QUANTUM);
            std::thread::sleep(step);
            remaining -= step;
        }
        self.is_active()
    }
}
