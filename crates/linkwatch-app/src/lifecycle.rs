//! 라이프사이클 관리.
//!
//! 프로세스 종료 신호와 OS 시그널 대기. 감시 루프의 중단은 엔진의
//! `MonitoringFlag`가 맡고, 여기서는 봇 전체(업데이트 루프 포함)의 종료만 다룬다.

use tokio::sync::watch;
use tracing::{info, warn};

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        let _ = self.shutdown_tx.send(true);
    }

    /// OS 시그널 대기 (SIGINT, SIGTERM) 후 종료 신호 발송
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => info!("SIGINT 수신"),
                        _ = sigterm.recv() => info!("SIGTERM 수신"),
                    }
                }
                _ => {
                    warn!("유닉스 시그널 핸들러 등록 실패, Ctrl+C만 대기");
                    wait_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        wait_ctrl_c().await;

        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C 수신"),
        Err(e) => {
            warn!("Ctrl+C 핸들러 등록 실패: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lm = LifecycleManager::default();
        assert!(!*lm.subscribe().borrow());
    }

    #[test]
    fn late_subscriber_still_wakes() {
        let lm = LifecycleManager::new();
        lm.shutdown();
        let mut rx = lm.subscribe();
        tokio_test::block_on(rx.changed()).unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let lm = LifecycleManager::new();
        let mut updates = lm.subscribe();
        let mut dispatch = lm.subscribe();
        lm.shutdown();
        updates.changed().await.unwrap();
        dispatch.changed().await.unwrap();
        assert!(*updates.borrow() && *dispatch.borrow());
    }
}
