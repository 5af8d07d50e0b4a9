//! # linkwatch-storage
//!
//! 구독 세션 저장소 어댑터.
//! 재시작 후 세션을 복원하기 위해 사용자 세션을 TTL과 함께 보관한다.
//!
//! ## 모듈
//! - `sqlite`: SQLite 세션 저장소 (기본)
//! - `file_store`: JSON 파일 세션 저장소 (폴백)
//! - `migration`: 스키마 마이그레이션

pub mod file_store;
pub mod migration;
pub mod sqlite;

use linkwatch_core::error::CoreError;
use linkwatch_core::ports::session_store::SessionStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::file_store::FileSessionStore;
use crate::sqlite::SqliteSessionStore;

/// 백엔드 선택 결과
pub struct StoreSelection {
    /// 선택된 저장소
    pub store: Arc<dyn SessionStore>,
    /// 기본 백엔드를 쓰지 못한 사유 (폴백 시)
    pub degraded: Option<String>,
}

/// 세션 저장소 백엔드 선택.
///
/// SQLite를 먼저 열고, 실패하면 JSON 파일 저장소로 폴백한다.
/// 선택은 생성 시 한 번만 이루어진다.
pub fn open_session_store(
    db_path: &Path,
    fallback_path: &Path,
) -> Result<StoreSelection, CoreError> {
    match SqliteSessionStore::open(db_path) {
        Ok(store) => {
            info!("세션 저장소: SQLite ({})", db_path.display());
            Ok(StoreSelection {
                store: Arc::new(store),
                degraded: None,
            })
        }
        Err(e) => {
            warn!("SQLite 세션 저장소 열기 실패, 파일 저장소로 폴백: {e}");
            let store = FileSessionStore::open(fallback_path)?;
            info!("세션 저장소: JSON 파일 ({})", fallback_path.display());
            Ok(StoreSelection {
                store: Arc::new(store),
                degraded: Some(e.to_string()),
            })
        }
    }
}
