//! SQLite 세션 저장소.
//!
//! `SessionStore` 포트 구현. 만료 시각(`expires_at`)이 지난 행은 조회에서 제외하고
//! `sweep_older_than`에서 함께 정리한다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkwatch_core::error::CoreError;
use linkwatch_core::models::session::StoredSession;
use linkwatch_core::ports::session_store::SessionStore;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::migration;

/// SQLite 세션 저장소: `SessionStore` 포트 구현
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// 파일 기반 저장소 생성
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| CoreError::Store(format!("SQLite 열기 실패: {e}")))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            ",
        )
        .map_err(|e| CoreError::Store(format!("PRAGMA 설정 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Store(format!("마이그레이션 실패: {e}")))?;

        info!("SQLite 세션 저장소 초기화: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 인메모리 저장소 생성 (테스트용)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Store(format!("인메모리 SQLite 생성 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Store(format!("마이그레이션 실패: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Store(format!("DB 잠금 실패: {e}")))?;
        op(&conn).map_err(|e| CoreError::Store(format!("SQLite 쿼리 실패: {e}")))
    }

    fn row_to_session(
        user_name: String,
        start_time: i64,
        thread_id: Option<i64>,
    ) -> StoredSession {
        StoredSession {
            user_name,
            start_time: DateTime::<Utc>::from_timestamp(start_time, 0).unwrap_or_default(),
            thread_id,
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(
        &self,
        chat_id: i64,
        session: &StoredSession,
        ttl_hours: u64,
    ) -> Result<(), CoreError> {
        let now = Utc::now().timestamp();
        let expires_at = now + (ttl_hours as i64) * 3600;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (chat_id, user_name, start_time, thread_id, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(chat_id) DO UPDATE SET
                    user_name = excluded.user_name,
                    start_time = excluded.start_time,
                    thread_id = excluded.thread_id,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![
                    chat_id,
                    session.user_name,
                    session.start_time.timestamp(),
                    session.thread_id,
                    expires_at,
                    now
                ],
            )
        })?;
        debug!("세션 저장: chat_id={chat_id}, ttl={ttl_hours}h");
        Ok(())
    }

    async fn load(&self, chat_id: i64) -> Result<Option<StoredSession>, CoreError> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_name, start_time, thread_id FROM sessions
                 WHERE chat_id = ?1 AND expires_at > ?2",
                params![chat_id, now],
                |row| {
                    Ok(Self::row_to_session(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                    ))
                },
            )
            .optional()
        })
    }

    async fn load_all(&self) -> Result<HashMap<i64, StoredSession>, CoreError> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, user_name, start_time, thread_id FROM sessions
                 WHERE expires_at > ?1",
            )?;
            let rows = stmt.query_map(params![now], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Self::row_to_session(row.get(1)?, row.get(2)?, row.get(3)?),
                ))
            })?;
            rows.collect::<rusqlite::Result<HashMap<_, _>>>()
        })
    }

    async fn delete(&self, chat_id: i64) -> Result<bool, CoreError> {
        let deleted = self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE chat_id = ?1", params![chat_id])
        })?;
        Ok(deleted > 0)
    }

    async fn sweep_older_than(&self, max_age_hours: u64) -> Result<usize, CoreError> {
        let now = Utc::now().timestamp();
        let cutoff = now - (max_age_hours as i64) * 3600;
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE start_time < ?1 OR expires_at <= ?2",
                params![cutoff, now],
            )
        })?;
        if deleted > 0 {
            info!("오래된 세션 {deleted}개 정리 (>{max_age_hours}h)");
        }
        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), CoreError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
