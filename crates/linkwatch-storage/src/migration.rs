//! 세션 DB 스키마 마이그레이션.
//!
//! `schema_version` 테이블에 적용된 버전을 남기고, 빠진 단계만 순서대로 적용한다.

use rusqlite::Connection;
use tracing::{debug, info};

/// 현재 스키마 버전
const SCHEMA_VERSION: u32 = 1;

/// 누락된 마이그레이션 적용
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = applied_version(conn)?;
    if current >= SCHEMA_VERSION {
        debug!("세션 스키마 최신 (v{current})");
        return Ok(());
    }
    info!("세션 스키마 v{current} → v{SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// 적용된 최고 버전 (테이블이 비어 있으면 0)
fn applied_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// V1: 세션 테이블과 만료/나이 인덱스
fn migrate_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("V1 적용: sessions");

    conn.execute_batch(
        "
        -- 구독 세션 (시각은 unix 초)
        CREATE TABLE IF NOT EXISTS sessions (
            chat_id INTEGER PRIMARY KEY,
            user_name TEXT NOT NULL,
            start_time INTEGER NOT NULL,
            thread_id INTEGER,
            expires_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    Ok(())
}
