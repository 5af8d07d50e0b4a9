//! 세션 저장소 포트.
//!
//! 구현: `linkwatch-storage` crate (SQLite 기본, JSON 파일 폴백)

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::CoreError;
use crate::models::session::StoredSession;

/// 구독 세션 키-값 저장소 (키: 채팅 ID)
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 세션 저장 (TTL 시간 후 만료)
    async fn save(
        &self,
        chat_id: i64,
        session: &StoredSession,
        ttl_hours: u64,
    ) -> Result<(), CoreError>;

    /// 세션 조회 (만료되었으면 None)
    async fn load(&self, chat_id: i64) -> Result<Option<StoredSession>, CoreError>;

    /// 만료되지 않은 전체 세션
    async fn load_all(&self) -> Result<HashMap<i64, StoredSession>, CoreError>;

    /// 세션 삭제: 존재했으면 true
    async fn delete(&self, chat_id: i64) -> Result<bool, CoreError>;

    /// 시작 시각이 `max_age_hours`보다 오래된 세션 정리: 삭제 건수
    async fn sweep_older_than(&self, max_age_hours: u64) -> Result<usize, CoreError>;

    /// 저장소 응답 확인 (헬스 점검)
    async fn ping(&self) -> Result<(), CoreError>;

    /// 백엔드 이름 (로그용)
    fn backend_name(&self) -> &'static str;
}
