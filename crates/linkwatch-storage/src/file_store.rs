//! JSON 파일 세션 저장소.
//!
//! SQLite를 쓸 수 없을 때의 폴백. 전체 맵을 메모리에 두고 변경마다 파일을 다시 쓴다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use linkwatch_core::error::CoreError;
use linkwatch_core::models::session::StoredSession;
use linkwatch_core::ports::session_store::SessionStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 파일 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    session: StoredSession,
    expires_at: DateTime<Utc>,
}

/// JSON 파일 세션 저장소: `SessionStore` 포트 구현
pub struct FileSessionStore {
    path: PathBuf,
    records: Mutex<HashMap<i64, FileRecord>>,
}

impl FileSessionStore {
    /// 파일 저장소 열기 (없으면 빈 저장소)
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let records = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                match serde_json::from_str::<HashMap<i64, FileRecord>>(&content) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!("세션 파일 파싱 실패, 빈 저장소로 시작: {e}");
                        HashMap::new()
                    }
                }
            }
        } else {
            HashMap::new()
        };

        info!(
            "파일 세션 저장소 초기화: {} ({}개)",
            path.display(),
            records.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    /// 현재 맵을 파일로 기록 (임시 파일 후 rename)
    fn flush(&self, records: &HashMap<i64, FileRecord>) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(
        &self,
        chat_id: i64,
        session: &StoredSession,
        ttl_hours: u64,
    ) -> Result<(), CoreError> {
        let mut records = self.records.lock();
        records.insert(
            chat_id,
            FileRecord {
                session: session.clone(),
                expires_at: Utc::now() + Duration::hours(ttl_hours as i64),
            },
        );
        self.flush(&records)?;
        debug!("세션 파일 저장: chat_id={chat_id}");
        Ok(())
    }

    async fn load(&self, chat_id: i64) -> Result<Option<StoredSession>, CoreError> {
        let now = Utc::now();
        let records = self.records.lock();
        Ok(records
            .get(&chat_id)
            .filter(|r| r.expires_at > now)
            .map(|r| r.session.clone()))
    }

    async fn load_all(&self) -> Result<HashMap<i64, StoredSession>, CoreError> {
        let now = Utc::now();
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|(_, r)| r.expires_at > now)
            .map(|(id, r)| (*id, r.session.clone()))
            .collect())
    }

    async fn delete(&self, chat_id: i64) -> Result<bool, CoreError> {
        let mut records = self.records.lock();
        let existed = records.remove(&chat_id).is_some();
        if existed {
            self.flush(&records)?;
        }
        Ok(existed)
    }

    async fn sweep_older_than(&self, max_age_hours: u64) -> Result<usize, CoreError> {
        let now = Utc::now();
        let cutoff = now - Duration::hours(max_age_hours as i64);
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.session.start_time >= cutoff && r.expires_at > now);
        let removed = before - records.len();
        if removed > 0 {
            self.flush(&records)?;
            info!("오래된 세션 {removed}개 정리 (>{max_age_hours}h)");
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::metadata(dir)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(name: &str, age_hours: i64) -> StoredSession {
        StoredSession {
            user_name: name.to_string(),
            start_time: Utc::now() - Duration::hours(age_hours),
            thread_id: Some(9),
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("active_sessions.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.save(42, &session("carol", 0), 24).await.unwrap();
        drop(store);

        let reopened = FileSessionStore::open(&path).unwrap();
        let loaded = reopened.load(42).await.unwrap().unwrap();
        assert_eq!(loaded.user_name, "carol");
        assert_eq!(loaded.thread_id, Some(9));
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("active_sessions.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::open(&path).unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(&dir.path().join("s.json")).unwrap();
        store.save(1, &session("fresh", 2), 24).await.unwrap();
        store.save(2, &session("stale", 72), 24).await.unwrap();

        assert_eq!(store.sweep_older_than(48).await.unwrap(), 1);
        assert!(store.delete(1).await.unwrap());
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.ping().await.is_ok());
    }
}
