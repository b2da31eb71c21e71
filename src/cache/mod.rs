//! Response Cache - LLM 응답 캐시
//!
//! 키 = `llm_response_` + sha256(마지막 user 메시지 | 학년 | 모델).
//! 이전 대화 턴은 키에 영향을 주지 않습니다.
//!
//! 캐시 장애는 miss로 취급하고 파이프라인을 멈추지 않습니다.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::store::TutorStore;

/// 캐시 키 네임스페이스
pub const CACHE_KEY_PREFIX: &str = "llm_response_";

/// 기본 TTL (1시간)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// 캐시 키 생성
pub fn cache_key(last_user_message: &str, grade: u8, model: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", last_user_message, grade, model).as_bytes());
    format!("{}{:x}", CACHE_KEY_PREFIX, digest)
}

// ============================================================================
// ResponseCache Trait
// ============================================================================

/// 응답 캐시 트레이트
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// 유효한 항목이 있으면 반환
    async fn get(&self, key: &str) -> Option<String>;

    /// 저장 (실패는 로그만 남김)
    async fn set(&self, key: &str, value: &str, ttl: Duration);
}

// ============================================================================
// MemoryResponseCache
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// 프로세스 내 LRU 캐시 (항목별 만료 시각)
pub struct MemoryResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryResponseCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.put(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

// ============================================================================
// SqliteResponseCache
// ============================================================================

/// SQLite 영속 캐시 (TutorStore의 response_cache 테이블)
pub struct SqliteResponseCache {
    store: TutorStore,
}

impl SqliteResponseCache {
    pub fn new(store: TutorStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.store.cache_get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Response cache read failed: {:#}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self.store.cache_set(key, value, ttl) {
            tracing::warn!("Response cache write failed: {:#}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key("What is a triangle?", 6, "llama3.2");
        assert!(key.starts_with(CACHE_KEY_PREFIX));
        assert_eq!(key.len(), CACHE_KEY_PREFIX.len() + 64);
        assert_eq!(key, cache_key("What is a triangle?", 6, "llama3.2"));
    }

    #[test]
    fn test_cache_key_inputs_matter() {
        let base = cache_key("What is a triangle?", 6, "llama3.2");
        assert_ne!(base, cache_key("What is a triangle?", 6, "gemma3"));
        assert_ne!(base, cache_key("What is a triangle?", 7, "llama3.2"));
        assert_ne!(base, cache_key("What is a circle?", 6, "llama3.2"));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryResponseCache::new(8);

        cache.set("k", "v", Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_cache_eviction() {
        let cache = MemoryResponseCache::new(2);

        cache.set("a", "1", DEFAULT_TTL).await;
        cache.set("b", "2", DEFAULT_TTL).await;
        cache.set("c", "3", DEFAULT_TTL).await;

        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.get("c").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_sqlite_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = TutorStore::open(&dir.path().join("cache.db")).unwrap();
        let cache = SqliteResponseCache::new(store);

        let key = cache_key("q", 9, "gemini");
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, "answer", DEFAULT_TTL).await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("answer"));
    }
}
