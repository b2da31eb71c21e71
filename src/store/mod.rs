//! Tutor Store - rusqlite 기반 학생/대화/캐시 저장소
//!
//! 저장 위치: `<data_dir>/tutor.db`
//!
//! - students: 학생 프로필 + 난이도 카운터
//! - conversations / messages: 세션별 대화 기록 (append-only)
//! - response_cache: LLM 응답 캐시 (만료 시각 포함)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::adaptive::{DifficultyLevel, StudentState};

/// 대화 기록 조회 기본 개수
pub const HISTORY_LIMIT: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// 대화 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }
}

/// 대화 한 턴 (메시지 한 건)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub model_used: Option<String>,
    /// 응답 생성 시간 (초)
    pub response_time: Option<f64>,
    pub audio_path: Option<String>,
    pub diagram_path: Option<String>,
}

impl ConversationTurn {
    fn with_role(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sources: Vec::new(),
            model_used: None,
            response_time: None,
            audio_path: None,
            diagram_path: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(TurnRole::Assistant, content)
    }
}

/// 대화 세션
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub student: String,
    pub session_id: String,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub student_count: usize,
    pub conversation_count: usize,
    pub message_count: usize,
    pub cached_responses: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// TutorStore
// ============================================================================

/// 튜터 저장소
///
/// 연결 하나를 Mutex로 감싸 공유합니다. 학생 카운터 갱신은 이 락 안에서
/// 트랜잭션으로 처리되므로 동시 피드백이 서로를 덮어쓰지 않습니다.
#[derive(Clone)]
pub struct TutorStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl TutorStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                name TEXT PRIMARY KEY,
                grade INTEGER NOT NULL,
                difficulty_level TEXT NOT NULL DEFAULT 'intermediate',
                struggle_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                preferred_model TEXT,
                total_queries INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student TEXT NOT NULL REFERENCES students(name),
                session_id TEXT NOT NULL UNIQUE,
                started_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                model_used TEXT,
                response_time REAL,
                audio_path TEXT,
                diagram_path TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, id);

            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .context("Failed to initialize schema")?;

        tracing::debug!("Tutor store initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Students
    // ------------------------------------------------------------------------

    /// 학생 저장 (이름이 같으면 전체 덮어쓰기)
    pub fn save_student(&self, student: &StudentState) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO students (name, grade, difficulty_level, struggle_count, success_count,
                                   preferred_model, total_queries, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(name) DO UPDATE SET
                grade = excluded.grade,
                difficulty_level = excluded.difficulty_level,
                struggle_count = excluded.struggle_count,
                success_count = excluded.success_count,
                preferred_model = excluded.preferred_model,
                total_queries = excluded.total_queries,
                updated_at = excluded.updated_at",
            params![
                student.name,
                student.grade,
                student.difficulty_level.as_str(),
                student.struggle_count,
                student.success_count,
                student.preferred_model,
                student.total_queries,
                now
            ],
        )
        .context("Failed to save student")?;

        tracing::info!("Saved student profile: {} (class {})", student.name, student.grade);
        Ok(())
    }

    /// 이름으로 학생 조회
    pub fn get_student(&self, name: &str) -> Result<Option<StudentState>> {
        let conn = self.lock()?;
        load_student(&conn, name)
    }

    /// 피드백 반영 (이해함 = success)
    ///
    /// 읽기-수정-쓰기를 한 트랜잭션으로 처리합니다.
    /// 학생이 없으면 `None`, 있으면 갱신된 상태와 단계 전환 여부를 돌려줍니다.
    pub fn record_feedback(&self, name: &str, understood: bool) -> Result<Option<(StudentState, bool)>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let Some(mut student) = load_student(&tx, name)? else {
            return Ok(None);
        };

        let changed = student.adjust_difficulty(understood);

        tx.execute(
            "UPDATE students
             SET difficulty_level = ?2, struggle_count = ?3, success_count = ?4, updated_at = ?5
             WHERE name = ?1",
            params![
                name,
                student.difficulty_level.as_str(),
                student.struggle_count,
                student.success_count,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to update difficulty")?;

        tx.commit().context("Failed to commit feedback")?;
        Ok(Some((student, changed)))
    }

    /// 총 질문 수 1 증가 (증가 후 값 반환)
    pub fn increment_queries(&self, name: &str) -> Result<Option<u32>> {
        let conn = self.lock()?;

        conn.query_row(
            "UPDATE students SET total_queries = total_queries + 1, updated_at = ?2
             WHERE name = ?1
             RETURNING total_queries",
            params![name, Utc::now().to_rfc3339()],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to increment query count")
    }

    // ------------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------------

    /// 세션 ID로 대화 조회, 없으면 생성
    ///
    /// 세션 ID가 없으면 새 UUID로 대화를 시작합니다.
    pub fn get_or_create_conversation(
        &self,
        student: &str,
        session_id: Option<&str>,
    ) -> Result<Conversation> {
        let conn = self.lock()?;
        let session_id = session_id
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let existing = conn
            .query_row(
                "SELECT id, student FROM conversations WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to look up conversation")?;

        if let Some((id, owner)) = existing {
            return Ok(Conversation {
                id,
                student: owner,
                session_id,
            });
        }

        conn.execute(
            "INSERT INTO conversations (student, session_id, started_at) VALUES (?1, ?2, ?3)",
            params![student, session_id, Utc::now().to_rfc3339()],
        )
        .context("Failed to create conversation")?;

        let id = conn.last_insert_rowid();
        tracing::info!("Started conversation {} for {}", session_id, student);

        Ok(Conversation {
            id,
            student: student.to_string(),
            session_id,
        })
    }

    /// 메시지 추가
    pub fn append_message(&self, conversation_id: i64, turn: &ConversationTurn) -> Result<i64> {
        let conn = self.lock()?;
        let sources = serde_json::to_string(&turn.sources).context("Failed to encode sources")?;

        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, sources, model_used,
                                   response_time, audio_path, diagram_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                conversation_id,
                turn.role.as_str(),
                turn.content,
                sources,
                turn.model_used,
                turn.response_time,
                turn.audio_path,
                turn.diagram_path,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert message")?;

        Ok(conn.last_insert_rowid())
    }

    /// 최근 메시지 `limit`개 (오래된 순)
    pub fn recent_history(&self, conversation_id: i64, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT role, content, sources, model_used, response_time, audio_path, diagram_path
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let mut turns: Vec<ConversationTurn> = stmt
            .query_map(params![conversation_id, limit as i64], |row| {
                let role: String = row.get(0)?;
                let sources: String = row.get(2)?;
                Ok(ConversationTurn {
                    role: TurnRole::parse(&role).unwrap_or(TurnRole::User),
                    content: row.get(1)?,
                    sources: serde_json::from_str(&sources).unwrap_or_default(),
                    model_used: row.get(3)?,
                    response_time: row.get(4)?,
                    audio_path: row.get(5)?,
                    diagram_path: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        turns.reverse();
        Ok(turns)
    }

    // ------------------------------------------------------------------------
    // Response Cache
    // ------------------------------------------------------------------------

    /// 캐시 조회 (만료된 항목은 없는 것으로 취급)
    pub fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT value FROM response_cache WHERE key = ?1 AND expires_at > ?2",
            params![key, Utc::now().timestamp()],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read response cache")
    }

    /// 캐시 저장
    pub fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = self.lock()?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

        conn.execute(
            "INSERT OR REPLACE INTO response_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )
        .context("Failed to write response cache")?;

        Ok(())
    }

    /// 만료된 캐시 정리
    pub fn purge_expired_cache(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM response_cache WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;

        if removed > 0 {
            tracing::debug!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let count = |table: &str| -> usize {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize
        };

        Ok(StoreStats {
            student_count: count("students"),
            conversation_count: count("conversations"),
            message_count: count("messages"),
            cached_responses: count("response_cache"),
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_student(conn: &Connection, name: &str) -> Result<Option<StudentState>> {
    conn.query_row(
        "SELECT name, grade, difficulty_level, struggle_count, success_count,
                preferred_model, total_queries
         FROM students WHERE name = ?1",
        params![name],
        |row| {
            let level: String = row.get(2)?;
            Ok(StudentState {
                name: row.get(0)?,
                grade: row.get(1)?,
                difficulty_level: DifficultyLevel::parse(&level).unwrap_or_default(),
                struggle_count: row.get(3)?,
                success_count: row.get(4)?,
                preferred_model: row.get(5)?,
                total_queries: row.get(6)?,
            })
        },
    )
    .optional()
    .context("Failed to load student")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, TutorStore) {
        let dir = TempDir::new().unwrap();
        let store = TutorStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_get_student() {
        let (_dir, store) = create_test_store();

        let mut student = StudentState::new("Asha", 7);
        student.preferred_model = Some("gemma3".to_string());
        store.save_student(&student).unwrap();

        let loaded = store.get_student("Asha").unwrap().unwrap();
        assert_eq!(loaded, student);
        assert!(store.get_student("Nobody").unwrap().is_none());

        // 같은 이름으로 다시 저장하면 갱신
        student.grade = 8;
        store.save_student(&student).unwrap();
        assert_eq!(store.get_student("Asha").unwrap().unwrap().grade, 8);
        assert_eq!(store.stats().unwrap().student_count, 1);
    }

    #[test]
    fn test_feedback_persists_transition() {
        let (_dir, store) = create_test_store();
        store.save_student(&StudentState::new("Ravi", 6)).unwrap();

        assert!(!store.record_feedback("Ravi", false).unwrap().unwrap().1);
        assert!(!store.record_feedback("Ravi", false).unwrap().unwrap().1);
        let (state, changed) = store.record_feedback("Ravi", false).unwrap().unwrap();

        assert!(changed);
        assert_eq!(state.difficulty_level, DifficultyLevel::Beginner);

        let loaded = store.get_student("Ravi").unwrap().unwrap();
        assert_eq!(loaded.difficulty_level, DifficultyLevel::Beginner);
        assert_eq!(loaded.struggle_count, 0);

        assert!(store.record_feedback("Ghost", true).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_feedback_is_not_lost() {
        let (_dir, store) = create_test_store();
        store.save_student(&StudentState::new("Meera", 9)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.record_feedback("Meera", true).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.get_student("Meera").unwrap().unwrap();
        assert_eq!(loaded.success_count, 4);
        assert_eq!(loaded.difficulty_level, DifficultyLevel::Intermediate);
    }

    #[test]
    fn test_increment_queries() {
        let (_dir, store) = create_test_store();
        store.save_student(&StudentState::new("Kiran", 10)).unwrap();

        assert_eq!(store.increment_queries("Kiran").unwrap(), Some(1));
        assert_eq!(store.increment_queries("Kiran").unwrap(), Some(2));
        assert_eq!(store.increment_queries("Ghost").unwrap(), None);
    }

    #[test]
    fn test_conversation_history_order_and_limit() {
        let (_dir, store) = create_test_store();
        store.save_student(&StudentState::new("Asha", 7)).unwrap();

        let conversation = store
            .get_or_create_conversation("Asha", Some("session-1"))
            .unwrap();
        let again = store
            .get_or_create_conversation("Asha", Some("session-1"))
            .unwrap();
        assert_eq!(conversation, again);

        for i in 0..6 {
            store
                .append_message(conversation.id, &ConversationTurn::user(format!("q{}", i)))
                .unwrap();
            let mut answer = ConversationTurn::assistant(format!("a{}", i));
            answer.sources = vec!["NCERT Textbooks".to_string()];
            answer.model_used = Some("llama3.2:latest".to_string());
            store.append_message(conversation.id, &answer).unwrap();
        }

        let history = store.recent_history(conversation.id, HISTORY_LIMIT).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content, "q1");
        assert_eq!(history[9].content, "a5");
        assert_eq!(history[9].sources, vec!["NCERT Textbooks".to_string()]);
        assert_eq!(history[8].role, TurnRole::User);
    }

    #[test]
    fn test_new_session_without_id() {
        let (_dir, store) = create_test_store();
        let a = store.get_or_create_conversation("Asha", None).unwrap();
        let b = store.get_or_create_conversation("Asha", None).unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_cache_expiry() {
        let (_dir, store) = create_test_store();

        store.cache_set("live", "hello", Duration::from_secs(3600)).unwrap();
        store.cache_set("dead", "bye", Duration::from_secs(0)).unwrap();

        assert_eq!(store.cache_get("live").unwrap().as_deref(), Some("hello"));
        assert!(store.cache_get("dead").unwrap().is_none());
        assert!(store.cache_get("missing").unwrap().is_none());

        assert_eq!(store.purge_expired_cache().unwrap(), 1);
        assert_eq!(store.stats().unwrap().cached_responses, 1);
    }
}
