//! 설정 모듈
//!
//! 우선순위: 환경변수 > `<data_dir>/config.toml` > 기본값
//!
//! ```toml
//! ollama_url = "http://localhost:11434"
//! default_model = "llama3.2"
//! cache_ttl_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 설정 파일 이름
const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.ncert-tutor/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TUTOR_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ncert-tutor")
}

// ============================================================================
// TutorConfig
// ============================================================================

/// 튜터 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// 데이터 디렉토리 (SQLite, LanceDB, 미디어)
    pub data_dir: PathBuf,
    /// Ollama 서버 주소
    pub ollama_url: String,
    /// Gemini API 키 (파일에는 저장하지 않고 환경변수에서만 읽음)
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    /// 기본(폴백) 모델 키
    pub default_model: String,
    /// 응답 캐시 유효 시간 (초)
    pub cache_ttl_secs: u64,
    /// 메모리 캐시 최대 엔트리 수
    pub cache_capacity: usize,
    /// 검색 결과 개수
    pub retrieval_results: usize,
    /// 웹 폴백 발동 임계값
    pub relevance_threshold: f32,
    /// 스크래핑 HTTP 타임아웃 (초)
    pub http_timeout_secs: u64,
    /// LLM 호출 타임아웃 (초)
    pub llm_timeout_secs: u64,
    /// NCERT 웹사이트 주소
    pub ncert_base_url: String,
    /// 음성/다이어그램 출력 디렉토리 (없으면 `<data_dir>/media`)
    pub media_dir: Option<PathBuf>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            ollama_url: "http://localhost:11434".to_string(),
            gemini_api_key: None,
            default_model: "llama3.2".to_string(),
            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
            retrieval_results: 3,
            relevance_threshold: 0.3,
            http_timeout_secs: 10,
            llm_timeout_secs: 120,
            ncert_base_url: "https://ncert.nic.in".to_string(),
            media_dir: None,
        }
    }
}

impl TutorConfig {
    /// 기본 위치에서 설정 로드
    pub fn load() -> Result<Self> {
        let path = get_data_dir().join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// TOML 파일에서 로드 (환경변수 미적용)
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config: {:?}", path))
    }

    /// TOML 문자열 파싱
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("TUTOR_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(url) = std::env::var("TUTOR_OLLAMA_URL") {
            if !url.is_empty() {
                self.ollama_url = url;
            }
        }

        if let Ok(model) = std::env::var("TUTOR_DEFAULT_MODEL") {
            if !model.is_empty() {
                self.default_model = model;
            }
        }

        self.gemini_api_key = crate::embedding::get_api_key().ok();
    }

    /// 캐시 TTL
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// SQLite 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tutor.db")
    }

    /// LanceDB 경로
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("textbooks.lance")
    }

    /// `profile`로 마지막에 선택한 학생 이름을 담는 파일
    pub fn active_student_path(&self) -> PathBuf {
        self.data_dir.join("active_student")
    }

    /// 미디어 출력 디렉토리
    pub fn media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("media"))
    }
}

// ============================================================================
// Tests
// ============================================================================
