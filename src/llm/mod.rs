//! LLM 모듈 - 모델 레지스트리 + 완성(completion) 프로바이더
//!
//! - Ollama: 로컬 모델 (llama3.2, gemma3)
//! - Gemini: Google 클라우드 API (키 필요)
//! - Gateway: 캐시 → 선택 모델 → 기본 모델 폴백 → 사과 메시지

mod gateway;
mod gemini;
mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gateway::{CompletionGateway, CompletionMetadata, CompletionOutcome, ModelStatus, APOLOGY_MESSAGE};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

/// 기본(폴백) 모델 키
pub const DEFAULT_MODEL_KEY: &str = "llama3.2";

// ============================================================================
// Messages
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 대화 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 마지막 user 메시지 내용 (없으면 빈 문자열)
pub fn last_user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

// ============================================================================
// Model Registry
// ============================================================================

/// 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Google => "google",
        }
    }
}

/// 모델 정의
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    /// 선택 키 ("llama3.2")
    pub key: &'static str,
    pub name: &'static str,
    pub provider: ProviderKind,
    /// 프로바이더에 전달하는 모델 ID
    pub model_id: &'static str,
    pub description: &'static str,
}

/// 지원 모델 목록
pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        key: "llama3.2",
        name: "Llama 3.2",
        provider: ProviderKind::Ollama,
        model_id: "llama3.2:latest",
        description: "Meta Llama 3.2 - fast and efficient local model",
    },
    ModelSpec {
        key: "gemma3",
        name: "Gemma 3",
        provider: ProviderKind::Ollama,
        model_id: "gemma3:4b",
        description: "Google Gemma 3 - lightweight local model",
    },
    ModelSpec {
        key: "gemini",
        name: "Gemini API",
        provider: ProviderKind::Google,
        model_id: "gemini-pro",
        description: "Google Gemini - cloud API (requires key)",
    },
];

/// 키로 모델 찾기
pub fn find_model(key: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.key == key)
}

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 완성 프로바이더 트레이트 (메시지 → 텍스트 또는 실패)
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 메시지 시퀀스로 응답 생성
    async fn complete(&self, messages: &[ChatMessage], model_id: &str) -> Result<String>;

    /// 모델 사용 가능 여부 (불가하면 사유를 담은 에러)
    async fn check_model(&self, model_id: &str) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
