//! ncert-tutor - NCERT 교과서 기반 학습 튜터
//!
//! 교과서 벡터 검색(LanceDB) + 웹 보충 + LLM 완성을 묶어
//! 학생의 학년(5~10)과 난이도에 맞는 답변을 만드는 오케스트레이션 파이프라인입니다.

pub mod adaptive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod multimodal;
pub mod scraper;
pub mod store;
pub mod tutor;

// Re-exports
pub use adaptive::{detect_subject, DifficultyLevel, StudentState, Subject};
pub use cache::{cache_key, MemoryResponseCache, ResponseCache, SqliteResponseCache};
pub use config::{get_data_dir, TutorConfig};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::TutorError;
pub use knowledge::{ContextRetriever, LanceTextbookIndex, RetrievalResult, TextbookIndex};
pub use llm::{CompletionGateway, CompletionOutcome, CompletionProvider};
pub use scraper::{FallbackScraper, ScrapeOutcome};
pub use store::{ConversationTurn, TutorStore};
pub use tutor::{OrchestrationResult, Query, QueryOptions, TutorService};
