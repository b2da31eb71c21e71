//! Knowledge 모듈 - NCERT 교과서 구절 검색
//!
//! - Vector: 검색 기능 트레이트 + 구절 타입
//! - LanceDB: 벡터 검색 (ANN) 구현체
//! - Retriever: 검색 결과 → 관련도 + 프롬프트용 컨텍스트

mod lance;
mod retriever;
mod vector;

// Re-exports
pub use lance::LanceTextbookIndex;
pub use retriever::{
    mean_relevance, ContextRetriever, RetrievalResult, CONTEXT_DELIMITER, DEFAULT_RESULT_COUNT,
};
pub use vector::{
    distance_to_relevance, escape_filter_value, Passage, PassageEntry, PassageMetadata,
    SearchFilter, TextbookIndex, UnavailableIndex, EMBEDDING_DIMENSION,
};
