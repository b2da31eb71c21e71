//! Textbook Index - 벡터 검색 트레이트 및 타입
//!
//! 검색 백엔드는 "쿼리 + 필터 → 거리순 구절 목록" 기능으로만 취급합니다.
//! 내부 인덱스 구조는 구현체(LanceDB 등)의 몫입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 벡터 임베딩 차원 (Gemini gemini-embedding-001 기본값)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const EMBEDDING_DIMENSION: i32 = 768;

// ============================================================================
// Types
// ============================================================================

/// 구절 출처 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// 원본 파일 이름 등 출처 라벨
    pub source: Option<String>,
    /// 과목 식별자 (mathematics, science, ...)
    pub subject: Option<String>,
    /// 단원 ("Chapter 3")
    pub chapter: Option<String>,
    /// 페이지 번호 (1부터)
    pub page_number: Option<u32>,
    /// heading / list_item / paragraph
    pub content_type: Option<String>,
}

/// 검색된 구절
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub metadata: PassageMetadata,
    /// 벡터 거리 (작을수록 관련도 높음)
    pub distance: f32,
}

/// 검색 필터 (메타데이터 동등 조건)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub subject: Option<String>,
}

impl SearchFilter {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
    }
}

/// 인덱스에 넣을 구절 (수집용)
#[derive(Debug, Clone)]
pub struct PassageEntry {
    pub text: String,
    pub metadata: PassageMetadata,
    pub embedding: Vec<f32>,
}

// ============================================================================
// TextbookIndex Trait
// ============================================================================

/// 교과서 벡터 검색 트레이트 (async)
#[async_trait]
pub trait TextbookIndex: Send + Sync {
    /// 쿼리와 가까운 순서로 최대 `limit`개 구절 반환
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<Passage>>;

    /// 저장된 구절 개수
    async fn count(&self) -> Result<usize>;
}

/// 인덱스를 열 수 없을 때 쓰는 구현 (모든 검색이 실패)
///
/// 검색기는 실패를 "찾지 못함"으로 바꾸므로 파이프라인은 웹 보충으로 넘어갑니다.
#[derive(Debug, Clone)]
pub struct UnavailableIndex {
    reason: String,
}

impl UnavailableIndex {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextbookIndex for UnavailableIndex {
    async fn search(
        &self,
        _query: &str,
        _limit: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<Passage>> {
        anyhow::bail!("Textbook index unavailable: {}", self.reason)
    }

    async fn count(&self) -> Result<usize> {
        anyhow::bail!("Textbook index unavailable: {}", self.reason)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 거리 → 관련도 (1 / (1 + d))
///
/// 음수 거리는 0으로 취급하여 결과가 (0, 1] 범위를 벗어나지 않게 합니다.
pub fn distance_to_relevance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// 필터 값 이스케이프 (SQL 문자열 리터럴)
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_relevance() {
        assert!((distance_to_relevance(0.0) - 1.0).abs() < 1e-6);
        assert!((distance_to_relevance(1.0) - 0.5).abs() < 1e-6);
        assert!((distance_to_relevance(-3.0) - 1.0).abs() < 1e-6);
        assert!(distance_to_relevance(1000.0) > 0.0);
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("science"), "science");
        assert_eq!(escape_filter_value("o'brien"), "o''brien");
    }

    #[tokio::test]
    async fn test_unavailable_index_fails() {
        let index = UnavailableIndex::new("no API key");
        let err = index.search("photosynthesis", 3, None).await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
        assert!(index.count().await.is_err());
    }

    #[test]
    fn test_filter_empty() {
        assert!(SearchFilter::default().is_empty());
        assert!(!SearchFilter::subject("science").is_empty());
    }
}
