//! Context Retriever - 교과서 구절 검색 + 관련도 계산
//!
//! 검색 백엔드가 완전히 죽어 있어도 에러를 올리지 않고
//! `found = false`, 관련도 0, 에러 설명이 담긴 결과를 돌려줍니다.

use std::sync::Arc;

use crate::adaptive::Subject;

use super::vector::{distance_to_relevance, Passage, SearchFilter, TextbookIndex};

/// 구절 사이 구분자
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// 기본 검색 결과 개수
pub const DEFAULT_RESULT_COUNT: usize = 3;

/// 출처 라벨이 없을 때 쓰는 기본값
const DEFAULT_SOURCE_LABEL: &str = "NCERT";

// ============================================================================
// RetrievalResult
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    /// 검색 백엔드가 돌려준 순서 그대로
    pub passages: Vec<Passage>,
    pub found: bool,
    /// 1/(1+distance)의 평균 (없으면 0)
    pub relevance: f32,
    /// 백엔드 실패 설명
    pub error: Option<String>,
}

impl RetrievalResult {
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        let relevance = mean_relevance(passages.iter().map(|p| p.distance));
        Self {
            found: !passages.is_empty(),
            passages,
            relevance,
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// 프롬프트용 컨텍스트 블록
    ///
    /// 각 구절 앞에 `[Source: ...]` 라벨을 붙이고 구분자로 이어 붙입니다.
    pub fn format_context(&self) -> String {
        if !self.found {
            return String::new();
        }

        self.passages
            .iter()
            .map(|p| {
                let label = p
                    .metadata
                    .source
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_SOURCE_LABEL);
                format!("[Source: {}]\n{}", label, p.text)
            })
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER)
    }
}

/// 거리 목록 → 평균 관련도
pub fn mean_relevance(distances: impl IntoIterator<Item = f32>) -> f32 {
    let (sum, count) = distances
        .into_iter()
        .fold((0.0f32, 0usize), |(sum, count), d| {
            (sum + distance_to_relevance(d), count + 1)
        });

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

// ============================================================================
// ContextRetriever
// ============================================================================

/// 교과서 컨텍스트 검색기
pub struct ContextRetriever {
    index: Arc<dyn TextbookIndex>,
}

impl ContextRetriever {
    pub fn new(index: Arc<dyn TextbookIndex>) -> Self {
        Self { index }
    }

    /// 상위 `n_results`개 구절 검색
    ///
    /// 과목이 감지되었으면 과목 동등 필터를 겁니다. 재정렬은 하지 않습니다.
    pub async fn retrieve(
        &self,
        query: &str,
        grade: u8,
        n_results: usize,
        subject: Option<Subject>,
    ) -> RetrievalResult {
        let filter = subject.map(|s| SearchFilter::subject(s.as_str()));

        match self.index.search(query, n_results, filter.as_ref()).await {
            Ok(passages) => {
                let result = RetrievalResult::from_passages(passages);
                tracing::info!(
                    "Retrieved {} passages for class {} (relevance {:.2})",
                    result.passages.len(),
                    grade,
                    result.relevance
                );
                result
            }
            Err(e) => {
                tracing::warn!("Textbook search unavailable: {:#}", e);
                RetrievalResult::unavailable(format!("{:#}", e))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
