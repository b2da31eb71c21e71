//! 파이프라인 결과 타입

use std::path::PathBuf;

use serde::Serialize;

use crate::llm::CompletionMetadata;
use crate::multimodal::DiagramParams;
use crate::scraper::ResourceRecommendation;

/// 파이프라인 전체가 실패했을 때의 응답
pub const PIPELINE_APOLOGY: &str =
    "I'm sorry, I encountered an error while processing your question. Please try again!";

/// 결과 메타데이터
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultMetadata {
    /// 완성 단계 메타데이터 (파이프라인이 그 전에 실패하면 없음)
    pub llm: Option<CompletionMetadata>,
    /// 감지된 과목 식별자
    pub subject: Option<String>,
    pub rag_relevance: f32,
    pub context_found: bool,
    /// 검색 백엔드 실패 설명
    pub retrieval_error: Option<String>,
    /// 설정되어 있으면 사용자에게 보이는 응답은 사과 메시지
    pub error: Option<String>,
}

/// 질문 하나에 대한 최종 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestrationResult {
    pub response: String,
    pub sources: Vec<String>,
    pub metadata: ResultMetadata,
    pub audio_path: Option<PathBuf>,
    pub diagram_path: Option<PathBuf>,
    pub diagram_params: Option<DiagramParams>,
    pub resource_recommendations: Vec<ResourceRecommendation>,
    pub suggestions: Vec<String>,
    /// 처리 시간 (초)
    pub processing_time: f64,
}

impl OrchestrationResult {
    /// 사과 응답 + 에러 메타데이터
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            response: PIPELINE_APOLOGY.to_string(),
            metadata: ResultMetadata {
                error: Some(error.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.metadata.error.is_some()
    }

    /// 응답한 모델 ID
    pub fn model_used(&self) -> Option<&str> {
        self.metadata.llm.as_ref().map(|m| m.model.as_str())
    }

    /// 완성 응답 시간 (캐시 적중이면 0)
    pub fn response_time(&self) -> Option<f64> {
        self.metadata.llm.as_ref().map(|m| m.response_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_is_well_formed() {
        let result = OrchestrationResult::failed("boom");

        assert_eq!(result.response, PIPELINE_APOLOGY);
        assert!(result.is_error());
        assert!(result.sources.is_empty());
        assert!(result.model_used().is_none());
        assert!(result.processing_time >= 0.0);
    }
}
