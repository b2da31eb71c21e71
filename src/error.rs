//! 호출자에게 노출되는 구조화된 에러
//!
//! 외부 기능(검색, 스크래핑, LLM, 미디어) 실패는 에러로 올라오지 않고
//! 각 컴포넌트 경계에서 타입이 있는 결과로 변환됩니다.
//! 여기에는 파이프라인 시작 전 거부(검증)와 저장소 에러만 남습니다.

use thiserror::Error;

/// 튜터 에러
#[derive(Debug, Error)]
pub enum TutorError {
    /// 질문 텍스트가 비어 있음
    #[error("query text is required")]
    EmptyQuery,

    /// 지원하지 않는 학년 (5~10만 허용)
    #[error("grade {0} is outside the supported range 5-10")]
    GradeOutOfRange(u8),

    /// 학생 프로필 없음
    #[error("student not found: {0}")]
    StudentNotFound(String),

    /// 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl TutorError {
    /// 검증 에러 여부 (HTTP 계층이라면 400에 해당)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyQuery | Self::GradeOutOfRange(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(TutorError::EmptyQuery.is_validation());
        assert!(TutorError::GradeOutOfRange(11).is_validation());
        assert!(!TutorError::StudentNotFound("x".into()).is_validation());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TutorError::GradeOutOfRange(4).to_string(),
            "grade 4 is outside the supported range 5-10"
        );
    }
}
