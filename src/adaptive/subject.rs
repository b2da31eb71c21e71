//! 과목 분류 - 키워드 규칙 테이블
//!
//! 순서가 있는 (과목, 키워드 목록) 규칙을 위에서부터 평가하고
//! 처음 일치한 과목을 반환합니다. 점수 계산은 하지 않습니다.

use serde::{Deserialize, Serialize};

/// 과목
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Mathematics,
    Science,
    SocialStudies,
}

impl Subject {
    /// 메타데이터/필터에 쓰는 식별자
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Mathematics => "mathematics",
            Subject::Science => "science",
            Subject::SocialStudies => "social_studies",
        }
    }

    /// 식별자 파싱 (대소문자 무시, 일부 별칭 허용)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mathematics" | "math" | "maths" => Some(Subject::Mathematics),
            "science" | "physics" | "chemistry" | "biology" => Some(Subject::Science),
            "social_studies" | "social studies" | "social" => Some(Subject::SocialStudies),
            _ => None,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 과목 키워드 규칙 (순서 = 우선순위)
const SUBJECT_RULES: &[(Subject, &[&str])] = &[
    (
        Subject::Mathematics,
        &[
            "add", "subtract", "multiply", "divide", "equation", "solve", "calculate",
            "fraction", "percentage", "geometry", "algebra", "triangle", "area", "volume",
        ],
    ),
    (
        Subject::Science,
        &[
            "experiment", "reaction", "chemical", "physics", "force", "energy", "cell",
            "biology", "organism", "atom", "molecule", "photosynthesis",
        ],
    ),
    (
        Subject::SocialStudies,
        &[
            "history", "geography", "government", "democracy", "map", "river", "mountain",
            "civilization", "independence", "constitution",
        ],
    ),
];

/// 질문에서 과목 감지
///
/// 소문자 변환 후 부분 문자열 포함 여부로 판단합니다.
/// 여러 과목 키워드가 섞여 있으면 먼저 검사하는 수학이 우선합니다.
pub fn detect_subject(query: &str) -> Option<Subject> {
    let query_lower = query.to_lowercase();

    SUBJECT_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| query_lower.contains(k)))
        .map(|(subject, _)| *subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_each_subject() {
        assert_eq!(detect_subject("How do I solve this?"), Some(Subject::Mathematics));
        assert_eq!(
            detect_subject("Explain PHOTOSYNTHESIS please"),
            Some(Subject::Science)
        );
        assert_eq!(
            detect_subject("Who wrote the constitution of India?"),
            Some(Subject::SocialStudies)
        );
    }

    #[test]
    fn test_no_subject() {
        assert_eq!(detect_subject("Tell me a joke"), None);
        assert_eq!(detect_subject(""), None);
    }

    #[test]
    fn test_mathematics_wins_on_overlap() {
        // "energy" (과학) + "calculate" (수학)
        assert_eq!(
            detect_subject("calculate the energy of the ball"),
            Some(Subject::Mathematics)
        );
        // "river" (사회) + "area" (수학)
        assert_eq!(
            detect_subject("area of the river basin"),
            Some(Subject::Mathematics)
        );
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Subject::parse("Maths"), Some(Subject::Mathematics));
        assert_eq!(Subject::parse("Biology"), Some(Subject::Science));
        assert_eq!(Subject::parse("social studies"), Some(Subject::SocialStudies));
        assert_eq!(Subject::parse("art"), None);
    }
}
