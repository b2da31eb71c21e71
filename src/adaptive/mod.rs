//! Adaptive 모듈 - 학년/난이도 맞춤 교수 전략
//!
//! - 학년 → 교수 스타일 단계 (결정적 템플릿)
//! - 난이도/과목별 추가 지시 블록
//! - 자료 추천 판단, 시험형 답안 포맷, 다음 단계 제안

mod student;
mod subject;

pub use student::{DifficultyLevel, StudentState};
pub use subject::{detect_subject, Subject};

/// 자료 추천이 필요한 관련도 기준
pub const LOW_RELEVANCE_THRESHOLD: f32 = 0.3;

/// 복잡한 질문 표지어
const COMPLEXITY_KEYWORDS: &[&str] = &["prove", "derive", "explain in detail", "why", "how does"];

/// 시험형 답안에 표기하는 배점
const EXAM_MARKS: u32 = 5;

// ============================================================================
// Grade Tier
// ============================================================================

/// 학년별 교수 스타일 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeTier {
    /// 5~6학년: 놀이/이야기 중심
    Foundational,
    /// 7~8학년: 단계별 안내
    Guided,
    /// 9~10학년: 시험 대비
    ExamOriented,
}

impl GradeTier {
    /// 학년 → 단계 (범위 밖이면 가장 가까운 단계)
    pub fn for_grade(grade: u8) -> Self {
        match grade {
            0..=6 => GradeTier::Foundational,
            7..=8 => GradeTier::Guided,
            _ => GradeTier::ExamOriented,
        }
    }

    fn teaching_style(&self, grade: u8, student_name: &str) -> String {
        match self {
            GradeTier::Foundational => format!(
                "Your teaching style for Class {grade}:\n\
                 - Use FUN stories, games, and simple analogies to explain concepts\n\
                 - Make learning feel like an adventure or puzzle\n\
                 - Use emojis and friendly language\n\
                 - Break down concepts into tiny, digestible pieces\n\
                 - Relate everything to things {student_name} sees in daily life\n\
                 - Always encourage and celebrate their curiosity\n\
                 - If explaining math, use real objects (toys, fruits, etc.)\n\
                 - Avoid technical jargon completely"
            ),
            GradeTier::Guided => format!(
                "Your teaching style for Class {grade}:\n\
                 - Provide STEP-BY-STEP guided solutions with clear examples\n\
                 - Use practical real-world scenarios to explain concepts\n\
                 - Show the \"why\" behind each step\n\
                 - Use simple diagrams or visual descriptions when helpful\n\
                 - For math problems, show each calculation clearly\n\
                 - For science, explain cause-and-effect relationships\n\
                 - Build on their existing knowledge gradually\n\
                 - Encourage them to think critically"
            ),
            GradeTier::ExamOriented => format!(
                "Your teaching style for Class {grade}:\n\
                 - Provide EXAM-ORIENTED, detailed explanations\n\
                 - Break solutions into clear steps as if writing an answer key\n\
                 - Show proper formula usage and derivations\n\
                 - Explain marking scheme logic (which steps get marks)\n\
                 - Use standard NCERT terminology and notation\n\
                 - For math: Show all working, formulas, and final answers clearly\n\
                 - For science: Include definitions, diagrams, and scientific reasoning\n\
                 - Highlight important concepts that frequently appear in exams"
            ),
        }
    }
}

// ============================================================================
// System Prompt
// ============================================================================

fn difficulty_instruction(level: DifficultyLevel) -> Option<&'static str> {
    match level {
        DifficultyLevel::Beginner => Some(
            "⚠️ IMPORTANT: This student is struggling. Use the SIMPLEST possible explanation. \
             Break it down into even smaller steps.",
        ),
        DifficultyLevel::Intermediate => None,
        DifficultyLevel::Advanced => Some(
            "✨ This student is doing well! You can include additional insights and advanced concepts.",
        ),
    }
}

fn subject_instruction(subject: Subject) -> Option<&'static str> {
    match subject {
        Subject::Mathematics => {
            Some("📐 For math problems: Show ALL steps, formulas, and calculations clearly.")
        }
        Subject::Science => {
            Some("🔬 For science: Include definitions, examples, and real-world applications.")
        }
        Subject::SocialStudies => None,
    }
}

/// 학년/난이도/과목에 맞춘 시스템 프롬프트 생성
///
/// 같은 입력이면 항상 같은 구조를 반환합니다 (학생 이름만 삽입됨).
pub fn build_system_prompt(
    student_name: &str,
    grade: u8,
    difficulty_level: DifficultyLevel,
    subject: Option<Subject>,
) -> String {
    let tier = GradeTier::for_grade(grade);

    let mut sections = vec![
        format!(
            "You are a friendly and expert NCERT AI Tutor helping {student_name}, a Class {grade} student."
        ),
        tier.teaching_style(grade, student_name),
    ];

    if let Some(block) = difficulty_instruction(difficulty_level) {
        sections.push(block.to_string());
    }

    if let Some(block) = subject.and_then(subject_instruction) {
        sections.push(block.to_string());
    }

    sections.push(format!(
        "If the concept is too complex or {student_name} might need more help:\n\
         - Recommend helpful YouTube videos (Khan Academy, NCERT official, etc.)\n\
         - Suggest NCERT website links for additional reading\n\
         - Provide practice problem suggestions"
    ));

    sections.push(format!(
        "Remember to:\n\
         1. Always address {student_name} by name\n\
         2. Be encouraging and positive\n\
         3. Ask if they understood at the end\n\
         4. Offer to explain differently if needed"
    ));

    sections.join("\n\n")
}

// ============================================================================
// Post-processing Policies
// ============================================================================

/// 외부 자료 추천 여부
///
/// 관련도가 낮거나, 학생이 어려워하거나, 복잡한 질문이면 추천합니다.
pub fn should_recommend_resources(query: &str, relevance: f32, struggle_count: u32) -> bool {
    if relevance < LOW_RELEVANCE_THRESHOLD {
        return true;
    }

    if struggle_count >= 2 {
        return true;
    }

    let query_lower = query.to_lowercase();
    COMPLEXITY_KEYWORDS.iter().any(|k| query_lower.contains(k))
}

/// 시험형 답안 포맷 적용 대상인지
pub fn needs_exam_format(grade: u8, subject: Option<Subject>) -> bool {
    grade >= 9 && matches!(subject, Some(Subject::Mathematics | Subject::Science))
}

/// 시험형 답안으로 감싸기
///
/// 이미 감싼 텍스트에 다시 적용하면 이중으로 감싸집니다. 한 번만 호출하세요.
pub fn format_exam_style_answer(content: &str, grade: u8) -> String {
    if grade < 9 {
        return content.to_string();
    }

    format!(
        "📝 **Answer:** (Suggested marks: {EXAM_MARKS})\n\n\
         {content}\n\n\
         ---\n\
         💡 **Note:** In your exam, remember to:\n\
         - Write clear headings/subheadings\n\
         - Show all steps and formulas\n\
         - Draw diagrams if asked\n\
         - Write definitions exactly as in NCERT\n\
         - Check your answer once completed"
    )
}

/// 과목별 후속 질문 제안 (항상 3개)
pub fn suggest_next_steps(subject: Option<Subject>) -> Vec<String> {
    let suggestions: [&str; 3] = match subject {
        Some(Subject::Mathematics) => [
            "Would you like to see a similar problem to practice?",
            "Shall I explain any specific step in more detail?",
            "Want to try solving a practice question on this topic?",
        ],
        Some(Subject::Science) => [
            "Would you like to see a diagram for this concept?",
            "Shall I explain the real-world applications?",
            "Want to know common exam questions on this topic?",
        ],
        _ => [
            "Do you have any follow-up questions?",
            "Would you like more examples?",
            "Shall I recommend some videos to watch?",
        ],
    };

    suggestions.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: [DifficultyLevel; 3] = [
        DifficultyLevel::Beginner,
        DifficultyLevel::Intermediate,
        DifficultyLevel::Advanced,
    ];

    #[test]
    fn test_system_prompt_for_every_grade_and_level() {
        for grade in 5..=10u8 {
            for level in LEVELS {
                let prompt = build_system_prompt("Meera", grade, level, None);
                assert!(!prompt.is_empty());
                assert!(prompt.contains("Meera"));
                assert!(prompt.contains(&format!("Class {}", grade)));

                match grade {
                    5 | 6 => {
                        assert!(prompt.contains("FUN stories"));
                        assert!(!prompt.contains("EXAM-ORIENTED"));
                        assert!(!prompt.contains("marking scheme"));
                    }
                    7 | 8 => assert!(prompt.contains("STEP-BY-STEP")),
                    _ => {
                        assert!(prompt.contains("EXAM-ORIENTED"));
                        assert!(!prompt.contains("FUN stories"));
                    }
                }
            }
        }
    }

    #[test]
    fn test_difficulty_blocks() {
        let beginner = build_system_prompt("A", 7, DifficultyLevel::Beginner, None);
        let middle = build_system_prompt("A", 7, DifficultyLevel::Intermediate, None);
        let advanced = build_system_prompt("A", 7, DifficultyLevel::Advanced, None);

        assert!(beginner.contains("SIMPLEST"));
        assert!(!middle.contains("SIMPLEST"));
        assert!(!middle.contains("advanced concepts"));
        assert!(advanced.contains("advanced concepts"));
    }

    #[test]
    fn test_subject_blocks() {
        let math = build_system_prompt("A", 8, DifficultyLevel::Intermediate, Some(Subject::Mathematics));
        let science = build_system_prompt("A", 8, DifficultyLevel::Intermediate, Some(Subject::Science));
        let social = build_system_prompt("A", 8, DifficultyLevel::Intermediate, Some(Subject::SocialStudies));

        assert!(math.contains("Show ALL steps"));
        assert!(science.contains("real-world applications"));
        assert!(!social.contains("Show ALL steps"));
    }

    #[test]
    fn test_out_of_range_grades_clamp() {
        assert_eq!(GradeTier::for_grade(3), GradeTier::Foundational);
        assert_eq!(GradeTier::for_grade(12), GradeTier::ExamOriented);
    }

    #[test]
    fn test_deterministic() {
        let a = build_system_prompt("Kiran", 9, DifficultyLevel::Advanced, Some(Subject::Science));
        let b = build_system_prompt("Kiran", 9, DifficultyLevel::Advanced, Some(Subject::Science));
        assert_eq!(a, b);
    }

    #[test]
    fn test_resource_gate() {
        assert!(should_recommend_resources("What is a cell?", 0.25, 0));
        assert!(!should_recommend_resources("What is a cell?", 0.9, 0));
        assert!(should_recommend_resources("Please explain in detail", 0.9, 0));
        assert!(should_recommend_resources("What is a cell?", 0.9, 2));
        assert!(should_recommend_resources("Why is the sky blue?", 0.9, 0));
    }

    #[test]
    fn test_exam_format() {
        assert!(needs_exam_format(9, Some(Subject::Mathematics)));
        assert!(needs_exam_format(10, Some(Subject::Science)));
        assert!(!needs_exam_format(8, Some(Subject::Mathematics)));
        assert!(!needs_exam_format(10, Some(Subject::SocialStudies)));
        assert!(!needs_exam_format(10, None));

        let wrapped = format_exam_style_answer("x = 2", 10);
        assert!(wrapped.starts_with("📝 **Answer:** (Suggested marks: 5)"));
        assert!(wrapped.contains("x = 2"));

        // 두 번 적용하면 이중으로 감싸짐
        let twice = format_exam_style_answer(&wrapped, 10);
        assert_eq!(twice.matches("Suggested marks").count(), 2);

        assert_eq!(format_exam_style_answer("x = 2", 8), "x = 2");
    }

    #[test]
    fn test_next_steps() {
        let math = suggest_next_steps(Some(Subject::Mathematics));
        assert_eq!(math.len(), 3);
        assert!(math[0].contains("similar problem"));

        let generic = suggest_next_steps(Some(Subject::SocialStudies));
        assert_eq!(generic, suggest_next_steps(None));
    }
}
