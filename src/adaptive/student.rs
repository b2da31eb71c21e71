//! 학생 상태 및 난이도 전환 규칙

use serde::{Deserialize, Serialize};

/// 실패 누적 시 한 단계 하향하는 기준
const STRUGGLE_THRESHOLD: u32 = 3;
/// 성공 누적 시 한 단계 상향하는 기준
const SUCCESS_THRESHOLD: u32 = 5;

/// 난이도 단계 (beginner < intermediate < advanced)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "beginner",
            DifficultyLevel::Intermediate => "intermediate",
            DifficultyLevel::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "beginner" => Some(DifficultyLevel::Beginner),
            "intermediate" => Some(DifficultyLevel::Intermediate),
            "advanced" => Some(DifficultyLevel::Advanced),
            _ => None,
        }
    }

    /// 한 단계 아래 (가장 낮으면 None)
    fn lower(self) -> Option<Self> {
        match self {
            DifficultyLevel::Beginner => None,
            DifficultyLevel::Intermediate => Some(DifficultyLevel::Beginner),
            DifficultyLevel::Advanced => Some(DifficultyLevel::Intermediate),
        }
    }

    /// 한 단계 위 (가장 높으면 None)
    fn higher(self) -> Option<Self> {
        match self {
            DifficultyLevel::Beginner => Some(DifficultyLevel::Intermediate),
            DifficultyLevel::Intermediate => Some(DifficultyLevel::Advanced),
            DifficultyLevel::Advanced => None,
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 학생 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentState {
    pub name: String,
    /// 학년 (5~10)
    pub grade: u8,
    pub difficulty_level: DifficultyLevel,
    pub struggle_count: u32,
    pub success_count: u32,
    /// 선호 모델 키 (없으면 기본 모델)
    pub preferred_model: Option<String>,
    pub total_queries: u32,
}

impl StudentState {
    pub fn new(name: impl Into<String>, grade: u8) -> Self {
        Self {
            name: name.into(),
            grade,
            difficulty_level: DifficultyLevel::default(),
            struggle_count: 0,
            success_count: 0,
            preferred_model: None,
            total_queries: 0,
        }
    }

    /// 피드백에 따른 난이도 조정
    ///
    /// 단계가 바뀌었으면 true를 반환합니다. 전환이 일어나면 해당 카운터는 0으로 돌아갑니다.
    pub fn adjust_difficulty(&mut self, success: bool) -> bool {
        if success {
            self.success_count += 1;
            if self.success_count >= SUCCESS_THRESHOLD {
                if let Some(next) = self.difficulty_level.higher() {
                    tracing::info!(
                        "Promoting {} from {} to {}",
                        self.name,
                        self.difficulty_level,
                        next
                    );
                    self.difficulty_level = next;
                    self.success_count = 0;
                    return true;
                }
            }
        } else {
            self.struggle_count += 1;
            if self.struggle_count >= STRUGGLE_THRESHOLD {
                if let Some(next) = self.difficulty_level.lower() {
                    tracing::info!(
                        "Demoting {} from {} to {}",
                        self.name,
                        self.difficulty_level,
                        next
                    );
                    self.difficulty_level = next;
                    self.struggle_count = 0;
                    return true;
                }
            }
        }

        false
    }
}
