//! Multimodal 모듈 - 음성 입출력 + 다이어그램
//!
//! 실제 음성 인식/합성 엔진은 외부 기능으로 취급합니다. 기본 구현은
//! "사용 불가"를 돌려주며, 파이프라인은 이를 경로 없음으로 처리합니다.

mod diagram;
mod expr;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

pub use diagram::{detect_diagram_need, render_svg, DiagramParams, Shape, SvgDiagramRenderer};
pub use expr::Expr;

/// 음성 합성에 넘기는 최대 문자 수
pub const TTS_MAX_CHARS: usize = 500;

/// 음성 → 텍스트
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// 텍스트 → 음성 파일
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<PathBuf>;
}

/// 다이어그램 파라미터 → 이미지 파일
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, params: &DiagramParams) -> Result<PathBuf>;
}

/// 음성 엔진이 설정되지 않았을 때의 기본 구현
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSpeech;

#[async_trait]
impl SpeechToText for UnavailableSpeech {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        anyhow::bail!("No speech-to-text engine configured (input: {:?})", audio_path)
    }
}

#[async_trait]
impl TextToSpeech for UnavailableSpeech {
    async fn synthesize(&self, _text: &str) -> Result<PathBuf> {
        anyhow::bail!("No text-to-speech engine configured")
    }
}
