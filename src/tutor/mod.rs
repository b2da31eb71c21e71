//! Tutor 모듈 - 질문 하나를 처리하는 오케스트레이터
//!
//! 과목 감지 → 교과서 검색 → (관련도 낮으면) 웹 보충 → 프롬프트 조립
//! → 캐시/완성 → 후처리(시험 형식, 다이어그램, 음성, 자료 추천, 후속 질문)
//!
//! 각 외부 기능의 실패는 해당 컴포넌트에서 타입이 있는 결과로 바뀌므로
//! 여기까지 올라오는 것은 패닉뿐입니다. 가장 바깥에서 한 번 잡아
//! 항상 형식이 갖춰진 `OrchestrationResult`를 돌려줍니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let tutor = TutorService::new(retriever, scraper, gateway, renderer);
//! let query = Query::new("What is a triangle?", 6, "Asha", None)?;
//! let result = tutor.process_query(&query, &student, &history, &QueryOptions::default()).await;
//! ```

mod prompt;
mod result;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::adaptive::{
    build_system_prompt, detect_subject, format_exam_style_answer, needs_exam_format,
    should_recommend_resources, suggest_next_steps, StudentState,
};
use crate::error::TutorError;
use crate::knowledge::{ContextRetriever, DEFAULT_RESULT_COUNT};
use crate::llm::CompletionGateway;
use crate::multimodal::{
    detect_diagram_need, DiagramParams, DiagramRenderer, SpeechToText, TextToSpeech,
    UnavailableSpeech, TTS_MAX_CHARS,
};
use crate::scraper::{truncate_chars, video_recommendations, FallbackScraper, ScrapeOutcome};
use crate::store::ConversationTurn;

pub use prompt::{
    build_messages, build_user_prompt, recent_exchanges, scraped_section_header, HISTORY_EXCHANGES,
};
pub use result::{OrchestrationResult, ResultMetadata, PIPELINE_APOLOGY};

/// 교과서 검색이 성공했을 때의 출처 라벨
pub const TEXTBOOK_SOURCE_LABEL: &str = "NCERT Textbooks";

/// 이 관련도 미만이면 웹 보충을 시도
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.3;

/// 추천 영상 검색어로 쓰는 질문 앞부분 길이
const TOPIC_MAX_CHARS: usize = 50;

// ============================================================================
// Query
// ============================================================================

/// 검증된 질문 (생성 후 변경 불가)
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    grade: u8,
    student: String,
    session: Option<String>,
}

impl Query {
    /// 빈 질문이나 5~10 밖의 학년은 거부
    pub fn new(
        text: impl Into<String>,
        grade: u8,
        student: impl Into<String>,
        session: Option<String>,
    ) -> Result<Self, TutorError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TutorError::EmptyQuery);
        }
        if !(5..=10).contains(&grade) {
            return Err(TutorError::GradeOutOfRange(grade));
        }

        Ok(Self {
            text: text.trim().to_string(),
            grade,
            student: student.into(),
            session,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn grade(&self) -> u8 {
        self.grade
    }

    pub fn student(&self) -> &str {
        &self.student
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

/// 질문별 옵션
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub include_audio: bool,
    pub include_diagram: bool,
    /// 모델 키 (없으면 학생 선호 모델 → 기본 모델)
    pub selected_model: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            include_audio: false,
            include_diagram: true,
            selected_model: None,
        }
    }
}

// ============================================================================
// TutorService
// ============================================================================

/// 오케스트레이터
///
/// 모든 협력자는 시작 시 한 번 만들어 주입합니다. 생성 후에는 읽기 전용입니다.
pub struct TutorService {
    retriever: ContextRetriever,
    scraper: FallbackScraper,
    gateway: CompletionGateway,
    diagrams: Arc<dyn DiagramRenderer>,
    speech_to_text: Arc<dyn SpeechToText>,
    text_to_speech: Arc<dyn TextToSpeech>,
    n_results: usize,
    relevance_threshold: f32,
}

impl TutorService {
    /// 음성 엔진은 기본적으로 "사용 불가"
    pub fn new(
        retriever: ContextRetriever,
        scraper: FallbackScraper,
        gateway: CompletionGateway,
        diagrams: Arc<dyn DiagramRenderer>,
    ) -> Self {
        Self {
            retriever,
            scraper,
            gateway,
            diagrams,
            speech_to_text: Arc::new(UnavailableSpeech),
            text_to_speech: Arc::new(UnavailableSpeech),
            n_results: DEFAULT_RESULT_COUNT,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }

    pub fn with_speech(
        mut self,
        speech_to_text: Arc<dyn SpeechToText>,
        text_to_speech: Arc<dyn TextToSpeech>,
    ) -> Self {
        self.speech_to_text = speech_to_text;
        self.text_to_speech = text_to_speech;
        self
    }

    pub fn with_retrieval(mut self, n_results: usize, relevance_threshold: f32) -> Self {
        self.n_results = n_results.max(1);
        self.relevance_threshold = relevance_threshold;
        self
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    /// 질문 처리
    ///
    /// 실패하더라도 사과 응답과 `metadata.error`가 담긴 결과를 돌려줍니다.
    pub async fn process_query(
        &self,
        query: &Query,
        student: &StudentState,
        history: &[ConversationTurn],
        options: &QueryOptions,
    ) -> OrchestrationResult {
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.run(query, student, history, options))
            .catch_unwind()
            .await;

        let mut result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Error processing query: {}", message);
                OrchestrationResult::failed(message)
            }
        };

        result.processing_time = started.elapsed().as_secs_f64();
        tracing::info!("Query processed in {:.2}s", result.processing_time);
        result
    }

    /// 음성 질문 → 텍스트 (실패하거나 비어 있으면 None)
    pub async fn transcribe(&self, audio_path: &Path) -> Option<String> {
        match self.speech_to_text.transcribe(audio_path).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!("Empty transcription for {:?}", audio_path);
                None
            }
            Err(e) => {
                tracing::warn!("Transcription failed: {:#}", e);
                None
            }
        }
    }

    async fn run(
        &self,
        query: &Query,
        student: &StudentState,
        history: &[ConversationTurn],
        options: &QueryOptions,
    ) -> OrchestrationResult {
        let text = query.text();
        let grade = query.grade();
        let mut result = OrchestrationResult::default();

        // 1. 과목 감지
        let subject = detect_subject(text);
        tracing::info!(
            "Detected subject: {}",
            subject.map(|s| s.as_str()).unwrap_or("none")
        );

        // 2. 교과서 검색
        let retrieval = self
            .retriever
            .retrieve(text, grade, self.n_results, subject)
            .await;
        let mut context = retrieval.format_context();
        if retrieval.found {
            result.sources.push(TEXTBOOK_SOURCE_LABEL.to_string());
        }
        tracing::info!(
            "Textbook context found: {}, relevance: {:.2}",
            retrieval.found,
            retrieval.relevance
        );

        // 3. 관련도가 낮으면 웹 보충
        if !retrieval.found || retrieval.relevance < self.relevance_threshold {
            tracing::info!("Low textbook relevance, attempting web scraping...");
            if let ScrapeOutcome::Found(scraped) = self.scraper.scrape(text, grade).await {
                context.push_str(scraped_section_header(scraped.origin));
                context.push_str(&scraped.content);
                result.sources.extend(scraped.sources);
            }
        }

        // 4. 프롬프트 조립
        let system_prompt =
            build_system_prompt(&student.name, grade, student.difficulty_level, subject);
        let user_prompt = build_user_prompt(text, &context, grade);
        let messages = build_messages(system_prompt, history, user_prompt);

        // 5. 캐시 → 완성
        let selected = options
            .selected_model
            .as_deref()
            .or(student.preferred_model.as_deref());
        let completion = self.gateway.generate(&messages, grade, selected).await;

        result.response = completion.text;
        result.metadata = ResultMetadata {
            error: completion
                .metadata
                .error
                .then(|| "all completion providers failed".to_string()),
            llm: Some(completion.metadata),
            subject: subject.map(|s| s.as_str().to_string()),
            rag_relevance: retrieval.relevance,
            context_found: retrieval.found,
            retrieval_error: retrieval.error,
        };

        // 6. 외부 자료 추천
        if should_recommend_resources(text, retrieval.relevance, student.struggle_count) {
            result.resource_recommendations =
                video_recommendations(&truncate_chars(text, TOPIC_MAX_CHARS), grade);
        }

        // 7. 시험 형식 (한 번만 적용)
        if needs_exam_format(grade, subject) {
            result.response = format_exam_style_answer(&result.response, grade);
        }

        // 8. 음성
        if options.include_audio {
            let excerpt = truncate_chars(&result.response, TTS_MAX_CHARS);
            result.audio_path = self.synthesize(&excerpt).await;
        }

        // 9. 다이어그램
        if options.include_diagram {
            if let Some(params) = detect_diagram_need(text, &result.response) {
                result.diagram_path = self.render_diagram(&params).await;
                result.diagram_params = Some(params);
            }
        }

        // 10. 후속 질문
        result.suggestions = suggest_next_steps(subject);

        result
    }

    async fn synthesize(&self, text: &str) -> Option<PathBuf> {
        match self.text_to_speech.synthesize(text).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Audio generation skipped: {:#}", e);
                None
            }
        }
    }

    async fn render_diagram(&self, params: &DiagramParams) -> Option<PathBuf> {
        match self.diagrams.render(params).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Diagram generation failed ({}): {:#}", params.kind(), e);
                None
            }
        }
    }
}

/// 패닉 페이로드 → 메시지
fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected panic in tutor pipeline".to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::DifficultyLevel;
    use crate::cache::MemoryResponseCache;
    use crate::knowledge::{Passage, PassageMetadata, SearchFilter, TextbookIndex};
    use crate::llm::{ChatMessage, CompletionProvider, ProviderKind, APOLOGY_MESSAGE};
    use crate::scraper::PageFetcher;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    enum IndexMode {
        Empty,
        Passages(Vec<f32>),
        Down,
        Panics,
    }

    struct FakeIndex(IndexMode);

    #[async_trait]
    impl TextbookIndex for FakeIndex {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            _filter: Option<&SearchFilter>,
        ) -> Result<Vec<Passage>> {
            match &self.0 {
                IndexMode::Empty => Ok(Vec::new()),
                IndexMode::Passages(distances) => Ok(distances
                    .iter()
                    .map(|d| Passage {
                        text: "Speed is the distance covered per unit time.".to_string(),
                        metadata: PassageMetadata {
                            source: Some("hesc108.pdf".to_string()),
                            ..Default::default()
                        },
                        distance: *d,
                    })
                    .collect()),
                IndexMode::Down => anyhow::bail!("index offline"),
                IndexMode::Panics => panic!("index corrupted"),
            }
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    /// 모든 URL에 같은 페이지를 돌려주거나 항상 실패
    struct FakeFetcher {
        page: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn offline() -> Arc<Self> {
            Arc::new(Self { page: None, calls: AtomicUsize::new(0) })
        }

        fn serving(page: &str) -> Arc<Self> {
            Arc::new(Self { page: Some(page.to_string()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.page {
                Some(page) => Ok(page.clone()),
                None => anyhow::bail!("network unreachable"),
            }
        }
    }

    /// 모델 ID별로 성공/실패가 정해진 프로바이더
    struct ScriptedProvider {
        failing: Vec<&'static str>,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl ScriptedProvider {
        fn new(failing: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                failing,
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, messages: &[ChatMessage], model_id: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages.to_vec();
            if self.failing.contains(&model_id) {
                anyhow::bail!("{} is not pulled", model_id);
            }
            Ok(format!("Answer from {}: a triangle has three sides.", model_id))
        }

        async fn check_model(&self, _model_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeRenderer {
        fail: bool,
    }

    #[async_trait]
    impl DiagramRenderer for FakeRenderer {
        async fn render(&self, params: &DiagramParams) -> Result<PathBuf> {
            if self.fail {
                anyhow::bail!("renderer offline");
            }
            Ok(PathBuf::from(format!("/tmp/{}.svg", params.kind())))
        }
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl SpeechToText for FixedTranscriber {
        async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FixedSpeaker;

    #[async_trait]
    impl TextToSpeech for FixedSpeaker {
        async fn synthesize(&self, text: &str) -> Result<PathBuf> {
            assert!(text.chars().count() <= TTS_MAX_CHARS);
            Ok(PathBuf::from("/tmp/answer.mp3"))
        }
    }

    fn tutor(
        index: IndexMode,
        fetcher: Arc<FakeFetcher>,
        provider: Arc<ScriptedProvider>,
        renderer_fails: bool,
    ) -> TutorService {
        let gateway = CompletionGateway::new(Arc::new(MemoryResponseCache::new(16)), "llama3.2")
            .with_provider(ProviderKind::Ollama, provider);

        TutorService::new(
            ContextRetriever::new(Arc::new(FakeIndex(index))),
            FallbackScraper::new(fetcher, "https://ncert.test"),
            gateway,
            Arc::new(FakeRenderer { fail: renderer_fails }),
        )
    }

    fn beginner(grade: u8) -> StudentState {
        let mut student = StudentState::new("Asha", grade);
        student.difficulty_level = DifficultyLevel::Beginner;
        student
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_triangle_question_without_context() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider.clone(), false);
        let query = Query::new("What is a triangle?", 6, "Asha", None).unwrap();

        let result = tutor
            .process_query(&query, &beginner(6), &[], &QueryOptions::default())
            .await;

        assert!(!result.response.is_empty());
        assert!(!result.is_error());
        assert_eq!(result.diagram_params.as_ref().map(|p| p.kind()), Some("geometry"));
        assert_eq!(result.diagram_path, Some(PathBuf::from("/tmp/geometry.svg")));
        assert!(!result.resource_recommendations.is_empty());
        assert!(!result.response.contains("Suggested marks"));
        assert!(result.sources.is_empty());
        assert_eq!(result.suggestions.len(), 3);
        assert_eq!(result.metadata.subject.as_deref(), Some("mathematics"));
        assert_eq!(result.metadata.rag_relevance, 0.0);
        assert!(result.audio_path.is_none());
        assert!(result.processing_time >= 0.0);

        let messages = provider.last_messages.lock().unwrap().clone();
        assert!(messages[0].content.contains("Asha"));
        assert!(messages
            .last()
            .unwrap()
            .content
            .contains("don't have textbook content available"));
    }

    #[tokio::test]
    async fn test_fallback_to_default_model() {
        let provider = ScriptedProvider::new(vec!["gemma3:4b"]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider.clone(), false);
        let query = Query::new("Explain fractions", 7, "Asha", None).unwrap();
        let options = QueryOptions {
            selected_model: Some("gemma3".to_string()),
            ..Default::default()
        };

        let result = tutor.process_query(&query, &beginner(7), &[], &options).await;

        assert_eq!(result.model_used(), Some("llama3.2:latest"));
        assert!(result.metadata.error.is_none());
        assert!(!result.metadata.llm.as_ref().unwrap().error);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_preferred_model_used_when_no_selection() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider, false);
        let query = Query::new("Explain fractions", 7, "Asha", None).unwrap();
        let mut student = beginner(7);
        student.preferred_model = Some("gemma3".to_string());

        let result = tutor
            .process_query(&query, &student, &[], &QueryOptions::default())
            .await;

        assert_eq!(result.model_used(), Some("gemma3:4b"));
    }

    #[tokio::test]
    async fn test_total_failure_still_well_formed() {
        let provider = ScriptedProvider::new(vec!["llama3.2:latest", "gemma3:4b"]);
        let tutor = tutor(IndexMode::Down, FakeFetcher::offline(), provider, true);
        let query = Query::new("Draw a triangle", 6, "Asha", None).unwrap();
        let options = QueryOptions {
            include_audio: true,
            ..Default::default()
        };

        let result = tutor.process_query(&query, &beginner(6), &[], &options).await;

        assert_eq!(result.response, APOLOGY_MESSAGE);
        assert!(result.metadata.error.is_some());
        assert!(result.metadata.retrieval_error.is_some());
        assert!(!result.metadata.context_found);
        assert!(result.audio_path.is_none());
        assert!(result.diagram_path.is_none());
        assert!(result.diagram_params.is_some());
        assert!(result.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn test_panic_becomes_apology() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Panics, FakeFetcher::offline(), provider.clone(), false);
        let query = Query::new("What is a cell?", 8, "Asha", None).unwrap();

        let result = tutor
            .process_query(&query, &beginner(8), &[], &QueryOptions::default())
            .await;

        assert_eq!(result.response, PIPELINE_APOLOGY);
        assert_eq!(result.metadata.error.as_deref(), Some("index corrupted"));
        assert!(result.processing_time >= 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_identical_query_hits_cache() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider.clone(), false);
        let query = Query::new("What is democracy?", 8, "Asha", None).unwrap();
        let student = beginner(8);

        let first = tutor
            .process_query(&query, &student, &[], &QueryOptions::default())
            .await;
        let second = tutor
            .process_query(&query, &student, &[], &QueryOptions::default())
            .await;

        assert!(!first.metadata.llm.as_ref().unwrap().from_cache);
        assert!(second.metadata.llm.as_ref().unwrap().from_cache);
        assert_eq!(second.response_time(), Some(0.0));
        assert_eq!(first.response, second.response);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relevant_context_skips_scraping() {
        let provider = ScriptedProvider::new(vec![]);
        let fetcher = FakeFetcher::offline();
        let tutor = tutor(IndexMode::Passages(vec![0.0, 0.2]), fetcher.clone(), provider.clone(), false);
        let query = Query::new("What is speed?", 7, "Asha", None).unwrap();

        let result = tutor
            .process_query(&query, &beginner(7), &[], &QueryOptions::default())
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.sources, vec![TEXTBOOK_SOURCE_LABEL.to_string()]);
        assert!(result.metadata.context_found);
        assert!(result.metadata.rag_relevance > 0.8);
        assert!(result.resource_recommendations.is_empty());

        let messages = provider.last_messages.lock().unwrap().clone();
        let prompt = &messages.last().unwrap().content;
        assert!(prompt.contains("[Source: hesc108.pdf]"));
        assert!(!prompt.contains("Web Scraped Content"));
    }

    #[tokio::test]
    async fn test_low_relevance_appends_scraped_content() {
        let page = r#"<html><body>
            <a href="textbook.php?fegp1=0-5">Class 6 Mathematics</a>
            <p>Triangles have three sides and three angles.</p>
        </body></html>"#;
        let provider = ScriptedProvider::new(vec![]);
        let fetcher = FakeFetcher::serving(page);
        let tutor = tutor(IndexMode::Passages(vec![9.0]), fetcher.clone(), provider.clone(), false);
        let query = Query::new("Angles of a triangle", 6, "Asha", None).unwrap();

        let result = tutor
            .process_query(&query, &beginner(6), &[], &QueryOptions::default())
            .await;

        assert_eq!(
            result.sources,
            vec![
                TEXTBOOK_SOURCE_LABEL.to_string(),
                "https://ncert.test/textbook.php?fegp1=0-5".to_string(),
            ]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        let messages = provider.last_messages.lock().unwrap().clone();
        let prompt = &messages.last().unwrap().content;
        assert!(prompt.contains("--- Web Scraped Content ---"));
        assert!(prompt.contains("Triangles have three sides and three angles."));
    }

    #[tokio::test]
    async fn test_exam_format_for_senior_science() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider, false);
        let query = Query::new("What is a chemical reaction?", 10, "Asha", None).unwrap();
        let options = QueryOptions {
            include_audio: true,
            include_diagram: false,
            selected_model: None,
        };
        let tutor = tutor.with_speech(Arc::new(UnavailableSpeech), Arc::new(FixedSpeaker));

        let result = tutor.process_query(&query, &beginner(10), &[], &options).await;

        assert_eq!(result.response.matches("Suggested marks").count(), 1);
        assert_eq!(result.audio_path, Some(PathBuf::from("/tmp/answer.mp3")));
        assert!(result.diagram_params.is_none());
        assert_eq!(result.metadata.subject.as_deref(), Some("science"));
    }

    #[tokio::test]
    async fn test_history_included_in_messages() {
        let provider = ScriptedProvider::new(vec![]);
        let tutor = tutor(IndexMode::Empty, FakeFetcher::offline(), provider.clone(), false);
        let query = Query::new("And for a square?", 6, "Asha", None).unwrap();
        let history = vec![
            ConversationTurn::user("Area of a rectangle?"),
            ConversationTurn::assistant("Length times width."),
        ];

        tutor
            .process_query(&query, &beginner(6), &history, &QueryOptions::default())
            .await;

        let messages = provider.last_messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "Area of a rectangle?");
        assert_eq!(messages[2].content, "Length times width.");
    }

    #[tokio::test]
    async fn test_transcribe() {
        let provider = ScriptedProvider::new(vec![]);
        let silent = tutor(IndexMode::Empty, FakeFetcher::offline(), provider.clone(), false);
        assert!(silent.transcribe(Path::new("q.wav")).await.is_none());

        let listening = tutor(IndexMode::Empty, FakeFetcher::offline(), provider, false)
            .with_speech(Arc::new(FixedTranscriber("  What is a cell?  ")), Arc::new(UnavailableSpeech));
        assert_eq!(
            listening.transcribe(Path::new("q.wav")).await.as_deref(),
            Some("What is a cell?")
        );
    }

    #[test]
    fn test_query_validation() {
        assert!(matches!(Query::new("   ", 7, "Asha", None), Err(TutorError::EmptyQuery)));
        assert!(matches!(
            Query::new("What is a cell?", 4, "Asha", None),
            Err(TutorError::GradeOutOfRange(4))
        ));
        assert!(matches!(
            Query::new("What is a cell?", 11, "Asha", None),
            Err(TutorError::GradeOutOfRange(11))
        ));

        let query = Query::new(" What is a cell? ", 5, "Asha", Some("s1".into())).unwrap();
        assert_eq!(query.text(), "What is a cell?");
        assert_eq!(query.session(), Some("s1"));
    }
}
