//! CLI 모듈
//!
//! ncert-tutor CLI 명령어 정의 및 구현
//!
//! 튜터 파이프라인의 바깥 표면입니다. 질문 하나를 처리한 뒤
//! 대화 기록과 학생 카운터를 저장하는 일은 여기서 합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adaptive::{StudentState, Subject};
use crate::cache::{MemoryResponseCache, ResponseCache, SqliteResponseCache};
use crate::config::TutorConfig;
use crate::embedding::{has_api_key, EmbeddingProvider, GeminiEmbedding};
use crate::error::TutorError;
use crate::ingest::TextbookIngester;
use crate::knowledge::{ContextRetriever, LanceTextbookIndex, TextbookIndex, UnavailableIndex};
use crate::llm::{find_model, CompletionGateway, GeminiProvider, OllamaProvider, ProviderKind};
use crate::multimodal::SvgDiagramRenderer;
use crate::scraper::{FallbackScraper, HttpFetcher};
use crate::store::{ConversationTurn, TutorStore, HISTORY_LIMIT};
use crate::tutor::{OrchestrationResult, Query, QueryOptions, TutorService};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "ncert-tutor")]
#[command(version, about = "NCERT 학습 튜터 (5~10학년)", long_about = None)]
pub struct Cli {
    /// 학생 이름 (없으면 마지막으로 profile 한 학생)
    #[arg(short, long, global = true)]
    pub student: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 학생 프로필 생성/수정
    Profile {
        /// 학생 이름
        #[arg(short, long)]
        name: String,

        /// 학년 (5~10)
        #[arg(short, long)]
        grade: u8,

        /// 선호 모델 (llama3.2, gemma3, gemini)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 질문하기
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        options: AskArgs,
    },

    /// 음성 파일로 질문하기
    Voice {
        /// 음성 파일 경로
        #[arg(id = "audio_file", value_name = "AUDIO")]
        audio: PathBuf,

        #[command(flatten)]
        options: AskArgs,
    },

    /// 마지막 답변에 대한 피드백
    Feedback {
        /// 이해했어요
        #[arg(long, conflicts_with = "confused")]
        understood: bool,

        /// 잘 모르겠어요
        #[arg(long)]
        confused: bool,
    },

    /// 교과서 PDF를 인덱스에 추가
    Ingest {
        /// PDF 폴더 (재귀)
        #[arg(short, long)]
        dir: PathBuf,

        /// 과목 (mathematics, science, social_studies)
        #[arg(long)]
        subject: String,
    },

    /// 모델 사용 가능 여부
    Models,

    /// 상태 확인
    Status,
}

/// 질문 옵션
#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    /// 이어갈 대화 세션 ID
    #[arg(long)]
    session: Option<String>,

    /// 음성 답변 생성
    #[arg(long)]
    audio: bool,

    /// 다이어그램 생성 안 함
    #[arg(long)]
    no_diagram: bool,

    /// 이번 질문에만 쓸 모델
    #[arg(short, long)]
    model: Option<String>,
}

impl AskArgs {
    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            include_audio: self.audio,
            include_diagram: !self.no_diagram,
            selected_model: self.model.clone(),
        }
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = TutorConfig::load().context("Failed to load configuration")?;
    let student = cli.student;

    match cli.command {
        Commands::Profile { name, grade, model } => cmd_profile(&config, &name, grade, model),
        Commands::Ask { question, options } => {
            cmd_ask(&config, student.as_deref(), &question, &options).await
        }
        Commands::Voice { audio, options } => {
            cmd_voice(&config, student.as_deref(), &audio, &options).await
        }
        Commands::Feedback {
            understood,
            confused,
        } => cmd_feedback(&config, student.as_deref(), understood, confused),
        Commands::Ingest { dir, subject } => cmd_ingest(&config, &dir, &subject).await,
        Commands::Models => cmd_models(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 프로필 명령어 (profile)
///
/// 기존 학생이면 난이도와 카운터는 유지하고 학년/모델만 바꿉니다.
fn cmd_profile(config: &TutorConfig, name: &str, grade: u8, model: Option<String>) -> Result<()> {
    if !(5..=10).contains(&grade) {
        return Err(TutorError::GradeOutOfRange(grade).into());
    }
    if let Some(ref key) = model {
        if find_model(key).is_none() {
            bail!("Unknown model '{}'. Run `ncert-tutor models` to list models.", key);
        }
    }

    let store = open_store(config)?;
    let mut student = store
        .get_student(name)?
        .unwrap_or_else(|| StudentState::new(name, grade));
    student.grade = grade;
    if model.is_some() {
        student.preferred_model = model;
    }

    store.save_student(&student)?;
    set_active_student(config, name)?;

    println!("[OK] {} (Class {}) 프로필이 저장되었습니다", student.name, student.grade);
    println!("     난이도: {}", student.difficulty_level);
    if let Some(ref model) = student.preferred_model {
        println!("     선호 모델: {}", model);
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &TutorConfig,
    student: Option<&str>,
    question: &str,
    options: &AskArgs,
) -> Result<()> {
    let store = open_store(config)?;
    let student = resolve_student(config, &store, student)?;
    let query = Query::new(question, student.grade, &student.name, options.session.clone())?;

    let tutor = build_tutor(config, &store).await?;
    answer(&tutor, &store, &query, &student, options).await
}

/// 음성 질문 명령어 (voice)
async fn cmd_voice(
    config: &TutorConfig,
    student: Option<&str>,
    audio: &Path,
    options: &AskArgs,
) -> Result<()> {
    if !audio.is_file() {
        bail!("Audio file not found: {:?}", audio);
    }

    let store = open_store(config)?;
    let student = resolve_student(config, &store, student)?;
    let tutor = build_tutor(config, &store).await?;

    println!("[*] 음성 인식 중: {}", audio.display());
    let Some(text) = tutor.transcribe(audio).await else {
        bail!("Could not transcribe {:?}. Try typing your question with `ncert-tutor ask`.", audio);
    };
    println!("[OK] 인식된 질문: \"{}\"", text);

    let query = Query::new(text, student.grade, &student.name, options.session.clone())?;
    answer(&tutor, &store, &query, &student, options).await
}

/// 피드백 명령어 (feedback)
fn cmd_feedback(
    config: &TutorConfig,
    student: Option<&str>,
    understood: bool,
    confused: bool,
) -> Result<()> {
    if understood == confused {
        bail!("--understood 또는 --confused 중 하나를 지정해야 합니다");
    }

    let store = open_store(config)?;
    let name = student_name(config, student)?;
    let (student, changed) = store
        .record_feedback(&name, understood)?
        .ok_or_else(|| TutorError::StudentNotFound(name.clone()))?;

    if understood {
        println!("[OK] 좋아요, {}! 잘하고 있어요.", student.name);
    } else {
        println!("[OK] 괜찮아요, {}. 다시 천천히 설명해 드릴게요.", student.name);
    }

    if changed {
        println!("     난이도 변경: {}", student.difficulty_level);
    } else {
        println!(
            "     난이도: {} (어려움 {}, 성공 {})",
            student.difficulty_level, student.struggle_count, student.success_count
        );
    }

    Ok(())
}

/// 수집 명령어 (ingest)
///
/// 폴더의 교과서 PDF를 블록 단위로 임베딩해 인덱스에 넣습니다.
async fn cmd_ingest(config: &TutorConfig, dir: &Path, subject: &str) -> Result<()> {
    let Some(subject) = Subject::parse(subject) else {
        bail!(
            "Unknown subject '{}'. Use one of: mathematics, science, social_studies",
            subject
        );
    };

    let Some(api_key) = config.gemini_api_key.clone() else {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    };

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(GeminiEmbedding::new(api_key).context("GeminiEmbedding 생성 실패")?);
    let index = LanceTextbookIndex::open(&config.index_path(), embedder.clone())
        .await
        .context("LanceDB 인덱스 열기 실패")?;

    println!("[*] 교과서 수집 중: {} ({})", dir.display(), subject);

    let ingester = TextbookIngester::new(embedder, Arc::new(index));
    let stats = ingester.ingest_directory(dir, subject).await?;

    println!();
    println!(
        "[OK] 완료: 파일 {}, 페이지 {}, 구절 {} (실패 {})",
        stats.files, stats.pages, stats.passages, stats.failed_files
    );

    Ok(())
}

/// 모델 명령어 (models)
async fn cmd_models(config: &TutorConfig) -> Result<()> {
    let cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new(1));
    let gateway = build_gateway(config, cache)?;

    println!("[*] 기본 모델: {}", gateway.default_model().key);
    println!();

    for status in gateway.model_status().await {
        let mark = if status.available { "OK" } else { "!" };
        println!("[{}] {:<9} {} ({}, {})", mark, status.key, status.name, status.provider, status.model_id);
        if let Some(reason) = status.reason {
            println!("     {}", truncate_text(&reason, 100));
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(config: &TutorConfig) -> Result<()> {
    println!("ncert-tutor v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] Ollama: {}", config.ollama_url);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (교과서 검색과 Gemini 모델 비활성)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match open_store(config) {
        Ok(store) => {
            match store.stats() {
                Ok(stats) => {
                    println!(
                        "[OK] 학생 {} 명, 대화 {} 건, 메시지 {} 건",
                        stats.student_count, stats.conversation_count, stats.message_count
                    );
                    println!("     캐시된 응답: {} 건", stats.cached_responses);
                    if let Ok(meta) = std::fs::metadata(&stats.db_path) {
                        println!("     DB 크기: {}", format_bytes(meta.len() as usize));
                    }
                }
                Err(e) => println!("[!] 통계 조회 실패: {}", e),
            }

            if let Ok(name) = student_name(config, None) {
                if let Ok(Some(student)) = store.get_student(&name) {
                    println!(
                        "[*] 현재 학생: {} (Class {}, {}, 질문 {} 회)",
                        student.name, student.grade, student.difficulty_level, student.total_queries
                    );
                }
            }
        }
        Err(e) => println!("[!] 저장소 열기 실패: {}", e),
    }

    match open_index(config).await.count().await {
        Ok(count) => println!("[OK] 교과서 인덱스: {} 구절", count),
        Err(e) => tracing::debug!("Index stats unavailable: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Service Wiring
// ============================================================================

fn open_store(config: &TutorConfig) -> Result<TutorStore> {
    TutorStore::open(&config.db_path()).context("TutorStore 열기 실패")
}

/// 교과서 인덱스 (키가 없거나 열 수 없으면 항상 실패하는 인덱스)
async fn open_index(config: &TutorConfig) -> Arc<dyn TextbookIndex> {
    let Some(api_key) = config.gemini_api_key.clone() else {
        return Arc::new(UnavailableIndex::new("GEMINI_API_KEY is not set"));
    };

    match open_lance(config, api_key).await {
        Ok(index) => Arc::new(index),
        Err(e) => {
            tracing::warn!("Textbook index disabled: {:#}", e);
            Arc::new(UnavailableIndex::new(format!("{:#}", e)))
        }
    }
}

async fn open_lance(config: &TutorConfig, api_key: String) -> Result<LanceTextbookIndex> {
    let embedder = Arc::new(GeminiEmbedding::new(api_key)?);
    LanceTextbookIndex::open(&config.index_path(), embedder).await
}

fn build_gateway(config: &TutorConfig, cache: Arc<dyn ResponseCache>) -> Result<CompletionGateway> {
    let timeout = Duration::from_secs(config.llm_timeout_secs);

    Ok(CompletionGateway::new(cache, &config.default_model)
        .with_ttl(config.cache_ttl())
        .with_provider(
            ProviderKind::Ollama,
            Arc::new(OllamaProvider::new(config.ollama_url.clone(), timeout)?),
        )
        .with_provider(
            ProviderKind::Google,
            Arc::new(GeminiProvider::new(config.gemini_api_key.clone(), timeout)?),
        ))
}

async fn build_tutor(config: &TutorConfig, store: &TutorStore) -> Result<TutorService> {
    let cache: Arc<dyn ResponseCache> = Arc::new(SqliteResponseCache::new(store.clone()));
    let gateway = build_gateway(config, cache)?;

    let fetcher = HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))?;
    let scraper = FallbackScraper::new(Arc::new(fetcher), config.ncert_base_url.clone());

    let retriever = ContextRetriever::new(open_index(config).await);
    let renderer = Arc::new(SvgDiagramRenderer::new(&config.media_dir()));

    Ok(TutorService::new(retriever, scraper, gateway, renderer)
        .with_retrieval(config.retrieval_results, config.relevance_threshold))
}

/// 파이프라인 실행 → 대화 저장 → 결과 출력
async fn answer(
    tutor: &TutorService,
    store: &TutorStore,
    query: &Query,
    student: &StudentState,
    options: &AskArgs,
) -> Result<()> {
    let conversation = store.get_or_create_conversation(query.student(), query.session())?;
    let history = store.recent_history(conversation.id, HISTORY_LIMIT)?;

    println!("[*] 생각 중... (Class {}, {})", student.grade, student.difficulty_level);
    let result = tutor
        .process_query(query, student, &history, &options.query_options())
        .await;

    store.append_message(conversation.id, &ConversationTurn::user(query.text()))?;
    store.append_message(conversation.id, &assistant_turn(&result))?;
    store.increment_queries(&student.name)?;

    print_result(&result);
    println!();
    println!("[*] 세션: {} (--session 으로 이어서 질문)", conversation.session_id);

    Ok(())
}

fn assistant_turn(result: &OrchestrationResult) -> ConversationTurn {
    let mut turn = ConversationTurn::assistant(&result.response);
    turn.sources = result.sources.clone();
    turn.model_used = result.model_used().map(str::to_string);
    turn.response_time = result.response_time();
    turn.audio_path = result.audio_path.as_ref().map(|p| p.display().to_string());
    turn.diagram_path = result.diagram_path.as_ref().map(|p| p.display().to_string());
    turn
}

fn print_result(result: &OrchestrationResult) {
    println!();
    println!("{}", result.response);
    println!();

    if !result.sources.is_empty() {
        println!("[출처] {}", result.sources.join(", "));
    }

    if let Some(ref path) = result.diagram_path {
        println!("[그림] {}", path.display());
    }

    if let Some(ref path) = result.audio_path {
        println!("[음성] {}", path.display());
    }

    if !result.resource_recommendations.is_empty() {
        println!("[추천 자료]");
        for rec in &result.resource_recommendations {
            println!("  - {}", rec.title);
            println!("    {}", rec.url);
        }
    }

    if !result.suggestions.is_empty() {
        println!("[다음 단계]");
        for suggestion in &result.suggestions {
            println!("  - {}", suggestion);
        }
    }

    let model = result.model_used().unwrap_or("-");
    let cached = result
        .metadata
        .llm
        .as_ref()
        .map(|m| m.from_cache)
        .unwrap_or(false);
    println!(
        "[*] 모델: {}{} | 관련도 {:.2} | {:.2}s",
        model,
        if cached { " (cache)" } else { "" },
        result.metadata.rag_relevance,
        result.processing_time
    );
}

// ============================================================================
// Active Student
// ============================================================================

fn set_active_student(config: &TutorConfig, name: &str) -> Result<()> {
    let path = config.active_student_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    std::fs::write(&path, name).with_context(|| format!("Failed to write {:?}", path))
}

/// `--student` 인자 → 없으면 마지막 profile 학생
fn student_name(config: &TutorConfig, explicit: Option<&str>) -> Result<String> {
    if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }

    let saved = std::fs::read_to_string(config.active_student_path()).unwrap_or_default();
    let saved = saved.trim();
    if saved.is_empty() {
        bail!("No student selected. Create one with `ncert-tutor profile --name <NAME> --grade <5-10>`.");
    }

    Ok(saved.to_string())
}

fn resolve_student(
    config: &TutorConfig,
    store: &TutorStore,
    explicit: Option<&str>,
) -> Result<StudentState> {
    let name = student_name(config, explicit)?;
    store
        .get_student(&name)?
        .ok_or_else(|| TutorError::StudentNotFound(name).into())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> TutorConfig {
        TutorConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "ncert-tutor", "--student", "Asha", "ask", "What is a triangle?", "--no-diagram", "-m", "gemma3",
        ])
        .unwrap();

        assert_eq!(cli.student.as_deref(), Some("Asha"));
        match cli.command {
            Commands::Ask { question, options } => {
                assert_eq!(question, "What is a triangle?");
                let opts = options.query_options();
                assert!(!opts.include_diagram);
                assert!(!opts.include_audio);
                assert_eq!(opts.selected_model.as_deref(), Some("gemma3"));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_feedback_flags_conflict() {
        assert!(Cli::try_parse_from(["ncert-tutor", "feedback", "--understood", "--confused"]).is_err());
    }

    #[test]
    fn test_profile_then_feedback() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        cmd_profile(&config, "Asha", 6, Some("gemma3".to_string())).unwrap();
        assert_eq!(student_name(&config, None).unwrap(), "Asha");

        for _ in 0..3 {
            cmd_feedback(&config, None, false, true).unwrap();
        }

        let store = open_store(&config).unwrap();
        let student = resolve_student(&config, &store, None).unwrap();
        assert_eq!(student.difficulty_level, crate::adaptive::DifficultyLevel::Beginner);
        assert_eq!(student.preferred_model.as_deref(), Some("gemma3"));
    }

    #[test]
    fn test_profile_validation() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        assert!(cmd_profile(&config, "Asha", 4, None).is_err());
        assert!(cmd_profile(&config, "Asha", 7, Some("gpt".to_string())).is_err());
        assert!(student_name(&config, None).is_err());
        assert!(cmd_feedback(&config, Some("Nobody"), true, false).is_err());
    }

    #[test]
    fn test_assistant_turn_copies_result() {
        let mut result = OrchestrationResult::failed("x");
        result.sources = vec!["NCERT Textbooks".to_string()];
        result.diagram_path = Some(PathBuf::from("/tmp/d.svg"));

        let turn = assistant_turn(&result);
        assert_eq!(turn.content, result.response);
        assert_eq!(turn.sources, result.sources);
        assert_eq!(turn.diagram_path.as_deref(), Some("/tmp/d.svg"));
        assert!(turn.model_used.is_none());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
