//! 폴백 스크래퍼 - 교과서 검색이 약할 때 웹에서 보충 콘텐츠 수집
//!
//! 1. NCERT 웹사이트 (교과서 목록 → 학년 링크 → 본문, 최대 2000자)
//! 2. 교육 포털 (Khan Academy, BYJU'S 순서, 첫 성공만 사용, 최대 1500자)
//!
//! 각 소스의 실패(네트워크, 비정상 상태 코드, 본문 없음)는 "없음"으로 취급하고
//! 다음 소스로 넘어갑니다. 재시도는 하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// NCERT 본문 최대 길이 (문자 수)
pub const PRIMARY_MAX_CHARS: usize = 2000;
/// 포털 본문 최대 길이 (문자 수)
pub const SECONDARY_MAX_CHARS: usize = 1500;

/// 학년 링크 후보 최대 개수
const MAX_GRADE_LINKS: usize = 5;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 본문 추출 시 건너뛰는 태그
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "header", "footer"];

/// 포털 본문 선택자 (순서대로 첫 매치)
const PORTAL_CONTENT_SELECTORS: &[&str] = &["article", "main", "div[class*=\"content\"]"];

// ============================================================================
// PageFetcher
// ============================================================================

/// 페이지 가져오기 트레이트 (URL → HTML)
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 성공 상태 코드가 아니면 에러
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// reqwest 기반 페이지 가져오기
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} returned {}", url, status);
        }

        response.text().await.context("Failed to read response body")
    }
}

// ============================================================================
// Types
// ============================================================================

/// 보충 콘텐츠가 나온 곳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOrigin {
    /// NCERT 웹사이트
    Primary,
    /// 교육 포털
    Secondary,
}

/// 스크랩 결과 콘텐츠
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedContext {
    pub origin: ScrapeOrigin,
    pub content: String,
    /// NCERT면 페이지 URL, 포털이면 포털 이름
    pub sources: Vec<String>,
}

/// 스크랩 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Found(ScrapedContext),
    NotFound,
}

/// 외부 학습 자료 추천
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecommendation {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// 교육 포털 정의
#[derive(Debug, Clone)]
pub struct Portal {
    pub name: &'static str,
    pub search_base: &'static str,
    pub query_param: &'static str,
}

impl Portal {
    fn search_url(&self, query: &str) -> Result<Url> {
        Url::parse_with_params(self.search_base, &[(self.query_param, query)])
            .with_context(|| format!("Invalid search URL for {}", self.name))
    }
}

/// 기본 포털 목록 (우선순위 순)
pub fn default_portals() -> Vec<Portal> {
    vec![
        Portal {
            name: "Khan Academy",
            search_base: "https://www.khanacademy.org/search",
            query_param: "page_search_query",
        },
        Portal {
            name: "BYJU'S",
            search_base: "https://byjus.com/",
            query_param: "s",
        },
    ]
}

// ============================================================================
// FallbackScraper
// ============================================================================

/// 폴백 스크래퍼
pub struct FallbackScraper {
    fetcher: Arc<dyn PageFetcher>,
    ncert_base_url: String,
    portals: Vec<Portal>,
}

impl FallbackScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, ncert_base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            ncert_base_url: ncert_base_url.into().trim_end_matches('/').to_string(),
            portals: default_portals(),
        }
    }

    pub fn with_portals(mut self, portals: Vec<Portal>) -> Self {
        self.portals = portals;
        self
    }

    /// NCERT → 포털 순으로 시도, 첫 성공 하나만 반환
    pub async fn scrape(&self, query: &str, grade: u8) -> ScrapeOutcome {
        if let Some(found) = self.search_ncert(grade).await {
            return ScrapeOutcome::Found(found);
        }

        match self.search_portals(query).await {
            Some(found) => ScrapeOutcome::Found(found),
            None => ScrapeOutcome::NotFound,
        }
    }

    /// NCERT 교과서 페이지에서 학년 링크를 찾아 첫 링크 본문 추출
    pub async fn search_ncert(&self, grade: u8) -> Option<ScrapedContext> {
        let index_url = format!("{}/textbook.php", self.ncert_base_url);

        let html = match self.fetcher.fetch(&index_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("NCERT website unavailable: {:#}", e);
                return None;
            }
        };

        let links = extract_grade_links(&html, grade, &self.ncert_base_url);
        let first = links.into_iter().next()?;

        let page = match self.fetcher.fetch(&first).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to scrape {}: {:#}", first, e);
                return None;
            }
        };

        let document = Html::parse_document(&page);
        let text = truncate_chars(&extract_text(document.root_element()), PRIMARY_MAX_CHARS);
        if text.is_empty() {
            return None;
        }

        tracing::info!("Scraped {} chars from {}", text.chars().count(), first);
        Some(ScrapedContext {
            origin: ScrapeOrigin::Primary,
            content: text,
            sources: vec![first],
        })
    }

    /// 교육 포털을 순서대로 시도
    pub async fn search_portals(&self, query: &str) -> Option<ScrapedContext> {
        for portal in &self.portals {
            match self.scrape_portal(portal, query).await {
                Ok(Some(text)) => {
                    tracing::info!("Scraped {} chars from {}", text.chars().count(), portal.name);
                    return Some(ScrapedContext {
                        origin: ScrapeOrigin::Secondary,
                        content: text,
                        sources: vec![portal.name.to_string()],
                    });
                }
                Ok(None) => tracing::debug!("No content found on {}", portal.name),
                Err(e) => tracing::warn!("Failed to scrape {}: {:#}", portal.name, e),
            }
        }

        None
    }

    async fn scrape_portal(&self, portal: &Portal, query: &str) -> Result<Option<String>> {
        let url = portal.search_url(query)?;
        let html = self.fetcher.fetch(url.as_str()).await?;
        let document = Html::parse_document(&html);

        for selector_str in PORTAL_CONTENT_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            if let Some(element) = document.select(&selector).next() {
                let text = truncate_chars(&extract_text(element), SECONDARY_MAX_CHARS);
                return Ok((!text.is_empty()).then_some(text));
            }
        }

        Ok(None)
    }
}

// ============================================================================
// Video Recommendations
// ============================================================================

/// 고정 유튜브 검색 추천 (스크랩 성공 여부와 무관)
pub fn video_recommendations(topic: &str, grade: u8) -> Vec<ResourceRecommendation> {
    vec![
        ResourceRecommendation {
            title: format!("{} - Class {} Explanation", topic, grade),
            url: youtube_search_url(&format!("{} class {} NCERT", topic, grade)),
            description: format!("Video explanation for {}", topic),
        },
        ResourceRecommendation {
            title: format!("{} - Khan Academy", topic),
            url: youtube_search_url(&format!("{} Khan Academy", topic)),
            description: format!("Khan Academy video on {}", topic),
        },
    ]
}

fn youtube_search_url(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("https://www.youtube.com/results?search_query={}", encoded)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 링크 텍스트에 학년 표기가 있는 링크 (최대 5개)
fn extract_grade_links(html: &str, grade: u8, base_url: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let keywords = [
        format!("class {}", grade),
        format!("class-{}", grade),
        format!("{}th", grade),
    ];

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter(|a| {
            let text = a.text().collect::<String>().to_lowercase();
            keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .filter_map(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}/{}", base_url, href.trim_start_matches('/'))
            }
        })
        .take(MAX_GRADE_LINKS)
        .collect()
}

/// 요소 텍스트 추출 (건너뛰는 태그 제외, 텍스트 노드마다 줄바꿈)
fn extract_text(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    collect_text(element, &mut lines);
    clean_text(&lines.join("\n"))
}

fn collect_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, lines);
                }
            }
            _ => {}
        }
    }
}

/// 연속 줄바꿈/공백 정리
fn clean_text(text: &str) -> String {
    let text = match regex::Regex::new(r"\n+") {
        Ok(re) => re.replace_all(text, "\n").into_owned(),
        Err(_) => text.to_string(),
    };

    match regex::Regex::new(r" +") {
        Ok(re) => re.replace_all(&text, " ").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

/// 문자 수 기준 자르기 (단어 경계 무시)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// Tests
// ============================================================================
