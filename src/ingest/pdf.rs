//! PDF 텍스트 추출 + 블록 분류
//!
//! pdf-extract로 페이지 텍스트를 얻고, 빈 줄 기준으로 블록을 나눈 뒤
//! 블록마다 heading / subheading / list_item / paragraph 를 붙입니다.
//! 글꼴 크기 정보가 없으므로 제목 판정은 모양(한 줄, 길이, 대소문자)으로 합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 이보다 짧은 블록은 버림
pub const MIN_BLOCK_CHARS: usize = 20;

/// 제목으로 볼 수 있는 최대 길이
const MAX_HEADING_CHARS: usize = 80;

/// 블록 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Heading,
    Subheading,
    ListItem,
    Paragraph,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Heading => "heading",
            ContentType::Subheading => "subheading",
            ContentType::ListItem => "list_item",
            ContentType::Paragraph => "paragraph",
        }
    }
}

/// 페이지 안의 텍스트 블록
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// 1부터 시작
    pub page_number: u32,
    pub text: String,
    pub content_type: ContentType,
}

/// PDF에서 페이지별 텍스트 추출 (페이지 번호는 1부터)
pub fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(Vec::new());
    }

    Ok(text
        .split('\x0c')
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page.to_string()))
        .filter(|(_, page)| !page.trim().is_empty())
        .collect())
}

/// NCERT 파일 이름에서 단원 추출 (`eemm101.pdf` → "Chapter 1")
pub fn chapter_from_filename(filename: &str) -> String {
    let chapter = regex::Regex::new(r"(?i)^[a-z]{4}1(\d{2})\.pdf$")
        .ok()
        .and_then(|re| re.captures(filename))
        .and_then(|caps| caps[1].parse::<u32>().ok());

    match chapter {
        Some(n) => format!("Chapter {}", n),
        None => "Unknown Chapter".to_string(),
    }
}

/// 페이지 텍스트 → 분류된 블록 (짧은 블록 제외)
pub fn split_blocks(page_number: u32, page_text: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    let mut flush = |lines: &mut Vec<&str>| {
        if lines.is_empty() {
            return;
        }
        let single_line = lines.len() == 1;
        let text = lines.join(" ");
        lines.clear();

        if text.chars().count() < MIN_BLOCK_CHARS {
            return;
        }

        blocks.push(TextBlock {
            page_number,
            content_type: classify_block(&text, single_line),
            text,
        });
    };

    for line in page_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut lines);
        } else {
            lines.push(trimmed);
        }
    }
    flush(&mut lines);

    blocks
}

/// 블록 종류 판정
fn classify_block(text: &str, single_line: bool) -> ContentType {
    let looks_like_title = single_line
        && text.chars().count() <= MAX_HEADING_CHARS
        && !text.ends_with(['.', '?', '!', ',', ';', ':']);

    if looks_like_title {
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if !letters.is_empty() && letters.iter().all(|c| c.is_uppercase()) {
            return ContentType::Heading;
        }

        let title_case = text
            .split_whitespace()
            .filter(|w| w.chars().next().map(|c| c.is_alphabetic()).unwrap_or(false))
            .filter(|w| w.chars().count() > 3)
            .all(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false));
        if title_case {
            return ContentType::Subheading;
        }
    }

    let is_list_item = regex::Regex::new(r"^\d+\.\s|^\([a-zA-Z]\)\s")
        .map(|re| re.is_match(text))
        .unwrap_or(false);
    if is_list_item {
        return ContentType::ListItem;
    }

    ContentType::Paragraph
}

// ============================================================================
// Tests
// ============================================================================
