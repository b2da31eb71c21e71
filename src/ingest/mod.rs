//! Ingest 모듈 - NCERT 교과서 PDF → 벡터 인덱스
//!
//! 수집(PDF) → 페이지 텍스트 추출 → 블록 분류 → 임베딩 → LanceDB 삽입
//!
//! ## 사용법
//! ```rust,ignore
//! let ingester = TextbookIngester::new(embedder, index);
//! let stats = ingester.ingest_directory(Path::new("./books/class5"), Subject::Mathematics).await?;
//! ```

mod collector;
mod pdf;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adaptive::Subject;
use crate::embedding::{EmbedTask, EmbeddingProvider};
use crate::knowledge::{LanceTextbookIndex, PassageEntry, PassageMetadata};

pub use collector::{collect_pdfs, is_pdf};
pub use pdf::{chapter_from_filename, extract_pages, split_blocks, ContentType, TextBlock};

/// 한 번에 삽입하는 구절 수
const INSERT_BATCH_SIZE: usize = 50;

/// 수집 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub files: usize,
    pub failed_files: usize,
    pub pages: usize,
    pub passages: usize,
}

/// 교과서 수집기
pub struct TextbookIngester {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<LanceTextbookIndex>,
}

impl TextbookIngester {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<LanceTextbookIndex>) -> Self {
        Self { embedder, index }
    }

    /// 디렉토리의 모든 PDF 수집
    ///
    /// 한 파일이 실패해도 나머지는 계속 처리합니다.
    pub async fn ingest_directory(&self, dir: &Path, subject: Subject) -> Result<IngestStats> {
        let files = collect_pdfs(dir)?;
        let mut stats = IngestStats::default();

        for path in &files {
            match self.ingest_file(path, subject).await {
                Ok((pages, passages)) => {
                    stats.files += 1;
                    stats.pages += pages;
                    stats.passages += passages;
                }
                Err(e) => {
                    stats.failed_files += 1;
                    tracing::warn!("Failed to ingest {:?}: {:#}", path, e);
                }
            }
        }

        tracing::info!(
            "Ingested {} passages from {} files ({} failed)",
            stats.passages,
            stats.files,
            stats.failed_files
        );
        Ok(stats)
    }

    /// PDF 하나 수집 → (페이지 수, 구절 수)
    pub async fn ingest_file(&self, path: &Path, subject: Subject) -> Result<(usize, usize)> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pages(&owned))
            .await
            .context("PDF extraction task failed")??;

        let blocks: Vec<TextBlock> = pages
            .iter()
            .flat_map(|(page_number, text)| split_blocks(*page_number, text))
            .collect();

        tracing::info!("Processing {}: {} blocks", filename, blocks.len());

        let mut inserted = 0;
        for chunk in blocks.chunks(INSERT_BATCH_SIZE) {
            let entries = build_entries(self.embedder.as_ref(), &filename, subject, chunk).await?;
            inserted += self.index.insert_batch(&entries).await?;
        }

        Ok((pages.len(), inserted))
    }
}

/// 블록 → 임베딩이 붙은 인덱스 엔트리
pub async fn build_entries(
    embedder: &dyn EmbeddingProvider,
    filename: &str,
    subject: Subject,
    blocks: &[TextBlock],
) -> Result<Vec<PassageEntry>> {
    let chapter = chapter_from_filename(filename);
    let mut entries = Vec::with_capacity(blocks.len());

    for block in blocks {
        let embedding = embedder
            .embed(&block.text, EmbedTask::Document)
            .await
            .with_context(|| format!("Failed to embed block from {} p.{}", filename, block.page_number))?;

        entries.push(PassageEntry {
            text: block.text.clone(),
            metadata: PassageMetadata {
                source: Some(filename.to_string()),
                subject: Some(subject.as_str().to_string()),
                chapter: Some(chapter.clone()),
                page_number: Some(block.page_number),
                content_type: Some(block.content_type.as_str().to_string()),
            },
            embedding,
        });
    }

    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CountingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedding {
        async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
            assert_eq!(task, EmbedTask::Document);
            Ok(vec![text.len() as f32; 4])
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_build_entries_metadata() {
        let blocks = split_blocks(
            2,
            "Fishermen in Kerala go out to sea early in the morning.\n\nTHE FISH TALE AND NUMBERS",
        );

        let entries = build_entries(&CountingEmbedding, "eemm101.pdf", Subject::Mathematics, &blocks)
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].metadata.subject.as_deref(), Some("mathematics"));
        assert_eq!(entries[0].metadata.chapter.as_deref(), Some("Chapter 1"));
        assert_eq!(entries[0].metadata.source.as_deref(), Some("eemm101.pdf"));
        assert_eq!(entries[0].metadata.page_number, Some(2));
        assert_eq!(entries[0].metadata.content_type.as_deref(), Some("paragraph"));
        assert_eq!(entries[1].metadata.content_type.as_deref(), Some("heading"));
        assert_eq!(entries[1].embedding.len(), 4);
    }
}
