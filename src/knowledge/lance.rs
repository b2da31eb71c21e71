//! LanceDB Textbook Index - 교과서 구절 벡터 검색
//!
//! 구절 텍스트와 출처 메타데이터, 임베딩을 한 테이블에 저장하고
//! 과목 동등 조건을 prefilter로 적용해 ANN 검색합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::embedding::{EmbedTask, EmbeddingProvider};

use super::vector::{
    escape_filter_value, Passage, PassageEntry, PassageMetadata, SearchFilter, TextbookIndex,
    EMBEDDING_DIMENSION,
};

/// 구절 테이블 이름
const TABLE_NAME: &str = "passages";

// ============================================================================
// LanceTextbookIndex
// ============================================================================

/// LanceDB 기반 교과서 인덱스
pub struct LanceTextbookIndex {
    db: Connection,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LanceTextbookIndex {
    /// 인덱스 열기 (디렉토리가 없으면 생성)
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, embedder })
    }

    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
            Field::new("subject", DataType::Utf8, true),
            Field::new("chapter", DataType::Utf8, true),
            Field::new("page_number", DataType::Int32, true),
            Field::new("content_type", DataType::Utf8, true),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[PassageEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != EMBEDDING_DIMENSION as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIMENSION,
                bad.embedding.len()
            );
        }

        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        let sources: Vec<Option<&str>> =
            entries.iter().map(|e| e.metadata.source.as_deref()).collect();
        let subjects: Vec<Option<&str>> =
            entries.iter().map(|e| e.metadata.subject.as_deref()).collect();
        let chapters: Vec<Option<&str>> =
            entries.iter().map(|e| e.metadata.chapter.as_deref()).collect();
        let pages: Vec<Option<i32>> = entries
            .iter()
            .map(|e| e.metadata.page_number.map(|p| p as i32))
            .collect();
        let content_types: Vec<Option<&str>> = entries
            .iter()
            .map(|e| e.metadata.content_type.as_deref())
            .collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(Float32Array::from(embeddings_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema()),
            vec![
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(subjects)),
                Arc::new(StringArray::from(chapters)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(StringArray::from(content_types)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open passages table")
    }

    /// 구절 배치 삽입
    pub async fn insert_batch(&self, entries: &[PassageEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add passages")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create passages table")?;
        }

        Ok(entries.len())
    }

    /// 필터를 LanceDB SQL 조건으로 변환
    fn filter_expression(filter: &SearchFilter) -> Option<String> {
        filter
            .subject
            .as_deref()
            .map(|s| format!("subject = '{}'", escape_filter_value(s)))
    }

    fn batch_to_passages(batch: &RecordBatch) -> Result<Vec<Passage>> {
        let texts = string_column(batch, "text")?;
        let sources = string_column(batch, "source")?;
        let subjects = string_column(batch, "subject")?;
        let chapters = string_column(batch, "chapter")?;
        let content_types = string_column(batch, "content_type")?;

        let pages = batch
            .column_by_name("page_number")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing page_number column"))?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

        let optional = |arr: &StringArray, i: usize| -> Option<String> {
            (!arr.is_null(i)).then(|| arr.value(i).to_string())
        };

        Ok((0..batch.num_rows())
            .map(|i| Passage {
                text: texts.value(i).to_string(),
                metadata: PassageMetadata {
                    source: optional(sources, i),
                    subject: optional(subjects, i),
                    chapter: optional(chapters, i),
                    page_number: (!pages.is_null(i)).then(|| pages.value(i).max(0) as u32),
                    content_type: optional(content_types, i),
                },
                distance: distances.value(i),
            })
            .collect())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl TextbookIndex for LanceTextbookIndex {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<Passage>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let query_embedding = self
            .embedder
            .embed(query, EmbedTask::Query)
            .await
            .context("Failed to embed query")?;

        let table = self.open_table().await?;
        let mut search = table
            .vector_search(query_embedding)
            .context("Failed to create vector search")?
            .limit(limit);

        if let Some(expr) = filter.and_then(Self::filter_expression) {
            search = search.only_if(expr);
        }

        let batches: Vec<RecordBatch> = search
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        let mut passages = Vec::new();
        for batch in &batches {
            passages.extend(Self::batch_to_passages(batch)?);
        }

        Ok(passages)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

// ============================================================================
// Tests
// ============================================================================
