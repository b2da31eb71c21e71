//! 교과서 PDF 수집
//!
//! .gitignore 패턴을 존중하며 디렉토리를 재귀 탐색합니다.
//! 파일 이름 순으로 정렬해 단원 순서를 유지합니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

/// PDF 확장자 여부 (대소문자 무시)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// 디렉토리에서 PDF 수집
pub fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let abs_path = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    if !abs_path.is_dir() {
        anyhow::bail!("Not a directory: {:?}", abs_path);
    }

    let mut files = Vec::new();

    for entry in WalkBuilder::new(&abs_path).hidden(true).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::info!("Collected {} PDFs from {:?}", files.len(), abs_path);
    Ok(files)
}
