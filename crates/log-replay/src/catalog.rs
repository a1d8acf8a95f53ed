//! 데이터 디렉토리 파일 목록
//!
//! [`PathCatalog`]는 루트 디렉토리 아래의 일반 파일을 재귀적으로 수집합니다.
//! 순서는 보장하지 않습니다. 재생 순서는 파일 구간으로 정렬하여 결정합니다.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::LogReplayError;

/// 디렉토리 아래 일반 파일 목록
#[derive(Debug, Clone, Default)]
pub struct PathCatalog {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl PathCatalog {
    /// 루트 아래를 재귀 탐색합니다.
    ///
    /// 읽을 수 없는 항목은 경고 후 건너뜁니다. 파일이 하나도 없으면 에러입니다.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, LogReplayError> {
        let root = root.as_ref();
        let mut files = Vec::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable catalog entry");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        if files.is_empty() {
            return Err(LogReplayError::EmptyDirectory {
                path: root.display().to_string(),
            });
        }

        debug!(root = %root.display(), files = files.len(), "catalog scanned");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// 탐색 루트
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 수집된 파일 경로
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// 파일 수
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// 파일이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 경로 목록으로 변환합니다.
    pub fn into_paths(self) -> Vec<PathBuf> {
        self.files
    }
}
