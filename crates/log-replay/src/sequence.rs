//! 시퀀스 -- 한 디렉토리에서 찾은 같은 종류의 로그 파일 묶음
//!
//! 디스커버리 단계에서 디렉토리를 재귀 탐색하고, 파일을 병렬로 검사(stat)한 뒤
//! 구간 시작 시각 순으로 정렬합니다. 이 순서는 이후 단계에서 다시 바꾸지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ironpost_core::metrics as m;
use ironpost_core::types::EventKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::PathCatalog;
use crate::error::{AggregateError, LogReplayError};
use crate::handle::{FileHandle, sha256_hex};
use crate::interval::Interval;
use crate::pool;
use crate::timestamp::TimestampExtractor;

/// 이벤트 종류 하나의 파일 스트림
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub(crate) data_dir: PathBuf,
    pub(crate) event_kind: EventKind,
    pub(crate) files: Vec<FileHandle>,
}

impl Sequence {
    /// 이미 검사한 파일로 시퀀스를 만듭니다. 파일은 구간 시작 순으로 정렬됩니다.
    pub fn new(data_dir: impl Into<PathBuf>, event_kind: EventKind, mut files: Vec<FileHandle>) -> Self {
        sort_by_interval(&mut files);
        Self {
            data_dir: data_dir.into(),
            event_kind,
            files,
        }
    }

    /// 디렉토리를 탐색하고 모든 파일을 `workers`개의 워커로 검사합니다.
    ///
    /// 구간이 뒤집혔거나 비어 있거나 인코딩을 지원하지 않는 파일은 경고 후 제외합니다.
    /// 그 외 검사 실패는 모아서 [`LogReplayError::Aggregate`]로 반환합니다.
    pub async fn discover(
        data_dir: impl Into<PathBuf>,
        event_kind: EventKind,
        extractor: Arc<dyn TimestampExtractor>,
        workers: usize,
    ) -> Result<Self, LogReplayError> {
        let data_dir = data_dir.into();
        let root = data_dir.clone();
        let catalog = tokio::task::spawn_blocking(move || PathCatalog::scan(&root))
            .await
            .map_err(|e| LogReplayError::Worker(format!("catalog scan task failed: {e}")))??;
        debug!(dir = %data_dir.display(), kind = %event_kind, files = catalog.len(), "stat pass starting");

        let results = pool::run_blocking(catalog.into_paths(), workers, move |path: PathBuf| {
            FileHandle::stat(path, event_kind, Some(extractor.as_ref()))
        })
        .await?;

        let mut files = Vec::with_capacity(results.len());
        let mut errors = AggregateError::new("async logfile stat");
        for result in results {
            match result {
                Ok(handle) => files.push(handle),
                Err(e) if e.is_exclusion() => {
                    warn!(dir = %data_dir.display(), error = %e, "excluding file from sequence");
                }
                Err(e) => errors.push(e),
            }
        }
        errors.into_result()?;

        info!(dir = %data_dir.display(), kind = %event_kind, files = files.len(), "sequence discovered");
        Ok(Self::new(data_dir, event_kind, files))
    }

    /// 데이터 디렉토리 기반 안정 식별자 (SHA-256 hex)
    pub fn id(&self) -> String {
        sha256_hex(&self.data_dir.display().to_string())
    }

    /// 데이터 디렉토리
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 이벤트 종류
    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    /// 파일 목록 (구간 시작 순)
    pub fn files(&self) -> &[FileHandle] {
        &self.files
    }

    /// 활성화된 파일 수
    pub fn enabled_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_enabled()).count()
    }

    /// 재생 구간과 겹치는 파일만 남기고 분류합니다.
    ///
    /// 남은 파일 수를 반환합니다.
    pub fn filter_to_window(&mut self, window: &Interval) -> usize {
        let before = self.files.len();
        self.files.retain_mut(|f| f.apply_window(window));
        let kept = self.files.len();

        metrics::gauge!(m::LOG_REPLAY_FILES_ENABLED, m::LABEL_KIND => self.event_kind.as_str())
            .set(kept as f64);
        debug!(
            dir = %self.data_dir.display(),
            kept,
            dropped = before - kept,
            "sequence filtered to window"
        );
        kept
    }

    /// 두 번째 파일부터 첫 라인 차이를 직전 파일과의 간격으로 바꿉니다.
    ///
    /// 간격은 `현재 파일 구간 시작 - 직전 파일 구간 끝`입니다.
    /// 파일 구간이 겹치면 음수가 될 수 있으며, 재생기가 0으로 처리합니다.
    pub fn calc_diffs_between_files(&mut self) {
        let mut previous_end = None;
        for file in self.files.iter_mut().filter(|f| f.enabled) {
            if let Some(end) = previous_end {
                let gap = file.interval.beginning - end;
                file.set_leading_gap(gap);
            }
            previous_end = Some(file.interval.end);
        }
    }
}

fn sort_by_interval(files: &mut [FileHandle]) {
    files.sort_by(|a, b| {
        a.interval
            .beginning
            .cmp(&b.interval.beginning)
            .then_with(|| a.path.cmp(&b.path))
    });
}
