//! 타임스탬프 차이 캐시
//!
//! 파일 하나를 빌드한 결과(라인 수, 시간 구간, 차이 목록)를 작업 디렉토리에 JSON으로
//! 저장하고, 다음 실행에서 다시 읽어 전체 스캔을 건너뜁니다.
//!
//! # 디렉토리 구조
//! ```text
//! <work_dir>/
//!   cache/<sha256(path)>.json      -- 파일별 캐시 항목
//!   sequences/<sha256(dir)>.json   -- 시퀀스 덤프 (디버깅용)
//! ```
//!
//! 캐시 무효화는 하지 않습니다. 원본 파일이 바뀌면 캐시 파일을 직접 지워야 합니다.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use ironpost_core::metrics as m;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LogReplayError;
use crate::handle::FileHandle;
use crate::interval::Interval;
use crate::sequence::Sequence;

const CACHE_DIR: &str = "cache";
const SEQUENCE_DIR: &str = "sequences";

/// 디렉토리 생성 권한
#[cfg(unix)]
const DIR_MODE: u32 = 0o750;

/// 파일 생성 권한
#[cfg(unix)]
const FILE_MODE: u32 = 0o640;

/// 캐시 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 빌드 시점의 라인 수
    pub lines: usize,
    /// 빌드 시점의 시간 구간
    pub interval: Interval,
    /// 라인별 차이 (나노초)
    #[serde(with = "diff_nanos")]
    pub diffs: Vec<TimeDelta>,
}

/// 작업 디렉토리 기반 캐시 저장소
#[derive(Debug, Clone)]
pub struct ReplayCache {
    work_dir: PathBuf,
}

impl ReplayCache {
    /// 작업 디렉토리로 캐시를 생성합니다. 디렉토리는 처음 저장할 때 만듭니다.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// 작업 디렉토리
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 핸들에 대응하는 캐시 파일 경로
    pub fn entry_path(&self, handle: &FileHandle) -> PathBuf {
        self.work_dir
            .join(CACHE_DIR)
            .join(format!("{}.json", handle.id()))
    }

    /// 시퀀스 덤프 파일 경로
    pub fn sequence_path(&self, sequence: &Sequence) -> PathBuf {
        self.work_dir
            .join(SEQUENCE_DIR)
            .join(format!("{}.json", sequence.id()))
    }

    /// 캐시 항목을 읽어 핸들에 적용합니다.
    ///
    /// 차이 목록과 시간 구간을 함께 복원합니다. 항목이 없으면 `Ok(false)`를
    /// 반환합니다. 항목이 손상되었거나 라인 수 또는 차이 개수가 파일과 다르면 에러입니다.
    pub fn load_into(&self, handle: &mut FileHandle) -> Result<bool, LogReplayError> {
        let path = self.entry_path(handle);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                metrics::counter!(m::LOG_REPLAY_CACHE_LOOKUPS_TOTAL, m::LABEL_RESULT => "miss")
                    .increment(1);
                return Ok(false);
            }
            Err(e) => return Err(cache_error(&path, e)),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes).map_err(|e| cache_error(&path, e))?;
        if entry.lines != handle.line_count || entry.diffs.len() != handle.line_count {
            return Err(cache_error(
                &path,
                format!(
                    "corrupt entry: {} lines and {} diffs for {} lines",
                    entry.lines,
                    entry.diffs.len(),
                    handle.line_count
                ),
            ));
        }
        entry
            .interval
            .validate(&path.display().to_string())
            .map_err(|e| cache_error(&path, format!("corrupt entry: {e}")))?;

        handle.interval = entry.interval;
        handle.diffs = entry.diffs;
        metrics::counter!(m::LOG_REPLAY_CACHE_LOOKUPS_TOTAL, m::LABEL_RESULT => "hit").increment(1);
        debug!(file = %handle.path().display(), cache = %path.display(), "loaded diffs from cache");
        Ok(true)
    }

    /// 핸들의 빌드 결과를 캐시에 저장합니다.
    pub fn store(&self, handle: &FileHandle) -> Result<PathBuf, LogReplayError> {
        let path = self.entry_path(handle);
        let entry = CacheEntry {
            lines: handle.line_count,
            interval: handle.interval,
            diffs: handle.diffs.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&path, &bytes).map_err(|e| cache_error(&path, e))?;
        debug!(file = %handle.path().display(), cache = %path.display(), "stored diffs in cache");
        Ok(path)
    }

    /// 시퀀스를 JSON으로 덤프합니다.
    pub fn dump_sequence(&self, sequence: &Sequence) -> Result<PathBuf, LogReplayError> {
        let path = self.sequence_path(sequence);
        let bytes = serde_json::to_vec_pretty(sequence)?;
        write_atomic(&path, &bytes)?;
        debug!(dir = %sequence.data_dir().display(), dump = %path.display(), "sequence dumped");
        Ok(path)
    }
}

fn cache_error(path: &Path, reason: impl std::fmt::Display) -> LogReplayError {
    LogReplayError::Cache {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// 상위 디렉토리를 만들고 임시 파일에 쓴 뒤 이름을 바꿉니다.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = open_for_write(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn create_dir_all(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn open_for_write(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// `Vec<TimeDelta>`를 나노초 정수 배열로 직렬화합니다.
pub(crate) mod diff_nanos {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(diffs: &[TimeDelta], serializer: S) -> Result<S::Ok, S::Error> {
        let nanos: Vec<i64> = diffs
            .iter()
            .map(|d| d.num_nanoseconds().unwrap_or(i64::MAX))
            .collect();
        nanos.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TimeDelta>, D::Error> {
        let nanos = Vec::<i64>::deserialize(deserializer)?;
        Ok(nanos.into_iter().map(TimeDelta::nanoseconds).collect())
    }
}
