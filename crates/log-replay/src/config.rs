//! 로그 재생 설정
//!
//! [`ReplayConfig`]는 core의 [`LogReplayConfig`]를 기반으로, 경로 확장과 시간 구간
//! 파싱을 끝낸 재생 엔진 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use ironpost_core::config::IronpostConfig;
//! use ironpost_log_replay::config::ReplayConfig;
//!
//! let core_config = IronpostConfig::load("ironpost.toml").await?;
//! let config = ReplayConfig::from_core(&core_config.replay)?;
//! config.validate()?;
//! ```

use std::path::{Path, PathBuf};

use ironpost_core::config::LogReplayConfig;
use ironpost_core::types::EventKind;

use crate::error::LogReplayError;
use crate::interval::Interval;
use crate::timestamp::{KnownTimestamps, TimestampField};

/// 기본 작업 디렉토리
const DEFAULT_WORK_DIR: &str = "~/.local/ironpost";

/// 재생할 스트림 디렉토리 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    /// 이벤트 종류
    pub kind: EventKind,
    /// 데이터 디렉토리 (`~` 확장 완료)
    pub dir: PathBuf,
}

/// 재생 엔진 설정
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// 스트림 디렉토리 목록. 디렉토리 하나가 시퀀스 하나가 됩니다.
    pub streams: Vec<StreamSource>,
    /// 재생 구간
    pub window: Interval,
    /// 워커 수
    pub workers: usize,
    /// 캐시와 시퀀스 덤프를 저장하는 작업 디렉토리
    pub work_dir: PathBuf,
    /// 캐시 사용 여부
    pub cache: bool,
    /// 빌드 중 파싱 에러 무시 여부
    pub ignore_parse_errors: bool,
    /// 출력 채널 용량
    pub channel_capacity: usize,
    /// 타임스탬프 키 조회 순서
    pub timestamp_fields: Vec<TimestampField>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            window: Interval::last_day(),
            workers: 2,
            work_dir: expand_home(DEFAULT_WORK_DIR),
            cache: false,
            ignore_parse_errors: true,
            channel_capacity: 100,
            timestamp_fields: KnownTimestamps::default().fields().to_vec(),
        }
    }
}

impl ReplayConfig {
    /// core의 `LogReplayConfig`에서 재생 설정을 생성합니다.
    ///
    /// 경로의 `~`를 확장하고, 시간 구간과 타임스탬프 형식을 파싱합니다.
    /// 디렉토리 존재 여부는 [`validate`](Self::validate)에서 확인합니다.
    pub fn from_core(core: &LogReplayConfig) -> Result<Self, LogReplayError> {
        let streams = core
            .streams
            .iter()
            .flat_map(|stream| {
                stream.dirs.iter().filter(|d| !d.trim().is_empty()).map(|dir| StreamSource {
                    kind: stream.kind,
                    dir: expand_home(dir.trim()),
                })
            })
            .collect();

        let timestamp_fields = core
            .timestamp_fields
            .iter()
            .map(TimestampField::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            streams,
            window: Interval::parse_window(&core.time_from, &core.time_to)?,
            workers: core.workers,
            work_dir: expand_home(&core.work_dir),
            cache: core.cache,
            ignore_parse_errors: core.ignore_parse_errors,
            channel_capacity: core.channel_capacity,
            timestamp_fields,
        })
    }

    /// 설정된 필드 순서로 타임스탬프 추출기를 만듭니다.
    pub fn extractor(&self) -> KnownTimestamps {
        KnownTimestamps::new(self.timestamp_fields.clone())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogReplayError> {
        if self.workers == 0 {
            return Err(config_error("workers", "must be greater than 0"));
        }

        if self.channel_capacity == 0 {
            return Err(config_error("channel_capacity", "must be greater than 0"));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(config_error("work_dir", "must not be empty"));
        }

        if self.timestamp_fields.is_empty() {
            return Err(config_error("timestamp_fields", "at least one field is required"));
        }

        self.window.validate("window")?;

        if self.streams.is_empty() {
            return Err(config_error(
                "streams",
                "no valid log directory paths configured",
            ));
        }

        for stream in &self.streams {
            validate_dir(&stream.dir)?;
        }

        Ok(())
    }
}

fn validate_dir(dir: &Path) -> Result<(), LogReplayError> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(config_error(
            "streams",
            format!("'{}' is not a directory", dir.display()),
        )),
        Err(e) => Err(config_error(
            "streams",
            format!("'{}' is not accessible: {}", dir.display(), e),
        )),
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> LogReplayError {
    LogReplayError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 경로 앞의 `~`를 `$HOME`으로 확장합니다. `HOME`이 없으면 그대로 둡니다.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };
    match (rest, std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// 재생 설정 빌더
#[derive(Default)]
pub struct ReplayConfigBuilder {
    config: ReplayConfig,
}

impl ReplayConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스트림 디렉토리를 추가합니다.
    pub fn stream(mut self, kind: EventKind, dir: impl Into<PathBuf>) -> Self {
        self.config.streams.push(StreamSource {
            kind,
            dir: dir.into(),
        });
        self
    }

    /// 재생 구간을 설정합니다.
    pub fn window(mut self, window: Interval) -> Self {
        self.config.window = window;
        self
    }

    /// 워커 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// 작업 디렉토리를 설정합니다.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    /// 캐시 사용 여부를 설정합니다.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.config.cache = enabled;
        self
    }

    /// 파싱 에러 무시 여부를 설정합니다.
    pub fn ignore_parse_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_parse_errors = ignore;
        self
    }

    /// 출력 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// 타임스탬프 키 조회 순서를 설정합니다.
    pub fn timestamp_fields(mut self, fields: Vec<TimestampField>) -> Self {
        self.config.timestamp_fields = fields;
        self
    }

    /// 설정을 검증하고 `ReplayConfig`를 생성합니다.
    pub fn build(self) -> Result<ReplayConfig, LogReplayError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
