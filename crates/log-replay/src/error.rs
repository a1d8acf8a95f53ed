//! 로그 재생 에러 타입
//!
//! [`LogReplayError`]는 파일 디스커버리, 타임스탬프 차이 빌드, 캐시, 탐색,
//! 재생 단계에서 발생하는 모든 에러를 표현합니다.
//! `From<LogReplayError> for IronpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::fmt;

use chrono::{DateTime, Utc};
use ironpost_core::error::{ConfigError, IronpostError, PipelineError};

/// 집계 에러에 보관하는 최대 개별 에러 수
pub const AGGREGATE_MAX_ITEMS: usize = 10;

/// 에러 메시지에 포함할 원본 라인의 최대 길이 (바이트)
const RAW_PREVIEW_LEN: usize = 256;

/// 로그 재생 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogReplayError {
    /// 파일 구간의 끝이 시작보다 앞섬
    #[error("invalid interval for {origin}: end {end} is before beginning {beginning}")]
    InvalidInterval {
        /// 파일 경로
        origin: String,
        /// 구간 시작
        beginning: DateTime<Utc>,
        /// 구간 끝
        end: DateTime<Utc>,
    },

    /// 타임스탬프 추출기가 주어지지 않음
    #[error("missing timestamp extraction function for {path}")]
    MissingExtractionFunction {
        /// 파일 경로
        path: String,
    },

    /// 단일 레코드에서 타임스탬프를 얻지 못함
    #[error("timestamp error: {reason}")]
    Timestamp {
        /// 실패 사유
        reason: String,
    },

    /// 라인 하나의 타임스탬프 파싱 실패 (복구 시도 후)
    #[error("parse error in {origin} at line {offset}: {reason} (raw: {raw})")]
    ParseRawData {
        /// 파일 경로
        origin: String,
        /// 라인 번호
        offset: usize,
        /// 실패 사유
        reason: String,
        /// 원본 라인 일부
        raw: String,
    },

    /// 파일 전체 파싱 결과 요약
    #[error("{count} errors parsing source {origin} with parser {parser}")]
    ParseMessageSource {
        /// 복구하지 못한 라인 수
        count: u64,
        /// 파일 경로
        origin: String,
        /// 추출기 이름
        parser: String,
    },

    /// 지원하지 않는 파일 인코딩
    #[error("unsupported encoding {encoding} for {path}")]
    UnsupportedEncoding {
        /// 파일 경로
        path: String,
        /// 감지된 인코딩
        encoding: String,
    },

    /// 라인이 하나도 없는 파일
    #[error("file {path} contains no lines")]
    EmptyFile {
        /// 파일 경로
        path: String,
    },

    /// 재귀 탐색 결과 파일이 없는 디렉토리
    #[error("no files found under {path}")]
    EmptyDirectory {
        /// 디렉토리 경로
        path: String,
    },

    /// 캐시 항목 로드/저장 실패
    #[error("cache error: {path}: {reason}")]
    Cache {
        /// 캐시 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 여러 워커에서 모인 에러
    #[error("{0}")]
    Aggregate(AggregateError),

    /// 취소 신호 수신
    #[error("operation cancelled")]
    Cancelled,

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 워커 태스크 join 실패 (panic 등)
    #[error("worker error: {0}")]
    Worker(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LogReplayError {
    /// 원본 라인을 잘라 담은 [`LogReplayError::ParseRawData`]를 생성합니다.
    pub fn parse_raw_data(
        origin: impl Into<String>,
        offset: usize,
        reason: impl Into<String>,
        raw: &[u8],
    ) -> Self {
        let preview = &raw[..raw.len().min(RAW_PREVIEW_LEN)];
        Self::ParseRawData {
            origin: origin.into(),
            offset,
            reason: reason.into(),
            raw: String::from_utf8_lossy(preview).into_owned(),
        }
    }

    /// 파일을 재생 대상에서 제외하고 계속 진행할 수 있는 에러인지 확인합니다.
    pub fn is_exclusion(&self) -> bool {
        matches!(
            self,
            Self::InvalidInterval { .. } | Self::EmptyFile { .. } | Self::UnsupportedEncoding { .. }
        )
    }
}

/// 집계 에러
///
/// 병렬 워커에서 수집한 에러 중 처음 [`AGGREGATE_MAX_ITEMS`]개만 보관하고,
/// 전체 개수는 `total`에 기록합니다.
#[derive(Debug)]
pub struct AggregateError {
    desc: String,
    total: usize,
    items: Vec<LogReplayError>,
}

impl AggregateError {
    /// 설명과 빈 목록으로 집계 에러를 생성합니다.
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            total: 0,
            items: Vec::new(),
        }
    }

    /// 에러를 추가합니다. 보관 한도를 넘으면 개수만 셉니다.
    pub fn push(&mut self, err: LogReplayError) {
        self.total += 1;
        if self.items.len() < AGGREGATE_MAX_ITEMS {
            self.items.push(err);
        }
    }

    /// 수집된 에러가 없으면 `Ok`, 있으면 집계 에러를 반환합니다.
    pub fn into_result(self) -> Result<(), LogReplayError> {
        if self.total == 0 {
            Ok(())
        } else {
            Err(LogReplayError::Aggregate(self))
        }
    }

    /// 집계 설명
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// 전체 에러 수 (보관 한도 초과분 포함)
    pub fn total(&self) -> usize {
        self.total
    }

    /// 보관된 에러 목록
    pub fn items(&self) -> &[LogReplayError] {
        &self.items
    }

    /// 에러가 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} errors", self.desc, self.total)?;
        for (idx, err) in self.items.iter().enumerate() {
            write!(f, "; [{idx}] {err}")?;
        }
        if self.total > self.items.len() {
            write!(f, "; ... {} more", self.total - self.items.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl From<LogReplayError> for IronpostError {
    fn from(err: LogReplayError) -> Self {
        match err {
            LogReplayError::Config { field, reason } => {
                IronpostError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogReplayError::Io(e) => IronpostError::Io(e),
            LogReplayError::Cancelled => IronpostError::Pipeline(PipelineError::Cancelled),
            other => IronpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
