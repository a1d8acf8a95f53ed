//! # ironpost-log-replay
//!
//! 저장된 JSON 로그 파일을 원래 기록된 시간 간격대로 다시 흘려보내는 재생 엔진입니다.
//!
//! # 모듈 구성
//!
//! - [`catalog`]: 데이터 디렉토리 재귀 탐색
//! - [`content`]: 인코딩 감지(gzip, xz, UTF-16, UTF-8 BOM)와 라인 리더
//! - [`timestamp`]: 타임스탬프 추출 trait과 알려진 키 기반 기본 구현
//! - [`interval`]: 시간 구간과 재생 구간 대비 분류([`Partial`])
//! - [`handle`]: 파일 핸들 (stat, build, seek, drain)
//! - [`cache`]: 타임스탬프 차이 캐시와 시퀀스 덤프
//! - [`sequence`]: 디렉토리 단위 파일 묶음
//! - [`sequence_list`]: 워커 풀 기반 build/seek/차이 보정 단계
//! - [`scheduler`]: 실시간 재생과 출력 채널 병합
//! - [`replay`]: 전체 흐름 오케스트레이션
//! - [`config`]: 재생 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! PathCatalog -> FileHandle::stat -> Sequence::filter_to_window
//!     -> SequenceList (build_or_load_all -> seek_all -> calc_diffs) -> Scheduler -> mpsc<Message>
//!                        |
//!                  ReplayCache (work_dir/cache)
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod handle;
pub mod interval;
pub mod replay;
pub mod scheduler;
pub mod sequence;
pub mod sequence_list;
pub mod timestamp;

mod pool;

// --- 주요 타입 re-export ---

// 엔진
pub use replay::{ReplayEngine, ReplayEngineBuilder};

// 설정
pub use config::{ReplayConfig, ReplayConfigBuilder, StreamSource};

// 에러
pub use error::{AggregateError, LogReplayError};

// 구간
pub use interval::{Interval, Partial};

// 파일과 시퀀스
pub use catalog::PathCatalog;
pub use content::ContentEncoding;
pub use handle::{Drain, FileHandle, Offsets};
pub use sequence::Sequence;
pub use sequence_list::SequenceList;

// 캐시
pub use cache::ReplayCache;

// 재생
pub use scheduler::{Playback, PlaybackReport, Scheduler};

// 타임스탬프
pub use timestamp::{KnownTimestamps, TimestampExtractor, TimestampField, TimestampFormat};
