//! Ironpost 공통 크레이트
//!
//! 재생 파이프라인과 CLI가 공유하는 에러, 설정, 도메인 타입, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, IronpostError, ParseError, PipelineError};

// 설정
pub use config::IronpostConfig;

// 도메인 타입
pub use types::{EventKind, Message};
