//! 설정 관리: ironpost.toml 파싱 및 런타임 설정
//!
//! [`IronpostConfig`]는 재생 파이프라인의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONPOST_REPLAY_WORKERS=4` 형식)
//! 3. 설정 파일 (`ironpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironpost_core::error::IronpostError> {
//! use ironpost_core::config::IronpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronpostConfig::load("ironpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronpostConfig::parse("[replay]\nworkers = 4")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronpostError};
use crate::types::EventKind;

/// 재생 구간 인자(`time_from`, `time_to`)의 형식
pub const WINDOW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 타임스탬프 필드에 허용되는 형식 이름
pub const TIMESTAMP_FORMATS: [&str; 3] = ["rfc3339", "suricata", "eventlog"];

/// Ironpost 통합 설정
///
/// `ironpost.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 재생 설정
    #[serde(default)]
    pub replay: LogReplayConfig,
    /// 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
}

impl IronpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronpostError> {
        toml::from_str(toml_str).map_err(|e| {
            IronpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONPOST_{SECTION}_{FIELD}`
    /// 스트림 디렉토리는 `IRONPOST_STREAM_{KIND}_DIRS` (쉼표 구분) 입니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONPOST_GENERAL_LOG_FORMAT");

        // Replay
        override_string(&mut self.replay.work_dir, "IRONPOST_REPLAY_WORK_DIR");
        override_usize(&mut self.replay.workers, "IRONPOST_REPLAY_WORKERS");
        override_bool(&mut self.replay.cache, "IRONPOST_REPLAY_CACHE");
        override_string(&mut self.replay.time_from, "IRONPOST_REPLAY_TIME_FROM");
        override_string(&mut self.replay.time_to, "IRONPOST_REPLAY_TIME_TO");
        override_bool(
            &mut self.replay.ignore_parse_errors,
            "IRONPOST_REPLAY_IGNORE_PARSE_ERRORS",
        );
        override_usize(
            &mut self.replay.channel_capacity,
            "IRONPOST_REPLAY_CHANNEL_CAPACITY",
        );

        for kind in EventKind::ALL {
            let key = format!("IRONPOST_STREAM_{}_DIRS", kind.as_str().to_uppercase());
            let mut dirs = Vec::new();
            override_csv(&mut dirs, &key);
            if dirs.is_empty() {
                continue;
            }
            self.replay.streams.retain(|s| s.kind != kind);
            self.replay.streams.push(StreamConfig { kind, dirs });
        }

        // Output
        override_bool(&mut self.output.stdout, "IRONPOST_OUTPUT_STDOUT");
        override_csv(&mut self.output.files, "IRONPOST_OUTPUT_FILES");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronpostError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.replay.validate()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 로그 재생 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogReplayConfig {
    /// 캐시와 시퀀스 덤프를 저장할 작업 디렉토리 (`~` 확장 지원)
    pub work_dir: String,
    /// 파일 통계/빌드/탐색 워커 수
    pub workers: usize,
    /// 타임스탬프 차이 캐시 사용 여부
    pub cache: bool,
    /// 재생 구간 시작 (`YYYY-MM-DD HH:MM:SS`, 비어 있으면 현재 - 24시간)
    pub time_from: String,
    /// 재생 구간 끝 (`YYYY-MM-DD HH:MM:SS`, 비어 있으면 현재 시각)
    pub time_to: String,
    /// 타임스탬프 파싱 실패 라인을 건너뛸지 여부
    pub ignore_parse_errors: bool,
    /// 출력 채널 용량
    pub channel_capacity: usize,
    /// 타임스탬프 필드 목록 (우선순위 순)
    pub timestamp_fields: Vec<TimestampFieldConfig>,
    /// 스트림별 데이터 디렉토리
    pub streams: Vec<StreamConfig>,
}

impl Default for LogReplayConfig {
    fn default() -> Self {
        Self {
            work_dir: "~/.local/ironpost".to_owned(),
            workers: 2,
            cache: false,
            time_from: String::new(),
            time_to: String::new(),
            ignore_parse_errors: true,
            channel_capacity: 100,
            timestamp_fields: TimestampFieldConfig::defaults(),
            streams: Vec::new(),
        }
    }
}

impl LogReplayConfig {
    /// 재생 설정의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("replay.workers", "must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("replay.channel_capacity", "must be greater than 0"));
        }
        if self.work_dir.trim().is_empty() {
            return Err(invalid("replay.work_dir", "must not be empty"));
        }
        if self.timestamp_fields.is_empty() {
            return Err(invalid(
                "replay.timestamp_fields",
                "at least one timestamp field is required",
            ));
        }
        for field in &self.timestamp_fields {
            if field.key.is_empty() {
                return Err(invalid("replay.timestamp_fields.key", "must not be empty"));
            }
            if !TIMESTAMP_FORMATS.contains(&field.format.as_str()) {
                return Err(invalid(
                    "replay.timestamp_fields.format",
                    &format!("must be one of: {}", TIMESTAMP_FORMATS.join(", ")),
                ));
            }
        }

        let from = parse_window_time("replay.time_from", &self.time_from)?;
        let to = parse_window_time("replay.time_to", &self.time_to)?;
        if let (Some(from), Some(to)) = (from, to) {
            if to < from {
                return Err(invalid(
                    "replay.time_to",
                    "must not be earlier than replay.time_from",
                ));
            }
        }

        for stream in &self.streams {
            if stream.dirs.iter().any(|d| d.trim().is_empty()) {
                return Err(invalid(
                    &format!("replay.streams.{}.dirs", stream.kind),
                    "directory path must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// 타임스탬프 필드 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampFieldConfig {
    /// JSON 최상위 키
    pub key: String,
    /// 값 형식 (rfc3339, suricata, eventlog)
    pub format: String,
}

impl TimestampFieldConfig {
    fn new(key: &str, format: &str) -> Self {
        Self {
            key: key.to_owned(),
            format: format.to_owned(),
        }
    }

    /// 알려진 타임스탬프 필드 기본 목록
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("@timestamp", "rfc3339"),
            Self::new("timestamp", "suricata"),
            Self::new("EventTime", "eventlog"),
            Self::new("EventReceivedTime", "eventlog"),
        ]
    }
}

/// 스트림 소스 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 스트림 종류
    pub kind: EventKind,
    /// 데이터 디렉토리 목록 (디렉토리마다 하나의 시퀀스)
    #[serde(default)]
    pub dirs: Vec<String>,
}

/// 출력 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 표준 출력으로 메시지를 내보낼지 여부
    pub stdout: bool,
    /// 메시지를 덧붙여 쓸 파일 또는 FIFO 경로
    pub files: Vec<String>,
}

impl OutputConfig {
    /// 하나 이상의 출력이 설정되어 있는지 확인합니다.
    pub fn has_outputs(&self) -> bool {
        self.stdout || !self.files.is_empty()
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_window_time(field: &str, value: &str) -> Result<Option<NaiveDateTime>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value.trim(), WINDOW_TIME_FORMAT)
        .map(Some)
        .map_err(|e| invalid(field, &format!("expected format YYYY-MM-DD HH:MM:SS: {e}")))
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = IronpostConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.replay.workers, 2);
        assert_eq!(config.replay.channel_capacity, 100);
        assert!(config.replay.ignore_parse_errors);
        assert!(!config.replay.cache);
        assert_eq!(config.replay.timestamp_fields.len(), 4);
        assert!(!config.output.has_outputs());
    }

    #[test]
    fn default_config_passes_validation() {
        IronpostConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = IronpostConfig::parse("").unwrap();
        assert_eq!(config.replay.work_dir, "~/.local/ironpost");
        assert_eq!(config.replay.timestamp_fields[0].key, "@timestamp");
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[replay]
work_dir = "/tmp/ironpost"
workers = 8
cache = true
time_from = "2024-03-01 00:00:00"
time_to = "2024-03-02 00:00:00"
ignore_parse_errors = false
channel_capacity = 500

[[replay.timestamp_fields]]
key = "ts"
format = "rfc3339"

[[replay.streams]]
kind = "suricata"
dirs = ["/data/suricata/a", "/data/suricata/b"]

[[replay.streams]]
kind = "syslog"
dirs = ["/data/syslog"]

[output]
stdout = true
files = ["/tmp/replay.fifo"]
"#;
        let config = IronpostConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.replay.workers, 8);
        assert!(config.replay.cache);
        assert!(!config.replay.ignore_parse_errors);
        assert_eq!(config.replay.timestamp_fields.len(), 1);
        assert_eq!(config.replay.streams.len(), 2);
        assert_eq!(config.replay.streams[0].kind, EventKind::Suricata);
        assert_eq!(config.replay.streams[0].dirs.len(), 2);
        assert!(config.output.has_outputs());
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = IronpostConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            IronpostError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn from_str_unknown_stream_kind_fails() {
        let toml = r#"
[[replay.streams]]
kind = "netflow"
dirs = ["/data"]
"#;
        assert!(IronpostConfig::parse(toml).is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IronpostConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = IronpostConfig::default();
        config.replay.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("replay.workers"));
    }

    #[test]
    fn validate_rejects_zero_channel_capacity() {
        let mut config = IronpostConfig::default();
        config.replay.channel_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn validate_rejects_malformed_time_from() {
        let mut config = IronpostConfig::default();
        config.replay.time_from = "2024/03/01".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("replay.time_from"));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let mut config = IronpostConfig::default();
        config.replay.time_from = "2024-03-02 00:00:00".to_owned();
        config.replay.time_to = "2024-03-01 00:00:00".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("replay.time_to"));
    }

    #[test]
    fn validate_rejects_unknown_timestamp_format() {
        let mut config = IronpostConfig::default();
        config.replay.timestamp_fields = vec![TimestampFieldConfig::new("ts", "unix")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timestamp_fields.format"));
    }

    #[test]
    fn validate_rejects_empty_timestamp_fields() {
        let mut config = IronpostConfig::default();
        config.replay.timestamp_fields.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_IRONPOST_STR", "overridden") };
        override_string(&mut val, "TEST_IRONPOST_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_IRONPOST_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_IRONPOST_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_IRONPOST_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_IRONPOST_BOOL_BAD") };
    }

    #[test]
    fn env_override_usize_invalid_keeps_original() {
        let mut val = 3;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_IRONPOST_USIZE_BAD", "many") };
        override_usize(&mut val, "TEST_IRONPOST_USIZE_BAD");
        assert_eq!(val, 3);
        unsafe { std::env::remove_var("TEST_IRONPOST_USIZE_BAD") };
    }

    #[test]
    fn env_override_csv_skips_empty_items() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_IRONPOST_CSV", "x, y,,z ") };
        override_csv(&mut val, "TEST_IRONPOST_CSV");
        assert_eq!(val, vec!["x", "y", "z"]);
        unsafe { std::env::remove_var("TEST_IRONPOST_CSV") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = IronpostConfig::default();
        config.replay.streams.push(StreamConfig {
            kind: EventKind::Snoopy,
            dirs: vec!["/data/snoopy".to_owned()],
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = IronpostConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.replay.streams, config.replay.streams);
        assert_eq!(parsed.replay.timestamp_fields, config.replay.timestamp_fields);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = IronpostConfig::from_file("/nonexistent/path/ironpost.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IronpostError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
