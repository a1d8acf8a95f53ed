//! 타임스탬프 추출
//!
//! 재생 엔진은 로그 레코드 형식을 모릅니다. 각 라인에서 시각을 얻는 방법은
//! [`TimestampExtractor`] trait으로 주입받습니다. 기본 구현인 [`KnownTimestamps`]는
//! JSON 객체의 알려진 키를 우선순위대로 조회합니다.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use ironpost_core::config::TimestampFieldConfig;
use serde::{Deserialize, Serialize};

use crate::error::LogReplayError;
use crate::interval::Interval;

/// Suricata EVE 타임스탬프 형식 (`2024-03-01T10:00:00.123456+0000`)
const SURICATA_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// nxlog 이벤트 로그 타임스탬프 형식 (`2024-03-01 10:00:00`, UTC로 해석)
const EVENTLOG_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 라인 바이트에서 레코드 시각을 얻는 확장 포인트
///
/// 디스커버리, 빌드, 탐색, 재생 단계에서 여러 워커가 동시에 호출합니다.
pub trait TimestampExtractor: Send + Sync {
    /// 로그와 에러 메시지에 쓰이는 추출기 이름
    fn name(&self) -> &str;

    /// 라인 하나에서 시각을 추출합니다.
    fn extract(&self, line: &[u8]) -> Result<DateTime<Utc>, LogReplayError>;

    /// 첫 라인과 마지막 라인으로 파일 구간을 만듭니다. 검증은 호출자가 합니다.
    fn interval(&self, first: &[u8], last: &[u8]) -> Result<Interval, LogReplayError> {
        Ok(Interval {
            beginning: self.extract(first)?,
            end: self.extract(last)?,
        })
    }
}

/// 타임스탬프 값 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampFormat {
    /// RFC 3339 (`2024-03-01T10:00:00Z`)
    Rfc3339,
    /// Suricata EVE (`2024-03-01T10:00:00.123456+0000`)
    Suricata,
    /// nxlog 이벤트 로그 (`2024-03-01 10:00:00`)
    EventLog,
}

impl TimestampFormat {
    /// 문자열 값을 이 형식으로 해석합니다.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .or_else(|_| DateTime::parse_from_str(raw, SURICATA_FORMAT))
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Suricata => DateTime::parse_from_str(raw, SURICATA_FORMAT)
                .or_else(|_| DateTime::parse_from_rfc3339(raw))
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::EventLog => NaiveDateTime::parse_from_str(raw, EVENTLOG_FORMAT)
                .ok()
                .map(|naive| naive.and_utc()),
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = LogReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rfc3339" => Ok(Self::Rfc3339),
            "suricata" => Ok(Self::Suricata),
            "eventlog" => Ok(Self::EventLog),
            other => Err(LogReplayError::Config {
                field: "timestamp_fields.format".to_owned(),
                reason: format!("unknown timestamp format '{other}'"),
            }),
        }
    }
}

/// 타임스탬프 필드 (키 + 형식)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampField {
    /// JSON 최상위 키
    pub key: String,
    /// 값 형식
    pub format: TimestampFormat,
}

impl TimestampField {
    /// 새 필드를 생성합니다.
    pub fn new(key: impl Into<String>, format: TimestampFormat) -> Self {
        Self {
            key: key.into(),
            format,
        }
    }
}

impl TryFrom<&TimestampFieldConfig> for TimestampField {
    type Error = LogReplayError;

    fn try_from(config: &TimestampFieldConfig) -> Result<Self, Self::Error> {
        Ok(Self::new(config.key.clone(), config.format.parse()?))
    }
}

/// 알려진 타임스탬프 키 추출기
///
/// JSON 객체에서 필드 목록을 순서대로 조회하여 처음 발견된 키의 값을 사용합니다.
#[derive(Debug, Clone)]
pub struct KnownTimestamps {
    fields: Vec<TimestampField>,
}

impl KnownTimestamps {
    /// 필드 목록으로 추출기를 생성합니다.
    pub fn new(fields: Vec<TimestampField>) -> Self {
        Self { fields }
    }

    /// 조회 순서대로 정렬된 필드 목록
    pub fn fields(&self) -> &[TimestampField] {
        &self.fields
    }
}

impl Default for KnownTimestamps {
    fn default() -> Self {
        Self::new(vec![
            TimestampField::new("@timestamp", TimestampFormat::Rfc3339),
            TimestampField::new("timestamp", TimestampFormat::Suricata),
            TimestampField::new("EventTime", TimestampFormat::EventLog),
            TimestampField::new("EventReceivedTime", TimestampFormat::EventLog),
        ])
    }
}

impl TimestampExtractor for KnownTimestamps {
    fn name(&self) -> &str {
        "known-timestamps"
    }

    fn extract(&self, line: &[u8]) -> Result<DateTime<Utc>, LogReplayError> {
        let value: serde_json::Value =
            serde_json::from_slice(line).map_err(|e| LogReplayError::Timestamp {
                reason: format!("invalid json: {e}"),
            })?;
        let object = value.as_object().ok_or_else(|| LogReplayError::Timestamp {
            reason: "record is not a json object".to_owned(),
        })?;

        for field in &self.fields {
            let Some(raw) = object.get(&field.key) else {
                continue;
            };
            let raw = raw.as_str().ok_or_else(|| LogReplayError::Timestamp {
                reason: format!("field '{}' is not a string", field.key),
            })?;
            return field.format.parse(raw).ok_or_else(|| LogReplayError::Timestamp {
                reason: format!(
                    "field '{}' value '{}' does not match {:?}",
                    field.key, raw, field.format
                ),
            });
        }

        Err(LogReplayError::Timestamp {
            reason: "no known timestamp field present".to_owned(),
        })
    }
}

/// 잘못 이스케이프된 문자(`\(`, `\)`, `\*`)를 되돌립니다.
///
/// 일부 수집기는 JSON 문자열 안에 허용되지 않는 이스케이프를 남깁니다.
/// 변경할 내용이 없으면 원본을 빌려 반환합니다.
pub fn repair_broken_escapes(line: &[u8]) -> Cow<'_, [u8]> {
    let broken = line
        .windows(2)
        .any(|w| w[0] == b'\\' && matches!(w[1], b'(' | b')' | b'*'));
    if !broken {
        return Cow::Borrowed(line);
    }

    let mut fixed = Vec::with_capacity(line.len());
    let mut iter = line.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\\' {
            match iter.peek() {
                Some(b'(' | b')' | b'*') => continue,
                Some(b'\\') => {
                    // 이미 올바른 이스케이프는 두 바이트 모두 유지
                    fixed.push(byte);
                    if let Some(next) = iter.next() {
                        fixed.push(next);
                    }
                    continue;
                }
                _ => {}
            }
        }
        fixed.push(byte);
    }
    Cow::Owned(fixed)
}

/// 추출에 실패하면 이스케이프를 복구한 뒤 한 번 더 시도합니다.
///
/// 두 번째 값은 복구가 필요했는지 여부입니다.
pub fn extract_with_repair(
    extractor: &dyn TimestampExtractor,
    line: &[u8],
) -> Result<(DateTime<Utc>, bool), LogReplayError> {
    match extractor.extract(line) {
        Ok(ts) => Ok((ts, false)),
        Err(first) => match repair_broken_escapes(line) {
            Cow::Borrowed(_) => Err(first),
            Cow::Owned(fixed) => extractor.extract(&fixed).map(|ts| (ts, true)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn extracts_rfc3339_timestamp() {
        let ts = KnownTimestamps::default()
            .extract(br#"{"@timestamp":"2024-03-01T10:00:00Z","msg":"x"}"#)
            .unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn extracts_suricata_timestamp_with_offset() {
        let ts = KnownTimestamps::default()
            .extract(br#"{"timestamp":"2024-03-01T12:00:00.500000+0200","event_type":"dns"}"#)
            .unwrap();
        assert_eq!(
            ts,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + chrono::TimeDelta::milliseconds(500)
        );
    }

    #[test]
    fn extracts_eventlog_timestamp() {
        let ts = KnownTimestamps::default()
            .extract(br#"{"EventTime":"2024-03-01 10:00:05","EventID":4624}"#)
            .unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap());
    }

    #[test]
    fn field_order_decides_priority() {
        let line = br#"{"EventReceivedTime":"2024-03-01 10:00:09","@timestamp":"2024-03-01T10:00:00Z"}"#;
        let ts = KnownTimestamps::default().extract(line).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());

        let reversed = KnownTimestamps::new(vec![
            TimestampField::new("EventReceivedTime", TimestampFormat::EventLog),
            TimestampField::new("@timestamp", TimestampFormat::Rfc3339),
        ]);
        let ts = reversed.extract(line).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 9).unwrap());
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = KnownTimestamps::default()
            .extract(br#"{"msg":"no time here"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("no known timestamp field"));
    }

    #[test]
    fn malformed_value_is_an_error() {
        assert!(KnownTimestamps::default()
            .extract(br#"{"@timestamp":"yesterday"}"#)
            .is_err());
        assert!(KnownTimestamps::default()
            .extract(br#"{"@timestamp":12345}"#)
            .is_err());
    }

    #[test]
    fn non_object_is_an_error() {
        assert!(KnownTimestamps::default().extract(b"[1,2,3]").is_err());
        assert!(KnownTimestamps::default().extract(b"plain text").is_err());
    }

    #[test]
    fn repair_removes_invalid_escapes_only() {
        let line = br#"{"cmd":"find . -name \*.log \( -mtime 1 \)","path":"C:\\temp"}"#;
        let fixed = repair_broken_escapes(line);
        assert_eq!(
            fixed.as_ref(),
            br#"{"cmd":"find . -name *.log ( -mtime 1 )","path":"C:\\temp"}"#
        );
    }

    #[test]
    fn repair_borrows_when_nothing_to_fix() {
        let line = br#"{"a":"b\\c"}"#;
        assert!(matches!(repair_broken_escapes(line), Cow::Borrowed(_)));
    }

    #[test]
    fn extract_with_repair_recovers_broken_line() {
        let line = br#"{"@timestamp":"2024-03-01T10:00:00Z","cmd":"ls \*"}"#;
        let extractor = KnownTimestamps::default();
        assert!(extractor.extract(line).is_err());
        let (ts, repaired) = extract_with_repair(&extractor, line).unwrap();
        assert!(repaired);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn default_interval_uses_first_and_last() {
        let extractor = KnownTimestamps::default();
        let interval = extractor
            .interval(
                br#"{"@timestamp":"2024-03-01T10:00:00Z"}"#,
                br#"{"@timestamp":"2024-03-01T11:00:00Z"}"#,
            )
            .unwrap();
        assert_eq!(interval.period(), chrono::TimeDelta::hours(1));
    }

    #[test]
    fn timestamp_field_from_config() {
        let config = TimestampFieldConfig {
            key: "ts".to_owned(),
            format: "suricata".to_owned(),
        };
        let field = TimestampField::try_from(&config).unwrap();
        assert_eq!(field.format, TimestampFormat::Suricata);

        let bad = TimestampFieldConfig {
            key: "ts".to_owned(),
            format: "epoch".to_owned(),
        };
        assert!(TimestampField::try_from(&bad).is_err());
    }
}
