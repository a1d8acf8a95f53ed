//! 도메인 타입: 재생 파이프라인 전역에서 사용되는 공통 타입
//!
//! 로그 스트림의 종류([`EventKind`])와 재생 시 하위 소비자에게 전달되는
//! 메시지([`Message`])를 정의합니다.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// 로그 스트림 종류
///
/// 하나의 데이터 디렉토리는 한 종류의 로그만 담습니다.
/// 재생된 메시지의 라우팅 키로도 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// rsyslog JSON 출력
    Syslog,
    /// snoopy 명령 실행 로그
    Snoopy,
    /// Suricata EVE JSON
    Suricata,
    /// Windows 이벤트 로그 (nxlog JSON)
    EventLog,
    /// Sysmon 이벤트
    Sysmon,
}

impl EventKind {
    /// 지원하는 모든 스트림 종류
    pub const ALL: [EventKind; 5] = [
        Self::Syslog,
        Self::Snoopy,
        Self::Suricata,
        Self::EventLog,
        Self::Sysmon,
    ];

    /// 설정 파일과 라우팅 키에 쓰이는 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::Snoopy => "snoopy",
            Self::Suricata => "suricata",
            Self::EventLog => "eventlog",
            Self::Sysmon => "sysmon",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ParseError;

    /// 대소문자를 구분하지 않습니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "syslog" => Ok(Self::Syslog),
            "snoopy" => Ok(Self::Snoopy),
            "suricata" => Ok(Self::Suricata),
            "eventlog" => Ok(Self::EventLog),
            "sysmon" => Ok(Self::Sysmon),
            other => Err(ParseError::UnsupportedFormat(format!(
                "unknown event kind '{other}'"
            ))),
        }
    }
}

/// 재생 메시지
///
/// 로그 파일의 한 줄을 나타냅니다. `time`은 원본 레코드에서 다시
/// 추출한 타임스탬프이며, `key`는 스트림 종류 이름입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// 원본 라인 바이트 (개행 제외)
    pub data: Bytes,
    /// 원본 파일 경로
    pub source: String,
    /// 파일 내 라인 번호 (0부터 시작)
    pub offset: u64,
    /// 레코드 타임스탬프
    pub time: DateTime<Utc>,
    /// 라우팅 키
    pub key: String,
}

impl Message {
    /// 본문을 UTF-8 문자열로 해석합니다. 잘못된 바이트는 대체 문자로 바뀝니다.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{} {}",
            self.key,
            self.source,
            self.offset,
            self.text()
        )
    }
}
