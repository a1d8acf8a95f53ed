//! 시간 구간과 구간 분류
//!
//! [`Interval`]은 닫힌 구간 `[beginning, end]` 입니다. 파일 구간과 재생 구간(window)의
//! 관계는 [`Partial`]로 분류합니다. 겹치는 두 구간은 정확히 하나의 분류에 속합니다.
//!
//! ```text
//! window:            |==========|
//! Completely:          |----|
//! Head:                   |--------->
//! Tail:          <--------|
//! Middle:        <-------------------->
//! ```

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LogReplayError;

pub use ironpost_core::config::WINDOW_TIME_FORMAT;

/// 닫힌 시간 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// 구간 시작 (포함)
    pub beginning: DateTime<Utc>,
    /// 구간 끝 (포함)
    pub end: DateTime<Utc>,
}

impl Interval {
    /// 구간을 생성합니다. 끝이 시작보다 앞서면 에러를 반환합니다.
    pub fn new(beginning: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, LogReplayError> {
        let interval = Self { beginning, end };
        interval.validate("interval")?;
        Ok(interval)
    }

    /// 현재 시각 기준 최근 24시간 구간
    pub fn last_day() -> Self {
        let end = Utc::now();
        Self {
            beginning: end - TimeDelta::hours(24),
            end,
        }
    }

    /// `YYYY-MM-DD HH:MM:SS` 형식의 문자열 두 개로 구간을 만듭니다.
    ///
    /// 빈 문자열은 기본값(시작은 현재 - 24시간, 끝은 현재)으로 대체됩니다.
    pub fn parse_window(from: &str, to: &str) -> Result<Self, LogReplayError> {
        let fallback = Self::last_day();
        let beginning = parse_window_time("time_from", from)?.unwrap_or(fallback.beginning);
        let end = parse_window_time("time_to", to)?.unwrap_or(fallback.end);
        if end < beginning {
            return Err(LogReplayError::Config {
                field: "time_to".to_owned(),
                reason: format!("window end {end} is before beginning {beginning}"),
            });
        }
        Ok(Self { beginning, end })
    }

    /// 끝이 시작보다 앞서지 않는지 검증합니다.
    pub fn validate(&self, origin: &str) -> Result<(), LogReplayError> {
        if self.end < self.beginning {
            return Err(LogReplayError::InvalidInterval {
                origin: origin.to_owned(),
                beginning: self.beginning,
                end: self.end,
            });
        }
        Ok(())
    }

    /// 구간 길이
    pub fn period(&self) -> TimeDelta {
        self.end - self.beginning
    }

    /// 두 구간이 한 점이라도 공유하는지 확인합니다.
    pub fn overlaps(&self, window: &Interval) -> bool {
        self.beginning <= window.end && self.end >= window.beginning
    }

    /// 이 구간이 window 안에 완전히 들어가는지 확인합니다.
    pub fn within(&self, window: &Interval) -> bool {
        self.beginning >= window.beginning && self.end <= window.end
    }

    /// 이 구간이 window를 양쪽으로 넘어서 감싸는지 확인합니다.
    pub fn contains(&self, window: &Interval) -> bool {
        self.beginning < window.beginning && self.end > window.end
    }

    /// 이 구간의 앞부분만 window 안에 있는지 확인합니다.
    pub fn head_in(&self, window: &Interval) -> bool {
        self.beginning >= window.beginning
            && self.beginning <= window.end
            && self.end > window.end
    }

    /// 이 구간의 뒷부분만 window 안에 있는지 확인합니다.
    pub fn tail_in(&self, window: &Interval) -> bool {
        self.beginning < window.beginning
            && self.end >= window.beginning
            && self.end <= window.end
    }
}

/// 파일 구간과 재생 구간의 관계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partial {
    /// 파일 전체가 구간 안에 있음
    #[default]
    CompletelyInRange,
    /// 파일 앞부분이 구간 안에 있음 (끝 오프셋 탐색 필요)
    HeadInRange,
    /// 파일 뒷부분이 구간 안에 있음 (시작 오프셋 탐색 필요)
    TailInRange,
    /// 파일 중간 부분이 구간 안에 있음 (양쪽 탐색 필요)
    MiddleSectionInRange,
}

impl Partial {
    /// 파일 구간을 재생 구간에 대해 분류합니다. 겹치지 않으면 `None`.
    pub fn classify(file: &Interval, window: &Interval) -> Option<Self> {
        if file.contains(window) {
            Some(Self::MiddleSectionInRange)
        } else if file.head_in(window) {
            Some(Self::HeadInRange)
        } else if file.tail_in(window) {
            Some(Self::TailInRange)
        } else if file.within(window) {
            Some(Self::CompletelyInRange)
        } else {
            None
        }
    }

    /// 시작 오프셋 탐색이 필요한지 확인합니다.
    pub fn seeks_beginning(&self) -> bool {
        matches!(self, Self::TailInRange | Self::MiddleSectionInRange)
    }

    /// 끝 오프셋 탐색이 필요한지 확인합니다.
    pub fn seeks_end(&self) -> bool {
        matches!(self, Self::HeadInRange | Self::MiddleSectionInRange)
    }

    /// 오프셋 탐색이 필요한지 확인합니다.
    pub fn needs_seek(&self) -> bool {
        self.seeks_beginning() || self.seeks_end()
    }

    /// 로그용 설명 문자열
    pub fn description(&self) -> &'static str {
        match self {
            Self::CompletelyInRange => "handle is fully in range",
            Self::HeadInRange => "handle head is in range",
            Self::TailInRange => "handle tail is in range",
            Self::MiddleSectionInRange => "handle middle section is in range",
        }
    }
}

fn parse_window_time(field: &str, value: &str) -> Result<Option<DateTime<Utc>>, LogReplayError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value, WINDOW_TIME_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| LogReplayError::Config {
            field: field.to_owned(),
            reason: format!("'{value}' does not match YYYY-MM-DD HH:MM:SS: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn iv(b: i64, e: i64) -> Interval {
        Interval {
            beginning: at(b),
            end: at(e),
        }
    }

    #[test]
    fn new_rejects_inverted_interval() {
        let err = Interval::new(at(10), at(5)).unwrap_err();
        assert!(matches!(err, LogReplayError::InvalidInterval { .. }));
        assert!(Interval::new(at(5), at(5)).is_ok());
    }

    #[test]
    fn period_is_end_minus_beginning() {
        assert_eq!(iv(0, 90).period(), TimeDelta::seconds(90));
    }

    #[test]
    fn classify_examples() {
        let window = iv(10, 20);
        assert_eq!(
            Partial::classify(&iv(12, 18), &window),
            Some(Partial::CompletelyInRange)
        );
        assert_eq!(
            Partial::classify(&iv(10, 20), &window),
            Some(Partial::CompletelyInRange)
        );
        assert_eq!(
            Partial::classify(&iv(15, 25), &window),
            Some(Partial::HeadInRange)
        );
        assert_eq!(
            Partial::classify(&iv(5, 15), &window),
            Some(Partial::TailInRange)
        );
        assert_eq!(
            Partial::classify(&iv(5, 25), &window),
            Some(Partial::MiddleSectionInRange)
        );
        assert_eq!(Partial::classify(&iv(0, 9), &window), None);
        assert_eq!(Partial::classify(&iv(21, 30), &window), None);
    }

    #[test]
    fn touching_boundaries_overlap() {
        let window = iv(10, 20);
        assert_eq!(
            Partial::classify(&iv(0, 10), &window),
            Some(Partial::TailInRange)
        );
        assert_eq!(
            Partial::classify(&iv(20, 30), &window),
            Some(Partial::HeadInRange)
        );
    }

    #[test]
    fn seek_requirements() {
        assert!(!Partial::CompletelyInRange.needs_seek());
        assert!(Partial::HeadInRange.seeks_end());
        assert!(!Partial::HeadInRange.seeks_beginning());
        assert!(Partial::TailInRange.seeks_beginning());
        assert!(Partial::MiddleSectionInRange.seeks_beginning());
        assert!(Partial::MiddleSectionInRange.seeks_end());
    }

    #[test]
    fn parse_window_accepts_expected_format() {
        let window = Interval::parse_window("2024-03-01 00:00:00", "2024-03-01 12:30:00").unwrap();
        assert_eq!(window.period(), TimeDelta::minutes(750));
    }

    #[test]
    fn parse_window_defaults_to_last_day() {
        let window = Interval::parse_window("", "").unwrap();
        assert_eq!(window.period(), TimeDelta::hours(24));
    }

    #[test]
    fn parse_window_rejects_bad_format() {
        let err = Interval::parse_window("01/03/2024", "").unwrap_err();
        assert!(matches!(err, LogReplayError::Config { .. }));
    }

    #[test]
    fn parse_window_rejects_inverted() {
        assert!(Interval::parse_window("2024-03-02 00:00:00", "2024-03-01 00:00:00").is_err());
    }

    fn arb_interval() -> impl Strategy<Value = Interval> {
        (0i64..1000, 0i64..1000).prop_map(|(a, b)| iv(a.min(b), a.max(b)))
    }

    proptest! {
        #[test]
        fn overlapping_pairs_have_exactly_one_classification(
            file in arb_interval(),
            window in arb_interval(),
        ) {
            let predicates = [
                file.within(&window),
                file.head_in(&window),
                file.tail_in(&window),
                file.contains(&window),
            ];
            let holding = predicates.iter().filter(|p| **p).count();
            if file.overlaps(&window) {
                prop_assert_eq!(holding, 1);
                prop_assert!(Partial::classify(&file, &window).is_some());
            } else {
                prop_assert_eq!(holding, 0);
                prop_assert!(Partial::classify(&file, &window).is_none());
            }
        }
    }
}
