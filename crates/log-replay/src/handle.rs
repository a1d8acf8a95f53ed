//! 파일 핸들 -- 로그 파일 하나의 메타데이터와 타임스탬프 차이
//!
//! [`FileHandle`]은 파일 경로, 라인 수, 인코딩, 시간 구간, 재생 오프셋,
//! 라인 간 타임스탬프 차이(`diffs`)를 담습니다.
//!
//! # 생명주기
//! ```text
//! stat -> apply_window -> build (또는 캐시 로드) -> seek -> align_to_window -> drain
//! ```
//!
//! 모든 파일 I/O는 동기 방식이며, 호출자가 blocking 스레드에서 실행합니다.
//! [`FileHandle::drain`]만 내부에서 `spawn_blocking`으로 리더를 띄웁니다.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use ironpost_core::metrics as m;
use ironpost_core::types::{EventKind, Message};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::content::{ContentEncoding, LineReader};
use crate::error::LogReplayError;
use crate::interval::{Interval, Partial};
use crate::timestamp::{TimestampExtractor, extract_with_repair, repair_broken_escapes};

/// 재생 대상 라인 범위 (양 끝 포함, 0부터 시작)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offsets {
    /// 첫 라인
    pub beginning: usize,
    /// 마지막 라인
    pub end: usize,
}

#[allow(clippy::len_without_is_empty)]
impl Offsets {
    /// 파일 전체 범위
    pub fn whole(line_count: usize) -> Self {
        Self {
            beginning: 0,
            end: line_count.saturating_sub(1),
        }
    }

    /// 범위에 포함된 라인 수. 닫힌 범위이므로 최소 1 입니다.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.beginning) + 1
    }
}

/// 로그 파일 핸들
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHandle {
    pub(crate) path: PathBuf,
    pub(crate) event_kind: EventKind,
    pub(crate) line_count: usize,
    pub(crate) encoding: ContentEncoding,
    pub(crate) interval: Interval,
    pub(crate) offsets: Offsets,
    pub(crate) partial: Partial,
    pub(crate) enabled: bool,
    /// 라인별 차이. 덤프에는 나노초 정수 배열로 기록됩니다.
    #[serde(with = "crate::cache::diff_nanos", default)]
    pub(crate) diffs: Vec<TimeDelta>,
}

impl FileHandle {
    /// 파일을 검사하여 핸들을 생성합니다.
    ///
    /// 인코딩을 감지하고, 라인 수를 세고, 첫/마지막 라인으로 시간 구간을 구합니다.
    pub fn stat(
        path: impl Into<PathBuf>,
        event_kind: EventKind,
        extractor: Option<&dyn TimestampExtractor>,
    ) -> Result<Self, LogReplayError> {
        let path = path.into();
        let origin = path.display().to_string();
        let extractor = extractor.ok_or_else(|| LogReplayError::MissingExtractionFunction {
            path: origin.clone(),
        })?;

        let encoding = ContentEncoding::detect(&path)?;
        if !encoding.is_supported() {
            return Err(LogReplayError::UnsupportedEncoding {
                path: origin,
                encoding: encoding.to_string(),
            });
        }

        let mut line_count = 0usize;
        let mut first: Option<Vec<u8>> = None;
        let mut last = Vec::new();
        for line in LineReader::open(&path, encoding)? {
            let line = line?;
            if first.is_none() {
                first = Some(line.clone());
            }
            last = line;
            line_count += 1;
        }
        let Some(first) = first else {
            return Err(LogReplayError::EmptyFile { path: origin });
        };

        let interval = extractor
            .interval(&first, &last)
            .or_else(|_| {
                extractor.interval(&repair_broken_escapes(&first), &repair_broken_escapes(&last))
            })
            .map_err(|e| LogReplayError::parse_raw_data(&origin, 0, e.to_string(), &first))?;
        interval.validate(&origin)?;

        trace!(path = %origin, lines = line_count, %encoding, "file stat done");
        Ok(Self {
            path,
            event_kind,
            line_count,
            encoding,
            interval,
            offsets: Offsets::whole(line_count),
            partial: Partial::default(),
            enabled: false,
            diffs: Vec::new(),
        })
    }

    /// 경로 기반 안정 식별자 (SHA-256 hex)
    pub fn id(&self) -> String {
        sha256_hex(&self.path.to_string_lossy())
    }

    /// 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 스트림 종류
    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    /// 전체 라인 수
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// 감지된 인코딩
    pub fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    /// 첫/마지막 라인의 시간 구간
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// 재생 라인 범위
    pub fn offsets(&self) -> Offsets {
        self.offsets
    }

    /// 재생 구간과의 관계
    pub fn partial(&self) -> Partial {
        self.partial
    }

    /// 재생 대상 여부
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 라인별 타임스탬프 차이. 빌드 전에는 비어 있습니다.
    pub fn diffs(&self) -> &[TimeDelta] {
        &self.diffs
    }

    /// 재생 구간에 대해 분류하고, 겹치면 활성화합니다.
    ///
    /// 겹치지 않으면 비활성화하고 `false`를 반환합니다.
    pub fn apply_window(&mut self, window: &Interval) -> bool {
        match Partial::classify(&self.interval, window) {
            Some(partial) => {
                self.partial = partial;
                self.enabled = true;
            }
            None => self.enabled = false,
        }
        self.enabled
    }

    /// 라인 리더를 엽니다.
    pub fn lines(&self) -> Result<LineReader, LogReplayError> {
        LineReader::open(&self.path, self.encoding)
    }

    /// 지정한 라인 하나를 읽습니다.
    pub fn line_at(&self, index: usize) -> Result<Vec<u8>, LogReplayError> {
        match self.lines()?.nth(index) {
            Some(line) => Ok(line?),
            None => Err(LogReplayError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} has no line {}", self.path.display(), index),
            ))),
        }
    }

    /// 파일 전체를 읽어 라인 간 타임스탬프 차이를 계산합니다.
    ///
    /// `diffs[0]`은 항상 0 이고, 이후 각 값은 직전에 성공한 라인과의 차이입니다.
    /// 파싱에 실패한 라인은 이스케이프 복구 후 한 번 더 시도합니다. 그래도 실패하면
    /// `ignore_parse_errors`가 꺼져 있을 때 [`LogReplayError::ParseRawData`]로 즉시 중단하고,
    /// 켜져 있으면 해당 라인 차이를 0으로 두고 계속 진행합니다. 이 경우 스캔이 끝난 뒤
    /// 실패 개수를 담은 [`LogReplayError::ParseMessageSource`]를 반환하지만 `diffs`는 채워집니다.
    pub fn build(
        &mut self,
        extractor: &dyn TimestampExtractor,
        ignore_parse_errors: bool,
    ) -> Result<(), LogReplayError> {
        let started = Instant::now();
        let origin = self.path.display().to_string();
        let mut diffs = vec![TimeDelta::zero(); self.line_count];
        let mut last = None;
        let mut failed = 0u64;
        let mut repaired = 0u64;

        for (index, line) in self.lines()?.enumerate() {
            let line = line?;
            if index >= diffs.len() {
                debug!(path = %origin, lines = self.line_count, "file grew since stat, ignoring tail");
                break;
            }

            let ts = match extract_with_repair(extractor, &line) {
                Ok((ts, was_repaired)) => {
                    if was_repaired {
                        repaired += 1;
                    }
                    ts
                }
                Err(e) => {
                    if !ignore_parse_errors {
                        return Err(LogReplayError::parse_raw_data(
                            &origin,
                            index,
                            e.to_string(),
                            &line,
                        ));
                    }
                    failed += 1;
                    trace!(path = %origin, line = index, error = %e, "skipping unparsable line");
                    continue;
                }
            };

            if let Some(prev) = last {
                diffs[index] = ts - prev;
            }
            last = Some(ts);
        }

        if let Some(first) = diffs.first_mut() {
            *first = TimeDelta::zero();
        }
        self.diffs = diffs;

        metrics::counter!(m::LOG_REPLAY_FILES_BUILT_TOTAL).increment(1);
        metrics::counter!(m::LOG_REPLAY_PARSE_ERRORS_TOTAL).increment(failed);
        metrics::counter!(m::LOG_REPLAY_LINES_REPAIRED_TOTAL).increment(repaired);
        metrics::histogram!(m::LOG_REPLAY_BUILD_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            path = %origin,
            lines = self.line_count,
            failed,
            repaired,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "timestamp diffs built"
        );

        if failed > 0 {
            return Err(LogReplayError::ParseMessageSource {
                count: failed,
                origin,
                parser: extractor.name().to_owned(),
            });
        }
        Ok(())
    }

    /// 재생 구간 경계에 해당하는 라인 오프셋을 찾습니다.
    ///
    /// 시작 오프셋은 구간 시작보다 늦은 첫 라인, 끝 오프셋은 구간 끝보다 늦은 첫 라인입니다.
    /// 해당 라인이 없으면 마지막 라인을 사용합니다. 파싱할 수 없는 라인은 건너뜁니다.
    /// 매 라인마다 취소 여부를 확인합니다.
    pub fn seek(
        &mut self,
        window: &Interval,
        extractor: &dyn TimestampExtractor,
        cancel: &CancellationToken,
    ) -> Result<(), LogReplayError> {
        self.offsets = Offsets::whole(self.line_count);
        if !self.apply_window(window) || !self.partial.needs_seek() {
            return Ok(());
        }
        let partial = self.partial;
        trace!(path = %self.path.display(), partial = partial.description(), "seeking");

        let mut beginning = None;
        let mut end = None;
        for (index, line) in self.lines()?.enumerate() {
            if cancel.is_cancelled() {
                return Err(LogReplayError::Cancelled);
            }
            let line = line?;
            let ts = match extract_with_repair(extractor, &line) {
                Ok((ts, _)) => ts,
                Err(e) => {
                    trace!(path = %self.path.display(), line = index, error = %e, "seek skipping line");
                    continue;
                }
            };

            if partial.seeks_beginning() && beginning.is_none() && ts > window.beginning {
                beginning = Some(index);
            }
            if partial.seeks_end() && end.is_none() && ts > window.end {
                end = Some(index);
            }

            let beginning_done = !partial.seeks_beginning() || beginning.is_some();
            let end_done = !partial.seeks_end() || end.is_some();
            if beginning_done && end_done {
                break;
            }
        }

        let last = self.line_count.saturating_sub(1);
        let beginning = match beginning {
            Some(idx) => idx,
            None if partial.seeks_beginning() => last,
            None => 0,
        };
        let end = end.unwrap_or(last).max(beginning);
        self.offsets = Offsets { beginning, end };

        debug!(
            path = %self.path.display(),
            beginning,
            end,
            partial = partial.description(),
            "seek done"
        );
        Ok(())
    }

    /// 재생 시작 라인의 차이를 구간 시작 기준으로 다시 계산합니다.
    ///
    /// 시퀀스의 첫 파일에만 적용하여, 재생이 구간 시작 시각에 맞춰 시작되도록 합니다.
    pub fn align_to_window(
        &mut self,
        window: &Interval,
        extractor: &dyn TimestampExtractor,
    ) -> Result<(), LogReplayError> {
        let index = self.offsets.beginning;
        if index >= self.diffs.len() {
            return Ok(());
        }
        let line = self.line_at(index)?;
        let (ts, _) = extract_with_repair(extractor, &line)?;
        self.diffs[index] = ts - window.beginning;
        Ok(())
    }

    /// 이전 파일과의 간격을 첫 라인 차이로 기록합니다.
    pub fn set_leading_gap(&mut self, gap: TimeDelta) {
        if let Some(first) = self.diffs.first_mut() {
            *first = gap;
        }
    }

    /// 재생 범위의 라인을 메시지로 흘려보냅니다.
    ///
    /// blocking 스레드에서 파일을 읽어 용량 `capacity`의 채널로 보냅니다.
    /// 메시지의 `time`은 읽은 시각이며, 재생기가 레코드 시각으로 교체합니다.
    /// 취소되거나 수신측이 닫히면 읽기를 멈춥니다.
    pub fn drain(&self, cancel: CancellationToken, capacity: usize) -> Drain {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let path = self.path.clone();
        let encoding = self.encoding;
        let offsets = self.offsets;
        let source = self.path.display().to_string();
        let key = self.event_kind.to_string();

        let reader = tokio::task::spawn_blocking(move || -> Result<usize, LogReplayError> {
            let mut sent = 0usize;
            for (index, line) in LineReader::open(&path, encoding)?.enumerate() {
                if cancel.is_cancelled() {
                    trace!(source = source.as_str(), sent, "drain cancelled");
                    break;
                }
                let line = line?;
                if index < offsets.beginning {
                    continue;
                }
                let message = Message {
                    data: Bytes::from(line),
                    source: source.clone(),
                    offset: index as u64,
                    time: Utc::now(),
                    key: key.clone(),
                };
                if tx.blocking_send(message).is_err() {
                    trace!(source = source.as_str(), sent, "drain receiver closed");
                    break;
                }
                sent += 1;
                if index >= offsets.end {
                    break;
                }
            }
            Ok(sent)
        });

        Drain { messages: rx, reader }
    }
}

/// [`FileHandle::drain`]의 결과
pub struct Drain {
    /// 라인 메시지 수신 채널
    pub messages: mpsc::Receiver<Message>,
    /// 리더 태스크. 보낸 메시지 수를 반환합니다.
    pub reader: JoinHandle<Result<usize, LogReplayError>>,
}

/// 문자열의 SHA-256 hex 다이제스트
pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
