//! 재생 스케줄러
//!
//! 시퀀스마다 태스크 하나를 띄워 활성 파일을 저장된 순서대로 읽고, 미리 계산한
//! 차이만큼 기다린 뒤 메시지를 공유 출력 채널로 보냅니다.
//!
//! # 아키텍처
//! ```text
//! Sequence A --drain--> [sleep(diff)] --\
//! Sequence B --drain--> [sleep(diff)] ----> mpsc::Sender<Message> --> 출력 (shipper)
//! Sequence C --drain--> [sleep(diff)] --/
//! ```
//!
//! 출력 채널은 모든 시퀀스 태스크가 끝나 송신측이 모두 drop 되면 닫힙니다.
//! 대기 중에도 취소 신호를 받으면 바로 멈춥니다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use ironpost_core::metrics as m;
use ironpost_core::types::Message;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::handle::{Drain, FileHandle};
use crate::sequence::Sequence;
use crate::timestamp::{TimestampExtractor, extract_with_repair};

/// 재생 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// 출력 채널로 보낸 메시지 수
    pub emitted: u64,
    /// 타임스탬프를 얻지 못해 건너뛴 메시지 수
    pub skipped: u64,
    /// 읽기 도중 실패한 파일 수
    pub failed_files: u64,
    /// 비정상 종료(panic)한 시퀀스 태스크 수
    pub failed_sequences: u64,
    /// 취소로 중단되었는지 여부
    pub cancelled: bool,
}

impl PlaybackReport {
    fn merge(&mut self, other: PlaybackReport) {
        self.emitted += other.emitted;
        self.skipped += other.skipped;
        self.failed_files += other.failed_files;
        self.failed_sequences += other.failed_sequences;
        self.cancelled |= other.cancelled;
    }
}

/// [`Scheduler::play`]의 결과
pub struct Playback {
    /// 병합된 출력 채널
    pub messages: mpsc::Receiver<Message>,
    /// 모든 시퀀스가 끝나면 요약을 반환하는 감독 태스크
    pub supervisor: JoinHandle<PlaybackReport>,
}

/// 재생 스케줄러
pub struct Scheduler {
    extractor: Arc<dyn TimestampExtractor>,
    channel_capacity: usize,
    cancel: CancellationToken,
}

impl Scheduler {
    /// 스케줄러를 생성합니다.
    pub fn new(
        extractor: Arc<dyn TimestampExtractor>,
        channel_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            extractor,
            channel_capacity: channel_capacity.max(1),
            cancel,
        }
    }

    /// 모든 시퀀스의 재생을 시작합니다.
    pub fn play(&self, sequences: Vec<Sequence>) -> Playback {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut set = JoinSet::new();

        info!(sequences = sequences.len(), "playback starting");
        for sequence in sequences {
            let player = SequencePlayer {
                extractor: Arc::clone(&self.extractor),
                tx: tx.clone(),
                cancel: self.cancel.clone(),
                capacity: self.channel_capacity,
            };
            set.spawn(player.run(sequence));
        }
        drop(tx);

        let supervisor = tokio::spawn(async move {
            let mut report = PlaybackReport::default();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(sequence_report) => report.merge(sequence_report),
                    Err(e) => {
                        warn!(error = %e, "sequence task failed");
                        report.failed_sequences += 1;
                    }
                }
            }
            info!(
                emitted = report.emitted,
                skipped = report.skipped,
                failed_files = report.failed_files,
                cancelled = report.cancelled,
                "playback finished"
            );
            report
        });

        Playback {
            messages: rx,
            supervisor,
        }
    }
}

struct SequencePlayer {
    extractor: Arc<dyn TimestampExtractor>,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    capacity: usize,
}

/// 파일 하나 재생 후 다음 동작
enum Flow {
    Continue,
    Stop,
}

impl SequencePlayer {
    async fn run(self, sequence: Sequence) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        let kind = sequence.event_kind().as_str();
        debug!(dir = %sequence.data_dir().display(), kind, "sequence playback starting");

        for file in sequence.files().iter().filter(|f| f.is_enabled()) {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Flow::Stop = self.play_file(file, kind, &mut report).await {
                break;
            }
        }
        report.cancelled |= self.cancel.is_cancelled();

        debug!(
            dir = %sequence.data_dir().display(),
            emitted = report.emitted,
            skipped = report.skipped,
            "sequence playback finished"
        );
        report
    }

    async fn play_file(
        &self,
        file: &FileHandle,
        kind: &'static str,
        report: &mut PlaybackReport,
    ) -> Flow {
        let offsets = file.offsets();
        let mut delays: VecDeque<TimeDelta> = file
            .diffs()
            .get(offsets.beginning..=offsets.end)
            .map(|range| range.iter().copied().collect())
            .unwrap_or_default();
        trace!(
            path = %file.path().display(),
            beginning = offsets.beginning,
            end = offsets.end,
            lines = offsets.len(),
            delays = delays.len(),
            "file playback starting"
        );

        let Drain {
            mut messages,
            reader,
        } = file.drain(self.cancel.child_token(), self.capacity);
        let mut flow = Flow::Continue;

        while let Some(mut message) = messages.recv().await {
            if let Some(delay) = delays.pop_front() {
                let delay = delay.to_std().unwrap_or(Duration::ZERO);
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            report.cancelled = true;
                            flow = Flow::Stop;
                            break;
                        }
                    }
                }
            }

            match extract_with_repair(self.extractor.as_ref(), &message.data) {
                Ok((time, _)) => message.time = time,
                Err(e) => {
                    debug!(source = %message.source, offset = message.offset, error = %e, "skipping message without timestamp");
                    metrics::counter!(m::LOG_REPLAY_MESSAGES_SKIPPED_TOTAL, m::LABEL_KIND => kind)
                        .increment(1);
                    report.skipped += 1;
                    continue;
                }
            }

            if self.tx.send(message).await.is_err() {
                debug!(path = %file.path().display(), "output channel closed, stopping sequence");
                flow = Flow::Stop;
                break;
            }
            metrics::counter!(m::LOG_REPLAY_MESSAGES_EMITTED_TOTAL, m::LABEL_KIND => kind).increment(1);
            report.emitted += 1;
        }
        drop(messages);

        match reader.await {
            Ok(Ok(sent)) => trace!(path = %file.path().display(), sent, "file reader finished"),
            Ok(Err(e)) => {
                warn!(path = %file.path().display(), error = %e, "file reader failed");
                report.failed_files += 1;
            }
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "file reader task failed");
                report.failed_files += 1;
            }
        }
        flow
    }
}
