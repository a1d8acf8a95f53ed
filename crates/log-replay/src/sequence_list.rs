//! 시퀀스 목록 -- 모든 시퀀스의 파일을 하나의 워커 풀로 처리합니다.
//!
//! # 단계
//! ```text
//! build_or_load_all -> seek_all -> calc_diffs_between_files -> calc_diff_beginning
//! ```
//!
//! 각 단계는 활성화된 핸들을 시퀀스에서 꺼내 워커 풀에 넘기고, 끝나면 원래 자리에
//! 되돌려 놓습니다. 한 핸들은 한 번에 하나의 워커만 소유합니다.
//! 한 핸들의 실패는 다른 핸들 처리를 멈추지 않으며, 단계가 끝난 뒤 집계 에러로 반환됩니다.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ReplayCache;
use crate::error::{AggregateError, LogReplayError};
use crate::handle::FileHandle;
use crate::interval::Interval;
use crate::pool;
use crate::sequence::Sequence;
use crate::timestamp::TimestampExtractor;

/// 처리 대상 핸들 선택 함수: 시퀀스에서 파일 인덱스 목록을 고릅니다.
type Selector = fn(&Sequence) -> Vec<usize>;

/// 재생할 시퀀스 목록
pub struct SequenceList {
    sequences: Vec<Sequence>,
    extractor: Arc<dyn TimestampExtractor>,
    workers: usize,
}

impl SequenceList {
    /// 시퀀스 목록을 생성합니다.
    pub fn new(
        sequences: Vec<Sequence>,
        extractor: Arc<dyn TimestampExtractor>,
        workers: usize,
    ) -> Self {
        Self {
            sequences,
            extractor,
            workers: workers.max(1),
        }
    }

    /// 시퀀스 목록
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// 시퀀스 목록을 꺼냅니다.
    pub fn into_sequences(self) -> Vec<Sequence> {
        self.sequences
    }

    /// 활성화된 파일 수
    pub fn enabled_count(&self) -> usize {
        self.sequences.iter().map(Sequence::enabled_count).sum()
    }

    /// 활성화된 모든 핸들의 타임스탬프 차이를 빌드하거나 캐시에서 읽습니다.
    ///
    /// 캐시가 주어지면 항목이 있을 때 읽고, 없으면 빌드 후 저장합니다.
    /// 파싱 에러 무시 정책으로 빌드가 끝난 경우([`LogReplayError::ParseMessageSource`])는
    /// 실패로 보지 않고 debug 로그만 남깁니다.
    pub async fn build_or_load_all(
        &mut self,
        cache: Option<ReplayCache>,
        ignore_parse_errors: bool,
    ) -> Result<(), LogReplayError> {
        info!(
            files = self.enabled_count(),
            cache = cache.is_some(),
            workers = self.workers,
            "building timestamp diffs"
        );
        let extractor = Arc::clone(&self.extractor);
        self.run_phase("async build or load", all_enabled, move |handle| {
            build_or_load(handle, cache.as_ref(), extractor.as_ref(), ignore_parse_errors)
        })
        .await
    }

    /// 재생 구간 경계에 걸친 핸들의 오프셋을 찾습니다.
    pub async fn seek_all(
        &mut self,
        window: Interval,
        cancel: CancellationToken,
    ) -> Result<(), LogReplayError> {
        info!(files = self.enabled_count(), "seeking window boundaries");
        let extractor = Arc::clone(&self.extractor);
        let token = cancel.clone();
        let result = self
            .run_phase("async seek", needs_seek, move |handle| {
                handle.seek(&window, extractor.as_ref(), &token)
            })
            .await;
        if cancel.is_cancelled() {
            return Err(LogReplayError::Cancelled);
        }
        result
    }

    /// 각 시퀀스에서 파일 사이 간격을 첫 라인 차이에 기록합니다.
    pub fn calc_diffs_between_files(&mut self) {
        for sequence in &mut self.sequences {
            sequence.calc_diffs_between_files();
        }
    }

    /// 각 시퀀스의 첫 활성 파일에서 재생 시작 라인의 차이를 구간 시작 기준으로 바꿉니다.
    ///
    /// 실패한 시퀀스는 debug 로그를 남기고 기존 차이를 유지합니다.
    pub async fn calc_diff_beginning(&mut self, window: Interval) -> Result<(), LogReplayError> {
        let extractor = Arc::clone(&self.extractor);
        let result = self
            .run_phase("async diff beginning", first_enabled, move |handle| {
                handle.align_to_window(&window, extractor.as_ref())
            })
            .await;
        match result {
            Err(LogReplayError::Aggregate(agg)) => {
                debug!(error = %agg, "diff beginning left unchanged for some sequences");
                Ok(())
            }
            other => other,
        }
    }

    /// 모든 시퀀스를 작업 디렉토리에 덤프합니다. 실패는 경고만 남깁니다.
    pub fn dump_sequences(&self, cache: &ReplayCache) {
        for sequence in &self.sequences {
            if let Err(e) = cache.dump_sequence(sequence) {
                warn!(dir = %sequence.data_dir().display(), error = %e, "failed to dump sequence");
            }
        }
    }

    /// 선택된 핸들을 꺼내 워커 풀에서 `job`을 실행하고 되돌려 놓습니다.
    async fn run_phase<F>(
        &mut self,
        desc: &str,
        select: Selector,
        job: F,
    ) -> Result<(), LogReplayError>
    where
        F: Fn(&mut FileHandle) -> Result<(), LogReplayError> + Send + Sync + 'static,
    {
        let mut slots: Vec<Vec<Option<FileHandle>>> = Vec::with_capacity(self.sequences.len());
        let mut items = Vec::new();
        for (seq_idx, sequence) in self.sequences.iter_mut().enumerate() {
            let selected = select(sequence);
            let files = std::mem::take(&mut sequence.files);
            let mut row = Vec::with_capacity(files.len());
            for (file_idx, handle) in files.into_iter().enumerate() {
                if selected.contains(&file_idx) {
                    items.push((seq_idx, file_idx, handle));
                    row.push(None);
                } else {
                    row.push(Some(handle));
                }
            }
            slots.push(row);
        }

        let outcome = pool::run_blocking(items, self.workers, move |(seq_idx, file_idx, mut handle)| {
            let result = job(&mut handle);
            (seq_idx, file_idx, handle, result)
        })
        .await;

        let mut errors = AggregateError::new(desc);
        let mut join_error = None;
        match outcome {
            Ok(results) => {
                for (seq_idx, file_idx, handle, result) in results {
                    if let Err(e) = result {
                        errors.push(e);
                    }
                    slots[seq_idx][file_idx] = Some(handle);
                }
            }
            Err(e) => join_error = Some(e),
        }

        for (sequence, row) in self.sequences.iter_mut().zip(slots) {
            sequence.files = row.into_iter().flatten().collect();
        }

        if let Some(e) = join_error {
            return Err(e);
        }
        errors.into_result()
    }
}

fn all_enabled(sequence: &Sequence) -> Vec<usize> {
    sequence
        .files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.enabled)
        .map(|(i, _)| i)
        .collect()
}

fn needs_seek(sequence: &Sequence) -> Vec<usize> {
    sequence
        .files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.enabled && f.partial.needs_seek())
        .map(|(i, _)| i)
        .collect()
}

fn first_enabled(sequence: &Sequence) -> Vec<usize> {
    sequence
        .files
        .iter()
        .position(|f| f.enabled)
        .into_iter()
        .collect()
}

fn build_or_load(
    handle: &mut FileHandle,
    cache: Option<&ReplayCache>,
    extractor: &dyn TimestampExtractor,
    ignore_parse_errors: bool,
) -> Result<(), LogReplayError> {
    if let Some(cache) = cache {
        if cache.load_into(handle)? {
            return Ok(());
        }
    }

    match handle.build(extractor, ignore_parse_errors) {
        Ok(()) => {}
        Err(e @ LogReplayError::ParseMessageSource { .. }) if ignore_parse_errors => {
            debug!(error = %e, "parse errors ignored");
        }
        Err(e) => return Err(e),
    }

    if let Some(cache) = cache {
        cache.store(handle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::KnownTimestamps;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use ironpost_core::types::EventKind;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn write_secs(dir: &Path, name: &str, secs: &[i64]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for s in secs {
            let ts = t0() + TimeDelta::seconds(*s);
            writeln!(file, r#"{{"@timestamp":"{}"}}"#, ts.to_rfc3339()).unwrap();
        }
        path
    }

    fn window(from: i64, to: i64) -> Interval {
        Interval::new(t0() + TimeDelta::seconds(from), t0() + TimeDelta::seconds(to)).unwrap()
    }

    async fn list_for(dir: &Path, window: &Interval) -> SequenceList {
        let extractor: Arc<dyn TimestampExtractor> = Arc::new(KnownTimestamps::default());
        let mut seq = Sequence::discover(dir, EventKind::Syslog, Arc::clone(&extractor), 2)
            .await
            .unwrap();
        seq.filter_to_window(window);
        SequenceList::new(vec![seq], extractor, 2)
    }

    #[tokio::test]
    async fn build_all_fills_diffs_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 1, 3]);
        write_secs(dir.path(), "b.json", &[5, 9]);
        let w = window(0, 10);
        let mut list = list_for(dir.path(), &w).await;

        list.build_or_load_all(None, false).await.unwrap();
        let files = list.sequences()[0].files();
        assert_eq!(files.len(), 2);
        assert!(files[0].path().ends_with("a.json"));
        assert_eq!(
            files[0].diffs(),
            &[TimeDelta::zero(), TimeDelta::seconds(1), TimeDelta::seconds(2)]
        );
        assert_eq!(files[1].diffs(), &[TimeDelta::zero(), TimeDelta::seconds(4)]);
    }

    #[tokio::test]
    async fn build_all_aggregates_failures_and_restores_handles() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 1]);
        let bad = dir.path().join("b.json");
        std::fs::write(
            &bad,
            format!(
                "{{\"@timestamp\":\"{}\"}}\nbroken\n{{\"@timestamp\":\"{}\"}}\n",
                (t0() + TimeDelta::seconds(2)).to_rfc3339(),
                (t0() + TimeDelta::seconds(4)).to_rfc3339()
            ),
        )
        .unwrap();
        let w = window(0, 10);
        let mut list = list_for(dir.path(), &w).await;

        let err = list.build_or_load_all(None, false).await.unwrap_err();
        match err {
            LogReplayError::Aggregate(agg) => {
                assert_eq!(agg.total(), 1);
                assert!(matches!(agg.items()[0], LogReplayError::ParseRawData { offset: 1, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(list.sequences()[0].files().len(), 2);
    }

    #[tokio::test]
    async fn ignored_parse_errors_do_not_fail_the_phase() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            format!(
                "{{\"@timestamp\":\"{}\"}}\nbroken\n{{\"@timestamp\":\"{}\"}}\n",
                t0().to_rfc3339(),
                (t0() + TimeDelta::seconds(4)).to_rfc3339()
            ),
        )
        .unwrap();
        let work = tempfile::tempdir().unwrap();
        let w = window(0, 10);
        let mut list = list_for(dir.path(), &w).await;

        list.build_or_load_all(Some(ReplayCache::new(work.path())), true)
            .await
            .unwrap();
        let diffs = list.sequences()[0].files()[0].diffs();
        assert_eq!(diffs, &[TimeDelta::zero(), TimeDelta::zero(), TimeDelta::seconds(4)]);
        assert_eq!(std::fs::read_dir(work.path().join("cache")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn seek_all_only_touches_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 1, 2, 3, 4]);
        write_secs(dir.path(), "b.json", &[6, 7]);
        let w = window(2, 8);
        let mut list = list_for(dir.path(), &w).await;
        list.build_or_load_all(None, false).await.unwrap();

        list.seek_all(w, CancellationToken::new()).await.unwrap();
        let files = list.sequences()[0].files();
        assert_eq!(files[0].offsets().beginning, 3);
        assert_eq!(files[0].offsets().end, 4);
        assert_eq!(files[1].offsets().beginning, 0);
        assert_eq!(files[1].offsets().end, 1);
    }

    #[tokio::test]
    async fn seek_all_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 1, 2, 3, 4]);
        let w = window(2, 3);
        let mut list = list_for(dir.path(), &w).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = list.seek_all(w, cancel).await.unwrap_err();
        assert!(matches!(err, LogReplayError::Cancelled));
        assert_eq!(list.sequences()[0].files().len(), 1);
    }

    #[tokio::test]
    async fn diff_beginning_measures_from_window_start() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 2, 5]);
        write_secs(dir.path(), "b.json", &[8, 9]);
        let w = window(1, 10);
        let mut list = list_for(dir.path(), &w).await;
        list.build_or_load_all(None, false).await.unwrap();
        list.seek_all(w, CancellationToken::new()).await.unwrap();
        list.calc_diffs_between_files();
        list.calc_diff_beginning(w).await.unwrap();

        let files = list.sequences()[0].files();
        assert_eq!(files[0].offsets().beginning, 1);
        assert_eq!(files[0].diffs()[1], TimeDelta::seconds(1));
        assert_eq!(files[1].diffs()[0], TimeDelta::seconds(3));
    }

    #[tokio::test]
    async fn dump_writes_one_file_per_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_secs(dir.path(), "a.json", &[0, 1]);
        let work = tempfile::tempdir().unwrap();
        let w = window(0, 2);
        let mut list = list_for(dir.path(), &w).await;
        list.build_or_load_all(None, false).await.unwrap();

        let cache = ReplayCache::new(work.path());
        list.dump_sequences(&cache);
        let path = cache.sequence_path(&list.sequences()[0]);
        let raw = std::fs::read(path).unwrap();
        let dumped: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(dumped["event_kind"], "syslog");
        assert_eq!(dumped["files"].as_array().unwrap().len(), 1);
        assert_eq!(dumped["files"][0]["diffs"], serde_json::json!([0, 1_000_000_000]));

        let restored: Sequence = serde_json::from_slice(&raw).unwrap();
        assert_eq!(restored.files()[0].diffs(), list.sequences()[0].files()[0].diffs());
    }
}
