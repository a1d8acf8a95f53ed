//! 재생 엔진 -- 디스커버리부터 재생까지 전체 흐름을 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! PathCatalog -> FileHandle(stat) -> Sequence(filter) -> SequenceList(build/seek/diff) -> Scheduler
//! ```
//!
//! [`ReplayEngine::prepare`]가 파일을 모두 검증하고 차이를 계산한 뒤에야
//! [`ReplayEngine::play`]로 재생을 시작할 수 있습니다.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::ReplayCache;
use crate::config::ReplayConfig;
use crate::error::LogReplayError;
use crate::scheduler::{Playback, Scheduler};
use crate::sequence::Sequence;
use crate::sequence_list::SequenceList;
use crate::timestamp::TimestampExtractor;

/// 엔진 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// 생성됨, 아직 준비하지 않음
    Initialized,
    /// 준비 완료, 재생 대기
    Prepared,
    /// 재생 시작됨
    Playing,
}

/// 로그 재생 엔진
///
/// # 사용 예시
/// ```ignore
/// use ironpost_log_replay::{ReplayConfig, ReplayEngineBuilder};
///
/// let mut engine = ReplayEngineBuilder::new()
///     .config(config)
///     .cancel_token(token.clone())
///     .build()?;
///
/// engine.prepare().await?;
/// let mut playback = engine.play()?;
/// while let Some(msg) = playback.messages.recv().await {
///     println!("{msg}");
/// }
/// ```
pub struct ReplayEngine {
    config: ReplayConfig,
    extractor: Arc<dyn TimestampExtractor>,
    cancel: CancellationToken,
    state: EngineState,
    sequences: Vec<Sequence>,
}

impl ReplayEngine {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Initialized => "initialized",
            EngineState::Prepared => "prepared",
            EngineState::Playing => "playing",
        }
    }

    /// 엔진 설정
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// 준비된 시퀀스 목록
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// 재생 대상 파일 수
    pub fn enabled_count(&self) -> usize {
        self.sequences.iter().map(Sequence::enabled_count).sum()
    }

    /// 디렉토리를 탐색하고 재생에 필요한 모든 계산을 마칩니다.
    ///
    /// 단계마다 취소 여부를 확인합니다. 어느 단계든 실패하면 재생을 시작하지 않습니다.
    pub async fn prepare(&mut self) -> Result<(), LogReplayError> {
        if self.state != EngineState::Initialized {
            return Err(LogReplayError::Config {
                field: "engine".to_owned(),
                reason: format!("cannot prepare in state {}", self.state_name()),
            });
        }
        let window = self.config.window;
        info!(
            from = %window.beginning,
            to = %window.end,
            streams = self.config.streams.len(),
            "preparing log replay"
        );

        let mut sequences = Vec::with_capacity(self.config.streams.len());
        for stream in &self.config.streams {
            self.check_cancelled()?;
            let mut sequence = Sequence::discover(
                stream.dir.clone(),
                stream.kind,
                Arc::clone(&self.extractor),
                self.config.workers,
            )
            .await?;
            let kept = sequence.filter_to_window(&window);
            info!(dir = %stream.dir.display(), kind = %stream.kind, files = kept, "files in window");
            sequences.push(sequence);
        }

        let mut list = SequenceList::new(sequences, Arc::clone(&self.extractor), self.config.workers);
        let cache = ReplayCache::new(&self.config.work_dir);

        self.check_cancelled()?;
        list.build_or_load_all(
            self.config.cache.then(|| cache.clone()),
            self.config.ignore_parse_errors,
        )
        .await?;

        self.check_cancelled()?;
        list.seek_all(window, self.cancel.clone()).await?;

        list.calc_diffs_between_files();
        self.check_cancelled()?;
        list.calc_diff_beginning(window).await?;
        list.dump_sequences(&cache);

        self.sequences = list.into_sequences();
        self.state = EngineState::Prepared;
        info!(files = self.enabled_count(), "log replay prepared");
        Ok(())
    }

    /// 준비된 시퀀스의 재생을 시작합니다.
    pub fn play(&mut self) -> Result<Playback, LogReplayError> {
        if self.state != EngineState::Prepared {
            return Err(LogReplayError::Config {
                field: "engine".to_owned(),
                reason: format!("cannot play in state {}", self.state_name()),
            });
        }
        self.state = EngineState::Playing;
        let scheduler = Scheduler::new(
            Arc::clone(&self.extractor),
            self.config.channel_capacity,
            self.cancel.clone(),
        );
        Ok(scheduler.play(std::mem::take(&mut self.sequences)))
    }

    fn check_cancelled(&self) -> Result<(), LogReplayError> {
        if self.cancel.is_cancelled() {
            return Err(LogReplayError::Cancelled);
        }
        Ok(())
    }
}

/// 재생 엔진 빌더
pub struct ReplayEngineBuilder {
    config: ReplayConfig,
    extractor: Option<Arc<dyn TimestampExtractor>>,
    cancel: Option<CancellationToken>,
}

impl ReplayEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ReplayConfig::default(),
            extractor: None,
            cancel: None,
        }
    }

    /// 재생 설정을 지정합니다.
    pub fn config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// 타임스탬프 추출기를 지정합니다.
    ///
    /// 지정하지 않으면 설정의 `timestamp_fields` 순서로 조회하는 추출기를 사용합니다.
    pub fn extractor(mut self, extractor: Arc<dyn TimestampExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// 취소 토큰을 지정합니다.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 설정을 검증하고 엔진을 생성합니다.
    pub fn build(self) -> Result<ReplayEngine, LogReplayError> {
        self.config.validate()?;
        let extractor: Arc<dyn TimestampExtractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(self.config.extractor()),
        };
        Ok(ReplayEngine {
            config: self.config,
            extractor,
            cancel: self.cancel.unwrap_or_default(),
            state: EngineState::Initialized,
            sequences: Vec::new(),
        })
    }
}

impl Default for ReplayEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
