//! 메트릭 상수 및 설명 등록
//!
//! 재생 파이프라인의 메트릭 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않으면 기록은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironpost_log_replay_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 스트림 종류 레이블 키 (syslog, suricata, ...)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (hit, miss)
pub const LABEL_RESULT: &str = "result";

// ─── Log Replay 메트릭 ─────────────────────────────────────────────

/// Log Replay: 출력 채널로 전달된 메시지 수 (counter, label: kind)
pub const LOG_REPLAY_MESSAGES_EMITTED_TOTAL: &str = "ironpost_log_replay_messages_emitted_total";

/// Log Replay: 재생 중 타임스탬프를 다시 읽지 못해 건너뛴 메시지 수 (counter)
pub const LOG_REPLAY_MESSAGES_SKIPPED_TOTAL: &str = "ironpost_log_replay_messages_skipped_total";

/// Log Replay: 빌드 중 복구 불가능한 파싱 실패 라인 수 (counter)
pub const LOG_REPLAY_PARSE_ERRORS_TOTAL: &str = "ironpost_log_replay_parse_errors_total";

/// Log Replay: 이스케이프 복구 후 파싱에 성공한 라인 수 (counter)
pub const LOG_REPLAY_LINES_REPAIRED_TOTAL: &str = "ironpost_log_replay_lines_repaired_total";

/// Log Replay: 캐시 조회 수 (counter, label: result)
pub const LOG_REPLAY_CACHE_LOOKUPS_TOTAL: &str = "ironpost_log_replay_cache_lookups_total";

/// Log Replay: 타임스탬프 차이 빌드가 끝난 파일 수 (counter)
pub const LOG_REPLAY_FILES_BUILT_TOTAL: &str = "ironpost_log_replay_files_built_total";

/// Log Replay: 파일 하나의 빌드 소요 시간 (histogram, 초)
pub const LOG_REPLAY_BUILD_DURATION_SECONDS: &str = "ironpost_log_replay_build_duration_seconds";

/// Log Replay: 재생 대상으로 활성화된 파일 수 (gauge)
pub const LOG_REPLAY_FILES_ENABLED: &str = "ironpost_log_replay_files_enabled";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        LOG_REPLAY_MESSAGES_EMITTED_TOTAL,
        "Total number of replayed messages sent to the output channel"
    );
    describe_counter!(
        LOG_REPLAY_MESSAGES_SKIPPED_TOTAL,
        "Total number of messages skipped during playback because the timestamp could not be parsed"
    );
    describe_counter!(
        LOG_REPLAY_PARSE_ERRORS_TOTAL,
        "Total number of lines whose timestamp could not be parsed while building diffs"
    );
    describe_counter!(
        LOG_REPLAY_LINES_REPAIRED_TOTAL,
        "Total number of lines parsed only after escape repair"
    );
    describe_counter!(
        LOG_REPLAY_CACHE_LOOKUPS_TOTAL,
        "Total number of diff cache lookups by result (hit, miss)"
    );
    describe_counter!(
        LOG_REPLAY_FILES_BUILT_TOTAL,
        "Total number of files whose timestamp diffs were built from scratch"
    );
    describe_histogram!(
        LOG_REPLAY_BUILD_DURATION_SECONDS,
        "Time to build timestamp diffs for a single file in seconds"
    );
    describe_gauge!(
        LOG_REPLAY_FILES_ENABLED,
        "Number of files selected for playback in the current window"
    );
}
