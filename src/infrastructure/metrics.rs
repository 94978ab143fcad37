//! Bridge metrics recorded through the `metrics` facade

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

pub const ACTIVE_SESSIONS: &str = "bridge_active_sessions";
pub const SESSIONS_TOTAL: &str = "bridge_sessions_total";
pub const SESSION_FAILURES_TOTAL: &str = "bridge_session_failures_total";
pub const AUDIO_FRAMES_TOTAL: &str = "bridge_audio_frames_total";
pub const FUNCTION_CALLS_TOTAL: &str = "bridge_function_calls_total";
pub const FUNCTION_CALL_DURATION: &str = "bridge_function_call_duration_seconds";

/// Register descriptions with whatever recorder is installed
pub fn describe() {
    describe_gauge!(ACTIVE_SESSIONS, "Number of currently bridged calls");
    describe_counter!(SESSIONS_TOTAL, "Total number of sessions started");
    describe_counter!(
        SESSION_FAILURES_TOTAL,
        "Sessions that failed to start or ended on a transport failure"
    );
    describe_counter!(AUDIO_FRAMES_TOTAL, "Audio frames relayed, by direction");
    describe_counter!(
        FUNCTION_CALLS_TOTAL,
        "Function invocations dispatched, by function and status"
    );
    describe_histogram!(
        FUNCTION_CALL_DURATION,
        "Function invocation duration in seconds"
    );
}

/// Update active sessions gauge
pub fn update_active_sessions(count: usize) {
    gauge!(ACTIVE_SESSIONS).set(count as f64);
}

pub fn record_session_started() {
    counter!(SESSIONS_TOTAL).increment(1);
}

pub fn record_session_failure(reason: &str) {
    counter!(SESSION_FAILURES_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// `direction` is the source side of the frame
pub fn record_audio_frame(direction: &'static str) {
    counter!(AUDIO_FRAMES_TOTAL, "direction" => direction).increment(1);
}

pub fn record_function_call(function: &str, status: &str, duration: Duration) {
    counter!(
        FUNCTION_CALLS_TOTAL,
        "function" => function.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(FUNCTION_CALL_DURATION, "function" => function.to_string())
        .record(duration.as_secs_f64());
}
