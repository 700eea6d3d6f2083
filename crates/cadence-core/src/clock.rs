//! Wall-clock access, in the integer-microseconds convention used by
//! every `*_us` column.

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
