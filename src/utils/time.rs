use chrono::Utc;

/// Current time in milliseconds since the unix epoch.
pub fn time_millis() -> i64 {
    Utc::now().timestamp_millis()
}
