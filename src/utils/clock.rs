use chrono::{DateTime, TimeZone, Utc};

pub const MS_PER_MINUTE: i64 = 60 * 1000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts epoch milliseconds into a UTC timestamp, clamping values chrono
/// cannot represent to the epoch.
pub fn utc_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn minutes_to_ms(minutes: u32) -> i64 {
    i64::from(minutes) * MS_PER_MINUTE
}
