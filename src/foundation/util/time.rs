use crate::foundation::SkusError;
use chrono::{DateTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_nanos_env(env_var: Option<&str>) -> Result<u64, SkusError> {
    if let Some(var) = env_var {
        if let Ok(value) = std::env::var(var) {
            return value.parse::<u64>().map_err(|err| SkusError::Message(err.to_string()));
        }
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|err| SkusError::Message(err.to_string()))?;
    Ok(now.as_secs().saturating_mul(1_000_000_000).saturating_add(u64::from(now.subsec_nanos())))
}

/// Returns the current wall-clock timestamp in nanoseconds.
///
/// For test determinism, this respects `TEST_NOW_NANOS_ENV_VAR` when set.
pub fn now_nanos() -> u64 {
    current_timestamp_nanos_env(Some(crate::foundation::constants::TEST_NOW_NANOS_ENV_VAR))
        .or_else(|_| current_timestamp_nanos_env(None))
        .unwrap_or(0)
}

/// Wall clock as a UTC timestamp, honoring the same test override as [`now_nanos`].
pub fn now_utc() -> DateTime<Utc> {
    nanos_to_utc(now_nanos())
}

pub fn nanos_to_utc(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / crate::foundation::constants::NANOS_PER_SECOND) as i64;
    let sub = (nanos % crate::foundation::constants::NANOS_PER_SECOND) as u32;
    Utc.timestamp_opt(secs, sub).single().unwrap_or_default()
}

/// Parses an RFC3339 timestamp into UTC.
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, SkusError> {
    Ok(DateTime::parse_from_rfc3339(value.trim())?.with_timezone(&Utc))
}

/// Converts a unix millisecond timestamp (as used by both app stores) into UTC.
pub fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
