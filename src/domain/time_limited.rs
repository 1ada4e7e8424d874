//! Time-limited (v1) credentials: one derived token per issuance interval, from the current
//! interval until the item's validity (plus grace) runs out.

use crate::domain::credential::TimeLimitedCreds;
use crate::foundation::util::encoding::encode_base64;
use crate::foundation::{IsoDuration, ItemId, OrderId, SkusError, TIME_LIMITED_GRACE_DAYS};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

const TOKEN_KEY_CONTEXT: &str = "skus-core time-limited credential v1";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Derives interval tokens from a merchant signing secret.
#[derive(Clone)]
pub struct TimeLimitedSecret {
    key: [u8; 32],
}

impl TimeLimitedSecret {
    pub fn new(secret: &[u8]) -> Self {
        Self { key: blake3::derive_key(TOKEN_KEY_CONTEXT, secret) }
    }

    pub fn derive(&self, issuer_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(issuer_id.as_bytes());
        hasher.update(b"|");
        hasher.update(start.format(DATE_FORMAT).to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(end.format(DATE_FORMAT).to_string().as_bytes());
        encode_base64(hasher.finalize().as_bytes())
    }
}

impl std::fmt::Debug for TimeLimitedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TimeLimitedSecret(..)")
    }
}

/// Returns the interval `[start, end)` containing `t`. Monthly intervals follow calendar months;
/// anything else truncates to the interval length since the unix epoch.
pub fn chunk(interval: &IsoDuration, t: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), SkusError> {
    let invalid = |details: &str| SkusError::InvalidDuration { value: interval.to_string(), details: details.to_string() };

    if *interval == (IsoDuration { months: 1, ..IsoDuration::default() }) {
        let start = Utc
            .with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
            .single()
            .ok_or_else(|| invalid("month start out of range"))?;
        let end = interval.add_to(start).ok_or_else(|| invalid("month end out of range"))?;
        return Ok((start, end));
    }

    let length = interval.length_from(t).ok_or_else(|| invalid("interval out of range"))?;
    let step = length.num_seconds();
    if step <= 0 {
        return Err(invalid("interval must be positive"));
    }
    let secs = t.timestamp();
    let start_secs = secs - secs.rem_euclid(step);
    let start = Utc.timestamp_opt(start_secs, 0).single().ok_or_else(|| invalid("interval start out of range"))?;
    Ok((start, start + Duration::seconds(step)))
}

/// Issues one credential per interval from the interval containing `now` until `issued + duration`
/// plus the grace period.
#[allow(clippy::too_many_arguments)]
pub fn time_chunking(
    issuer_id: &str,
    secret: &TimeLimitedSecret,
    order_id: OrderId,
    item_id: ItemId,
    issued: DateTime<Utc>,
    duration: &IsoDuration,
    interval: &IsoDuration,
    now: DateTime<Utc>,
) -> Result<Vec<TimeLimitedCreds>, SkusError> {
    let expires_at = duration
        .add_to(issued)
        .ok_or_else(|| SkusError::InvalidDuration { value: duration.to_string(), details: "unable to compute expiry".to_string() })?
        + Duration::days(TIME_LIMITED_GRACE_DAYS);

    let (mut d_end, _) = chunk(interval, now)?;
    let mut credentials = Vec::new();
    while d_end < expires_at {
        let (d_start, next_end) = chunk(interval, d_end)?;
        d_end = next_end;
        credentials.push(TimeLimitedCreds {
            item_id,
            order_id,
            issued_at: d_start.format(DATE_FORMAT).to_string(),
            expires_at: d_end.format(DATE_FORMAT).to_string(),
            token: secret.derive(issuer_id, d_start, d_end),
        });
    }
    Ok(credentials)
}
