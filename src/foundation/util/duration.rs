//! ISO-8601 durations as carried in SKU caveats (`P1M`, `P1D`, `PT1H`, `P1Y2M10DT2H30M`).
//!
//! Calendar components (years, months) are applied with calendar arithmetic, so `P1M` from
//! January 31st lands on the last day of February rather than a fixed number of seconds later.

use crate::foundation::SkusError;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IsoDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl IsoDuration {
    pub fn parse(value: &str) -> Result<Self, SkusError> {
        let invalid = |details: &str| SkusError::InvalidDuration { value: value.to_string(), details: details.to_string() };

        let body = value.trim().strip_prefix('P').ok_or_else(|| invalid("missing 'P' designator"))?;
        if body.is_empty() {
            return Err(invalid("empty duration"));
        }

        let mut out = IsoDuration::default();
        let mut in_time = false;
        let mut digits = String::new();
        let mut seen_component = false;
        let mut seen_time_component = false;

        for ch in body.chars() {
            match ch {
                'T' => {
                    if in_time || !digits.is_empty() {
                        return Err(invalid("misplaced 'T' designator"));
                    }
                    in_time = true;
                }
                '0'..='9' => digits.push(ch),
                unit => {
                    if digits.is_empty() {
                        return Err(invalid("designator without a value"));
                    }
                    let n: u32 = digits.parse().map_err(|_| invalid("component out of range"))?;
                    digits.clear();
                    seen_component = true;
                    seen_time_component |= in_time;
                    match (in_time, unit) {
                        (false, 'Y') => out.years = n,
                        (false, 'M') => out.months = n,
                        (false, 'W') => out.weeks = n,
                        (false, 'D') => out.days = n,
                        (true, 'H') => out.hours = n,
                        (true, 'M') => out.minutes = n,
                        (true, 'S') => out.seconds = n,
                        _ => return Err(invalid("unknown designator")),
                    }
                }
            }
        }

        if !digits.is_empty() {
            return Err(invalid("trailing value without designator"));
        }
        if !seen_component {
            return Err(invalid("no components"));
        }
        if in_time && !seen_time_component {
            return Err(invalid("'T' designator without time components"));
        }
        Ok(out)
    }

    pub fn is_zero(&self) -> bool {
        *self == IsoDuration::default()
    }

    /// Returns `from + self`, or `None` on calendar overflow.
    pub fn add_to(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = if months > 0 { from.checked_add_months(Months::new(months))? } else { from };
        let fixed = Duration::weeks(i64::from(self.weeks))
            + Duration::days(i64::from(self.days))
            + Duration::hours(i64::from(self.hours))
            + Duration::minutes(i64::from(self.minutes))
            + Duration::seconds(i64::from(self.seconds));
        shifted.checked_add_signed(fixed)
    }

    /// Length of this duration when started at `from`.
    pub fn length_from(&self, from: DateTime<Utc>) -> Option<Duration> {
        self.add_to(from).map(|end| end - from)
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (n, unit) in [(self.years, 'Y'), (self.months, 'M'), (self.weeks, 'W'), (self.days, 'D')] {
            if n > 0 {
                write!(f, "{n}{unit}")?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            f.write_str("T")?;
            for (n, unit) in [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')] {
                if n > 0 {
                    write!(f, "{n}{unit}")?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for IsoDuration {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for IsoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IsoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
