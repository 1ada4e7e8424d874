use chrono::{DateTime, TimeZone, Utc};
use skus_core::domain::time_limited::{chunk, time_chunking, TimeLimitedSecret};
use skus_core::foundation::{IsoDuration, ItemId, OrderId};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[test]
fn test_chunk_when_hourly_then_truncates_to_hour() {
    let hour = IsoDuration::parse("PT1H").unwrap();
    let (start, end) = chunk(&hour, at(2024, 5, 5, 13, 47)).unwrap();
    assert_eq!(start, at(2024, 5, 5, 13, 0));
    assert_eq!(end, at(2024, 5, 5, 14, 0));
}

#[test]
fn test_chunk_when_monthly_in_december_then_ends_next_year() {
    let month = IsoDuration::parse("P1M").unwrap();
    let (start, end) = chunk(&month, at(2023, 12, 31, 23, 59)).unwrap();
    assert_eq!(start, at(2023, 12, 1, 0, 0));
    assert_eq!(end, at(2024, 1, 1, 0, 0));
}

#[test]
fn test_secret_when_same_inputs_then_same_token() {
    let a = TimeLimitedSecret::new(b"secret");
    let b = TimeLimitedSecret::new(b"secret");
    let other = TimeLimitedSecret::new(b"other-secret");
    let (start, end) = (at(2024, 1, 1, 0, 0), at(2024, 1, 2, 0, 0));

    assert_eq!(a.derive("brave.com?sku=x", start, end), b.derive("brave.com?sku=x", start, end));
    assert_ne!(a.derive("brave.com?sku=x", start, end), other.derive("brave.com?sku=x", start, end));
    assert_ne!(a.derive("brave.com?sku=x", start, end), a.derive("brave.com?sku=y", start, end));
    assert!(!format!("{a:?}").contains("secret"));
}

#[test]
fn test_time_chunking_when_mid_period_then_starts_at_current_interval() {
    let secret = TimeLimitedSecret::new(b"secret");
    let creds = time_chunking(
        "brave.com?sku=brave-talk-premium",
        &secret,
        OrderId::new_v4(),
        ItemId::new_v4(),
        at(2024, 1, 1, 0, 0),
        &IsoDuration::parse("P1M").unwrap(),
        &IsoDuration::parse("P1D").unwrap(),
        at(2024, 1, 20, 9, 30),
    )
    .unwrap();

    // Jan 20 through Feb 5 (expiry Feb 1 plus five days of grace).
    assert_eq!(creds.len(), 17);
    assert_eq!(creds[0].issued_at, "2024-01-20");
    assert_eq!(creds.last().unwrap().expires_at, "2024-02-06");
    for pair in creds.windows(2) {
        assert_eq!(pair[0].expires_at, pair[1].issued_at);
    }
}

#[test]
fn test_time_chunking_when_monthly_interval_then_one_token_per_month() {
    let secret = TimeLimitedSecret::new(b"secret");
    let creds = time_chunking(
        "brave.com?sku=brave-talk-premium",
        &secret,
        OrderId::new_v4(),
        ItemId::new_v4(),
        at(2024, 1, 10, 0, 0),
        &IsoDuration::parse("P1M").unwrap(),
        &IsoDuration::parse("P1M").unwrap(),
        at(2024, 1, 10, 0, 0),
    )
    .unwrap();
    // Expiry Feb 10 plus grace falls inside February, so January and February are issued.
    assert_eq!(creds.iter().map(|c| c.issued_at.as_str()).collect::<Vec<_>>(), vec!["2024-01-01", "2024-02-01"]);
}
