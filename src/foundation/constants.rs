//! System-wide constants for SKU credential issuance.

/// Merchant that owns every issuer created by this service.
pub const DEFAULT_MERCHANT_ID: &str = "brave.com";

/// Upper bound on tokens an issuer may sign.
pub const DEFAULT_MAX_TOKENS_PER_ISSUER: u32 = 4_000_000;

/// Cohort used when creating and fetching v3 issuers.
pub const DEFAULT_COHORT: i16 = 1;

/// Number of future signing periods a time-limited-v2 issuer keeps keys for.
pub const DEFAULT_ISSUER_BUFFER: i32 = 30;

/// Number of overlapping periods a time-limited-v2 issuer keeps keys for.
pub const DEFAULT_ISSUER_OVERLAP: i32 = 5;

/// Issuance interval applied to time-limited items that do not carry one.
pub const DEFAULT_ISSUANCE_INTERVAL: &str = "P1D";

/// Days of validity added on top of an item's duration when chunking time-limited credentials.
pub const TIME_LIMITED_GRACE_DAYS: i64 = 5;

/// Credential issuer HTTP statuses that are never retried.
pub const NON_RETRIABLE_ISSUER_STATUSES: &[u16] = &[400, 401, 403, 500, 409];

/// Status the issuer returns when the issuer already exists.
pub const ISSUER_CONFLICT_STATUS: u16 = 409;

/// Status the issuer returns when a token preimage was already redeemed.
pub const REDEMPTION_DUPLICATE_STATUS: u16 = 409;

/// Status the issuer returns for a malformed or unknown redemption.
pub const REDEMPTION_BAD_REQUEST_STATUS: u16 = 400;

/// Distinct signing requests with credentials active at once for a time-limited-v2 item.
pub const MAX_TLV2_ACTIVE_BATCHES: usize = 10;

/// Value of a single vote, reported in every ledger event.
pub const BASE_VOTE_VALUE: &str = "0.25";

/// How long the vote drain pauses after the bus reports an expired session or certificate.
pub const VOTE_DRAIN_PAUSE_SECS: u64 = 30 * 60;

/// Substring in a publish error that indicates an expired transport session or certificate.
pub const TRANSPORT_EXPIRED_MARKER: &str = "expired";

/// Nanoseconds per second (10^9).
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Storage lock timeout in seconds.
pub const STORAGE_LOCK_TIMEOUT_SECS: u64 = 30;

/// Test-only override for the wall clock, in unix nanoseconds.
pub const TEST_NOW_NANOS_ENV_VAR: &str = "SKUS_TEST_NOW_NANOS";

/// Signed-order-credentials consumer backoff after a handler error, in milliseconds.
pub const DEFAULT_CONSUMER_BACKOFF_MS: u64 = 1_000;
