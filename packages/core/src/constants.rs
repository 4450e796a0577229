// ABOUTME: Platform-wide constants for consent request TTLs and scheduler windows
// ABOUTME: Single source of truth so storage, engine and API agree on limits

/// Default time-to-live for a consent request before it expires unread.
pub const DEFAULT_REQUEST_TTL_MINUTES: i64 = 60;

/// Callers may shorten a request TTL, but not below this floor.
pub const MIN_REQUEST_TTL_MINUTES: i64 = 5;

/// Callers may lengthen a request TTL, but not past this ceiling.
pub const MAX_REQUEST_TTL_MINUTES: i64 = 24 * 60;

/// How far ahead of artifact expiry the reminder job looks.
pub const DEFAULT_REMINDER_WINDOW_DAYS: i64 = 7;

/// Upper bound on items accepted by a single bulk-validate call.
pub const BULK_VALIDATE_MAX_ITEMS: usize = 100;
