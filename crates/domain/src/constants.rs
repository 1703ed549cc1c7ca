//! Engine constants
//!
//! Centralized location for persisted keys and engine defaults.

// Persistence keys
/// Storage key of the pending blob.
pub const PENDING_QUEUE_KEY: &str = "sync_queue_pending";
/// Storage key of the dead-letter blob.
pub const DEAD_LETTER_QUEUE_KEY: &str = "sync_queue_deadletter";
/// Suffix for backups of unreadable blobs.
pub const CORRUPT_KEY_SUFFIX: &str = ".corrupt";

// Queue limits
/// Failed attempts before an item is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Oldest dead-lettered items are dropped past this size.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 200;
/// `last_error` is truncated to this many characters.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 256;

// Scheduling
/// 5 minutes.
pub const DEFAULT_PERIODIC_INTERVAL_SECS: u64 = 300;
/// Quiet period after reconnecting before a drain.
pub const DEFAULT_RECONNECT_DEBOUNCE_MS: u64 = 500;
/// Bound for joining scheduler tasks.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5_000;

// Backoff
/// Backoff delay for attempt 0.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
/// Backoff cap (5 minutes).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;
/// Relative jitter band, `±20%`.
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

// Transport
/// Header carrying the item id.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Server used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

// Storage
/// SQLite file used when none is configured.
pub const DEFAULT_DB_PATH: &str = "outpost.db";
/// Connections in the SQLite pool.
pub const DEFAULT_DB_POOL_SIZE: u32 = 4;
