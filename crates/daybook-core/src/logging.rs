//! Structured logging field name constants for daybook.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, retry attempts, config choices |
//! | TRACE | Per-item iteration, verification polls |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → store → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "store", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "list", "update", "toggle_hidden", "delete", "import"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Entry id being operated on.
pub const ENTRY_ID: &str = "entry_id";

/// Setting key being operated on.
pub const SETTING_KEY: &str = "setting_key";

// ─── Backend/retry fields ──────────────────────────────────────────────────

/// Which store answered the call. Values: "remote", "local".
pub const BACKEND: &str = "backend";

/// Zero-based retry attempt number.
pub const ATTEMPT: &str = "attempt";

/// Configured retry budget for the operation.
pub const MAX_RETRIES: &str = "max_retries";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of entries returned or affected.
pub const RESULT_COUNT: &str = "result_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
