//! Store configuration.
//!
//! The choice of backend is explicit state passed in at construction, not
//! ambient globals: two façades with different configurations can coexist
//! in one process, which is what makes the selection policy testable.

use std::path::PathBuf;
use std::time::Duration;

/// Execution mode the application was launched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Normal,
    /// Forces the local fallback store regardless of every other flag.
    Mock,
}

/// Configuration for [`crate::DiaryStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Execution mode (mock mode short-circuits backend selection).
    pub mode: ExecutionMode,
    /// Explicit "use the local store" flag.
    pub use_mock: bool,
    /// Whether this is a development build. Dev builds default to the
    /// local store so development never depends on a live deployment.
    pub dev_build: bool,
    /// Base URL of the remote record store API.
    pub base_url: String,
    /// Directory holding the local fallback store's buckets.
    pub data_dir: PathBuf,
    /// Simulated latency for local store operations. Zero in tests.
    pub latency: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Normal,
            use_mock: false,
            dev_build: cfg!(debug_assertions),
            base_url: "http://localhost:3000/api".to_string(),
            data_dir: PathBuf::from(".daybook"),
            latency: Duration::from_millis(80),
        }
    }
}

impl StoreConfig {
    /// Build a configuration from the environment.
    ///
    /// Environment variables:
    ///   DAYBOOK_MODE        - "mock" to force the local store
    ///   DAYBOOK_USE_MOCK    - "true"/"1" to force the local store
    ///   DAYBOOK_API_URL     - base URL of the remote API
    ///   DAYBOOK_DATA_DIR    - local store directory
    ///   DAYBOOK_LATENCY_MS  - simulated local latency in milliseconds
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match std::env::var("DAYBOOK_MODE").as_deref() {
            Ok("mock") => ExecutionMode::Mock,
            _ => ExecutionMode::Normal,
        };
        let use_mock = std::env::var("DAYBOOK_USE_MOCK")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let base_url = std::env::var("DAYBOOK_API_URL").unwrap_or(defaults.base_url);
        let data_dir = std::env::var("DAYBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let latency = std::env::var("DAYBOOK_LATENCY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.latency);

        Self {
            mode,
            use_mock,
            dev_build: defaults.dev_build,
            base_url,
            data_dir,
            latency,
        }
    }

    /// The backend selection policy, evaluated once at façade
    /// construction. `force_local` is the user's persisted preference,
    /// read from the local store's state bucket.
    pub fn prefers_local(&self, force_local: bool) -> bool {
        if self.mode == ExecutionMode::Mock {
            return true;
        }
        if self.use_mock {
            return true;
        }
        if force_local {
            return true;
        }
        if self.dev_build {
            return true;
        }
        false
    }
}
