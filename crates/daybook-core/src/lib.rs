//! # daybook-core
//!
//! Core types, traits, and abstractions for the daybook diary store.
//!
//! This crate provides the shared data model, the error taxonomy, and the
//! retry/verification primitives that the client façade and the server-side
//! repositories both depend on.

pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use retry::{backoff_delay, verify_deletion, with_retry, DeletionCheck, RetryOptions};
pub use traits::*;
