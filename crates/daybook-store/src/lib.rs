//! # daybook-store
//!
//! Client-side store façade for daybook.
//!
//! [`DiaryStore`] is the single interface consumers call. It decides once,
//! at construction, whether the remote record store or the local fallback
//! store is authoritative, wraps remote writes in retry/verification, and
//! permanently falls back to the local store for the rest of the session
//! when the remote store becomes unreachable.

pub mod config;
pub mod facade;
pub mod local;
pub mod remote;

pub use config::{ExecutionMode, StoreConfig};
pub use facade::{Backend, DiaryStore};
pub use local::{LocalStore, LocalStoreOptions};
pub use remote::RemoteStore;
