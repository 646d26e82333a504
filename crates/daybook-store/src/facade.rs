//! The store façade.
//!
//! [`DiaryStore`] hides backend selection and retry mechanics behind one
//! stable interface. The authoritative backend is decided once at
//! construction; a transport failure against the remote store flips the
//! façade to the local fallback for the remainder of the session (one-way;
//! reversed only by an explicit [`DiaryStore::enable_remote_mode`]), and
//! the failed operation is retried once against the fallback before any
//! error reaches the caller.
//!
//! Mutations on a given entry id serialize through a per-id lock table, so
//! concurrent `update`/`toggle`/`delete` calls on the same id cannot race
//! each other within this process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use daybook_core::{
    verify_deletion, with_retry, DeletionCheck, DiaryBackend, Entry, EntryDraft, EntryPatch,
    EntryStore, Error, ImportMode, Result, RetryOptions, SettingStore, UpdateOutcome,
};

use crate::config::StoreConfig;
use crate::local::{LocalStore, LocalStoreOptions};
use crate::remote::RemoteStore;

/// Which backend is currently authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

/// The single stable interface consumers call.
pub struct DiaryStore {
    remote: Arc<dyn DiaryBackend>,
    local: Arc<LocalStore>,
    /// Sticky fallback flag: set on transport failure, cleared only by
    /// `enable_remote_mode`.
    use_local: AtomicBool,
    /// Per-id mutexes serializing mutations on the same entry.
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl DiaryStore {
    /// Build a façade from configuration, probing the persisted
    /// force-local preference as the selection policy requires.
    pub fn new(config: &StoreConfig) -> Self {
        let force_local = LocalStore::read_force_local(&config.data_dir);
        let start_local = config.prefers_local(force_local);
        let remote: Arc<dyn DiaryBackend> = Arc::new(RemoteStore::new(config.base_url.clone()));
        let local = Arc::new(LocalStore::new(LocalStoreOptions {
            data_dir: config.data_dir.clone(),
            latency: config.latency,
        }));
        info!(
            subsystem = "store",
            backend = if start_local { "local" } else { "remote" },
            "store façade initialized"
        );
        Self::assemble(remote, local, start_local)
    }

    /// Build a façade over explicit backends. Lets tests construct two
    /// façades with different states in the same process.
    pub fn with_backends(
        remote: Arc<dyn DiaryBackend>,
        local: Arc<LocalStore>,
        start_local: bool,
    ) -> Self {
        Self::assemble(remote, local, start_local)
    }

    fn assemble(remote: Arc<dyn DiaryBackend>, local: Arc<LocalStore>, start_local: bool) -> Self {
        Self {
            remote,
            local,
            use_local: AtomicBool::new(start_local),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The backend currently answering calls.
    pub fn current_backend(&self) -> Backend {
        if self.use_local.load(Ordering::Acquire) {
            Backend::Local
        } else {
            Backend::Remote
        }
    }

    /// Switch to the local store and persist the preference.
    pub async fn enable_local_mode(&self) -> Result<()> {
        self.use_local.store(true, Ordering::Release);
        self.local.set_force_local(true).await?;
        info!(subsystem = "store", backend = "local", "local mode enabled");
        Ok(())
    }

    /// Switch back to the remote store and clear the persisted preference.
    /// The only way a fallback flip is undone within a session.
    pub async fn enable_remote_mode(&self) -> Result<()> {
        self.use_local.store(false, Ordering::Release);
        self.local.set_force_local(false).await?;
        info!(subsystem = "store", backend = "remote", "remote mode enabled");
        Ok(())
    }

    /// Wipe the local fallback store's data and suppress re-seeding.
    pub async fn clear_local_data(&self) -> Result<()> {
        self.local.clear().await
    }

    fn on_local(&self) -> bool {
        self.use_local.load(Ordering::Acquire)
    }

    /// Record a transport failure: the remote store is unreachable, so the
    /// local store is authoritative for the rest of the session.
    fn fall_back(&self, op: &str, err: &Error) {
        warn!(
            subsystem = "store",
            op,
            error = %err,
            "remote store unreachable, falling back to local store for this session"
        );
        self.use_local.store(true, Ordering::Release);
    }

    async fn lock_for(&self, id: i64) -> OwnedMutexGuard<()> {
        let entry_lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry_lock.lock_owned().await
    }

    // ─── Entry operations ──────────────────────────────────────────────

    /// All entries, newest-first. Never fails for an empty store.
    pub async fn list(&self) -> Result<Vec<Entry>> {
        if self.on_local() {
            return self.local.list().await;
        }
        match self.remote.list().await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_transport() => {
                self.fall_back("list", &e);
                self.local.list().await
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one entry; `None` signals "not found".
    ///
    /// Unlike the other operations, a transport failure here retries
    /// against the local store without recording a permanent flip: a
    /// single failed point read is best-effort, not proof the session is
    /// offline.
    pub async fn get(&self, id: i64) -> Result<Option<Entry>> {
        if self.on_local() {
            return self.local.get(id).await;
        }
        match self.remote.get(id).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_transport() => {
                debug!(
                    subsystem = "store",
                    op = "get",
                    entry_id = id,
                    error = %e,
                    "remote read failed, answering from local store"
                );
                self.local.get(id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Create an entry with draft defaults applied.
    pub async fn create(&self, draft: EntryDraft) -> Result<Entry> {
        if self.on_local() {
            return self.local.create(draft).await;
        }
        match self.remote.create(draft.clone()).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_transport() => {
                self.fall_back("create", &e);
                self.local.create(draft).await
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a partial update.
    ///
    /// A patch touching exactly the `hidden` flag routes through the
    /// dedicated toggle path instead of the general edit path; an empty
    /// patch short-circuits inside the store as an `Unchanged` outcome.
    pub async fn update(&self, id: i64, patch: EntryPatch) -> Result<UpdateOutcome> {
        let _guard = self.lock_for(id).await;
        if patch.is_hidden_only() {
            // The toggle endpoint flips unconditionally; only call it when
            // the requested value differs from the current one. The read
            // and the flip share the per-id lock so no other mutation can
            // land between them.
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
            let wanted = patch.hidden.unwrap_or(current.hidden);
            if current.hidden == wanted {
                return Ok(UpdateOutcome::Unchanged(current));
            }
            return Ok(UpdateOutcome::Updated(self.toggle_locked(id).await?));
        }

        if self.on_local() {
            return self.local.update(id, patch).await;
        }
        match self.remote.update(id, patch.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_transport() => {
                self.fall_back("update", &e);
                self.local.update(id, patch).await
            }
            Err(e) => Err(e),
        }
    }

    /// Flip an entry's soft-visibility flag.
    pub async fn toggle(&self, id: i64) -> Result<Entry> {
        let _guard = self.lock_for(id).await;
        self.toggle_locked(id).await
    }

    /// Toggle body shared with the hidden-only update path. The caller
    /// must already hold the per-id lock.
    async fn toggle_locked(&self, id: i64) -> Result<Entry> {
        if self.on_local() {
            return self.local.toggle_hidden(id).await;
        }
        match self.remote.toggle_hidden(id).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_transport() => {
                self.fall_back("toggle", &e);
                self.local.toggle_hidden(id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an entry.
    ///
    /// The remote delete runs under retry, then a verification loop polls
    /// until the row is observably gone. An exhausted verification budget
    /// is soft: the delete itself succeeded, so this logs a warning and
    /// still returns Ok — but an immediately-subsequent read of the same
    /// id may be stale.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let _guard = self.lock_for(id).await;
        if self.on_local() {
            return self.local.delete(id).await;
        }

        let deleted = with_retry(|| self.remote.delete(id), RetryOptions::for_delete()).await;
        match deleted {
            Ok(()) => {
                let confirmed = verify_deletion(
                    || async {
                        match self.remote.get(id).await {
                            Ok(None) => DeletionCheck::Deleted,
                            Ok(Some(_)) => DeletionCheck::Present,
                            Err(e) if e.is_not_found() => DeletionCheck::Deleted,
                            Err(_) => DeletionCheck::Inconclusive,
                        }
                    },
                    RetryOptions::for_deletion_check(),
                )
                .await;
                if !confirmed {
                    warn!(
                        subsystem = "store",
                        op = "delete",
                        entry_id = id,
                        "delete succeeded but confirmation timed out; reads may briefly see the old row"
                    );
                }
                Ok(())
            }
            Err(e) if e.is_transport() => {
                self.fall_back("delete", &e);
                self.local.delete(id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Import a batch of entries (merge or overwrite).
    pub async fn import(&self, entries: Vec<EntryDraft>, mode: ImportMode) -> Result<Vec<Entry>> {
        if self.on_local() {
            return self.local.import(entries, mode).await;
        }
        match self.remote.import(entries.clone(), mode).await {
            Ok(imported) => Ok(imported),
            Err(e) if e.is_transport() => {
                self.fall_back("import", &e);
                self.local.import(entries, mode).await
            }
            Err(e) => Err(e),
        }
    }

    /// Replace whole rows by id.
    pub async fn update_batch(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        if self.on_local() {
            return self.local.update_batch(entries).await;
        }
        match self.remote.update_batch(entries.clone()).await {
            Ok(updated) => Ok(updated),
            Err(e) if e.is_transport() => {
                self.fall_back("update_batch", &e);
                self.local.update_batch(entries).await
            }
            Err(e) => Err(e),
        }
    }

    // ─── Settings ──────────────────────────────────────────────────────

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        if self.on_local() {
            return self.local.get_setting(key).await;
        }
        match self.remote.get_setting(key).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transport() => {
                self.fall_back("get_setting", &e);
                self.local.get_setting(key).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        if self.on_local() {
            return self.local.set_setting(key, value).await;
        }
        match self.remote.set_setting(key, value).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport() => {
                self.fall_back("set_setting", &e);
                self.local.set_setting(key, value).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn all_settings(&self) -> Result<HashMap<String, String>> {
        if self.on_local() {
            return self.local.all_settings().await;
        }
        match self.remote.all_settings().await {
            Ok(settings) => Ok(settings),
            Err(e) if e.is_transport() => {
                self.fall_back("all_settings", &e);
                self.local.all_settings().await
            }
            Err(e) => Err(e),
        }
    }
}
