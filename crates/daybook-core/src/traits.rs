//! Store traits for daybook backends.
//!
//! Both the remote record store client and the local fallback store
//! implement the same contracts, which is what lets the façade swap one
//! for the other mid-session without callers noticing.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{Entry, EntryDraft, EntryPatch, ImportMode};

/// Result of a partial update.
///
/// "No changes" is a first-class outcome, not an error: a patch that
/// supplies no fields returns the existing row without issuing a write,
/// and the HTTP layer messages it differently from a successful write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The write was applied; holds the freshly re-read row.
    Updated(Entry),
    /// The patch supplied no fields; holds the untouched existing row.
    Unchanged(Entry),
}

impl UpdateOutcome {
    /// The entry regardless of whether a write happened.
    pub fn into_entry(self) -> Entry {
        match self {
            UpdateOutcome::Updated(e) | UpdateOutcome::Unchanged(e) => e,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, UpdateOutcome::Unchanged(_))
    }
}

/// CRUD contract over diary entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// All entries, newest-first by `created_at`. Empty store yields an
    /// empty vec, never an error.
    async fn list(&self) -> Result<Vec<Entry>>;

    /// Fetch one entry. `None` signals "not found".
    async fn get(&self, id: i64) -> Result<Option<Entry>>;

    /// Insert a new entry, applying draft defaults. Returns the created
    /// row including the store-assigned id and timestamps.
    async fn create(&self, draft: EntryDraft) -> Result<Entry>;

    /// Apply a partial update. Only fields present in the patch are
    /// touched; `updated_at` is refreshed on any actual write.
    async fn update(&self, id: i64, patch: EntryPatch) -> Result<UpdateOutcome>;

    /// Flip the soft-visibility flag and return the updated row.
    async fn toggle_hidden(&self, id: i64) -> Result<Entry>;

    /// Delete an entry.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Import a batch of entries. Overwrite mode replaces the full set;
    /// merge mode appends. Fresh ids are assigned either way, `created_at`
    /// is preserved from the payload when present, and the resulting set
    /// is persisted newest-first.
    async fn import(&self, entries: Vec<EntryDraft>, mode: ImportMode) -> Result<Vec<Entry>>;

    /// Replace whole rows by id, refreshing `updated_at`. Unknown ids are
    /// skipped; returns the rows actually updated.
    async fn update_batch(&self, entries: Vec<Entry>) -> Result<Vec<Entry>>;
}

/// Key/value application settings with upsert semantics.
#[async_trait]
pub trait SettingStore: Send + Sync {
    /// Fetch a setting value. `None` signals "not found".
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a setting (last-writer-wins per key).
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// All settings as a map.
    async fn all_settings(&self) -> Result<HashMap<String, String>>;

    /// Remove a setting. Removing an absent key is not an error.
    async fn delete_setting(&self, key: &str) -> Result<()>;
}

/// A backend the façade can route to: entries plus settings.
pub trait DiaryBackend: EntryStore + SettingStore {}

impl<T: EntryStore + SettingStore> DiaryBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_entry() -> Entry {
        Entry {
            id: 1,
            title: "t".into(),
            content: "c".into(),
            content_type: Default::default(),
            mood: "neutral".into(),
            weather: "unknown".into(),
            images: vec![],
            location: None,
            tags: vec![],
            hidden: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_update_outcome_into_entry() {
        let entry = sample_entry();
        assert_eq!(UpdateOutcome::Updated(entry.clone()).into_entry().id, 1);
        assert!(UpdateOutcome::Unchanged(entry).is_unchanged());
    }
}
