//! Local fallback store.
//!
//! A durable, in-process substitute for the remote record store with the
//! identical operation contract. State lives in two JSON buckets under a
//! data directory (entries and settings) plus a small state file that
//! remembers whether sample seeding has been disabled, so data wiped by an
//! overwrite-import or an explicit clear never silently reappears.
//!
//! Every operation pauses for a configurable simulated latency to keep
//! interface parity with the remote store; tests set it to zero.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use daybook_core::{
    sort_newest_first, Entry, EntryDraft, EntryPatch, EntryStore, Error, ImportMode, Result,
    SettingStore, UpdateOutcome,
};

const ENTRIES_BUCKET: &str = "entries.json";
const SETTINGS_BUCKET: &str = "settings.json";
const STATE_BUCKET: &str = "state.json";

/// Persisted store state, separate from the data buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    /// Set after an overwrite-import or an explicit clear; suppresses
    /// sample seeding for all future sessions against this data dir.
    #[serde(default)]
    pub defaults_disabled: bool,
    /// The user's persisted "force local mode" preference.
    #[serde(default)]
    pub force_local: bool,
}

/// Options for constructing a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct LocalStoreOptions {
    pub data_dir: PathBuf,
    /// Simulated per-operation latency. Zero disables the pause.
    pub latency: Duration,
}

/// Durable local substitute for the remote record store.
pub struct LocalStore {
    data_dir: PathBuf,
    latency: Duration,
    /// Serializes read-modify-write cycles on the buckets.
    io_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(options: LocalStoreOptions) -> Self {
        Self {
            data_dir: options.data_dir,
            latency: options.latency,
            io_lock: Mutex::new(()),
        }
    }

    /// Construction-time probe for the persisted force-local preference.
    /// Synchronous: runs before the runtime-facing API is in play.
    pub fn read_force_local(data_dir: &Path) -> bool {
        read_state_sync(data_dir).force_local
    }

    /// Persist or clear the force-local preference.
    pub async fn set_force_local(&self, force_local: bool) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut state = self.load_state().await;
        state.force_local = force_local;
        self.save_state(&state).await
    }

    /// Wipe both buckets and disable sample seeding.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        for bucket in [ENTRIES_BUCKET, SETTINGS_BUCKET] {
            let path = self.data_dir.join(bucket);
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
            }
        }
        let mut state = self.load_state().await;
        state.defaults_disabled = true;
        self.save_state(&state).await?;
        debug!(subsystem = "store", backend = "local", "local data cleared");
        Ok(())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn load_state(&self) -> StoreState {
        match tokio::fs::read(self.data_dir.join(STATE_BUCKET)).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
            Err(_) => StoreState::default(),
        }
    }

    async fn save_state(&self, state: &StoreState) -> Result<()> {
        self.write_bucket(STATE_BUCKET, &serde_json::to_vec_pretty(state)?)
            .await
    }

    async fn write_bucket(&self, bucket: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::write(self.data_dir.join(bucket), bytes).await?;
        Ok(())
    }

    /// Load the entry bucket, seeding sample entries on first use unless
    /// seeding has been disabled.
    async fn load_entries(&self) -> Result<Vec<Entry>> {
        match tokio::fs::read(self.data_dir.join(ENTRIES_BUCKET)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw).unwrap_or_default()),
            Err(_) => {
                let state = self.load_state().await;
                if state.defaults_disabled {
                    return Ok(Vec::new());
                }
                let seeded = sample_entries();
                self.save_entries(&seeded).await?;
                debug!(
                    subsystem = "store",
                    backend = "local",
                    result_count = seeded.len(),
                    "seeded sample entries"
                );
                Ok(seeded)
            }
        }
    }

    async fn save_entries(&self, entries: &[Entry]) -> Result<()> {
        self.write_bucket(ENTRIES_BUCKET, &serde_json::to_vec_pretty(entries)?)
            .await
    }

    async fn load_settings(&self) -> Result<HashMap<String, String>> {
        match tokio::fs::read(self.data_dir.join(SETTINGS_BUCKET)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw).unwrap_or_default()),
            Err(_) => Ok(HashMap::new()),
        }
    }

    async fn save_settings(&self, settings: &HashMap<String, String>) -> Result<()> {
        self.write_bucket(SETTINGS_BUCKET, &serde_json::to_vec_pretty(settings)?)
            .await
    }
}

fn read_state_sync(data_dir: &Path) -> StoreState {
    std::fs::read(data_dir.join(STATE_BUCKET))
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .unwrap_or_default()
}

fn next_id(entries: &[Entry]) -> i64 {
    entries.iter().map(|e| e.id).max().unwrap_or(0) + 1
}

fn materialize(draft: EntryDraft, id: i64) -> Entry {
    let now = Utc::now();
    let title = draft.display_title();
    Entry {
        id,
        title,
        content: draft.content,
        content_type: draft.content_type.unwrap_or_default(),
        mood: draft.mood.unwrap_or_else(|| daybook_core::DEFAULT_MOOD.to_string()),
        weather: draft
            .weather
            .unwrap_or_else(|| daybook_core::DEFAULT_WEATHER.to_string()),
        images: draft.images.unwrap_or_default(),
        location: draft.location,
        tags: draft.tags.unwrap_or_default(),
        hidden: draft.hidden.unwrap_or(false),
        created_at: draft.created_at.unwrap_or(now),
        updated_at: now,
    }
}

/// Sample entries seeded on first use of an empty local store.
fn sample_entries() -> Vec<Entry> {
    let now = Utc::now();
    let seeds = [
        (
            1,
            "A walk in the park",
            "Clear skies today. Went for a long **walk in the park** with a friend \
             and came back lighter than I left.\n\n> The small things carry the day.",
            "happy",
            "sunny",
            vec!["walk", "friends", "park"],
        ),
        (
            2,
            "Small wins at work",
            "Hit a wall mid-morning, but the team pulled it apart together.\n\n\
             Things I picked up:\n- a cleaner way to structure the review\n- when to \
             stop polishing and ship",
            "neutral",
            "cloudy",
            vec!["work", "learning"],
        ),
        (
            3,
            "Rainy evening, quiet thoughts",
            "Rain all evening. Sat by the window with a book and let the day wind \
             down on its own.\n\n*Sometimes slowing down is the whole point.*",
            "peaceful",
            "rainy",
            vec!["reading", "rain"],
        ),
    ];

    seeds
        .into_iter()
        .map(|(id, title, content, mood, weather, tags)| {
            let stamp = now - ChronoDuration::days(id);
            Entry {
                id,
                title: title.to_string(),
                content: content.to_string(),
                content_type: Default::default(),
                mood: mood.to_string(),
                weather: weather.to_string(),
                images: vec![],
                location: None,
                tags: tags.into_iter().map(str::to_string).collect(),
                hidden: false,
                created_at: stamp,
                updated_at: stamp,
            }
        })
        .collect()
}

#[async_trait]
impl EntryStore for LocalStore {
    async fn list(&self) -> Result<Vec<Entry>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, id: i64) -> Result<Option<Entry>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let entries = self.load_entries().await?;
        Ok(entries.into_iter().find(|e| e.id == id))
    }

    async fn create(&self, draft: EntryDraft) -> Result<Entry> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let entry = materialize(draft, next_id(&entries));
        entries.insert(0, entry.clone());
        self.save_entries(&entries).await?;
        Ok(entry)
    }

    async fn update(&self, id: i64, patch: EntryPatch) -> Result<UpdateOutcome> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;

        if patch.is_empty() {
            return Ok(UpdateOutcome::Unchanged(entry.clone()));
        }

        patch.apply_to(entry);
        entry.updated_at = Utc::now();
        let updated = entry.clone();
        self.save_entries(&entries).await?;
        Ok(UpdateOutcome::Updated(updated))
    }

    async fn toggle_hidden(&self, id: i64) -> Result<Entry> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
        entry.hidden = !entry.hidden;
        entry.updated_at = Utc::now();
        let updated = entry.clone();
        self.save_entries(&entries).await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(Error::NotFound(format!("entry {id}")));
        }
        self.save_entries(&entries).await
    }

    async fn import(&self, drafts: Vec<EntryDraft>, mode: ImportMode) -> Result<Vec<Entry>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;

        let mut entries = match mode {
            ImportMode::Overwrite => {
                // The wipe must outlive this session: disable seeding so
                // fresh sessions don't reintroduce sample data.
                let mut state = self.load_state().await;
                state.defaults_disabled = true;
                self.save_state(&state).await?;
                Vec::new()
            }
            ImportMode::Merge => self.load_entries().await?,
        };

        let mut imported = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let entry = materialize(draft, next_id(&entries));
            entries.push(entry.clone());
            imported.push(entry);
        }

        sort_newest_first(&mut entries);
        self.save_entries(&entries).await?;
        sort_newest_first(&mut imported);
        debug!(
            subsystem = "store",
            backend = "local",
            result_count = imported.len(),
            ?mode,
            "imported entries"
        );
        Ok(imported)
    }

    async fn update_batch(&self, updates: Vec<Entry>) -> Result<Vec<Entry>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut entries = self.load_entries().await?;
        let mut updated = Vec::new();
        for mut incoming in updates {
            if let Some(existing) = entries.iter_mut().find(|e| e.id == incoming.id) {
                incoming.updated_at = Utc::now();
                *existing = incoming.clone();
                updated.push(incoming);
            }
        }
        self.save_entries(&entries).await?;
        Ok(updated)
    }
}

#[async_trait]
impl SettingStore for LocalStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let settings = self.load_settings().await?;
        Ok(settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut settings = self.load_settings().await?;
        settings.insert(key.to_string(), value.to_string());
        self.save_settings(&settings).await
    }

    async fn all_settings(&self) -> Result<HashMap<String, String>> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        self.load_settings().await
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.simulate_latency().await;
        let _guard = self.io_lock.lock().await;
        let mut settings = self.load_settings().await?;
        settings.remove(key);
        self.save_settings(&settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> LocalStore {
        LocalStore::new(LocalStoreOptions {
            data_dir: dir.to_path_buf(),
            latency: Duration::ZERO,
        })
    }

    fn draft(title: &str, content: &str) -> EntryDraft {
        EntryDraft {
            title: title.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_seeds_samples_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 3);
        // newest-first
        assert!(entries[0].created_at >= entries[1].created_at);
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("T", "hello")).await.unwrap();
        assert_eq!(entry.mood, "neutral");
        assert_eq!(entry.weather, "unknown");
        assert!(entry.tags.is_empty());
        assert!(entry.images.is_empty());
        assert!(!entry.hidden);
        assert!(entry.id > 0);
    }

    #[tokio::test]
    async fn test_create_substitutes_placeholder_title() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("", "hello")).await.unwrap();
        assert_eq!(entry.title, daybook_core::UNTITLED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_empty_patch_is_a_non_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("T", "hello")).await.unwrap();
        let outcome = store.update(entry.id, EntryPatch::default()).await.unwrap();
        assert!(outcome.is_unchanged());
        assert_eq!(outcome.into_entry().updated_at, entry.updated_at);
    }

    #[tokio::test]
    async fn test_update_merges_never_clobbers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store
            .create(EntryDraft {
                mood: Some("happy".into()),
                tags: Some(vec!["a".into()]),
                ..draft("T", "hello")
            })
            .await
            .unwrap();
        let patch = EntryPatch {
            title: Some("X".into()),
            ..Default::default()
        };
        let updated = store.update(entry.id, patch).await.unwrap().into_entry();
        assert_eq!(updated.title, "X");
        assert_eq!(updated.content, entry.content);
        assert_eq!(updated.mood, "happy");
        assert_eq!(updated.tags, entry.tags);
        assert!(updated.updated_at > entry.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_entry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let err = store
            .update(9999, EntryPatch::hidden(true))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_toggle_flips_and_read_back_reflects_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("T", "hello")).await.unwrap();
        let toggled = store.toggle_hidden(entry.id).await.unwrap();
        assert!(toggled.hidden);
        let read = store.get(entry.id).await.unwrap().unwrap();
        assert!(read.hidden);
        let toggled_again = store.toggle_hidden(entry.id).await.unwrap();
        assert!(!toggled_again.hidden);
    }

    #[tokio::test]
    async fn test_delete_then_get_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("T", "hello")).await.unwrap();
        store.delete(entry.id).await.unwrap();
        assert!(store.get(entry.id).await.unwrap().is_none());
        assert!(store.delete(entry.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite_import_is_destructive_and_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        // seed + one of our own
        store.create(draft("mine", "body")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 4);

        let imported = store
            .import(
                vec![draft("D", "d body"), draft("E", "e body")],
                ImportMode::Overwrite,
            )
            .await
            .unwrap();
        assert_eq!(imported.len(), 2);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        let titles: Vec<_> = listed.iter().map(|e| e.title.as_str()).collect();
        assert!(titles.contains(&"D") && titles.contains(&"E"));

        // Fresh session against the same data dir: no sample resurrection.
        drop(store);
        let fresh = store_in(dir.path());
        assert_eq!(fresh.list().await.unwrap().len(), 2);

        // Even after a wipe of the bucket itself, seeding stays disabled.
        std::fs::remove_file(dir.path().join(ENTRIES_BUCKET)).unwrap();
        let wiped = store_in(dir.path());
        assert!(wiped.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_import_is_additive_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .import(vec![draft("A", "a")], ImportMode::Overwrite)
            .await
            .unwrap();
        store
            .import(vec![draft("B", "b")], ImportMode::Merge)
            .await
            .unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[tokio::test]
    async fn test_import_preserves_payload_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let old = Utc::now() - ChronoDuration::days(30);
        let imported = store
            .import(
                vec![EntryDraft {
                    created_at: Some(old),
                    ..draft("old", "body")
                }],
                ImportMode::Overwrite,
            )
            .await
            .unwrap();
        assert_eq!(imported[0].created_at, old);
        assert!(imported[0].updated_at > old);
    }

    #[tokio::test]
    async fn test_import_assigns_fresh_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let imported = store
            .import(
                vec![draft("x", "1"), draft("y", "2")],
                ImportMode::Overwrite,
            )
            .await
            .unwrap();
        let mut ids: Vec<_> = imported.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_settings_upsert_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.get_setting("theme").await.unwrap().is_none());
        store.set_setting("theme", "dark").await.unwrap();
        assert_eq!(
            store.get_setting("theme").await.unwrap().as_deref(),
            Some("dark")
        );
        store.set_setting("theme", "light").await.unwrap();
        assert_eq!(
            store.get_setting("theme").await.unwrap().as_deref(),
            Some("light")
        );
        store.delete_setting("theme").await.unwrap();
        assert!(store.get_setting("theme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_disables_seeding() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.list().await.unwrap().len(), 3);
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_force_local_preference_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!LocalStore::read_force_local(dir.path()));
        store.set_force_local(true).await.unwrap();
        assert!(LocalStore::read_force_local(dir.path()));
        store.set_force_local(false).await.unwrap();
        assert!(!LocalStore::read_force_local(dir.path()));
    }

    #[tokio::test]
    async fn test_update_batch_skips_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let entry = store.create(draft("T", "body")).await.unwrap();
        let mut revised = entry.clone();
        revised.title = "revised".into();
        let mut phantom = entry.clone();
        phantom.id = 9999;
        let updated = store.update_batch(vec![revised, phantom]).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].title, "revised");
    }
}
