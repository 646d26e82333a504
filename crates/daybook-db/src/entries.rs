//! Diary entry repository.
//!
//! Partial updates run a read-orchestrate-write-verify sequence so the
//! HTTP layer can tell three failures apart: the row never existed
//! (`NotFound`), the UPDATE touched zero rows (`UpdateConflict`), and the
//! read-back after a reported write found nothing (`PostWriteRead`).
//! Deletes are verified the same way and re-issued once before giving up.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};

use daybook_core::{
    parse_location, parse_string_list, sort_newest_first, verify_deletion, ContentType,
    DeletionCheck, DiaryStats, Entry, EntryDraft, EntryPatch, EntryStore, Error, ImportMode,
    Result, RetryOptions, UpdateOutcome, DEFAULT_MOOD, DEFAULT_WEATHER,
};

/// Parameter for a dynamically built entry query, in bind order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    /// Text column that may be set to NULL (location clears this way).
    NullableText(Option<String>),
    Bool(bool),
}

/// Build the SET fragments and bind params for a partial entry update.
///
/// Positions `$1` (updated_at) and `$2` (id) are reserved by the caller;
/// dynamic fields bind from `$3`. Pure function, exercised directly by
/// unit tests.
pub fn build_update_clause(patch: &EntryPatch) -> (Vec<String>, Vec<QueryParam>) {
    let mut updates: Vec<String> = vec!["updated_at = $1".to_string()];
    let mut params: Vec<QueryParam> = Vec::new();
    let mut idx = 3;

    if let Some(ref title) = patch.title {
        updates.push(format!("title = ${idx}"));
        params.push(QueryParam::Text(title.clone()));
        idx += 1;
    }
    if let Some(ref content) = patch.content {
        updates.push(format!("content = ${idx}"));
        params.push(QueryParam::Text(content.clone()));
        idx += 1;
    }
    if let Some(content_type) = patch.content_type {
        updates.push(format!("content_type = ${idx}"));
        params.push(QueryParam::Text(content_type.as_str().to_string()));
        idx += 1;
    }
    if let Some(ref mood) = patch.mood {
        updates.push(format!("mood = ${idx}"));
        params.push(QueryParam::Text(mood.clone()));
        idx += 1;
    }
    if let Some(ref weather) = patch.weather {
        updates.push(format!("weather = ${idx}"));
        params.push(QueryParam::Text(weather.clone()));
        idx += 1;
    }
    if let Some(ref images) = patch.images {
        updates.push(format!("images = ${idx}"));
        params.push(QueryParam::Text(encode_list(images)));
        idx += 1;
    }
    if let Some(ref location) = patch.location {
        // Outer Some means the field was supplied; inner None clears it.
        updates.push(format!("location = ${idx}"));
        params.push(QueryParam::NullableText(
            location.as_ref().map(encode_json),
        ));
        idx += 1;
    }
    if let Some(ref tags) = patch.tags {
        updates.push(format!("tags = ${idx}"));
        params.push(QueryParam::Text(encode_list(tags)));
        idx += 1;
    }
    if let Some(hidden) = patch.hidden {
        updates.push(format!("hidden = ${idx}"));
        params.push(QueryParam::Bool(hidden));
    }

    (updates, params)
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn encode_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Decode a stored row into an [`Entry`]. List and location columns hold
/// serialized JSON text; malformed values coerce to empty/none instead of
/// failing the read.
fn entry_from_row(row: &PgRow) -> Result<Entry> {
    Ok(Entry {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        content_type: ContentType::parse(&row.try_get::<String, _>("content_type")?),
        mood: row.try_get("mood")?,
        weather: row.try_get("weather")?,
        images: parse_string_list(row.try_get::<Option<String>, _>("images")?.as_deref()),
        location: parse_location(row.try_get::<Option<String>, _>("location")?.as_deref()),
        tags: parse_string_list(row.try_get::<Option<String>, _>("tags")?.as_deref()),
        hidden: row.try_get("hidden")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, title, content, content_type, mood, weather, images, \
                              location, tags, hidden, created_at, updated_at";

/// Field values for an INSERT after draft defaults are applied.
struct Materialized {
    title: String,
    content: String,
    content_type: String,
    mood: String,
    weather: String,
    images: String,
    location: Option<String>,
    tags: String,
    hidden: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Apply creation defaults: placeholder title, markdown content type,
/// neutral mood, unknown weather, empty lists, visible. Import drafts may
/// carry their own `created_at`; `updated_at` is always refreshed.
fn materialize(draft: &EntryDraft, now: DateTime<Utc>) -> Materialized {
    Materialized {
        title: draft.display_title(),
        content: draft.content.clone(),
        content_type: draft.content_type.unwrap_or_default().as_str().to_string(),
        mood: draft
            .mood
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MOOD.to_string()),
        weather: draft
            .weather
            .clone()
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| DEFAULT_WEATHER.to_string()),
        images: encode_list(draft.images.as_deref().unwrap_or(&[])),
        location: draft.location.as_ref().map(encode_json),
        tags: encode_list(draft.tags.as_deref().unwrap_or(&[])),
        hidden: draft.hidden.unwrap_or(false),
        created_at: draft.created_at.unwrap_or(now),
        updated_at: now,
    }
}

/// PostgreSQL-backed entry repository.
#[derive(Clone)]
pub struct PgEntryRepository {
    pool: PgPool,
}

impl PgEntryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_entry(&self, id: i64) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM diary_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Poll with backoff until a deleted row stops being readable.
    /// Probe errors count as inconclusive, never as confirmation.
    async fn verified_gone(&self, id: i64) -> Result<bool> {
        Ok(verify_deletion(
            || async {
                match self.fetch_entry(id).await {
                    Ok(None) => DeletionCheck::Deleted,
                    Ok(Some(_)) => DeletionCheck::Present,
                    Err(_) => DeletionCheck::Inconclusive,
                }
            },
            RetryOptions::for_deletion_check(),
        )
        .await)
    }

    async fn insert_materialized<'e, E>(executor: E, m: &Materialized) -> Result<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            "INSERT INTO diary_entries \
               (title, content, content_type, mood, weather, images, location, tags, hidden, \
                created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING id",
        )
        .bind(&m.title)
        .bind(&m.content)
        .bind(&m.content_type)
        .bind(&m.mood)
        .bind(&m.weather)
        .bind(&m.images)
        .bind(&m.location)
        .bind(&m.tags)
        .bind(m.hidden)
        .bind(m.created_at)
        .bind(m.updated_at)
        .fetch_one(executor)
        .await
        .map_err(Error::Database)?;

        row.try_get("id").map_err(Error::Database)
    }

    /// Aggregate writing statistics, hidden entries included.
    pub async fn stats(&self) -> Result<DiaryStats> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total_entries, \
                    COUNT(DISTINCT created_at::date) AS total_days, \
                    MIN(created_at) AS first_at, \
                    MAX(created_at) AS latest_at \
             FROM diary_entries",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let day_rows = sqlx::query(
            "SELECT DISTINCT created_at::date AS day FROM diary_entries ORDER BY day DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        let days: Vec<NaiveDate> = day_rows.iter().map(|row| row.get("day")).collect();
        let (consecutive_days, current_streak_start) =
            consecutive_day_streak(&days, Utc::now().date_naive());

        Ok(DiaryStats {
            consecutive_days,
            total_days_with_entries: totals.try_get("total_days")?,
            total_entries: totals.try_get("total_entries")?,
            latest_entry_date: totals.try_get("latest_at")?,
            first_entry_date: totals.try_get("first_at")?,
            current_streak_start,
        })
    }
}

/// Length and start of the writing streak ending today or yesterday.
///
/// `days` are the distinct days with entries, newest first. A latest day
/// older than yesterday means the streak has lapsed and counts as zero.
/// Pure function, exercised directly by unit tests.
pub fn consecutive_day_streak(days: &[NaiveDate], today: NaiveDate) -> (i64, Option<NaiveDate>) {
    let Some(&latest) = days.first() else {
        return (0, None);
    };
    if (today - latest).num_days() > 1 {
        return (0, None);
    }

    let mut streak = 1;
    let mut start = latest;
    for &day in &days[1..] {
        if (start - day).num_days() == 1 {
            streak += 1;
            start = day;
        } else {
            break;
        }
    }
    (streak, Some(start))
}

#[async_trait]
impl EntryStore for PgEntryRepository {
    async fn list(&self) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM diary_entries ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>>>()?;
        debug!(
            subsystem = "database",
            op = "list",
            result_count = entries.len(),
            "Listed diary entries"
        );
        Ok(entries)
    }

    async fn get(&self, id: i64) -> Result<Option<Entry>> {
        self.fetch_entry(id).await
    }

    async fn create(&self, draft: EntryDraft) -> Result<Entry> {
        let m = materialize(&draft, Utc::now());
        let id = Self::insert_materialized(&self.pool, &m).await?;

        info!(
            subsystem = "database",
            op = "create",
            entry_id = id,
            "Created diary entry"
        );

        self.fetch_entry(id)
            .await?
            .ok_or_else(|| Error::PostWriteRead(format!("entry {id} missing after insert")))
    }

    async fn update(&self, id: i64, patch: EntryPatch) -> Result<UpdateOutcome> {
        // Tier 1: the row must exist before anything is written.
        let current = self
            .fetch_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("entry {id} not found")))?;

        // An empty patch is a non-write.
        if patch.is_empty() {
            debug!(
                subsystem = "database",
                op = "update",
                entry_id = id,
                "Patch supplied no fields, returning existing row"
            );
            return Ok(UpdateOutcome::Unchanged(current));
        }

        let now = Utc::now();
        let (updates, params) = build_update_clause(&patch);
        let query = format!(
            "UPDATE diary_entries SET {} WHERE id = $2",
            updates.join(", ")
        );

        let mut q = sqlx::query(&query).bind(now).bind(id);
        for param in params {
            q = match param {
                QueryParam::Text(s) => q.bind(s),
                QueryParam::NullableText(s) => q.bind(s),
                QueryParam::Bool(b) => q.bind(b),
            };
        }

        // Tier 2: a write that touches zero rows means the row vanished
        // between the existence check and the UPDATE.
        let affected = q
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        if affected == 0 {
            return Err(Error::UpdateConflict(format!(
                "entry {id} was not updated (concurrent delete?)"
            )));
        }

        // Tier 3: the written row must read back.
        let updated = self.fetch_entry(id).await?.ok_or_else(|| {
            Error::PostWriteRead(format!("entry {id} unreadable after update"))
        })?;

        info!(
            subsystem = "database",
            op = "update",
            entry_id = id,
            "Updated diary entry"
        );
        Ok(UpdateOutcome::Updated(updated))
    }

    async fn toggle_hidden(&self, id: i64) -> Result<Entry> {
        if self.fetch_entry(id).await?.is_none() {
            return Err(Error::NotFound(format!("entry {id} not found")));
        }

        let affected =
            sqlx::query("UPDATE diary_entries SET hidden = NOT hidden, updated_at = $1 WHERE id = $2")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?
                .rows_affected();
        if affected == 0 {
            return Err(Error::UpdateConflict(format!(
                "entry {id} was not toggled (concurrent delete?)"
            )));
        }

        self.fetch_entry(id)
            .await?
            .ok_or_else(|| Error::PostWriteRead(format!("entry {id} unreadable after toggle")))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let affected = sqlx::query("DELETE FROM diary_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound(format!("entry {id} not found")));
        }

        // Confirm the row is observably gone before acknowledging. A
        // stale read triggers one re-issued DELETE, then one more
        // verification pass.
        let confirmed = self.verified_gone(id).await?;
        if !confirmed {
            warn!(
                subsystem = "database",
                op = "delete",
                entry_id = id,
                "Deleted row still visible, re-issuing delete"
            );
            sqlx::query("DELETE FROM diary_entries WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            if !self.verified_gone(id).await? {
                return Err(Error::ConsistencyTimeout(format!(
                    "entry {id} still visible after repeated delete"
                )));
            }
        }

        info!(
            subsystem = "database",
            op = "delete",
            entry_id = id,
            "Deleted diary entry"
        );
        Ok(())
    }

    async fn import(&self, entries: Vec<EntryDraft>, mode: ImportMode) -> Result<Vec<Entry>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        if mode == ImportMode::Overwrite {
            let wiped = sqlx::query("DELETE FROM diary_entries")
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected();
            warn!(
                subsystem = "database",
                op = "import",
                result_count = wiped,
                "Overwrite import wiped existing entries"
            );
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(entries.len());
        for draft in &entries {
            let m = materialize(draft, now);
            ids.push(Self::insert_materialized(&mut *tx, &m).await?);
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            op = "import",
            result_count = ids.len(),
            overwrite = (mode == ImportMode::Overwrite),
            "Imported diary entries"
        );

        let mut imported = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.fetch_entry(id).await? {
                imported.push(entry);
            }
        }
        // Drafts may carry arbitrary timestamps; return canonical order.
        sort_newest_first(&mut imported);
        Ok(imported)
    }

    async fn update_batch(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let mut touched = Vec::new();
        for entry in &entries {
            let affected = sqlx::query(
                "UPDATE diary_entries SET \
                   title = $1, content = $2, content_type = $3, mood = $4, weather = $5, \
                   images = $6, location = $7, tags = $8, hidden = $9, updated_at = $10 \
                 WHERE id = $11",
            )
            .bind(&entry.title)
            .bind(&entry.content)
            .bind(entry.content_type.as_str())
            .bind(&entry.mood)
            .bind(&entry.weather)
            .bind(encode_list(&entry.images))
            .bind(entry.location.as_ref().map(encode_json))
            .bind(encode_list(&entry.tags))
            .bind(entry.hidden)
            .bind(now)
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

            // Unknown ids are skipped, not errors; a bulk visibility pass
            // should not fail because one entry was deleted meanwhile.
            if affected == 1 {
                touched.push(entry.id);
            } else {
                debug!(
                    subsystem = "database",
                    op = "update_batch",
                    entry_id = entry.id,
                    "Skipped unknown entry id in batch update"
                );
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            op = "update_batch",
            result_count = touched.len(),
            "Batch-updated diary entries"
        );

        let mut updated = Vec::with_capacity(touched.len());
        for id in touched {
            if let Some(entry) = self.fetch_entry(id).await? {
                updated.push(entry);
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::Location;

    fn loc() -> Location {
        Location {
            name: "Cafe".into(),
            address: None,
            latitude: 1.5,
            longitude: 2.5,
            details: None,
        }
    }

    #[test]
    fn test_empty_patch_builds_timestamp_only() {
        let (updates, params) = build_update_clause(&EntryPatch::default());
        assert_eq!(updates, vec!["updated_at = $1".to_string()]);
        assert!(params.is_empty());
    }

    #[test]
    fn test_hidden_only_patch() {
        let (updates, params) = build_update_clause(&EntryPatch::hidden(true));
        assert_eq!(updates, vec!["updated_at = $1", "hidden = $3"]);
        assert_eq!(params, vec![QueryParam::Bool(true)]);
    }

    #[test]
    fn test_param_indexes_are_sequential() {
        let patch = EntryPatch {
            title: Some("T".into()),
            content: Some("C".into()),
            tags: Some(vec!["a".into()]),
            ..Default::default()
        };
        let (updates, params) = build_update_clause(&patch);
        assert_eq!(
            updates,
            vec!["updated_at = $1", "title = $3", "content = $4", "tags = $5"]
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], QueryParam::Text("[\"a\"]".into()));
    }

    #[test]
    fn test_location_set_binds_serialized_json() {
        let patch = EntryPatch {
            location: Some(Some(loc())),
            ..Default::default()
        };
        let (updates, params) = build_update_clause(&patch);
        assert_eq!(updates, vec!["updated_at = $1", "location = $3"]);
        match &params[0] {
            QueryParam::NullableText(Some(json)) => {
                assert!(json.contains("\"name\":\"Cafe\""));
            }
            other => panic!("unexpected param {other:?}"),
        }
    }

    #[test]
    fn test_location_clear_binds_null() {
        let patch = EntryPatch {
            location: Some(None),
            ..Default::default()
        };
        let (_, params) = build_update_clause(&patch);
        assert_eq!(params, vec![QueryParam::NullableText(None)]);
    }

    #[test]
    fn test_materialize_applies_defaults() {
        let draft = EntryDraft {
            content: "hello".into(),
            ..Default::default()
        };
        let now = Utc::now();
        let m = materialize(&draft, now);
        assert_eq!(m.title, "Untitled");
        assert_eq!(m.content_type, "markdown");
        assert_eq!(m.mood, DEFAULT_MOOD);
        assert_eq!(m.weather, DEFAULT_WEATHER);
        assert_eq!(m.images, "[]");
        assert_eq!(m.tags, "[]");
        assert!(m.location.is_none());
        assert!(!m.hidden);
        assert_eq!(m.created_at, now);
    }

    #[test]
    fn test_materialize_preserves_import_created_at() {
        let stamp = "2024-03-01T10:00:00Z".parse().unwrap();
        let draft = EntryDraft {
            content: "old".into(),
            created_at: Some(stamp),
            updated_at: Some(stamp),
            ..Default::default()
        };
        let now = Utc::now();
        let m = materialize(&draft, now);
        assert_eq!(m.created_at, stamp);
        // updated_at always reflects the import time, not the payload.
        assert_eq!(m.updated_at, now);
    }

    #[test]
    fn test_materialize_blank_mood_falls_back() {
        let draft = EntryDraft {
            content: "x".into(),
            mood: Some(String::new()),
            ..Default::default()
        };
        let m = materialize(&draft, Utc::now());
        assert_eq!(m.mood, DEFAULT_MOOD);
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let days = [day("2026-08-30"), day("2026-08-29"), day("2026-08-28")];
        let (streak, start) = consecutive_day_streak(&days, day("2026-08-30"));
        assert_eq!(streak, 3);
        assert_eq!(start, Some(day("2026-08-28")));
    }

    #[test]
    fn test_streak_may_anchor_on_yesterday() {
        // No entry yet today; yesterday's streak still counts.
        let days = [day("2026-08-29"), day("2026-08-28")];
        let (streak, start) = consecutive_day_streak(&days, day("2026-08-30"));
        assert_eq!(streak, 2);
        assert_eq!(start, Some(day("2026-08-28")));
    }

    #[test]
    fn test_streak_stops_at_first_gap() {
        let days = [day("2026-08-30"), day("2026-08-29"), day("2026-08-26")];
        let (streak, start) = consecutive_day_streak(&days, day("2026-08-30"));
        assert_eq!(streak, 2);
        assert_eq!(start, Some(day("2026-08-29")));
    }

    #[test]
    fn test_lapsed_streak_is_zero() {
        let days = [day("2026-08-27"), day("2026-08-26")];
        let (streak, start) = consecutive_day_streak(&days, day("2026-08-30"));
        assert_eq!(streak, 0);
        assert_eq!(start, None);
    }

    #[test]
    fn test_streak_with_no_entries_is_zero() {
        assert_eq!(consecutive_day_streak(&[], day("2026-08-30")), (0, None));
    }
}
