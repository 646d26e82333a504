//! Core data models for daybook.
//!
//! These types are shared across all daybook crates and represent the
//! diary domain entities plus the wire envelope the HTTP layer speaks.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Mood assigned when a draft does not specify one.
pub const DEFAULT_MOOD: &str = "neutral";

/// Weather assigned when a draft does not specify one.
pub const DEFAULT_WEATHER: &str = "unknown";

/// Title substituted when a caller submits an empty title.
pub const UNTITLED_PLACEHOLDER: &str = "Untitled";

/// Canonical mood values. Anything else is accepted and treated as custom.
pub static CANONICAL_MOODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "happy", "sad", "neutral", "excited", "anxious", "peaceful", "calm", "angry", "grateful",
        "loved",
    ]
    .into_iter()
    .collect()
});

/// Canonical weather values. Anything else is accepted and treated as custom.
pub static CANONICAL_WEATHER: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["sunny", "cloudy", "rainy", "snowy", "unknown"].into_iter().collect());

/// Whether a mood value is one of the canonical set.
pub fn is_canonical_mood(mood: &str) -> bool {
    CANONICAL_MOODS.contains(mood)
}

/// Whether a weather value is one of the canonical set.
pub fn is_canonical_weather(weather: &str) -> bool {
    CANONICAL_WEATHER.contains(weather)
}

// =============================================================================
// ENTRY TYPES
// =============================================================================

/// How entry content should be rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Markdown,
    Plain,
}

impl ContentType {
    /// Stored text form, matching the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Markdown => "markdown",
            ContentType::Plain => "plain",
        }
    }

    /// Parse a stored value. Unknown values fall back to markdown, the
    /// same coercion reads apply everywhere else.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "plain" => ContentType::Plain,
            _ => ContentType::Markdown,
        }
    }
}

/// Structured location attached to an entry.
///
/// The record store holds this as an opaque serialized blob; nested
/// detail fields (road, building, district, ...) stay untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// A diary entry as read back from a store.
///
/// Invariant: `images` and `tags` always deserialize to a valid sequence
/// (empty on absent or malformed stored value, never null) and `hidden`
/// always coerces to a boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default = "default_weather")]
    pub weather: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_mood() -> String {
    DEFAULT_MOOD.to_string()
}

fn default_weather() -> String {
    DEFAULT_WEATHER.to_string()
}

/// Payload for creating an entry. Every optional field gets a default at
/// the store: markdown content type, neutral mood, unknown weather, empty
/// tags/images, no location, visible.
///
/// Import payloads may carry their own timestamps; `created_at` is
/// preserved on import, `updated_at` is always refreshed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryDraft {
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntryDraft {
    /// Title with the empty-string placeholder substitution applied.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            UNTITLED_PLACEHOLDER.to_string()
        } else {
            self.title.clone()
        }
    }
}

impl From<Entry> for EntryDraft {
    fn from(e: Entry) -> Self {
        EntryDraft {
            title: e.title,
            content: e.content,
            content_type: Some(e.content_type),
            mood: Some(e.mood),
            weather: Some(e.weather),
            images: Some(e.images),
            location: e.location,
            tags: Some(e.tags),
            hidden: Some(e.hidden),
            created_at: Some(e.created_at),
            updated_at: Some(e.updated_at),
        }
    }
}

/// Partial update for an entry. Absent fields are left untouched.
///
/// `location` is a double `Option`: the outer level distinguishes
/// "not supplied" from "explicitly set", the inner level allows clearing
/// the location with an explicit null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub location: Option<Option<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl EntryPatch {
    /// True when the patch supplies no fields at all. An empty patch is a
    /// non-write: stores return the existing row unchanged.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.content_type.is_none()
            && self.mood.is_none()
            && self.weather.is_none()
            && self.images.is_none()
            && self.location.is_none()
            && self.tags.is_none()
            && self.hidden.is_none()
    }

    /// True when the patch touches exactly the `hidden` flag. Such patches
    /// route through the dedicated visibility-toggle path, which avoids a
    /// field-enumeration round trip.
    pub fn is_hidden_only(&self) -> bool {
        self.hidden.is_some()
            && self.title.is_none()
            && self.content.is_none()
            && self.content_type.is_none()
            && self.mood.is_none()
            && self.weather.is_none()
            && self.images.is_none()
            && self.location.is_none()
            && self.tags.is_none()
    }

    /// A patch that only flips the hidden flag.
    pub fn hidden(hidden: bool) -> Self {
        EntryPatch {
            hidden: Some(hidden),
            ..Default::default()
        }
    }

    /// Apply this patch to an entry in place. Timestamp handling is the
    /// caller's responsibility.
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(ref title) = self.title {
            entry.title = title.clone();
        }
        if let Some(ref content) = self.content {
            entry.content = content.clone();
        }
        if let Some(content_type) = self.content_type {
            entry.content_type = content_type;
        }
        if let Some(ref mood) = self.mood {
            entry.mood = mood.clone();
        }
        if let Some(ref weather) = self.weather {
            entry.weather = weather.clone();
        }
        if let Some(ref images) = self.images {
            entry.images = images.clone();
        }
        if let Some(ref location) = self.location {
            entry.location = location.clone();
        }
        if let Some(ref tags) = self.tags {
            entry.tags = tags.clone();
        }
        if let Some(hidden) = self.hidden {
            entry.hidden = hidden;
        }
    }
}

/// Serde adapter distinguishing an absent field from an explicit null.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Import behavior for a batch of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Append imported entries to existing ones.
    Merge,
    /// Discard all existing entries (including seeded samples) and
    /// replace them with exactly the imported set. Also suppresses any
    /// future re-seeding of sample data in local mode.
    Overwrite,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// A key/value application setting. The value is an uninterpreted string;
/// boolean-as-string and JSON-as-string conventions belong to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Protocol token carried in the envelope `message` field when a partial
/// update supplied no actual changes. A shared constant, not matched out
/// of free-form error text.
pub const MSG_NO_CHANGES: &str = "no changes";

/// Request body for `POST /entries/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportRequest {
    pub entries: Vec<EntryDraft>,
    /// Overwrite mode discards all existing entries first.
    #[serde(default)]
    pub overwrite: bool,
}

/// Request body for `PUT /entries/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub entries: Vec<Entry>,
}

/// Request body for `PUT /settings/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

/// Aggregate statistics across all entries, hidden ones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryStats {
    /// Length of the writing streak ending today or yesterday; zero once
    /// a full day has been skipped.
    pub consecutive_days: i64,
    /// Distinct days with at least one entry.
    pub total_days_with_entries: i64,
    pub total_entries: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_entry_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_entry_date: Option<DateTime<Utc>>,
    /// First day of the active streak, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_streak_start: Option<NaiveDate>,
}

/// Shared response envelope for every HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Canonical listing order: newest first, ids breaking timestamp ties.
/// Every store returns entry collections in this order.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        ApiEnvelope {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        ApiEnvelope {
            success: true,
            data: Some(data),
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        ApiEnvelope {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

// =============================================================================
// LENIENT DECODING
// =============================================================================

/// Decode a stored JSON string-list column. Absent or malformed values
/// decode to an empty list, never null.
pub fn parse_string_list(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}

/// Decode a stored location blob. Absent or malformed values decode to
/// `None`.
pub fn parse_location(raw: Option<&str>) -> Option<Location> {
    raw.and_then(|s| serde_json::from_str::<Location>(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ContentType::Markdown).unwrap(),
            "\"markdown\""
        );
        assert_eq!(
            serde_json::from_str::<ContentType>("\"plain\"").unwrap(),
            ContentType::Plain
        );
    }

    #[test]
    fn test_entry_lenient_defaults_on_deserialize() {
        let entry: Entry = serde_json::from_str(
            r#"{
                "id": 1,
                "title": "t",
                "content": "c",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(entry.content_type, ContentType::Markdown);
        assert_eq!(entry.mood, DEFAULT_MOOD);
        assert_eq!(entry.weather, DEFAULT_WEATHER);
        assert!(entry.images.is_empty());
        assert!(entry.tags.is_empty());
        assert!(entry.location.is_none());
        assert!(!entry.hidden);
    }

    #[test]
    fn test_parse_string_list_malformed_is_empty() {
        assert!(parse_string_list(None).is_empty());
        assert!(parse_string_list(Some("not json")).is_empty());
        assert!(parse_string_list(Some("{\"a\":1}")).is_empty());
        assert_eq!(
            parse_string_list(Some("[\"a\",\"b\"]")),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_parse_location_roundtrip() {
        let loc = Location {
            name: "Park".into(),
            address: Some("1 Park Way".into()),
            latitude: 51.5,
            longitude: -0.1,
            details: None,
        };
        let raw = serde_json::to_string(&loc).unwrap();
        assert_eq!(parse_location(Some(&raw)), Some(loc));
        assert_eq!(parse_location(Some("garbage")), None);
        assert_eq!(parse_location(None), None);
    }

    #[test]
    fn test_draft_display_title_placeholder() {
        let draft = EntryDraft {
            title: "   ".into(),
            content: "c".into(),
            ..Default::default()
        };
        assert_eq!(draft.display_title(), UNTITLED_PLACEHOLDER);

        let named = EntryDraft {
            title: "A day".into(),
            content: "c".into(),
            ..Default::default()
        };
        assert_eq!(named.display_title(), "A day");
    }

    #[test]
    fn test_patch_is_empty_and_hidden_only() {
        let empty = EntryPatch::default();
        assert!(empty.is_empty());
        assert!(!empty.is_hidden_only());

        let hidden_only = EntryPatch::hidden(true);
        assert!(!hidden_only.is_empty());
        assert!(hidden_only.is_hidden_only());

        let mixed = EntryPatch {
            hidden: Some(true),
            title: Some("x".into()),
            ..Default::default()
        };
        assert!(!mixed.is_hidden_only());
    }

    #[test]
    fn test_patch_location_double_option() {
        // absent -> outer None
        let patch: EntryPatch = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(patch.location.is_none());

        // explicit null -> Some(None)
        let patch: EntryPatch = serde_json::from_str(r#"{"location":null}"#).unwrap();
        assert_eq!(patch.location, Some(None));
        assert!(!patch.is_empty());

        // explicit value -> Some(Some(_))
        let patch: EntryPatch = serde_json::from_str(
            r#"{"location":{"name":"Home","latitude":1.0,"longitude":2.0}}"#,
        )
        .unwrap();
        assert!(matches!(patch.location, Some(Some(ref l)) if l.name == "Home"));
    }

    #[test]
    fn test_patch_apply_merges_never_clobbers() {
        let mut entry: Entry = serde_json::from_str(
            r#"{
                "id": 7,
                "title": "old",
                "content": "body",
                "mood": "happy",
                "tags": ["a"],
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let patch = EntryPatch {
            title: Some("new".into()),
            ..Default::default()
        };
        patch.apply_to(&mut entry);
        assert_eq!(entry.title, "new");
        assert_eq!(entry.content, "body");
        assert_eq!(entry.mood, "happy");
        assert_eq!(entry.tags, vec!["a".to_string()]);
    }

    #[test]
    fn test_canonical_value_sets() {
        assert!(is_canonical_mood("neutral"));
        assert!(!is_canonical_mood("triumphant"));
        assert!(is_canonical_weather("rainy"));
        assert!(!is_canonical_weather("hail of frogs"));
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = ApiEnvelope::ok(1);
        assert!(ok.success);
        assert_eq!(ok.data, Some(1));

        let err = ApiEnvelope::<()>::err("nope");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("nope"));

        let json = serde_json::to_string(&ApiEnvelope::ok("x")).unwrap();
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_sort_newest_first_breaks_ties_by_id() {
        let base = Utc::now();
        let entry = |id: i64, age_days: i64| {
            let at = base - chrono::Duration::days(age_days);
            Entry {
                id,
                title: String::new(),
                content: String::new(),
                content_type: ContentType::Markdown,
                mood: DEFAULT_MOOD.into(),
                weather: DEFAULT_WEATHER.into(),
                images: vec![],
                location: None,
                tags: vec![],
                hidden: false,
                created_at: at,
                updated_at: at,
            }
        };
        let mut entries = vec![entry(1, 2), entry(3, 0), entry(2, 0), entry(4, 1)];
        sort_newest_first(&mut entries);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_envelope_decodes_payloads_without_default() {
        // Entry has no Default impl; decoding must only need Deserialize.
        let json = r#"{
            "success": true,
            "data": {
                "id": 7,
                "title": "morning pages",
                "content": "wrote three of them",
                "content_type": "markdown",
                "tags": ["writing"],
                "location": null,
                "hidden": false,
                "created_at": "2026-08-29T08:00:00Z",
                "updated_at": "2026-08-29T08:00:00Z"
            }
        }"#;
        let envelope: ApiEnvelope<Entry> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        let entry = envelope.data.unwrap();
        assert_eq!(entry.id, 7);
        assert_eq!(entry.tags, vec!["writing"]);
        assert!(envelope.message.is_none());
    }
}
