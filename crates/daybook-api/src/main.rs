//! HTTP API server for daybook.
//!
//! Serves the diary entry and settings endpoints behind the shared
//! response envelope. Every handler body rides in an [`ApiEnvelope`] so
//! clients branch on `success` plus HTTP status, never on error prose.

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use daybook_core::{
    ApiEnvelope, BatchImportRequest, BatchUpdateRequest, EntryDraft, EntryPatch, EntryStore,
    ImportMode, SetSettingRequest, SettingStore, UpdateOutcome, MSG_NO_CHANGES,
};
use daybook_db::{log_pool_metrics, Database, PoolConfig};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically and line up
/// with log output during incident debugging.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
struct AppState {
    db: Database,
    /// When set, the stats endpoint requires this key; unset leaves it open.
    stats_api_key: Option<String>,
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "daybook_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "daybook_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("daybook-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/daybook".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);
    let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(daybook_db::pool::DEFAULT_MAX_CONNECTIONS);
    let stats_api_key = std::env::var("STATS_API_KEY").ok().filter(|k| !k.is_empty());

    // Connect to database
    info!("Connecting to database...");
    let pool_config = PoolConfig::new().max_connections(max_connections);
    let db = Database::connect_with_config(&database_url, pool_config).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let state = AppState { db, stats_api_key };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Entries CRD + batch
        .route("/api/entries", get(list_entries).post(create_entry))
        .route(
            "/api/entries/batch",
            post(batch_import_entries).put(batch_update_entries),
        )
        .route("/api/entries/:id", get(get_entry).delete(delete_entry))
        .route("/api/entries/:id/edit", post(edit_entry))
        .route("/api/entries/:id/toggle-visibility", post(toggle_visibility))
        // Stats
        .route("/api/stats", get(diary_stats))
        // Settings
        .route("/api/settings", get(all_settings))
        .route(
            "/api/settings/:key",
            get(get_setting).put(put_setting).delete(delete_setting),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let allowed_origins = parse_allowed_origins();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600))
        })
        .with_state(state)
}

/// Allowed CORS origins from CORS_ALLOWED_ORIGINS (comma-separated).
/// Defaults to common local development hosts.
fn parse_allowed_origins() -> Vec<axum::http::HeaderValue> {
    let raw = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string());
    raw.split(',')
        .filter_map(|origin| {
            let origin = origin.trim();
            match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "Ignoring unparseable CORS origin");
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// HANDLERS: HEALTH
// =============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    log_pool_metrics(state.db.pool());
    Json(serde_json::json!({
        "status": "ok",
        "service": "daybook-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// HANDLERS: ENTRIES
// =============================================================================

async fn list_entries(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = state.db.entries.list().await?;
    Ok(Json(ApiEnvelope::ok(entries)))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .db
        .entries
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Entry {id} not found")))?;
    Ok(Json(ApiEnvelope::ok(entry)))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(draft): Json<EntryDraft>,
) -> Result<impl IntoResponse, ApiError> {
    if draft.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content is required".to_string()));
    }
    let entry = state.db.entries.create(draft).await?;
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(entry))))
}

/// Partial update. An empty patch is acknowledged with the existing row
/// and the shared no-changes message token instead of an error.
async fn edit_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<EntryPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let envelope = match state.db.entries.update(id, patch).await? {
        UpdateOutcome::Updated(entry) => ApiEnvelope::ok(entry),
        UpdateOutcome::Unchanged(entry) => ApiEnvelope::ok_with_message(entry, MSG_NO_CHANGES),
    };
    Ok(Json(envelope))
}

async fn toggle_visibility(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.db.entries.toggle_hidden(id).await?;
    Ok(Json(ApiEnvelope::ok(entry)))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.entries.delete(id).await?;
    Ok(Json(ApiEnvelope::ok_with_message(
        serde_json::json!({ "id": id }),
        "Entry deleted",
    )))
}

async fn batch_import_entries(
    State(state): State<AppState>,
    Json(request): Json<BatchImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.entries.is_empty() {
        return Err(ApiError::BadRequest(
            "Import payload contains no entries".to_string(),
        ));
    }
    let mode = if request.overwrite {
        ImportMode::Overwrite
    } else {
        ImportMode::Merge
    };
    let imported = state.db.entries.import(request.entries, mode).await?;
    Ok(Json(ApiEnvelope::ok(imported)))
}

async fn batch_update_entries(
    State(state): State<AppState>,
    Json(request): Json<BatchUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.db.entries.update_batch(request.entries).await?;
    Ok(Json(ApiEnvelope::ok(updated)))
}

// =============================================================================
// HANDLERS: STATS
// =============================================================================

/// Aggregate writing statistics: totals, first/latest entry timestamps,
/// and the consecutive-day streak.
async fn diary_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ref expected) = state.stats_api_key {
        if !stats_key_matches(&headers, expected) {
            return Err(ApiError::Unauthorized("Invalid API key".to_string()));
        }
    }
    let stats = state.db.entries.stats().await?;
    Ok(Json(ApiEnvelope::ok(stats)))
}

/// Accepts the key as `Authorization: Bearer <key>` or `X-API-Key: <key>`.
fn stats_key_matches(headers: &HeaderMap, expected: &str) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(expected) {
        return true;
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(expected)
}

// =============================================================================
// HANDLERS: SETTINGS
// =============================================================================

async fn all_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let settings = state.db.settings.all_settings().await?;
    Ok(Json(ApiEnvelope::ok(settings)))
}

/// Returns the setting as a single-key map, so the response shape matches
/// the all-settings endpoint.
async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state
        .db
        .settings
        .get_setting(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Setting {key} not found")))?;
    let mut map = std::collections::HashMap::new();
    map.insert(key, value);
    Ok(Json(ApiEnvelope::ok(map)))
}

async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SetSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.settings.set_setting(&key, &request.value).await?;
    Ok(Json(ApiEnvelope::ok(serde_json::json!({ "key": key }))))
}

async fn delete_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.settings.delete_setting(&key).await?;
    Ok(Json(ApiEnvelope::ok(serde_json::json!({ "key": key }))))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// HTTP-facing error. Conversion from the domain error keeps the write
/// failure tiers distinguishable: a missing row maps to 404, a write that
/// touched no rows to 409, a failed read-back to 500, and a verification
/// timeout to 503.
#[derive(Debug)]
enum ApiError {
    Internal(daybook_core::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ReadBack(String),
    Unverified(String),
}

impl From<daybook_core::Error> for ApiError {
    fn from(err: daybook_core::Error) -> Self {
        match err {
            daybook_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            daybook_core::Error::Validation(msg) => ApiError::BadRequest(msg),
            daybook_core::Error::UpdateConflict(msg) => ApiError::Conflict(msg),
            daybook_core::Error::PostWriteRead(msg) => ApiError::ReadBack(msg),
            daybook_core::Error::ConsistencyTimeout(msg) => ApiError::Unverified(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ReadBack(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Unverified(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ApiEnvelope::<()>::err(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::Error;

    fn status_for(err: Error) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_for(Error::NotFound("entry 9 not found".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_for(Error::Validation("content required".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_update_conflict_maps_to_409() {
        assert_eq!(
            status_for(Error::UpdateConflict("zero rows".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_post_write_read_maps_to_500() {
        assert_eq!(
            status_for(Error::PostWriteRead("unreadable".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_consistency_timeout_maps_to_503() {
        assert_eq!(
            status_for(Error::ConsistencyTimeout("still visible".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_write_failure_tiers_stay_distinguishable() {
        // The three tiers of a failed edit must not collapse into one
        // status + message pair.
        let tiers = [
            status_for(Error::NotFound("x".into())),
            status_for(Error::UpdateConflict("x".into())),
            status_for(Error::PostWriteRead("x".into())),
        ];
        assert_eq!(tiers[0], StatusCode::NOT_FOUND);
        assert_eq!(tiers[1], StatusCode::CONFLICT);
        assert_eq!(tiers[2], StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let status = ApiError::Unauthorized("bad key".into())
            .into_response()
            .status();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_stats_key_accepted_from_either_header() {
        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, "Bearer sekrit".parse().unwrap());
        assert!(stats_key_matches(&bearer, "sekrit"));

        let mut api_key = HeaderMap::new();
        api_key.insert("x-api-key", "sekrit".parse().unwrap());
        assert!(stats_key_matches(&api_key, "sekrit"));

        let mut wrong = HeaderMap::new();
        wrong.insert(header::AUTHORIZATION, "Bearer guess".parse().unwrap());
        assert!(!stats_key_matches(&wrong, "sekrit"));
        assert!(!stats_key_matches(&HeaderMap::new(), "sekrit"));
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ApiEnvelope::<()>::err("boom");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_no_changes_envelope_carries_message_token() {
        let envelope = ApiEnvelope::ok_with_message(42, MSG_NO_CHANGES);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], MSG_NO_CHANGES);
    }
}
