//! Remote record store client.
//!
//! Thin reqwest client over the daybook HTTP API. Connectivity failures
//! surface as [`Error::Transport`] so the façade can tell them apart from
//! domain errors; everything else is decoded out of the shared response
//! envelope.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::trace;

use daybook_core::{
    ApiEnvelope, BatchImportRequest, BatchUpdateRequest, Entry, EntryDraft, EntryPatch,
    EntryStore, Error, ImportMode, Result, SetSettingRequest, SettingStore, UpdateOutcome,
    MSG_NO_CHANGES,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the remote record store.
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteStore {
    /// Create a client for the API rooted at `base_url` (e.g.
    /// `http://localhost:3000/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a response into its envelope, mapping HTTP status onto the
    /// error taxonomy. The envelope's `error` text rides along as the
    /// diagnostic message but never drives control flow.
    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>> {
        let status = response.status();
        // A reply that is not an envelope (a proxy error page, say) means
        // the server answered but misbehaved. That is a server fault, not
        // a connectivity one, so it must not read as a transport error.
        let envelope = match response.json::<ApiEnvelope<T>>().await {
            Ok(envelope) => envelope,
            Err(e) if e.is_decode() => {
                return Err(Error::Internal(format!(
                    "malformed response body ({status}): {e}"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        trace!(subsystem = "store", backend = "remote", %status, "response decoded");

        if envelope.success {
            return Ok(envelope);
        }
        let detail = envelope.error.unwrap_or_else(|| status.to_string());
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(detail)),
            StatusCode::BAD_REQUEST => Err(Error::Validation(detail)),
            _ => Err(Error::Internal(detail)),
        }
    }

    fn require_data<T>(envelope: ApiEnvelope<T>) -> Result<T> {
        envelope
            .data
            .ok_or_else(|| Error::Internal("response envelope missing data".to_string()))
    }
}

#[async_trait]
impl EntryStore for RemoteStore {
    async fn list(&self) -> Result<Vec<Entry>> {
        let response = self.client.get(self.url("/entries")).send().await?;
        let envelope = self.decode::<Vec<Entry>>(response).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn get(&self, id: i64) -> Result<Option<Entry>> {
        let response = self
            .client
            .get(self.url(&format!("/entries/{id}")))
            .send()
            .await?;
        match self.decode::<Entry>(response).await {
            Ok(envelope) => Ok(envelope.data),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, draft: EntryDraft) -> Result<Entry> {
        let response = self
            .client
            .post(self.url("/entries"))
            .json(&draft)
            .send()
            .await?;
        Self::require_data(self.decode(response).await?)
    }

    async fn update(&self, id: i64, patch: EntryPatch) -> Result<UpdateOutcome> {
        let response = self
            .client
            .post(self.url(&format!("/entries/{id}/edit")))
            .json(&patch)
            .send()
            .await?;
        let envelope = self.decode::<Entry>(response).await?;
        let unchanged = envelope.message.as_deref() == Some(MSG_NO_CHANGES);
        let entry = Self::require_data(envelope)?;
        Ok(if unchanged {
            UpdateOutcome::Unchanged(entry)
        } else {
            UpdateOutcome::Updated(entry)
        })
    }

    async fn toggle_hidden(&self, id: i64) -> Result<Entry> {
        let response = self
            .client
            .post(self.url(&format!("/entries/{id}/toggle-visibility")))
            .send()
            .await?;
        Self::require_data(self.decode(response).await?)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/entries/{id}")))
            .send()
            .await?;
        self.decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn import(&self, entries: Vec<EntryDraft>, mode: ImportMode) -> Result<Vec<Entry>> {
        let request = BatchImportRequest {
            entries,
            overwrite: mode == ImportMode::Overwrite,
        };
        let response = self
            .client
            .post(self.url("/entries/batch"))
            .json(&request)
            .send()
            .await?;
        Self::require_data(self.decode(response).await?)
    }

    async fn update_batch(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        let request = BatchUpdateRequest { entries };
        let response = self
            .client
            .put(self.url("/entries/batch"))
            .json(&request)
            .send()
            .await?;
        Self::require_data(self.decode(response).await?)
    }
}

#[async_trait]
impl SettingStore for RemoteStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url(&format!("/settings/{key}")))
            .send()
            .await?;
        match self.decode::<HashMap<String, String>>(response).await {
            Ok(envelope) => Ok(envelope.data.and_then(|mut map| map.remove(key))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let request = SetSettingRequest {
            value: value.to_string(),
        };
        let response = self
            .client
            .put(self.url(&format!("/settings/{key}")))
            .json(&request)
            .send()
            .await?;
        self.decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn all_settings(&self) -> Result<HashMap<String, String>> {
        let response = self.client.get(self.url("/settings")).send().await?;
        let envelope = self.decode::<HashMap<String, String>>(response).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/settings/{key}")))
            .send()
            .await?;
        self.decode::<serde_json::Value>(response).await?;
        Ok(())
    }
}
