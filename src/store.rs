// Client for the Cloudflare Worker that hosts the shiny database.
//
// The Worker only supports whole-document reads and writes: every update
// replaces the entire store.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::model::PlayerStore;

/// Admin credentials accepted by the Worker's write endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    username: &'a str,
    password: &'a str,
    data: &'a PlayerStore,
    action: &'a str,
}

/// Body returned by `/update-database`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: Url,
}

impl StoreClient {
    /// `base_url` is the Worker's admin root, e.g.
    /// `https://adminpage.hypersmmo.workers.dev/admin`.
    pub fn new(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| StoreError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, name: &str) -> StoreResult<Url> {
        self.base_url
            .join(name)
            .map_err(|e| StoreError::InvalidUrl(format!("{name}: {e}")))
    }

    /// Fetch the whole shiny database.
    pub async fn fetch_database(&self) -> StoreResult<PlayerStore> {
        let url = self.endpoint("database")?;
        tracing::debug!("GET {url}");
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Replace the whole shiny database.
    pub async fn update_database(
        &self,
        store: &PlayerStore,
        credentials: &Credentials,
        action: &str,
    ) -> StoreResult<UpdateResponse> {
        let url = self.endpoint("update-database")?;
        tracing::debug!("POST {url} ({} players)", store.len());
        let body = UpdateRequest {
            username: &credentials.username,
            password: &credentials.password,
            data: store,
            action,
        };
        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let parsed: UpdateResponse = if text.trim().is_empty() {
            UpdateResponse::default()
        } else {
            serde_json::from_str(&text).unwrap_or_default()
        };
        if parsed.success == Some(false) {
            let reason = parsed
                .error
                .clone()
                .unwrap_or_else(|| "success: false".to_string());
            return Err(StoreError::Rejected(reason));
        }
        Ok(parsed)
    }
}
