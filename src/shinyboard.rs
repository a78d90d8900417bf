// ShinyBoard API client: follows a player's paginated shiny list.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::merge::ALL_MERGEABLE_FIELDS;
use crate::model::SecondaryRecord;

/// Hard stop for a page chain that never ends.
pub const MAX_PAGES: usize = 500;

/// Raw page as returned by `/api/users/{name}/shinies`.
#[derive(Debug, Default, Deserialize)]
struct ShinyPage {
    #[serde(default)]
    shinies: Option<Value>,
    #[serde(default)]
    next_page_url: Option<String>,
}

/// Everything fetched for one player. A failed page ends the chain; the
/// records gathered before it are kept.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<SecondaryRecord>,
    pub pages: usize,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ShinyBoardClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ShinyBoardClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self { http, base_url })
    }

    /// URL of the first page of a player's shinies.
    pub fn first_page_url(&self, player: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "users", player, "shinies"]);
        url.query_pairs_mut().append_pair("page", "1");
        Ok(url)
    }

    /// Lazy sequence of pages for a player.
    ///
    /// Each page's address comes from the previous response, so pages are
    /// fetched one after another. The stream ends when a page has no
    /// `next_page_url`, right after the first failed page, or after
    /// [`MAX_PAGES`] pages.
    pub fn pages<'a>(
        &'a self,
        player: &str,
    ) -> impl Stream<Item = Result<Vec<SecondaryRecord>, FetchError>> + 'a {
        let start = match self.first_page_url(player) {
            Ok(url) => PageCursor::Next { url, fetched: 0 },
            Err(e) => PageCursor::Failed(e),
        };

        stream::unfold(start, move |cursor| async move {
            match cursor {
                PageCursor::Done => None,
                PageCursor::Failed(e) => Some((Err(e), PageCursor::Done)),
                PageCursor::Next { fetched, .. } if fetched >= MAX_PAGES => {
                    Some((Err(FetchError::PageLimit(MAX_PAGES)), PageCursor::Done))
                }
                PageCursor::Next { url, fetched } => match self.fetch_page(&url).await {
                    Ok((records, next)) => {
                        let cursor = match next {
                            Some(url) => PageCursor::Next {
                                url,
                                fetched: fetched + 1,
                            },
                            None => PageCursor::Done,
                        };
                        Some((Ok(records), cursor))
                    }
                    Err(e) => Some((Err(e), PageCursor::Done)),
                },
            }
        })
    }

    /// Fetch every page for a player. Never fails: errors are carried in
    /// the outcome next to whatever was fetched before them.
    pub async fn fetch_all(&self, player: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let mut pages = std::pin::pin!(self.pages(player));
        while let Some(page) = pages.next().await {
            match page {
                Ok(records) => {
                    outcome.pages += 1;
                    outcome.records.extend(records);
                }
                Err(e) => {
                    tracing::warn!("ShinyBoard fetch for {player} stopped: {e}");
                    outcome.error = Some(e);
                }
            }
        }
        tracing::debug!(
            "ShinyBoard: {} records over {} pages for {player}",
            outcome.records.len(),
            outcome.pages
        );
        outcome
    }

    async fn fetch_page(&self, url: &Url) -> Result<(Vec<SecondaryRecord>, Option<Url>), FetchError> {
        tracing::debug!("GET {url}");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let page: ShinyPage = response.json().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        let records = page
            .shinies
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| items.iter().map(flatten_shiny).collect())
            .unwrap_or_default();

        // Relative links resolve against the page that returned them
        let next = match page.next_page_url.as_deref().map(str::trim) {
            Some(next) if !next.is_empty() => Some(
                url.join(next)
                    .map_err(|e| FetchError::InvalidUrl(format!("{next}: {e}")))?,
            ),
            _ => None,
        };
        Ok((records, next))
    }
}

enum PageCursor {
    Next { url: Url, fetched: usize },
    Failed(FetchError),
    Done,
}

/// Flatten one API item into a [`SecondaryRecord`], keeping only the
/// mergeable attributes the item actually carries.
pub fn flatten_shiny(item: &Value) -> SecondaryRecord {
    let name = item
        .get("pokemon")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let mut record = SecondaryRecord::new(name);
    if let Some(obj) = item.as_object() {
        for field in ALL_MERGEABLE_FIELDS {
            if let Some(value) = obj.get(*field) {
                record.fields.insert(field.to_string(), value.clone());
            }
        }
    }
    record
}
