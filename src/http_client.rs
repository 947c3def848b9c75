//! HTTP Client (spec §4.B).
//!
//! Authenticated, paginated GETs against the vendor API. Pagination is
//! exposed as a lazy, restartable stream so the Sync Engine can resume it
//! from an externally supplied offset (the Progress Store's `current_offset`).

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::cancellation::SyncCancellation;
use crate::rate_limiter::RateLimiter;
use shared::error::{Error, Result};

const USER_AGENT: &str = "fulfillment-sync-engine/1.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// A page may arrive as a bare JSON array or as `{"data": [...]}` — the
/// vendor is observed to use both forms (spec §4.B).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Array(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Envelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Envelope::Array(items) => items,
            Envelope::Wrapped { data } => data,
        }
    }
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// One GET against `endpoint` with the given query parameters, decoded
    /// as JSON. Status in [200, 300) decodes; 429 is `RateLimited`; any
    /// other non-2xx is `Http(status)`.
    pub async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .query(params)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            return Err(Error::Http(status.as_u16()));
        }

        response.json::<Value>().await.map_err(Error::Transport)
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        base_params: &[(&str, String)],
        offset: u32,
        limit: u32,
    ) -> Result<Vec<T>> {
        let mut params: Vec<(&str, String)> = base_params.to_vec();
        params.push(("offset", offset.to_string()));
        params.push(("limit", limit.to_string()));

        let value = self.get_json(endpoint, &params).await?;
        let envelope: Envelope<T> = serde_json::from_value(value).map_err(Error::Decode)?;
        Ok(envelope.into_items())
    }

    /// Fetch a single detail resource (e.g. `/picklists/{id}`), used for the
    /// per-parent detail fetches picklists/batches require.
    pub async fn fetch_detail<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let value = self.get_json(endpoint, &[]).await?;
        serde_json::from_value(value).map_err(Error::Decode)
    }

    /// Serializes a `since` datetime the way the vendor's `updated_since`
    /// parameter requires: `YYYY-MM-DD HH:MM:SS`, UTC, space not "T".
    pub fn format_since(since: DateTime<Utc>) -> String {
        since.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Lazily paginate `endpoint`, serialized through `limiter`, starting at
    /// `start_offset`. Stops once a page has fewer than `limit` items. If
    /// `since` is set, it is passed as `updated_since`. If `cutoff` is set
    /// (only meaningful for the batches "last N days" sync), each page is
    /// sorted descending by `updated_at` before the cutoff test is applied,
    /// and items below the cutoff are dropped; the stream then ends.
    pub fn paginate<'a, T>(
        &'a self,
        limiter: &'a RateLimiter,
        cancel: &'a SyncCancellation,
        endpoint: &'a str,
        mut base_params: Vec<(&'static str, String)>,
        since: Option<DateTime<Utc>>,
        cutoff: Option<DateTime<Utc>>,
        start_offset: u32,
        limit: u32,
    ) -> BoxStream<'a, Result<Vec<T>>>
    where
        T: DeserializeOwned + HasUpdatedAt + Send + 'static,
    {
        if let Some(since) = since {
            base_params.push(("updated_since", Self::format_since(since)));
        }

        let state = PaginationState {
            offset: start_offset,
            done: false,
        };

        stream::unfold(state, move |mut state| {
            let base_params = base_params.clone();
            async move {
                if state.done {
                    return None;
                }
                if cancel.is_cancelled() {
                    return Some((Err(Error::Cancelled), state));
                }

                let endpoint = endpoint.to_string();
                let fetch_result = limiter
                    .execute(cancel, || {
                        let endpoint = endpoint.clone();
                        let base_params = base_params.clone();
                        async move { self.fetch_page::<T>(&endpoint, &base_params, state.offset, limit).await }
                    })
                    .await;

                let mut page = match fetch_result {
                    Ok(page) => page,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                };

                let page_len = page.len() as u32;
                state.offset += limit;
                if page_len < limit {
                    state.done = true;
                }

                if let Some(cutoff) = cutoff {
                    page.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
                    let before_drop = page.len();
                    page.retain(|item| item.updated_at().map(|ts| ts >= cutoff).unwrap_or(true));
                    if page.len() < before_drop {
                        state.done = true;
                    }
                }

                Some((Ok(page), state))
            }
        })
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
struct PaginationState {
    offset: u32,
    done: bool,
}

/// Implemented by every decoded API record so the paginator can apply the
/// cutoff-descending-sort rule without knowing the concrete entity type.
pub trait HasUpdatedAt {
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}
