//! Single-page access to the `/me/top/{type}` endpoint.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::rate_limit::ApiRateLimiter;

use super::error::FetchError;

/// Default Web API base URL.
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Largest `limit` the endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 50;

/// Which collection to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Tracks,
    Artists,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tracks => "tracks",
            Self::Artists => "artists",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Affinity window the ranking is computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Roughly the last 4 weeks.
    ShortTerm,
    /// Roughly the last 6 months.
    #[default]
    MediumTerm,
    /// Roughly the last year.
    LongTerm,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ShortTerm => "last ~4 weeks",
            Self::MediumTerm => "last ~6 months",
            Self::LongTerm => "last ~year",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short_term" | "short" => Ok(Self::ShortTerm),
            "medium_term" | "medium" => Ok(Self::MediumTerm),
            "long_term" | "long" => Ok(Self::LongTerm),
            other => Err(format!(
                "unknown time range '{other}' (expected short_term, medium_term or long_term)"
            )),
        }
    }
}

/// One page of the collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items in the collection, as declared by the API.
    pub total: usize,
}

/// Client for the top-items endpoint, authenticated with a bearer token.
///
/// Cheap to clone; page workers each hold a clone.
#[derive(Clone)]
pub struct TopItemsClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    access_token: String,
    rate_limiter: Option<ApiRateLimiter>,
}

impl fmt::Debug for TopItemsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopItemsClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

impl TopItemsClient {
    pub fn new(transport: Arc<dyn HttpTransport>, access_token: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: API_BASE_URL.to_string(),
            access_token: access_token.into(),
            rate_limiter: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Pace every page request through `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<ApiRateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// URL of one page.
    pub fn page_url(
        &self,
        item_type: ItemType,
        time_range: TimeRange,
        limit: usize,
        offset: usize,
    ) -> String {
        format!(
            "{}/me/top/{}?time_range={}&limit={}&offset={}",
            self.base_url, item_type, time_range, limit, offset
        )
    }

    /// Fetch a single page.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        item_type: ItemType,
        time_range: TimeRange,
        limit: usize,
        offset: usize,
    ) -> Result<Page<T>, FetchError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let url = self.page_url(item_type, time_range, limit, offset);
        tracing::debug!(%item_type, offset, limit, "Requesting page");

        let request = HttpRequest::get(url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Accept", "application/json");

        let response = self.transport.send(request).await?;
        check_status(&response)?;

        serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn check_status(response: &HttpResponse) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }
    Err(match response.status {
        401 => FetchError::Unauthorized,
        403 => FetchError::Forbidden(response.text()),
        429 => FetchError::RateLimited {
            retry_after: response
                .header("retry-after")
                .and_then(|v| v.trim().parse().ok()),
        },
        status => FetchError::Http {
            status,
            body: response.text(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport, header_get};

    const BASE: &str = "https://api.test/v1";

    fn client(transport: &MockTransport) -> TopItemsClient {
        TopItemsClient::new(Arc::new(transport.clone()), "token-123").with_base_url(BASE)
    }

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_time_range_parsing_and_display() {
        assert_eq!("short_term".parse::<TimeRange>().unwrap(), TimeRange::ShortTerm);
        assert_eq!("Medium".parse::<TimeRange>().unwrap(), TimeRange::MediumTerm);
        assert_eq!("long".parse::<TimeRange>().unwrap(), TimeRange::LongTerm);
        assert!("forever".parse::<TimeRange>().is_err());
        assert_eq!(TimeRange::default(), TimeRange::MediumTerm);
        assert_eq!(TimeRange::LongTerm.to_string(), "long_term");
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&TimeRange::ShortTerm).unwrap(),
            "\"short_term\""
        );
        assert_eq!(
            serde_json::from_str::<ItemType>("\"artists\"").unwrap(),
            ItemType::Artists
        );
    }

    #[test]
    fn test_page_url_and_trailing_slash() {
        let transport = MockTransport::new();
        let c = TopItemsClient::new(Arc::new(transport), "t").with_base_url("https://api.test/v1/");
        assert_eq!(
            c.page_url(ItemType::Tracks, TimeRange::ShortTerm, 50, 100),
            "https://api.test/v1/me/top/tracks?time_range=short_term&limit=50&offset=100"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let c = client(&MockTransport::new());
        assert!(!format!("{c:?}").contains("token-123"));
    }

    #[tokio::test]
    async fn test_get_page_sends_bearer_and_decodes() {
        let transport = MockTransport::new();
        let c = client(&transport);
        transport.push_response(
            HttpMethod::Get,
            c.page_url(ItemType::Artists, TimeRange::MediumTerm, 2, 0),
            response(200, &[], r#"{"items":[{"name":"a"},{"name":"b"}],"total":9,"limit":2}"#),
        );

        let page: Page<serde_json::Value> = c
            .get_page(ItemType::Artists, TimeRange::MediumTerm, 2, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 9);
        assert_eq!(page.items.len(), 2);

        let requests = transport.requests();
        assert_eq!(
            header_get(&requests[0].headers, "authorization"),
            Some("Bearer token-123")
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let transport = MockTransport::new();
        let c = client(&transport);
        let url = c.page_url(ItemType::Tracks, TimeRange::LongTerm, 50, 0);
        transport.push_response(HttpMethod::Get, &url, response(401, &[], "{}"));
        transport.push_response(HttpMethod::Get, &url, response(403, &[], "user not registered"));
        transport.push_response(
            HttpMethod::Get,
            &url,
            response(429, &[("Retry-After", "7")], ""),
        );
        transport.push_response(HttpMethod::Get, &url, response(502, &[], "bad gateway"));
        transport.push_response(HttpMethod::Get, &url, response(200, &[], "<html>"));
        transport.push_transport_error(HttpMethod::Get, &url, "connection reset");

        let get = || c.get_page::<serde_json::Value>(ItemType::Tracks, TimeRange::LongTerm, 50, 0);

        assert!(matches!(get().await, Err(FetchError::Unauthorized)));
        assert!(matches!(get().await, Err(FetchError::Forbidden(ref b)) if b == "user not registered"));
        assert!(matches!(
            get().await,
            Err(FetchError::RateLimited {
                retry_after: Some(7)
            })
        ));
        assert!(matches!(
            get().await,
            Err(FetchError::Http { status: 502, .. })
        ));
        assert!(matches!(get().await, Err(FetchError::Decode(_))));
        assert!(matches!(get().await, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_rate_limiter_is_applied() {
        let transport = MockTransport::new();
        let c = client(&transport).with_rate_limiter(Some(ApiRateLimiter::new(50)));
        let url = c.page_url(ItemType::Tracks, TimeRange::MediumTerm, 1, 0);
        transport.push_response(HttpMethod::Get, &url, response(200, &[], r#"{"items":[],"total":0}"#));

        let page: Page<serde_json::Value> = c
            .get_page(ItemType::Tracks, TimeRange::MediumTerm, 1, 0)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(format!("{c:?}").contains("requests_per_second: 50"));
    }
}
