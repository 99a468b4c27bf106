//! HTTP boundary shared by the token exchanger and the API client.
//!
//! Everything that leaves the process goes through [`HttpTransport`], so
//! tests can script the accounts service and the Web API without sockets.

use async_trait::async_trait;
use thiserror::Error;

/// The two verbs this crate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Ordered header list; lookups go through [`header_get`].
pub type HttpHeaders = Vec<(String, String)>;

/// Outbound request, independent of any HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    /// POST with a urlencoded form body.
    #[must_use]
    pub fn form<'a>(
        url: impl Into<String>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: encoded.into_bytes(),
        }
        .header("Content-Type", "application/x-www-form-urlencoded")
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status, headers and the fully buffered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    /// Body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection, TLS, timeout or body read failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// A scripted transport had nothing queued for this request.
    #[error("no scripted response for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

/// Sends one request and buffers the whole response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First value for `name`, compared case-insensitively.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers.iter().find_map(|(key, value)| {
        key.eq_ignore_ascii_case(name).then_some(value.as_str())
    })
}

pub mod reqwest_transport {
    use std::time::Duration;

    use super::{HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
    use async_trait::async_trait;

    /// Per-request timeout used by [`ReqwestTransport::with_timeout`] callers.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    fn transport_error(err: reqwest::Error) -> HttpError {
        HttpError::Transport(err.to_string())
    }

    /// [`HttpTransport`] over a shared `reqwest::Client`.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("topfetch/", env!("CARGO_PKG_VERSION")))
                .build()
                .map(Self::new)
                .map_err(transport_error)
        }
    }

    impl From<HttpMethod> for reqwest::Method {
        fn from(method: HttpMethod) -> Self {
            match method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;

            let mut builder = headers
                .iter()
                .fold(self.client.request(method.into(), &url), |b, (k, v)| {
                    b.header(k.as_str(), v.as_str())
                });
            if !body.is_empty() {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(transport_error)?;

            let status = response.status().as_u16();
            // Non-ASCII header values are dropped; nothing here reads them.
            let headers: HttpHeaders = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_owned(), v.to_owned()))
                })
                .collect();
            let body = response.bytes().await.map_err(transport_error)?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
pub use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use async_trait::async_trait;

    use super::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

    enum Reply {
        Respond(HttpResponse),
        Fail(String),
    }

    #[derive(Default)]
    struct Script {
        replies: HashMap<(HttpMethod, String), VecDeque<Reply>>,
        seen: Vec<HttpRequest>,
    }

    /// Scripted transport keyed by method and exact URL.
    ///
    /// Replies queued for the same key are consumed in order. Clones share
    /// the script, so a test can keep a handle after passing one to a client.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        script: Arc<Mutex<Script>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn enqueue(&self, method: HttpMethod, url: String, reply: Reply) {
            self.script()
                .replies
                .entry((method, url))
                .or_default()
                .push_back(reply);
        }

        pub fn push_response(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
            self.enqueue(method, url.into(), Reply::Respond(response));
        }

        /// Queue a connection-level failure.
        pub fn push_transport_error(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            message: impl Into<String>,
        ) {
            self.enqueue(method, url.into(), Reply::Fail(message.into()));
        }

        /// Every request sent so far, in order.
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.script().seen.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut script = self.script();
            let method = request.method;
            let url = request.url.clone();
            script.seen.push(request);

            let next = script
                .replies
                .get_mut(&(method, url.clone()))
                .and_then(VecDeque::pop_front);

            match next {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(message)) => Err(HttpError::Transport(message)),
                None => Err(HttpError::NoMockResponse {
                    method: method.as_str().to_string(),
                    url,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::post;

    use super::reqwest_transport::ReqwestTransport;
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let headers: HttpHeaders = vec![
            ("Retry-After".to_string(), "3".to_string()),
            ("retry-after".to_string(), "9".to_string()),
        ];
        assert_eq!(header_get(&headers, "RETRY-AFTER"), Some("3"));
        assert_eq!(header_get(&headers, "etag"), None);
    }

    #[test]
    fn test_form_request() {
        let req = HttpRequest::form(
            "https://accounts.test/api/token",
            [
                ("grant_type", "authorization_code"),
                ("redirect_uri", "http://127.0.0.1:8888/callback"),
            ],
        );
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(
            String::from_utf8(req.body).unwrap(),
            "grant_type=authorization_code&redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback"
        );
        assert_eq!(
            header_get(&req.headers, "content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_response_helpers() {
        let ok = HttpResponse {
            status: 204,
            headers: vec![("Content-Type".into(), "text/plain".into())],
            body: b"ok".to_vec(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.header("content-type"), Some("text/plain"));
        assert_eq!(ok.text(), "ok");

        let redirect = HttpResponse {
            status: 302,
            headers: Vec::new(),
            body: vec![0xff],
        };
        assert!(!redirect.is_success());
        assert_eq!(redirect.text(), "\u{fffd}");
    }

    #[tokio::test]
    async fn test_mock_replays_in_order_then_runs_dry() {
        let transport = MockTransport::new();
        let url = "https://api.test/v1/me/top/tracks";
        let reply = |status| HttpResponse {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        };
        transport.push_response(HttpMethod::Get, url, reply(500));
        transport.push_response(HttpMethod::Get, url, reply(200));
        transport.push_transport_error(HttpMethod::Get, url, "reset");

        let send = || transport.send(HttpRequest::get(url).header("Accept", "application/json"));
        assert_eq!(send().await.unwrap().status, 500);
        assert_eq!(send().await.unwrap().status, 200);
        assert!(matches!(send().await, Err(HttpError::Transport(ref m)) if m == "reset"));
        assert!(matches!(send().await, Err(HttpError::NoMockResponse { .. })));

        // A different verb is a different key.
        assert!(matches!(
            transport.send(HttpRequest::form(url, [])).await,
            Err(HttpError::NoMockResponse { ref method, .. }) if method == "POST"
        ));
        assert_eq!(transport.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_reqwest_transport_round_trip() {
        async fn echo(headers: HeaderMap, body: String) -> ([(&'static str, &'static str); 1], String) {
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            ([("x-echo", "yes")], format!("{content_type}|{body}"))
        }

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/token", post(echo)))
                .await
                .unwrap();
        });

        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(HttpRequest::form(format!("http://{addr}/token"), [("a", "1")]))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("X-Echo"), Some("yes"));
        assert_eq!(response.text(), "application/x-www-form-urlencoded|a=1");

        server.abort();
    }

    #[tokio::test]
    async fn test_reqwest_transport_rejects_bad_url() {
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let err = transport
            .send(HttpRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
