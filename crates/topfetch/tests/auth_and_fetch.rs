//! End-to-end tests: obtain a token, then fetch a whole collection.
//!
//! A scripted in-process transport stands in for both the accounts service
//! and the Web API. The interactive flow runs against a real loopback
//! callback listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use topfetch::fetch::{FetchError, FetchRequest, ItemType, TimeRange, TopItemsClient};
use topfetch::http::{HttpError, HttpRequest, HttpResponse, HttpTransport, header_get};
use topfetch::oauth::{
    AuthSettings, AuthorizationSession, Authenticator, ClientCredentials, TokenExchanger,
    redirect_uri,
};
use topfetch::retry::RetryConfig;
use topfetch::store::{CredentialRecord, FileTokenStore, TokenStore};

const TOKEN_URL: &str = "https://accounts.test/api/token";
const API_BASE: &str = "https://api.test/v1";

/// Fake accounts service + Web API.
#[derive(Clone, Default)]
struct FakeSpotify {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    /// Refresh tokens the accounts service still honors.
    valid_refresh_tokens: Vec<String>,
    /// Access token the API accepts.
    valid_access_token: Option<String>,
    totals: HashMap<String, usize>,
    requests: Vec<HttpRequest>,
}

impl FakeSpotify {
    fn new(refresh_tokens: &[&str], tracks: usize, artists: usize) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.valid_refresh_tokens = refresh_tokens.iter().map(|s| s.to_string()).collect();
            state.totals.insert("tracks".into(), tracks);
            state.totals.insert("artists".into(), artists);
        }
        fake
    }

    fn api_requests(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.url.starts_with(API_BASE))
            .count()
    }

    fn revoke_access(&self) {
        self.state.lock().unwrap().valid_access_token = None;
    }

    fn token(state: &mut FakeState, request: &HttpRequest) -> HttpResponse {
        let form: HashMap<String, String> = url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect();

        match form.get("grant_type").map(String::as_str) {
            Some("refresh_token") => {
                let presented = form.get("refresh_token").cloned().unwrap_or_default();
                if !state.valid_refresh_tokens.contains(&presented) {
                    return json_response(400, json!({ "error": "invalid_grant" }));
                }
                state.valid_access_token = Some("refreshed-access".into());
                // Spotify usually omits refresh_token on refresh.
                json_response(
                    200,
                    json!({ "access_token": "refreshed-access", "token_type": "Bearer", "expires_in": 3600 }),
                )
            }
            Some("authorization_code") => {
                if form.get("code").map(String::as_str) != Some("good-code") {
                    return json_response(400, json!({ "error": "invalid_grant" }));
                }
                state.valid_access_token = Some("interactive-access".into());
                state.valid_refresh_tokens.push("interactive-refresh".into());
                json_response(
                    200,
                    json!({
                        "access_token": "interactive-access",
                        "refresh_token": "interactive-refresh",
                        "expires_in": 3600,
                        "scope": "user-top-read user-read-private user-read-email"
                    }),
                )
            }
            _ => json_response(400, json!({ "error": "unsupported_grant_type" })),
        }
    }

    fn top_items(state: &FakeState, request: &HttpRequest) -> HttpResponse {
        let expected = state
            .valid_access_token
            .as_ref()
            .map(|t| format!("Bearer {t}"));
        if header_get(&request.headers, "authorization") != expected.as_deref() {
            return json_response(401, json!({ "error": { "status": 401 } }));
        }

        let url = url::Url::parse(&request.url).unwrap();
        let kind = url.path().rsplit('/').next().unwrap_or_default().to_string();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let limit: usize = query["limit"].parse().unwrap();
        let offset: usize = query["offset"].parse().unwrap();
        let total = state.totals.get(&kind).copied().unwrap_or(0);

        let items: Vec<Value> = (offset..(offset + limit).min(total))
            .map(|i| json!({ "id": format!("{kind}-{i}"), "rank": i }))
            .collect();
        json_response(200, json!({ "items": items, "total": total, "limit": limit, "offset": offset }))
    }
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: serde_json::to_vec(&body).unwrap(),
    }
}

#[async_trait]
impl HttpTransport for FakeSpotify {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if request.url == TOKEN_URL {
            Ok(Self::token(&mut state, &request))
        } else if request.url.starts_with(API_BASE) {
            Ok(Self::top_items(&state, &request))
        } else {
            Err(HttpError::Transport(format!("unexpected URL {}", request.url)))
        }
    }
}

fn authenticator(fake: &FakeSpotify, store: Arc<dyn TokenStore>) -> Authenticator {
    let exchanger = TokenExchanger::new(
        Arc::new(fake.clone()),
        ClientCredentials::new("client-id", "client-secret"),
        "http://127.0.0.1:8888/callback",
    )
    .with_token_url(TOKEN_URL);

    let settings = AuthSettings {
        callback_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        callback_timeout: Some(Duration::from_secs(10)),
        retry: RetryConfig::disabled(),
        ..AuthSettings::default()
    };

    Authenticator::new(exchanger, store, settings)
}

/// Prompt that "clicks approve" by requesting the callback with `query`.
fn browser(query: &'static str) -> impl Fn(&AuthorizationSession) + Send + Sync {
    move |session| {
        assert!(session.url.contains("show_dialog=true"));
        let url = format!("{}?{query}", redirect_uri(session.listening_on));
        tokio::spawn(async move {
            let _ = reqwest::get(url).await;
        });
    }
}

fn never_prompt() -> impl Fn(&AuthorizationSession) + Send + Sync {
    |_| panic!("interactive flow should not run")
}

#[tokio::test]
async fn refresh_then_fetch_everything() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
    store
        .save(&CredentialRecord::new(
            "expired",
            Some("stored-refresh".into()),
            Some(3600),
            0,
        ))
        .unwrap();

    let fake = FakeSpotify::new(&["stored-refresh"], 237, 42);
    let auth = authenticator(&fake, store.clone());

    let token = auth.access_token(&never_prompt()).await.unwrap();
    assert_eq!(token, "refreshed-access");

    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.access_token, "refreshed-access");
    assert_eq!(persisted.refresh_token.as_deref(), Some("stored-refresh"));

    let client = TopItemsClient::new(Arc::new(fake.clone()), token).with_base_url(API_BASE);

    let tracks = client
        .fetch_all::<Value>(
            &FetchRequest::new(ItemType::Tracks, TimeRange::ShortTerm).with_concurrency(3),
            None,
        )
        .await
        .unwrap();
    assert_eq!(tracks.items.len(), 237);
    assert!(tracks.is_complete());
    assert_eq!(tracks.items[0]["id"], "tracks-0");

    let artists = client
        .fetch_all::<Value>(&FetchRequest::new(ItemType::Artists, TimeRange::ShortTerm), None)
        .await
        .unwrap();
    assert_eq!(artists.items.len(), 42);

    // 5 pages of tracks + 1 page of artists
    assert_eq!(fake.api_requests(), 6);
}

#[tokio::test]
async fn revoked_refresh_token_falls_back_to_browser_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
    store
        .save(&CredentialRecord::new("old", Some("revoked".into()), None, 0))
        .unwrap();

    let fake = FakeSpotify::new(&[], 12, 0);
    let auth = authenticator(&fake, store.clone());

    let token = auth.access_token(&browser("code=good-code")).await.unwrap();
    assert_eq!(token, "interactive-access");

    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.refresh_token.as_deref(), Some("interactive-refresh"));
    assert!(persisted.scope.unwrap().contains("user-top-read"));

    // A later run refreshes silently with the newly stored token.
    let token = auth.access_token(&never_prompt()).await.unwrap();
    assert_eq!(token, "refreshed-access");

    let client = TopItemsClient::new(Arc::new(fake.clone()), token).with_base_url(API_BASE);
    let outcome = client
        .fetch_all::<Value>(&FetchRequest::new(ItemType::Tracks, TimeRange::LongTerm), None)
        .await
        .unwrap();
    assert_eq!(outcome.items.len(), 12);
}

#[tokio::test]
async fn revoked_access_token_fails_fetch_as_unauthorized() {
    let store: Arc<dyn TokenStore> = Arc::new(topfetch::store::MemoryTokenStore::new());
    let fake = FakeSpotify::new(&["rt"], 300, 0);
    let auth = Authenticator::new(
        TokenExchanger::new(
            Arc::new(fake.clone()),
            ClientCredentials::new("client-id", "client-secret"),
            "http://127.0.0.1:8888/callback",
        )
        .with_token_url(TOKEN_URL),
        store,
        AuthSettings {
            refresh_token_override: Some("rt".into()),
            retry: RetryConfig::disabled(),
            ..AuthSettings::default()
        },
    );

    let token = auth.access_token(&never_prompt()).await.unwrap();
    fake.revoke_access();

    let client = TopItemsClient::new(Arc::new(fake.clone()), token).with_base_url(API_BASE);
    let err = client
        .fetch_all::<Value>(&FetchRequest::new(ItemType::Tracks, TimeRange::MediumTerm), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Unauthorized));
    assert_eq!(fake.api_requests(), 1);
}

#[tokio::test]
async fn denied_consent_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("tokens.json")));
    let fake = FakeSpotify::new(&[], 0, 0);
    let auth = authenticator(&fake, store.clone());

    let err = auth
        .access_token(&browser("error=access_denied"))
        .await
        .unwrap_err();

    assert!(err.is_flow_error());
    assert!(store.load().unwrap().is_none());
}
