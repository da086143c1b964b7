// In-memory backend for protocol tests

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{
    CredentialStore, KeyValueStore, MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use crate::error::{ClientError, FailureKind};
use crate::http_client::{ApiClient, ClientSettings};
use crate::navigation::tests::RecordingNavigator;
use crate::navigation::Redirector;
use crate::notify::NotificationCenter;
use crate::request::RequestBody;
use crate::transport::{OutboundRequest, Transport, TransportResponse};

/// What the fake refresh endpoint does
#[derive(Clone, Debug)]
pub(crate) enum RefreshBehavior {
    /// Issue this access token
    Issue(String),
    /// Answer 401
    Reject,
    /// Drop the connection
    Unreachable,
}

/// One request as the backend saw it
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Seen {
    pub path: String,
    pub bearer: Option<String>,
    pub content_type: Option<String>,
}

/// Fake PawCare backend
///
/// - `/auth/refresh` follows `refresh`, after `refresh_delay`
/// - `/auth/login` accepts password `hunter2`
/// - `/broken` always answers 500
/// - `/always-401` always answers 401
/// - `/slow...` checks the bearer only after 200 ms
/// - anything else answers 200 if the bearer matches the current token
pub(crate) struct ScriptedBackend {
    pub valid_token: Mutex<String>,
    pub refresh: Mutex<RefreshBehavior>,
    pub refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub seen: Mutex<Vec<Seen>>,
}

impl ScriptedBackend {
    pub(crate) fn new(valid_token: &str, refresh: RefreshBehavior) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh: Mutex::new(refresh),
            refresh_delay: Duration::from_millis(50),
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Paths replayed with `token`, in the order they reached the backend
    pub(crate) fn paths_with_token(&self, token: &str) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter(|s| s.bearer.as_deref() == Some(token))
            .map(|s| s.path)
            .collect()
    }

    fn respond(status: u16, body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status,
            body: Bytes::from(body.to_string()),
        }
    }
}

#[async_trait]
impl Transport for ScriptedBackend {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        let bearer = request.bearer().map(str::to_string);
        self.seen.lock().unwrap().push(Seen {
            path: request.path.clone(),
            bearer: bearer.clone(),
            content_type: request
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        match request.path.as_str() {
            "/auth/refresh" => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.refresh_delay).await;
                let behavior = self.refresh.lock().unwrap().clone();
                match behavior {
                    RefreshBehavior::Issue(token) => {
                        *self.valid_token.lock().unwrap() = token.clone();
                        Ok(Self::respond(200, json!({ "accessToken": token })))
                    }
                    RefreshBehavior::Reject => {
                        Ok(Self::respond(401, json!({ "message": "refresh token expired" })))
                    }
                    RefreshBehavior::Unreachable => Err(ClientError::Transport {
                        kind: FailureKind::NoResponse,
                        message: "connection reset".to_string(),
                    }),
                }
            }
            "/auth/login" => {
                let password = match request.body {
                    RequestBody::Json(ref v) => v["password"].as_str().map(str::to_string),
                    _ => None,
                };
                if password.as_deref() == Some("hunter2") {
                    let token = self.valid_token.lock().unwrap().clone();
                    Ok(Self::respond(
                        200,
                        json!({
                            "accessToken": token,
                            "refreshToken": "refresh-login",
                            "user": { "id": 42, "email": "mina@pawcare.dev", "nickname": "mina" }
                        }),
                    ))
                } else {
                    Ok(Self::respond(401, json!({ "message": "bad credentials" })))
                }
            }
            "/broken" => Ok(Self::respond(500, json!({ "message": "boom" }))),
            "/always-401" => Ok(Self::respond(401, json!({ "message": "nope" }))),
            path => {
                if path.starts_with("/slow") {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                let valid = self.valid_token.lock().unwrap().clone();
                if bearer.as_deref() == Some(valid.as_str()) {
                    Ok(Self::respond(200, json!({ "path": path })))
                } else {
                    Ok(Self::respond(401, json!({ "message": "token expired" })))
                }
            }
        }
    }
}

/// Client wired to `backend` with an in-memory store
pub(crate) struct Harness {
    pub client: ApiClient,
    pub store: Arc<MemoryStore>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub(crate) fn new(
        backend: Arc<ScriptedBackend>,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Self {
        Self::with_settings(backend, access_token, refresh_token, ClientSettings::default())
    }

    pub(crate) fn with_settings(
        backend: Arc<ScriptedBackend>,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        settings: ClientSettings,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        if let Some(token) = access_token {
            store.set(ACCESS_TOKEN_KEY, token).unwrap();
        }
        if let Some(token) = refresh_token {
            store.set(REFRESH_TOKEN_KEY, token).unwrap();
        }

        let navigator = Arc::new(RecordingNavigator::default());
        let client = ApiClient::new(
            backend,
            CredentialStore::new(store.clone()),
            Arc::new(NotificationCenter::new()),
            Redirector::new(navigator.clone()),
            settings,
        );

        Self {
            client,
            store,
            navigator,
        }
    }

    pub(crate) fn stored(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap()
    }
}
