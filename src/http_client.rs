use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::auth::{
    exchange_refresh_token, CredentialStore, RefreshCoordinator, SessionState, Ticket,
};
use crate::error::{ClientError, FailureKind, Result};
use crate::navigation::{Redirector, LOGIN_ROUTE};
use crate::notify::{
    Level, Notification, NotificationCenter, SESSION_EXPIRED_KEY, SESSION_EXPIRED_MESSAGE,
};
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::{prepare_headers, OutboundRequest, Transport};

/// Tunables for the session-recovery protocol
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Refresh endpoint path
    pub refresh_path: String,
    /// Login endpoint path
    pub login_path: String,
    /// How long a queued request waits for the in-flight refresh
    pub queue_wait_timeout: Duration,
    /// Delay before navigating to login after the session expires
    pub redirect_delay: Duration,
    /// How long the session-expired notification stays up
    pub notification_duration: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            refresh_path: "/auth/refresh".to_string(),
            login_path: "/auth/login".to_string(),
            queue_wait_timeout: Duration::from_secs(30),
            redirect_delay: Duration::from_millis(1200),
            notification_duration: Duration::from_millis(3000),
        }
    }
}

/// Authenticated client for the PawCare API
///
/// Attaches the stored access token to every call. When calls fail with 401,
/// one of them refreshes the token while the rest wait for it, then each
/// replays once with the new token.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    pub(crate) credentials: CredentialStore,
    refresh: RefreshCoordinator,
    pub(crate) notifications: Arc<NotificationCenter>,
    pub(crate) redirector: Redirector,
    pub(crate) settings: ClientSettings,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        notifications: Arc<NotificationCenter>,
        redirector: Redirector,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresh: RefreshCoordinator::new(),
            notifications,
            redirector,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn redirector(&self) -> &Redirector {
        &self.redirector
    }

    /// Where the session stands right now
    pub fn session_state(&self) -> Result<SessionState> {
        if self.refresh.is_refreshing() {
            return Ok(SessionState::Refreshing);
        }
        match self.credentials.access_token()? {
            Some(_) => Ok(SessionState::Active),
            None => Ok(SessionState::Expired),
        }
    }

    /// Send a request, recovering transparently from an expired access token
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let span = tracing::debug_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path
        );

        self.send_inner(request).instrument(span).await
    }

    async fn send_inner(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = self.credentials.access_token()?;
        match self.dispatch(&request, token.as_deref()).await {
            Err(err) if err.is_unauthorized() => {
                self.recover(request, token.as_deref(), err).await
            }
            other => other,
        }
    }

    /// One round-trip; any non-2xx becomes an error
    pub(crate) async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse> {
        let outbound = OutboundRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            headers: prepare_headers(token, &request.body)?,
            body: request.body.clone(),
            timeout: request.timeout,
        };

        tracing::debug!(retried = request.retried, "Sending HTTP request");

        let response = match self.transport.execute(outbound).await {
            Ok(response) => response,
            Err(err) => {
                log_failure(request, &err);
                return Err(err);
            }
        };

        if (200..300).contains(&response.status) {
            return Ok(ApiResponse {
                status: response.status,
                body: response.body,
            });
        }

        let err = ClientError::Status {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        };
        if !err.is_unauthorized() {
            log_failure(request, &err);
        }
        Err(err)
    }

    /// Handle a 401 for a request sent with `sent_token`
    async fn recover(
        &self,
        mut request: ApiRequest,
        sent_token: Option<&str>,
        original: ClientError,
    ) -> Result<ApiResponse> {
        if request.retried {
            tracing::warn!("Replayed request rejected again, giving up");
            return Err(original);
        }

        if is_same_path(&request.path, &self.settings.refresh_path) {
            tracing::warn!("Refresh endpoint rejected the session");
            return Err(self.expire_session(original));
        }

        // A refresh settled while this request was in flight
        if let Some(current) = self.credentials.access_token()? {
            if sent_token != Some(current.as_str()) {
                tracing::debug!("Access token already renewed, replaying");
                request.retried = true;
                return self.dispatch(&request, Some(&current)).await;
            }
        }

        match self.refresh.acquire() {
            Ticket::Follower(rx) => {
                let token = match tokio::time::timeout(self.settings.queue_wait_timeout, rx).await
                {
                    Ok(Ok(Ok(token))) => token,
                    Ok(Ok(Err(err))) => return Err(err),
                    Ok(Err(_)) => return Err(ClientError::RefreshAbandoned),
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = self.settings.queue_wait_timeout.as_millis() as u64,
                            "Gave up waiting for session refresh"
                        );
                        return Err(ClientError::RefreshTimeout(self.settings.queue_wait_timeout));
                    }
                };
                request.retried = true;
                self.dispatch(&request, Some(&token)).await
            }

            Ticket::Leader(lease) => {
                let refresh_token = match self.credentials.refresh_token() {
                    Ok(Some(token)) => token,
                    Ok(None) => {
                        tracing::warn!("No refresh token stored, session cannot be renewed");
                        lease.settle(Err(original.clone()));
                        return Err(self.expire_session(original));
                    }
                    Err(e) => {
                        let err = ClientError::from(e);
                        lease.settle(Err(err.clone()));
                        return Err(self.expire_session(err));
                    }
                };

                request.retried = true;

                let refreshed = exchange_refresh_token(
                    self.transport.as_ref(),
                    &self.settings.refresh_path,
                    &refresh_token,
                )
                .await
                .and_then(|tokens| {
                    if self.credentials.store_refreshed(&refresh_token, &tokens)? {
                        Ok(Some(tokens.access_token))
                    } else {
                        Ok(None)
                    }
                });

                match refreshed {
                    Ok(Some(token)) => {
                        lease.settle(Ok(token.clone()));
                        self.dispatch(&request, Some(&token)).await
                    }
                    Ok(None) => {
                        tracing::info!("Session ended during refresh, discarding new token");
                        lease.settle(Err(ClientError::SessionEnded));
                        Err(ClientError::SessionEnded)
                    }
                    Err(err) => {
                        lease.settle(Err(err.clone()));
                        Err(self.expire_session(err))
                    }
                }
            }
        }
    }

    /// Terminal path: clear credentials, tell the user once, send them to login
    fn expire_session(&self, err: ClientError) -> ClientError {
        if let Err(e) = self.credentials.clear() {
            tracing::error!(error = %e, "Failed to clear stored credentials");
        }

        self.notifications.show(Notification {
            key: SESSION_EXPIRED_KEY.to_string(),
            level: Level::Warning,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            duration: self.settings.notification_duration,
        });

        self.redirector
            .schedule(LOGIN_ROUTE, self.settings.redirect_delay);

        err
    }
}

/// Compare API paths ignoring the leading slash the transport adds anyway
fn is_same_path(a: &str, b: &str) -> bool {
    a.trim_start_matches('/') == b.trim_start_matches('/')
}

/// One-line classification of a failure that is passed straight to the caller
fn log_failure(request: &ApiRequest, err: &ClientError) {
    match err.kind() {
        FailureKind::Response => tracing::warn!(
            error_kind = err.kind().as_str(),
            status = err.status(),
            path = %request.path,
            "Server rejected request"
        ),
        FailureKind::NoResponse => tracing::warn!(
            error_kind = err.kind().as_str(),
            error = %err,
            path = %request.path,
            "No response received"
        ),
        FailureKind::NotSent => tracing::error!(
            error_kind = err.kind().as_str(),
            error = %err,
            path = %request.path,
            "Request was never sent"
        ),
    }
}
