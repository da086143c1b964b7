// Transport layer
// Turns an outbound request description into an HTTP exchange

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use std::time::Duration;

use crate::error::{ClientError, FailureKind};
use crate::request::{MultipartPart, RequestBody};

/// Fully prepared request, headers included
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// Bearer token carried in the Authorization header, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Raw response as seen by the transport, any status
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Something that can execute HTTP requests
///
/// `Err` means no response was received; any status code, including 4xx and
/// 5xx, comes back as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError>;
}

/// reqwest-backed transport with connection pooling
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a new transport for `base_url`
    pub fn new(
        base_url: &str,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn build_form(parts: &[MultipartPart]) -> Result<Form, ClientError> {
        let mut form = Form::new();
        for part in parts {
            let mut p = Part::bytes(part.data.to_vec());
            if let Some(ref file_name) = part.file_name {
                p = p.file_name(file_name.clone());
            }
            if let Some(ref mime) = part.mime {
                p = p.mime_str(mime).map_err(|e| ClientError::Transport {
                    kind: FailureKind::NotSent,
                    message: format!("Invalid MIME type {}: {}", mime, e),
                })?;
            }
            form = form.part(part.name.clone(), p);
        }
        Ok(form)
    }
}

/// Categorize a reqwest error by how far the request got
pub fn classify(e: &reqwest::Error) -> (FailureKind, &'static str) {
    if e.is_builder() {
        (FailureKind::NotSent, "builder_error")
    } else if e.is_timeout() {
        (FailureKind::NoResponse, "timeout")
    } else if e.is_connect() {
        (FailureKind::NoResponse, "connection_failed")
    } else if e.is_request() {
        (FailureKind::NoResponse, "request_error")
    } else if e.is_body() {
        (FailureKind::NoResponse, "body_error")
    } else if e.is_decode() {
        (FailureKind::NoResponse, "decode_error")
    } else {
        (FailureKind::NoResponse, "unknown")
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        let url = self.url_for(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(ref value) => builder.json(value),
            RequestBody::Multipart(ref parts) => builder.multipart(Self::build_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| {
            let (kind, error_kind) = classify(&e);
            tracing::warn!(
                error_kind = error_kind,
                error = %e,
                url = %url,
                "HTTP request error"
            );
            ClientError::Transport {
                kind,
                message: format!("{} (kind: {})", e, error_kind),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            let (kind, _) = classify(&e);
            ClientError::Transport {
                kind,
                message: format!("Failed to read response body: {}", e),
            }
        })?;

        tracing::debug!(status = status, url = %url, "Received HTTP response");

        Ok(TransportResponse { status, body })
    }
}

/// Header value for a bearer token
pub fn bearer_header(token: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| ClientError::Transport {
        kind: FailureKind::NotSent,
        message: format!("Access token is not a valid header value: {}", e),
    })
}

/// Headers for an outgoing call: bearer token plus JSON content type unless
/// the body is multipart
pub fn prepare_headers(
    token: Option<&str>,
    body: &RequestBody,
) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        headers.insert(AUTHORIZATION, bearer_header(token)?);
    }
    if !body.is_multipart() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}
