// Request and response types exposed to callers of the API client

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// One file or field of a multipart upload
///
/// Kept as raw bytes so the form can be rebuilt when the request is replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub data: Bytes,
    pub file_name: Option<String>,
    pub mime: Option<String>,
}

impl MultipartPart {
    /// Plain text field
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self {
            name: name.into(),
            data: Bytes::from(value),
            file_name: None,
            mime: None,
        }
    }

    /// Binary file field
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
        }
    }
}

/// Request payload
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Content-Type (with boundary) is set by the transport
    Multipart(Vec<MultipartPart>),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// A call against the PawCare REST API
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/pets/12`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Per-call override of the transport's request timeout
    pub timeout: Option<Duration>,
    /// Set once the request has been replayed after a session refresh
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::Transport {
            kind: crate::error::FailureKind::NotSent,
            message: format!("Failed to serialize request body: {}", e),
        })?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::get("/pets")
            .query("species", "dog")
            .query("page", "2")
            .timeout(Duration::from_secs(90));

        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "/pets");
        assert_eq!(
            req.query,
            vec![
                ("species".to_string(), "dog".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
        assert_eq!(req.timeout, Some(Duration::from_secs(90)));
        assert!(!req.retried);
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn test_json_body() {
        let req = ApiRequest::post("/pets")
            .json(&json!({"name": "Bori", "species": "cat"}))
            .unwrap();
        assert_eq!(
            req.body,
            RequestBody::Json(json!({"name": "Bori", "species": "cat"}))
        );
        assert!(!req.body.is_multipart());
    }

    #[test]
    fn test_multipart_body() {
        let req = ApiRequest::post("/pets/3/photo").multipart(vec![
            MultipartPart::text("caption", "sleepy"),
            MultipartPart::file("photo", "bori.png", "image/png", vec![0x89, 0x50]),
        ]);
        assert!(req.body.is_multipart());
        if let RequestBody::Multipart(parts) = &req.body {
            assert_eq!(parts[0].file_name, None);
            assert_eq!(parts[1].file_name.as_deref(), Some("bori.png"));
            assert_eq!(parts[1].data.as_ref(), &[0x89, 0x50]);
        }
    }

    #[test]
    fn test_response_json_decode() {
        #[derive(Deserialize)]
        struct Pet {
            name: String,
        }

        let response = ApiResponse {
            status: 200,
            body: Bytes::from_static(br#"{"name":"Bori"}"#),
        };
        let pet: Pet = response.json().unwrap();
        assert_eq!(pet.name, "Bori");

        let bad = ApiResponse {
            status: 200,
            body: Bytes::from_static(b"not json"),
        };
        assert!(matches!(bad.json::<Pet>(), Err(ClientError::Decode(_))));
        assert_eq!(bad.text(), "not json");
    }
}
