// Token refresh call

use reqwest::Method;

use super::types::{RefreshRequest, RefreshResponse, RefreshedTokens};
use crate::error::ClientError;
use crate::request::RequestBody;
use crate::transport::{prepare_headers, OutboundRequest, Transport};

/// Exchange a refresh token for a new access token
///
/// Goes straight to the transport: the refresh call never carries the access
/// token and is never itself intercepted or retried.
pub async fn exchange_refresh_token(
    transport: &dyn Transport,
    refresh_path: &str,
    refresh_token: &str,
) -> Result<RefreshedTokens, ClientError> {
    tracing::info!("Refreshing access token...");

    let body = serde_json::to_value(RefreshRequest {
        refresh_token: refresh_token.to_string(),
    })
    .map_err(|e| ClientError::Transport {
        kind: crate::error::FailureKind::NotSent,
        message: format!("Failed to serialize refresh request: {}", e),
    })?;
    let body = RequestBody::Json(body);

    let request = OutboundRequest {
        method: Method::POST,
        path: refresh_path.to_string(),
        query: Vec::new(),
        headers: prepare_headers(None, &body)?,
        body,
        timeout: None,
    };

    let response = transport.execute(request).await?;

    if !(200..300).contains(&response.status) {
        let error_text = String::from_utf8_lossy(&response.body).into_owned();
        tracing::error!(
            status = response.status,
            body = %error_text,
            "Token refresh failed"
        );
        return Err(ClientError::Status {
            status: response.status,
            body: error_text,
        });
    }

    let data: RefreshResponse = serde_json::from_slice(&response.body)
        .map_err(|e| ClientError::InvalidRefreshResponse(e.to_string()))?;

    if data.access_token.is_empty() {
        return Err(ClientError::InvalidRefreshResponse(
            "response does not contain accessToken".to_string(),
        ));
    }

    tracing::info!(
        rotated = data.refresh_token.is_some(),
        "Access token refreshed"
    );

    Ok(RefreshedTokens {
        access_token: data.access_token,
        refresh_token: data.refresh_token.filter(|t| !t.is_empty()),
    })
}
