//! Shared reqwest plumbing for the HTTP backends.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::SourceError;
use crate::traits::SourceResult;

const USER_AGENT: &str = concat!("modpromote/", env!("CARGO_PKG_VERSION"));

/// Build a client with a per-request timeout and default headers.
pub(crate) fn build_client(
    token: Option<&str>,
    auth_scheme: &str,
    accept: &str,
    timeout: Duration,
) -> SourceResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_str(accept).map_err(|e| SourceError::Transport(e.to_string()))?,
    );
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("{} {}", auth_scheme, token))
            .map_err(|e| SourceError::Transport(format!("invalid token header: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Transport(format!("failed to create HTTP client: {e}")))
}

/// Send a request, mapping transport failures and timeouts.
pub(crate) async fn send(
    request: RequestBuilder,
    resource: &str,
    timeout: Duration,
) -> SourceResult<Response> {
    debug!(resource = %resource, "HTTP request");
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            SourceError::Timeout {
                resource: resource.to_string(),
                after_secs: timeout.as_secs(),
            }
        } else {
            SourceError::Transport(e.to_string())
        }
    })
}

/// Map a non-success status onto the error taxonomy.
///
/// Returns `Ok(None)` for 404 so callers can decide whether absence is an
/// answer or an error.
pub(crate) fn check_status(response: Response, resource: &str) -> SourceResult<Option<Response>> {
    let status = response.status();
    if status.is_success() {
        return Ok(Some(response));
    }
    match status {
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Unauthorized {
            resource: resource.to_string(),
            status: status.as_u16(),
        }),
        _ => Err(SourceError::Status {
            resource: resource.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
