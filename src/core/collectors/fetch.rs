use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};

use crate::core::collectors::CollectorError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build the single HTTP client a collector owns for its lifetime.
pub fn build_http_client(timeout: Duration) -> Result<Client, CollectorError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("costguard/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Validate that a resolved endpoint URL is safe to send credentials to.
///
/// HTTPS is required. Plain HTTP is only accepted for loopback hosts, which
/// covers local proxies and mock servers.
pub fn validate_endpoint(url: &str, collector_name: &str) -> Result<Url, CollectorError> {
    let parsed = Url::parse(url).map_err(|e| {
        CollectorError::Config(format!("{collector_name}: invalid endpoint '{url}': {e}"))
    })?;

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback(&parsed) => Ok(parsed),
        _ => Err(CollectorError::Config(format!(
            "{collector_name}: endpoint must use HTTPS, got: {url}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
    )
}

/// Turn a non-success response into a typed error, keeping the provider's
/// own message when the body carries one.
pub async fn check_status(response: Response) -> Result<Response, CollectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or(body);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => CollectorError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollectorError::Auth(message),
        _ => CollectorError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

/// Pull a message out of the common JSON error envelopes:
/// `{"error": {"message": ..}}`, `{"message": ..}` and `{"Message": ..}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("Message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
