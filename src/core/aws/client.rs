use chrono::Utc;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::core::aws::credentials::Credentials;
use crate::core::aws::sigv4::{sign, SignableRequest, SigningParams};
use crate::core::collectors::fetch::{build_http_client, extract_error_message, validate_endpoint};
use crate::core::collectors::CollectorError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Signed client for AWS JSON 1.1 services (`POST /` with an `X-Amz-Target`).
pub struct AwsJsonClient {
    client: Client,
    credentials: Credentials,
    endpoint: Url,
    region: String,
    service: String,
}

impl std::fmt::Debug for AwsJsonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsJsonClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl AwsJsonClient {
    pub fn new(
        credentials: Credentials,
        endpoint: &str,
        region: &str,
        service: &str,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            credentials,
            endpoint: validate_endpoint(endpoint, service)?,
            region: region.to_string(),
            service: service.to_string(),
        })
    }

    /// Send requests somewhere other than the service's public endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, CollectorError> {
        self.endpoint = validate_endpoint(endpoint, &self.service)?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Send one signed request and decode the JSON response.
    pub async fn call<B, R>(&self, target: &str, body: &B) -> Result<R, CollectorError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let host = signed_host(&self.endpoint);
        let headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-amz-target".to_string(), target.to_string()),
        ];

        let signed = sign(
            &SignableRequest {
                method: "POST",
                host: &host,
                headers: &headers,
                payload: &payload,
            },
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: &self.service,
                time: Utc::now(),
            },
        );

        debug!(service = %self.service, target, "Calling AWS API");
        let mut request = self.client.post(self.endpoint.clone()).body(payload);
        for (name, value) in headers.iter().chain(signed.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = check_aws_status(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// `Host` as reqwest will send it: the port only appears when it is not the
/// scheme default.
fn signed_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// AWS reports throttling and auth failures as 400s with an `__type` code.
async fn check_aws_status(response: Response) -> Result<Response, CollectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let code = error_code(&body).unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or_else(|| {
        if code.is_empty() {
            body.clone()
        } else {
            code.clone()
        }
    });

    Err(
        if status == StatusCode::TOO_MANY_REQUESTS || code.contains("Throttling") {
            CollectorError::RateLimited(message)
        } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            || code.contains("AccessDenied")
            || code.contains("UnrecognizedClient")
            || code.contains("InvalidSignature")
        {
            CollectorError::Auth(message)
        } else {
            CollectorError::Api {
                status: status.as_u16(),
                message,
            }
        },
    )
}

/// Error code from `__type`, without the optional `namespace#` prefix.
fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let raw = value.get("__type")?.as_str()?;
    Some(raw.rsplit('#').next().unwrap_or(raw).to_string())
}
