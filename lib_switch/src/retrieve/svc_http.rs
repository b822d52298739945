//! # Service HTTP Client
//!
//! Asynchronous HTTP client for calling sibling platform services (issuer
//! gateways, settlement, fraud scoring). Built on `reqwest_middleware` with
//! exponential-backoff retries for transient failures, bearer-token
//! authentication, and a per-request correlation id header so a transaction
//! can be traced across service hops.

use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::utils::new_correlation_id;

/// Header carrying the platform-wide correlation id of a request chain.
pub const CORRELATION_HEADER: &str = "x-swx-correlation-id";

/// A standardized container for service responses: the deserialized body on
/// success, the raw error body otherwise, plus transaction metadata.
#[derive(Debug)]
pub struct SvcResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The correlation id sent with the request.
    pub correlation_id: String,
}

/// A middleware-enabled client bound to one service base URL.
pub struct SvcClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl SvcClient {
    /// Creates a client with the platform retry policy (exponential backoff,
    /// up to 3 transient retries). `base_url` must be absolute.
    pub fn new(base_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    /// Performs a request against `path` relative to the base URL.
    ///
    /// Handles URL joining, bearer authentication, correlation id injection,
    /// and JSON serialization both ways. Non-2xx statuses are not errors:
    /// the caller inspects [`SvcResponse::success`] and the error body.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<SvcResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path)?;
        let correlation_id = new_correlation_id();
        let mut req = self
            .inner
            .request(method, full_url)
            .header(CORRELATION_HEADER, &correlation_id);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();

        if success {
            let data = response.json::<T>().await?;
            Ok(SvcResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
                correlation_id,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(SvcResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
                correlation_id,
            })
        }
    }

    /// Convenience GET returning a deserialized body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<SvcResponse<T>> {
        self.request::<T, ()>(Method::GET, path, None, None).await
    }

    /// Convenience POST with a JSON body.
    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> anyhow::Result<SvcResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.request(Method::POST, path, None, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_base_url_is_rejected() {
        assert!(SvcClient::new("not-a-url", None).is_err());
    }

    #[test]
    fn paths_join_onto_the_base_url() {
        let client = SvcClient::new("https://settlement.internal/v1/", None).expect("client");
        let joined = client.base_url.join("batches/42").expect("join");
        assert_eq!(joined.as_str(), "https://settlement.internal/v1/batches/42");
    }
}
