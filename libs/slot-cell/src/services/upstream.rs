use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::UpstreamSettings;
use shared_utils::{Backoff, RetryPolicy};

use crate::error::SlotError;

/// JSON-over-HTTP client shared by the provider and the resolvers.
///
/// Connection failures, timeouts and non-2xx statuses are retried with a
/// fixed delay. A 2xx body that is not JSON is reported as malformed and
/// never retried.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, SlotError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| SlotError::Routing(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(settings.max_retries, Backoff::Fixed(settings.retry_delay)),
        })
    }

    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// POSTs `body` verbatim and decodes the response as JSON.
    pub async fn post_json(
        &self,
        upstream: &'static str,
        url: &str,
        headers: HeaderMap,
        body: String,
    ) -> Result<Value, SlotError> {
        debug!("Making request to {} ({})", url, upstream);

        self.retry
            .run(
                |attempt| {
                    let request = self
                        .client
                        .post(url)
                        .headers(headers.clone())
                        .body(body.clone());
                    async move {
                        let response = request.send().await.map_err(|e| {
                            warn!("{} request attempt {} failed: {}", upstream, attempt, e);
                            SlotError::UpstreamUnavailable {
                                upstream,
                                reason: e.to_string(),
                            }
                        })?;

                        let status = response.status();
                        if !status.is_success() {
                            let error_text = response.text().await.unwrap_or_default();
                            error!("{} API error ({}): {}", upstream, status, error_text);
                            return Err(SlotError::UpstreamUnavailable {
                                upstream,
                                reason: format!("status {}: {}", status, error_text),
                            });
                        }

                        let text = response.text().await.map_err(|e| {
                            SlotError::UpstreamUnavailable {
                                upstream,
                                reason: e.to_string(),
                            }
                        })?;
                        serde_json::from_str(&text).map_err(|e| {
                            error!("{} returned non-JSON body: {}", upstream, e);
                            SlotError::InvalidResponse {
                                upstream,
                                reason: format!("body is not JSON: {}", e),
                            }
                        })
                    }
                },
                SlotError::is_retryable,
            )
            .await
    }
}
