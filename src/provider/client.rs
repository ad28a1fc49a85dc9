//! Rate-limited HTTP client for the scheduling provider
//!
//! Every request passes through the shared [`RequestLimiter`] and is retried
//! according to the failure kind:
//! - 429: the server's `Retry-After`, else 5s, 10s, 20s
//! - timeouts, transport errors and 5xx: 2s, 4s, 8s
//! - 404: an empty result, never retried
//! - any other 4xx: returned immediately
//!
//! After the last attempt the caller gets `FetchError::MaxRetriesExceeded`
//! and is expected to skip the item.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER},
    Client, StatusCode,
};
use std::sync::Arc;

use super::limiter::RequestLimiter;
use super::wire::{self, NamedAttributes, PlanAttributes, PlanTimeAttributes, TeamMemberAttributes};
use super::{FetchResult, NamedResource, PlanSource, RemotePlan};
use crate::config::ProviderConfig;
use crate::metrics;
use crate::models::{Assignment, ServiceTime};
use crate::utils::error::FetchError;
use crate::utils::retry::{parse_retry_after, RetryConfig};

/// Header carrying the provider API version
const API_VERSION_HEADER: &str = "x-pco-api-version";

/// Page size for list endpoints
const PAGE_SIZE: u32 = 100;

/// HTTP client for the provider API
pub struct ProviderClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// API root every path is appended to
    base_url: String,

    /// Basic-auth credentials
    credentials: Option<(String, String)>,

    /// Request quota, shareable between clients
    limiter: Arc<RequestLimiter>,

    /// Backoff after 429 without Retry-After
    rate_limited_retry: RetryConfig,

    /// Backoff after timeouts, transport errors and 5xx
    transient_retry: RetryConfig,
}

impl ProviderClient {
    /// Create a client from provider settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &ProviderConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(&config.api_version) {
            Ok(value) => {
                headers.insert(API_VERSION_HEADER, value);
            }
            Err(_) => {
                tracing::warn!(api_version = %config.api_version, "Ignoring invalid API version header value");
            }
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let limiter = RequestLimiter::new(config.rate_limit, config.rate_window());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config
                .credentials()
                .map(|(id, secret)| (id.to_string(), secret.to_string())),
            limiter: Arc::new(limiter),
            rate_limited_retry: config.rate_limited_retry(),
            transient_retry: config.transient_retry(),
        })
    }

    /// Point the client at another API root (mock servers in tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Share a limiter with other clients
    pub fn with_limiter(mut self, limiter: Arc<RequestLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Override both backoff schedules
    pub fn with_retry(mut self, rate_limited: RetryConfig, transient: RetryConfig) -> Self {
        self.rate_limited_retry = rate_limited;
        self.transient_retry = transient;
        self
    }

    pub fn limiter(&self) -> &Arc<RequestLimiter> {
        &self.limiter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a GET request with quota enforcement and retries
    ///
    /// `path` is appended to the API root. Returns `Ok(None)` for 404.
    ///
    /// # Errors
    ///
    /// - `FetchError::ClientError` for 4xx other than 404 and 429
    /// - `FetchError::MaxRetriesExceeded` once the attempt budget is spent
    /// - `FetchError::InvalidUrl` if the URL cannot be built
    pub async fn request(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<String>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let max_attempts = self.rate_limited_retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            self.limiter.acquire().await;

            let mut request = self.client.get(&url).query(params);
            if let Some((id, secret)) = &self.credentials {
                request = request.basic_auth(id, Some(secret));
            }

            let (error, delay) = match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.text().await?;
                        metrics::record_provider_request("ok");
                        return Ok(Some(body));
                    }

                    if status == StatusCode::NOT_FOUND {
                        tracing::debug!(path, "Provider returned 404, treating as empty");
                        metrics::record_provider_request("not_found");
                        return Ok(None);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let delay = response
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after)
                            .map(|d| self.rate_limited_retry.cap(d))
                            .unwrap_or_else(|| self.rate_limited_retry.delay_after(attempt));
                        (FetchError::RateLimited, delay)
                    } else if status.is_server_error() {
                        (
                            FetchError::ServerError(status.as_u16()),
                            self.transient_retry.delay_after(attempt),
                        )
                    } else {
                        tracing::warn!(path, status = status.as_u16(), "Provider rejected request");
                        metrics::record_provider_request("client_error");
                        return Err(FetchError::ClientError(status.as_u16()));
                    }
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::InvalidUrl(e.to_string()));
                }
                Err(e) if e.is_timeout() => (FetchError::Timeout, self.transient_retry.delay_after(attempt)),
                Err(e) => (FetchError::Http(e), self.transient_retry.delay_after(attempt)),
            };

            if self.rate_limited_retry.has_attempts_after(attempt) {
                tracing::warn!(
                    path,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Provider request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        metrics::record_provider_request("exhausted");
        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        tracing::warn!(path, attempts = max_attempts, last = %last, "Provider request gave up");

        Err(FetchError::MaxRetriesExceeded {
            attempts: max_attempts,
            last,
        })
    }

    async fn fetch_document<A>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> FetchResult<Option<wire::Document<A>>>
    where
        A: for<'de> serde::Deserialize<'de> + Default,
    {
        match self.request(path, params).await? {
            Some(body) => wire::parse_document(&body).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_named(&self, path: &str) -> FetchResult<Vec<NamedResource>> {
        let params = [("per_page", PAGE_SIZE.to_string())];
        let Some(doc) = self.fetch_document::<NamedAttributes>(path, &params).await? else {
            return Ok(Vec::new());
        };

        Ok(doc
            .data
            .into_iter()
            .map(|item| NamedResource {
                name: item.attributes.display_name().unwrap_or_default().to_string(),
                id: item.id,
            })
            .collect())
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[async_trait]
impl PlanSource for ProviderClient {
    async fn future_plans(&self, group_id: &str, limit: u32) -> FetchResult<Vec<RemotePlan>> {
        let path = format!("/service_types/{group_id}/plans");
        let params = [
            ("filter", "future".to_string()),
            ("order", "sort_date".to_string()),
            ("per_page", limit.to_string()),
        ];
        let Some(doc) = self.fetch_document::<PlanAttributes>(&path, &params).await? else {
            return Ok(Vec::new());
        };

        Ok(doc
            .data
            .into_iter()
            .take(limit as usize)
            .map(|item| {
                let PlanAttributes { title, dates, .. } = item.attributes;
                let title = if title.trim().is_empty() { dates.clone() } else { title };
                RemotePlan {
                    id: item.id,
                    title,
                    dates,
                }
            })
            .collect())
    }

    async fn plan_times(&self, group_id: &str, plan_id: &str) -> FetchResult<Vec<ServiceTime>> {
        let path = format!("/service_types/{group_id}/plans/{plan_id}/plan_times");
        Ok(self
            .fetch_document::<PlanTimeAttributes>(&path, &[])
            .await?
            .map(wire::service_times_from_document)
            .unwrap_or_default())
    }

    async fn plan_assignments(
        &self,
        group_id: &str,
        plan_id: &str,
    ) -> FetchResult<Vec<Assignment>> {
        let path = format!("/service_types/{group_id}/plans/{plan_id}/team_members");
        let params = [
            ("include", "person,team_position".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
        ];
        Ok(self
            .fetch_document::<TeamMemberAttributes>(&path, &params)
            .await?
            .map(wire::assignments_from_document)
            .unwrap_or_default())
    }

    async fn teams(&self, group_id: &str) -> FetchResult<Vec<NamedResource>> {
        self.fetch_named(&format!("/service_types/{group_id}/teams"))
            .await
    }

    async fn team_positions(
        &self,
        group_id: &str,
        team_id: &str,
    ) -> FetchResult<Vec<NamedResource>> {
        self.fetch_named(&format!(
            "/service_types/{group_id}/teams/{team_id}/team_positions"
        ))
        .await
    }
}

/// Retry schedule with the given attempt budget and a 1ms backoff
pub fn immediate_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 1,
        backoff_multiplier: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_client_trims_base_url() {
        let config = ProviderConfig {
            base_url: "http://localhost:9999/services/v2/".to_string(),
            ..Default::default()
        };
        let client = ProviderClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9999/services/v2");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ProviderConfig {
            client_id: Some("app-id".to_string()),
            client_secret: Some("top-secret".to_string()),
            ..Default::default()
        };
        let client = ProviderClient::new(&config).unwrap();
        let debug = format!("{client:?}");

        assert!(debug.contains("authenticated: true"));
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn test_immediate_retry_keeps_attempts() {
        let retry = immediate_retry(3);
        assert!(retry.has_attempts_after(1));
        assert_eq!(retry.delay_after(2), Duration::from_millis(1));
    }
}
