//! Microsoft Graph API HTTP client with pagination and retries.

use chrono::{DateTime, Datelike, Utc};
use reqwest::{Method, StatusCode};
use retire_engine::{Lookup, Presence};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::retry::RetryConfig;
use crate::{GraphCredentials, GraphEndpoints, GraphError, GraphResult, TokenCache};

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Response wrapper for collection responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Graph API version segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    Beta,
}

impl ApiVersion {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1.0",
            Self::Beta => "beta",
        }
    }
}

/// Read directive sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Default session consistency.
    Default,
    /// `ConsistencyLevel: eventual`, required by `$search` on directory objects.
    Eventual,
}

/// Quotes a value as an `OData` string literal for `$filter`.
#[must_use]
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builds a `$search` clause on one property.
///
/// Double quotes delimit the clause, so they are stripped from the value.
#[must_use]
pub fn search_clause(property: &str, value: &str) -> String {
    format!("\"{property}:{}\"", value.replace('"', ""))
}

/// Parses a Graph timestamp.
///
/// Graph reports "never" as `0001-01-01T00:00:00Z`; that and anything
/// unparseable come back as `NotFound`.
#[must_use]
pub fn parse_timestamp(raw: Option<&str>) -> Lookup<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
        .into()
}

/// Maps a single-item GET onto presence; 404 means the item is gone.
pub(crate) fn presence<T>(result: Result<T, GraphError>) -> Result<Presence, GraphError> {
    match result {
        Ok(_) => {
            debug!("Device still present");
            Ok(Presence::Present)
        }
        Err(e) if e.status() == Some(404) => Ok(Presence::Absent),
        Err(e) => Err(e),
    }
}

/// Microsoft Graph API client.
///
/// Built once at startup and shared by all adapters.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: TokenCache,
    endpoints: GraphEndpoints,
    retry: RetryConfig,
}

impl GraphClient {
    /// Creates a new Graph client.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are incomplete or the HTTP client
    /// cannot be created.
    pub fn new(credentials: GraphCredentials, endpoints: GraphEndpoints) -> GraphResult<Self> {
        Self::with_retry_config(credentials, endpoints, RetryConfig::default())
    }

    /// Creates a new Graph client with custom retry configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are incomplete, the retry config is
    /// invalid, or the HTTP client cannot be created.
    pub fn with_retry_config(
        credentials: GraphCredentials,
        endpoints: GraphEndpoints,
        retry: RetryConfig,
    ) -> GraphResult<Self> {
        credentials.validate()?;
        retry
            .validate()
            .map_err(|e| GraphError::Config(format!("Invalid retry config: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        let token_cache = TokenCache::new(credentials, endpoints.clone(), http_client.clone());

        Ok(Self {
            http_client,
            token_cache,
            endpoints,
            retry,
        })
    }

    /// Returns the URL of a collection, e.g. `devices`.
    #[must_use]
    pub fn collection_url(&self, version: ApiVersion, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoints.graph(),
            version.as_str(),
            path.trim_matches('/')
        )
    }

    /// Returns the URL of one item in a collection, percent-encoding the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection URL cannot be parsed.
    pub fn item_url(&self, version: ApiVersion, path: &str, id: &str) -> GraphResult<String> {
        let mut url = Url::parse(&self.collection_url(version, path))?;
        url.path_segments_mut()
            .map_err(|()| GraphError::Config("Graph endpoint cannot be a base URL".into()))?
            .push(id);
        Ok(url.to_string())
    }

    /// Performs a GET request and decodes the JSON body.
    #[instrument(skip(self, query))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        consistency: Consistency,
    ) -> GraphResult<T> {
        let response = self
            .send(Method::GET, url, query, consistency)
            .await?;
        response.json().await.map_err(GraphError::from)
    }

    /// Performs a DELETE request.
    #[instrument(skip(self))]
    pub async fn delete(&self, url: &str) -> GraphResult<()> {
        self.send(Method::DELETE, url, &[], Consistency::Default)
            .await?;
        Ok(())
    }

    /// Fetches every page of a collection, following `@odata.nextLink`.
    #[instrument(skip(self, query))]
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> GraphResult<Vec<T>> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut page: ODataResponse<T> = self.get(url, query, Consistency::Default).await?;

        loop {
            items.extend(page.value);
            match page.next_link {
                // The next link already carries the original query.
                Some(next) => {
                    if !visited.insert(next.clone()) {
                        return Err(GraphError::PaginationLoop {
                            link: next,
                            pages: visited.len() + 1,
                        });
                    }
                    debug!("Fetching page: {}", next);
                    page = self.get(&next, &[], Consistency::Default).await?;
                }
                None => return Ok(items),
            }
        }
    }

    /// Sends a request with token injection and retry handling.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        consistency: Consistency,
    ) -> GraphResult<reqwest::Response> {
        let mut retries = 0u32;
        let mut token_refreshed = false;

        loop {
            let token = self.token_cache.get_token().await?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token);
            if !query.is_empty() {
                request = request.query(query);
            }
            if consistency == Consistency::Eventual {
                request = request.header("ConsistencyLevel", "eventual");
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            // Expired or revoked token: refresh once.
            if status == StatusCode::UNAUTHORIZED && !token_refreshed {
                warn!("Graph rejected the access token, refreshing");
                self.token_cache.invalidate().await;
                token_refreshed = true;
                continue;
            }

            let throttled = status == StatusCode::TOO_MANY_REQUESTS;
            let transient = matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            );

            if (throttled || transient) && retries < self.retry.max_retries {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(RetryConfig::parse_retry_after);
                let delay = self.retry.delay_for(retries, retry_after);
                retries += 1;
                warn!(
                    "Graph returned {}, retry {}/{} after {:?}",
                    status, retries, self.retry.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if throttled {
                return Err(GraphError::MaxRetriesExceeded { attempts: retries });
            }

            return Err(Self::error_from_response(status, response).await);
        }
    }

    async fn error_from_response(status: StatusCode, response: reqwest::Response) -> GraphError {
        let error_body = response.text().await.unwrap_or_default();
        if let Ok(odata_error) = serde_json::from_str::<ODataError>(&error_body) {
            return GraphError::GraphApi {
                status: status.as_u16(),
                code: odata_error.error.code,
                message: odata_error.error.message,
            };
        }

        GraphError::GraphApi {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message: error_body,
        }
    }
}
