//! OAuth2 client-credentials tokens for Microsoft Graph.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::{GraphCredentials, GraphEndpoints, GraphError, GraphResult};

/// Refresh this many seconds before the token actually expires.
const REFRESH_GRACE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Error body returned by the login endpoint (`invalid_client`, ...).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_GRACE_SECS) < self.expires_at
    }
}

/// Token cache shared by every Graph call of the process.
///
/// Readers share the cached token; a refresh takes the write lock and
/// re-checks, so concurrent callers trigger a single token request.
#[derive(Debug)]
pub struct TokenCache {
    credentials: GraphCredentials,
    endpoints: GraphEndpoints,
    http_client: reqwest::Client,
    current: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(
        credentials: GraphCredentials,
        endpoints: GraphEndpoints,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            http_client,
            current: RwLock::new(None),
        }
    }

    fn cached(slot: &Option<AccessToken>) -> Option<String> {
        slot.as_ref()
            .filter(|token| token.usable_at(Utc::now()))
            .map(|token| token.secret.clone())
    }

    /// Returns a bearer token, requesting a new one when the cached token is
    /// missing or inside the refresh window.
    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    pub async fn get_token(&self) -> GraphResult<String> {
        if let Some(token) = Self::cached(&*self.current.read().await) {
            return Ok(token);
        }

        let mut slot = self.current.write().await;
        if let Some(token) = Self::cached(&slot) {
            return Ok(token);
        }

        let token = self.request_token().await?;
        let secret = token.secret.clone();
        *slot = Some(token);
        Ok(secret)
    }

    /// Drops the cached token, e.g. after Graph rejected it with 401.
    pub async fn invalidate(&self) {
        self.current.write().await.take();
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.endpoints.login(),
            self.credentials.tenant_id
        )
    }

    async fn request_token(&self) -> GraphResult<AccessToken> {
        let scope = format!("{}/.default", self.endpoints.graph());
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("scope", scope.as_str()),
        ];

        debug!("Requesting access token");
        let response = self
            .http_client
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| GraphError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {description}", err.error),
                    None => err.error,
                },
                Err(_) => body,
            };
            warn!(%status, %reason, "Token request rejected");
            return Err(GraphError::Auth(format!(
                "token request rejected ({status}): {reason}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("malformed token response: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(%expires_at, "Access token acquired");

        Ok(AccessToken {
            secret: token.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

    fn cache_for(server: &MockServer) -> TokenCache {
        let credentials = GraphCredentials {
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "s3cret".to_string().into(),
        };
        let endpoints = GraphEndpoints::new(&server.uri(), &server.uri()).unwrap();
        TokenCache::new(credentials, endpoints, reqwest::Client::new())
    }

    fn token(access_token: &str, expires_in: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": expires_in
        }))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token("tok-1", 3600))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let (a, b, c, d) = tokio::join!(
            cache.get_token(),
            cache.get_token(),
            cache.get_token(),
            cache.get_token()
        );

        for result in [a, b, c, d] {
            assert_eq!(result.unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_token_inside_refresh_window_is_not_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token("short-lived", 60))
            .expect(2)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        cache.get_token().await.unwrap();
        cache.get_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token("tok-1", 3600))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token("tok-2", 3600))
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        assert_eq!(cache.get_token().await.unwrap(), "tok-1");
        assert_eq!(cache.get_token().await.unwrap(), "tok-1");

        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "tok-2");
    }

    #[tokio::test]
    async fn test_request_carries_graph_scope() {
        let server = MockServer::start().await;
        let scope = format!("scope={}", urlencoded(&format!("{}/.default", server.uri())));
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains(scope))
            .respond_with(token("tok", 3600))
            .expect(1)
            .mount(&server)
            .await;

        cache_for(&server).get_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let err = cache_for(&server).get_token().await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, GraphError::Auth(_)));
        assert!(message.contains("invalid_client: AADSTS7000215"));
        assert!(!message.contains("s3cret"));
    }

    fn urlencoded(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }
}
