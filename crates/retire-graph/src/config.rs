//! Graph endpoints and application credentials.

use secrecy::SecretString;
use url::Url;

use crate::{GraphError, GraphResult};

/// Microsoft Graph endpoint of the commercial cloud.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";

/// Azure AD login endpoint of the commercial cloud.
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

/// Base URLs for Graph calls and token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoints {
    graph: String,
    login: String,
}

impl Default for GraphEndpoints {
    fn default() -> Self {
        Self {
            graph: DEFAULT_GRAPH_ENDPOINT.to_string(),
            login: DEFAULT_LOGIN_ENDPOINT.to_string(),
        }
    }
}

impl GraphEndpoints {
    /// Creates endpoints from explicit base URLs (sovereign clouds, mock servers).
    ///
    /// # Errors
    ///
    /// Returns an error if either value is not an absolute http(s) URL.
    pub fn new(graph: &str, login: &str) -> GraphResult<Self> {
        Ok(Self {
            graph: normalize(graph)?,
            login: normalize(login)?,
        })
    }

    /// Graph endpoint without a trailing slash.
    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Login endpoint without a trailing slash.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }
}

fn normalize(raw: &str) -> GraphResult<String> {
    let parsed = Url::parse(raw.trim())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GraphError::Config(format!(
            "endpoint must be http(s), got {}",
            parsed.scheme()
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// Client-credentials grant for the app registration.
#[derive(Debug)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl GraphCredentials {
    /// Validates that no field is blank.
    pub fn validate(&self) -> GraphResult<()> {
        use secrecy::ExposeSecret;

        if self.tenant_id.trim().is_empty() {
            return Err(GraphError::Config("tenant_id is required".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(GraphError::Config("client_id is required".into()));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(GraphError::Config("client_secret is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = GraphEndpoints::default();
        assert_eq!(endpoints.graph(), "https://graph.microsoft.com");
        assert_eq!(endpoints.login(), "https://login.microsoftonline.com");
    }

    #[test]
    fn test_custom_endpoints_trim_trailing_slash() {
        let endpoints =
            GraphEndpoints::new("http://127.0.0.1:8080/", "http://127.0.0.1:9090").unwrap();
        assert_eq!(endpoints.graph(), "http://127.0.0.1:8080");
        assert_eq!(endpoints.login(), "http://127.0.0.1:9090");
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(GraphEndpoints::new("not a url", DEFAULT_LOGIN_ENDPOINT).is_err());
        assert!(GraphEndpoints::new("ftp://graph.example", DEFAULT_LOGIN_ENDPOINT).is_err());
    }

    #[test]
    fn test_credentials_validation() {
        let creds = GraphCredentials {
            tenant_id: "tenant".into(),
            client_id: " ".into(),
            client_secret: "secret".to_string().into(),
        };
        assert!(creds.validate().is_err());
    }
}
