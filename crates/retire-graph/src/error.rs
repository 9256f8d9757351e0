//! Error types for the Microsoft Graph client.

use retire_engine::{RegistryError, RegistryKind};
use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur when talking to Microsoft Graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Microsoft Graph API error.
    #[error("Graph API error ({status}): {code} - {message}")]
    GraphApi {
        status: u16,
        code: String,
        message: String,
    },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Throttled on every retry.
    #[error("Maximum retries ({attempts}) exceeded while throttled")]
    MaxRetriesExceeded { attempts: u32 },

    /// A collection handed back a next link it had already returned.
    #[error("Pagination loop: next link repeated after {pages} pages: {link}")]
    PaginationLoop { link: String, pages: usize },
}

impl GraphError {
    /// HTTP status of a Graph API error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::GraphApi { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Converts into the engine's error type, tagged with the registry.
    #[must_use]
    pub fn into_registry_error(self, registry: RegistryKind) -> RegistryError {
        match self {
            Self::GraphApi {
                status,
                code,
                message,
            } => RegistryError::Backend {
                registry,
                status,
                code,
                message,
            },
            Self::Json(e) => RegistryError::Decode {
                registry,
                message: e.to_string(),
            },
            Self::Http(e) if e.is_decode() => RegistryError::Decode {
                registry,
                message: e.to_string(),
            },
            other => RegistryError::Transport {
                registry,
                message: other.to_string(),
            },
        }
    }
}
