//! Registry error types.
//!
//! A device that is simply absent from a registry is never an error; it is
//! reported as data (`Lookup::NotFound`, `DeleteOutcome::AlreadyGone`,
//! `Presence::Absent`). The variants here cover calls that genuinely failed.

use thiserror::Error;

use crate::model::RegistryKind;

/// Result type alias using `RegistryError`.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error raised by a registry adapter.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backend answered with a non-success status.
    #[error("{registry} returned {status}: {code} - {message}")]
    Backend {
        registry: RegistryKind,
        status: u16,
        code: String,
        message: String,
    },

    /// The request never produced a usable response.
    #[error("{registry} request failed: {message}")]
    Transport {
        registry: RegistryKind,
        message: String,
    },

    /// The backend response could not be decoded.
    #[error("{registry} response could not be decoded: {message}")]
    Decode {
        registry: RegistryKind,
        message: String,
    },

    /// The engine was wired with the wrong registry.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// HTTP status reported by the backend, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend reported the resource as not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Registry the error came from, if known.
    #[must_use]
    pub fn registry(&self) -> Option<RegistryKind> {
        match self {
            Self::Backend { registry, .. }
            | Self::Transport { registry, .. }
            | Self::Decode { registry, .. } => Some(*registry),
            Self::Config(_) => None,
        }
    }
}
