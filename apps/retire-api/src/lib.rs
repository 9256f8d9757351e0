//! HTTP front end for device retirement.
//!
//! Exposes the resolver and the deletion orchestrator of `retire-engine`,
//! wired to the Microsoft Graph adapters of `retire-graph`, as JSON endpoints.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{AppConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
