//! Microsoft Graph adapters for device retirement.
//!
//! This crate implements the `retire-engine` registry traits on top of the
//! Microsoft Graph API:
//!
//! - [`IntuneRegistry`]: Intune managed devices
//! - [`AutopilotRegistry`]: Windows Autopilot device identities
//! - [`EntraRegistry`]: Entra ID devices, plus user lookups for logon enrichment
//!
//! All three share one [`GraphClient`], which handles `OAuth2` client
//! credentials, throttling and pagination.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use retire_graph::{GraphClient, GraphCredentials, GraphEndpoints, IntuneRegistry};
//!
//! # fn example() -> Result<(), retire_graph::GraphError> {
//! let credentials = GraphCredentials {
//!     tenant_id: "your-tenant-id".to_string(),
//!     client_id: "your-client-id".to_string(),
//!     client_secret: "your-client-secret".to_string().into(),
//! };
//!
//! let client = Arc::new(GraphClient::new(credentials, GraphEndpoints::default())?);
//! let intune = IntuneRegistry::new(client);
//! # Ok(())
//! # }
//! ```

mod auth;
mod autopilot;
mod config;
mod entra;
mod error;
mod graph_client;
mod intune;
mod retry;

pub use auth::TokenCache;
pub use autopilot::AutopilotRegistry;
pub use config::{
    GraphCredentials, GraphEndpoints, DEFAULT_GRAPH_ENDPOINT, DEFAULT_LOGIN_ENDPOINT,
};
pub use entra::EntraRegistry;
pub use error::{GraphError, GraphResult};
pub use graph_client::{
    odata_literal, parse_timestamp, search_clause, ApiVersion, Consistency, GraphClient,
    ODataError, ODataErrorBody, ODataResponse,
};
pub use intune::IntuneRegistry;
pub use retry::RetryConfig;
