//! Service configuration loaded from environment variables.

use retire_engine::{ConfirmationPolicy, OrchestratorConfig, RegistryPolicies};
use retire_graph::{
    GraphCredentials, GraphEndpoints, DEFAULT_GRAPH_ENDPOINT, DEFAULT_LOGIN_ENDPOINT,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,retire_engine=debug,retire_graph=debug";

/// Configuration for the retire API server.
#[derive(Debug)]
pub struct AppConfig {
    /// Listen address for the HTTP server.
    pub listen_addr: SocketAddr,

    /// Log filter directive.
    pub log_filter: String,

    /// App registration used for Graph calls.
    pub credentials: GraphCredentials,

    /// Graph and login base URLs.
    pub endpoints: GraphEndpoints,

    /// Confirmation polling per registry.
    pub policies: RegistryPolicies,

    /// Poll the ids of one stage concurrently.
    pub parallel_confirmation: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = reader("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidValue("HOST".into(), e.to_string()))?;
        let port = reader("PORT")
            .unwrap_or_else(|_| "4070".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("PORT".into(), e.to_string()))?;
        let listen_addr = SocketAddr::new(host, port);

        let log_filter = reader("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let credentials = GraphCredentials {
            tenant_id: required(&reader, "TENANT_ID")?,
            client_id: required(&reader, "CLIENT_ID")?,
            client_secret: required(&reader, "CLIENT_SECRET")?.into(),
        };

        let graph = reader("GRAPH_ENDPOINT").unwrap_or_else(|_| DEFAULT_GRAPH_ENDPOINT.to_string());
        GraphEndpoints::new(&graph, DEFAULT_LOGIN_ENDPOINT)
            .map_err(|e| ConfigError::InvalidValue("GRAPH_ENDPOINT".into(), e.to_string()))?;
        let login = reader("LOGIN_ENDPOINT").unwrap_or_else(|_| DEFAULT_LOGIN_ENDPOINT.to_string());
        let endpoints = GraphEndpoints::new(&graph, &login)
            .map_err(|e| ConfigError::InvalidValue("LOGIN_ENDPOINT".into(), e.to_string()))?;

        let policies = RegistryPolicies {
            managed: ConfirmationPolicy::fixed(
                Duration::from_secs(number(&reader, "MANAGED_CONFIRM_INTERVAL_SECS", 60)?),
                attempts(&reader, "MANAGED_CONFIRM_MAX_ATTEMPTS", 20)?,
            ),
            provisioning: ConfirmationPolicy::exponential(
                Duration::from_secs(number(&reader, "PROVISIONING_CONFIRM_BASE_SECS", 30)?),
                attempts(&reader, "PROVISIONING_CONFIRM_MAX_ATTEMPTS", 6)?,
            ),
            directory: ConfirmationPolicy::fixed(
                Duration::from_secs(number(&reader, "DIRECTORY_CONFIRM_INTERVAL_SECS", 60)?),
                attempts(&reader, "DIRECTORY_CONFIRM_MAX_ATTEMPTS", 20)?,
            ),
        };
        // Backoff doubles per attempt, so its attempt count is capped.
        policies
            .provisioning
            .validate()
            .map_err(|e| ConfigError::InvalidValue("PROVISIONING_CONFIRM_MAX_ATTEMPTS".into(), e))?;

        let parallel_confirmation = reader("PARALLEL_CONFIRMATION")
            .unwrap_or_else(|_| "false".to_string())
            .trim()
            .to_ascii_lowercase()
            .parse::<bool>()
            .map_err(|e| {
                ConfigError::InvalidValue("PARALLEL_CONFIRMATION".into(), e.to_string())
            })?;

        Ok(Self {
            listen_addr,
            log_filter,
            credentials,
            endpoints,
            policies,
            parallel_confirmation,
        })
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            policies: self.policies,
            parallel_confirmation: self.parallel_confirmation,
        }
    }
}

fn required<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(key.into())),
    }
}

fn number<F>(reader: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn attempts<F>(reader: &F, key: &str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let value = number(reader, key, u64::from(default))?;
    match u32::try_from(value) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidValue(
            key.into(),
            format!("must be between 1 and {}, got {value}", u32::MAX),
        )),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
