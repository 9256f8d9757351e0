//! Application state shared across all request handlers.

use retire_engine::{DeletionOrchestrator, OrchestratorConfig, RegistryResult, Resolver};
use retire_graph::{AutopilotRegistry, EntraRegistry, GraphClient, IntuneRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolver wired to the three Graph registries.
pub type GraphResolver = Resolver<IntuneRegistry, AutopilotRegistry, EntraRegistry>;

/// Application state shared across all handlers.
///
/// Cloned per request; everything inside is behind `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<GraphResolver>,

    pub orchestrator: Arc<DeletionOrchestrator>,

    /// Cancelled on shutdown so in-flight confirmation polls stop waiting.
    pub shutdown: CancellationToken,

    /// Application version from Cargo.toml
    pub version: &'static str,
}

impl AppState {
    /// Wires the adapters over one shared Graph client.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator rejects its configuration.
    pub fn new(client: Arc<GraphClient>, config: OrchestratorConfig) -> RegistryResult<Self> {
        let intune = IntuneRegistry::new(Arc::clone(&client));
        let autopilot = AutopilotRegistry::new(Arc::clone(&client));
        let entra = EntraRegistry::new(client);

        let orchestrator = DeletionOrchestrator::new(
            Arc::new(intune.clone()),
            Arc::new(autopilot.clone()),
            Arc::new(entra.clone()),
            config,
        )?;

        Ok(Self {
            resolver: Arc::new(Resolver::new(intune, autopilot, entra)),
            orchestrator: Arc::new(orchestrator),
            shutdown: CancellationToken::new(),
            version: env!("CARGO_PKG_VERSION"),
        })
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
