//! Device retirement engine
//!
//! Resolves devices by serial number across three independent registries and
//! retires them with a gated, confirmed deletion pipeline.
//!
//! # Components
//!
//! - [`registry`]: capability traits every registry adapter implements
//! - [`Resolver`]: concurrent fan-out lookup merged into one
//!   [`MergedDeviceView`] per serial, index-aligned with the input
//! - [`DeletionOrchestrator`]: managed device → provisioning → directory,
//!   each stage confirmed before the next one starts
//! - [`ConfirmationPoller`]: fixed-interval or exponential-backoff existence
//!   polling with cancellation
//!
//! # Example
//!
//! ```ignore
//! use retire_engine::{DeletionOrchestrator, DeletionRequest, Resolver};
//! use tokio_util::sync::CancellationToken;
//!
//! let views = resolver.resolve_text("SN100\nSN200").await?;
//! let request = DeletionRequest::from_views(&views, &[0]);
//! let report = orchestrator.execute(&request, &CancellationToken::new()).await;
//! assert!(report.succeeded());
//! ```

pub mod deletion;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod resolver;

pub use deletion::{CorrelatedId, CorrelationIssue, DeletionRequest, DeviceSelection};
pub use error::{RegistryError, RegistryResult};
pub use model::{
    DirectoryRecord, LastLogon, LogonEvent, Lookup, ManagedDeviceRecord, MergedDeviceView,
    ProvisioningRecord, RegistryKind, SerialBatch, UserSummary, UNKNOWN,
};
pub use orchestrator::{
    AbortReason, DeletionOrchestrator, DeletionOutcome, DeletionReport, OrchestratorConfig,
    StageReport, StageStatus,
};
pub use poller::{
    ConfirmationPolicy, ConfirmationPoller, ConfirmationState, ConfirmationStatus,
    RegistryPolicies, Target,
};
pub use registry::{DeleteOp, DeleteOutcome, Presence, Registry, SerialLookup, UserDirectory};
pub use resolver::Resolver;
