//! Three-stage deletion pipeline.
//!
//! Devices are removed from the device-management registry first, then from
//! the provisioning registry, then from the identity directory. A stage only
//! starts once every id of the previous stage has been confirmed gone. There
//! is no rollback: stages that already confirmed stay deleted when a later
//! stage fails.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::deletion::{CorrelationIssue, DeletionRequest};
use crate::error::{RegistryError, RegistryResult};
use crate::model::RegistryKind;
use crate::poller::{ConfirmationPoller, ConfirmationState, ConfirmationStatus, RegistryPolicies};
use crate::registry::{DeleteOp, DeleteOutcome};

/// Orchestrator tuning.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub policies: RegistryPolicies,
    /// Poll the ids of one stage concurrently instead of one at a time.
    pub parallel_confirmation: bool,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    /// Nothing to delete in this registry.
    Skipped,
    /// Every id was deleted and confirmed gone.
    Confirmed,
    /// A delete call failed with a non-benign error. `deleted` lists the ids
    /// of this stage whose delete calls went through before the failure; they
    /// are not polled and not rolled back.
    FatalDelete {
        id: String,
        error: String,
        deleted: Vec<String>,
    },
    /// At least one id was still present when its budget ran out.
    TimedOut { ids: Vec<String> },
    /// Cancelled before the stage could confirm.
    Aborted,
}

/// Why the pipeline stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    FatalDelete,
    ConfirmationTimeout,
    Cancelled,
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: RegistryKind,
    #[serde(flatten)]
    pub status: StageStatus,
    pub targets: Vec<ConfirmationState>,
}

impl StageReport {
    fn skipped(stage: RegistryKind) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            targets: Vec::new(),
        }
    }

    /// Whether later stages may run.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, StageStatus::Skipped | StageStatus::Confirmed)
    }

    #[must_use]
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self.status {
            StageStatus::Skipped | StageStatus::Confirmed => None,
            StageStatus::FatalDelete { .. } => Some(AbortReason::FatalDelete),
            StageStatus::TimedOut { .. } => Some(AbortReason::ConfirmationTimeout),
            StageStatus::Aborted => Some(AbortReason::Cancelled),
        }
    }
}

/// Terminal state of a deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeletionOutcome {
    AllConfirmed,
    AbortedAt {
        stage: RegistryKind,
        reason: AbortReason,
    },
}

/// Result of a full deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub outcome: DeletionOutcome,
    /// Stages that ran, in pipeline order. Stages after an abort are absent.
    pub stages: Vec<StageReport>,
    /// Devices excluded because their registry ids did not correlate.
    pub rejected: Vec<CorrelationIssue>,
}

impl DeletionReport {
    /// Every stage confirmed and no device was rejected.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == DeletionOutcome::AllConfirmed && self.rejected.is_empty()
    }

    #[must_use]
    pub fn stage(&self, kind: RegistryKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }
}

/// Drives deletions across the three registries.
pub struct DeletionOrchestrator {
    managed: Arc<dyn DeleteOp>,
    provisioning: Arc<dyn DeleteOp>,
    directory: Arc<dyn DeleteOp>,
    config: OrchestratorConfig,
}

impl DeletionOrchestrator {
    /// Creates an orchestrator over the three registries.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry is passed in the wrong position or a
    /// confirmation policy is invalid.
    pub fn new(
        managed: Arc<dyn DeleteOp>,
        provisioning: Arc<dyn DeleteOp>,
        directory: Arc<dyn DeleteOp>,
        config: OrchestratorConfig,
    ) -> RegistryResult<Self> {
        let wiring = [
            (RegistryKind::ManagedDevice, managed.kind()),
            (RegistryKind::Provisioning, provisioning.kind()),
            (RegistryKind::Directory, directory.kind()),
        ];
        for (expected, actual) in wiring {
            if expected != actual {
                return Err(RegistryError::Config(format!(
                    "expected {expected} registry, got {actual}"
                )));
            }
        }
        config.policies.validate().map_err(RegistryError::Config)?;

        Ok(Self {
            managed,
            provisioning,
            directory,
            config,
        })
    }

    fn registry(&self, kind: RegistryKind) -> &dyn DeleteOp {
        match kind {
            RegistryKind::ManagedDevice => self.managed.as_ref(),
            RegistryKind::Provisioning => self.provisioning.as_ref(),
            RegistryKind::Directory => self.directory.as_ref(),
        }
    }

    /// Runs the full pipeline for a request.
    #[instrument(skip_all, fields(
        managed = request.targets(RegistryKind::ManagedDevice).len(),
        provisioning = request.targets(RegistryKind::Provisioning).len(),
        directory = request.targets(RegistryKind::Directory).len(),
    ))]
    pub async fn execute(
        &self,
        request: &DeletionRequest,
        cancel: &CancellationToken,
    ) -> DeletionReport {
        for issue in request.rejected() {
            warn!(%issue, "Device excluded from deletion");
        }

        let mut stages = Vec::with_capacity(RegistryKind::PIPELINE.len());
        for kind in RegistryKind::PIPELINE {
            let report = self.run_stage(kind, request.targets(kind), cancel).await;
            let halted = report.abort_reason();
            stages.push(report);

            if let Some(reason) = halted {
                error!(stage = %kind, ?reason, "Deletion pipeline halted");
                return DeletionReport {
                    outcome: DeletionOutcome::AbortedAt { stage: kind, reason },
                    stages,
                    rejected: request.rejected().to_vec(),
                };
            }
        }

        info!("All registry deletions confirmed");
        DeletionReport {
            outcome: DeletionOutcome::AllConfirmed,
            stages,
            rejected: request.rejected().to_vec(),
        }
    }

    /// Deletes and confirms ids in the device-management registry only.
    pub async fn delete_managed_devices(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> StageReport {
        self.run_stage(RegistryKind::ManagedDevice, ids, cancel)
            .await
    }

    /// Deletes and confirms ids in the provisioning registry only.
    pub async fn delete_provisioning_devices(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> StageReport {
        self.run_stage(RegistryKind::Provisioning, ids, cancel)
            .await
    }

    /// Deletes and confirms ids in the identity directory only.
    pub async fn delete_directory_devices(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> StageReport {
        self.run_stage(RegistryKind::Directory, ids, cancel).await
    }

    /// Runs one stage: delete every id, then confirm every id.
    #[instrument(skip(self, ids, cancel), fields(targets = ids.len()))]
    pub async fn run_stage(
        &self,
        stage: RegistryKind,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> StageReport {
        if ids.is_empty() {
            info!("No targets, skipping stage");
            return StageReport::skipped(stage);
        }

        let registry = self.registry(stage);
        let mut issued = Vec::with_capacity(ids.len());

        for id in ids {
            if cancel.is_cancelled() {
                warn!("Cancelled before all delete calls were issued");
                return StageReport {
                    stage,
                    status: StageStatus::Aborted,
                    targets: Vec::new(),
                };
            }

            info!(%id, "Deleting device");
            match registry.delete_by_id(id).await {
                Ok(DeleteOutcome::Deleted) => {
                    info!(%id, "Delete accepted");
                    issued.push(id.clone());
                }
                Ok(DeleteOutcome::AlreadyGone) => {
                    info!(%id, "Device already gone or already queued, skipping");
                    issued.push(id.clone());
                }
                Err(e) => {
                    error!(%id, error = %e, deleted = issued.len(), "Aborting: delete failed");
                    return StageReport {
                        stage,
                        status: StageStatus::FatalDelete {
                            id: id.clone(),
                            error: e.to_string(),
                            deleted: issued,
                        },
                        targets: Vec::new(),
                    };
                }
            }
        }

        let poller = ConfirmationPoller::new(
            registry,
            self.config.policies.for_kind(stage),
            cancel.clone(),
        );

        let targets = if self.config.parallel_confirmation {
            join_all(ids.iter().map(|id| poller.confirm(id))).await
        } else {
            let mut targets = Vec::with_capacity(ids.len());
            for id in ids {
                targets.push(poller.confirm(id).await);
            }
            targets
        };

        let status = stage_status(&targets);
        if status == StageStatus::Confirmed {
            info!("Stage deletions complete");
        }

        StageReport {
            stage,
            status,
            targets,
        }
    }
}

fn stage_status(targets: &[ConfirmationState]) -> StageStatus {
    if targets
        .iter()
        .any(|t| t.status == ConfirmationStatus::Aborted)
    {
        return StageStatus::Aborted;
    }

    let timed_out: Vec<String> = targets
        .iter()
        .filter(|t| !t.is_confirmed())
        .map(|t| t.target.id.clone())
        .collect();

    if timed_out.is_empty() {
        StageStatus::Confirmed
    } else {
        StageStatus::TimedOut { ids: timed_out }
    }
}
