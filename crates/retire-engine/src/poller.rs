//! Confirmation polling after a delete call.
//!
//! Registries do not always reflect a deletion on the very next read, so each
//! deleted id is checked repeatedly until it disappears or the attempt budget
//! runs out.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::model::RegistryKind;
use crate::registry::{DeleteOp, Presence};

/// How long to wait before each existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Constant wait between checks.
    Fixed { interval: Duration, max_attempts: u32 },
    /// Wait `base * 2^attempt` before each check.
    ExponentialBackoff { base: Duration, max_attempts: u32 },
}

impl ConfirmationPolicy {
    #[must_use]
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            interval,
            max_attempts,
        }
    }

    #[must_use]
    pub fn exponential(base: Duration, max_attempts: u32) -> Self {
        Self::ExponentialBackoff { base, max_attempts }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Fixed { max_attempts, .. } | Self::ExponentialBackoff { max_attempts, .. } => {
                *max_attempts
            }
        }
    }

    /// Wait before the zero-based `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { interval, .. } => *interval,
            Self::ExponentialBackoff { base, .. } => {
                base.saturating_mul(2_u32.saturating_pow(attempt))
            }
        }
    }

    /// Total time spent waiting if every attempt is used.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        (0..self.max_attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts() == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if let Self::ExponentialBackoff { max_attempts, .. } = self {
            if *max_attempts > 16 {
                return Err("exponential max_attempts must be <= 16".to_string());
            }
        }
        Ok(())
    }
}

/// Confirmation policy for each registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicies {
    pub managed: ConfirmationPolicy,
    pub provisioning: ConfirmationPolicy,
    pub directory: ConfirmationPolicy,
}

impl Default for RegistryPolicies {
    fn default() -> Self {
        Self {
            managed: ConfirmationPolicy::fixed(Duration::from_secs(60), 20),
            // Provisioning listings are cache-backed and lag behind deletes.
            provisioning: ConfirmationPolicy::exponential(Duration::from_secs(30), 6),
            directory: ConfirmationPolicy::fixed(Duration::from_secs(60), 20),
        }
    }
}

impl RegistryPolicies {
    #[must_use]
    pub fn for_kind(&self, kind: RegistryKind) -> ConfirmationPolicy {
        match kind {
            RegistryKind::ManagedDevice => self.managed,
            RegistryKind::Provisioning => self.provisioning,
            RegistryKind::Directory => self.directory,
        }
    }

    /// Validates every policy.
    pub fn validate(&self) -> Result<(), String> {
        for kind in RegistryKind::PIPELINE {
            self.for_kind(kind)
                .validate()
                .map_err(|e| format!("{kind}: {e}"))?;
        }
        Ok(())
    }
}

/// Where a confirmation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    TimedOut,
    Aborted,
}

/// A deleted id in one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub registry: RegistryKind,
    pub id: String,
}

/// Progress of confirming one deleted id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationState {
    pub target: Target,
    pub attempts: u32,
    pub status: ConfirmationStatus,
}

impl ConfirmationState {
    fn new(target: Target) -> Self {
        Self {
            target,
            attempts: 0,
            status: ConfirmationStatus::Pending,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status != ConfirmationStatus::Pending
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == ConfirmationStatus::Confirmed
    }

    fn finish(&mut self, status: ConfirmationStatus) {
        if !self.is_terminal() {
            self.status = status;
        }
    }
}

/// Polls one registry until deleted ids disappear.
pub struct ConfirmationPoller<'a> {
    registry: &'a dyn DeleteOp,
    policy: ConfirmationPolicy,
    cancel: CancellationToken,
}

impl<'a> ConfirmationPoller<'a> {
    #[must_use]
    pub fn new(
        registry: &'a dyn DeleteOp,
        policy: ConfirmationPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            policy,
            cancel,
        }
    }

    /// Runs the poll loop for one id to a terminal state.
    ///
    /// Each attempt sleeps first and then checks existence. A failed check is
    /// logged and counts as one attempt; it never ends the loop early.
    #[instrument(skip(self), fields(registry = %self.registry.kind()))]
    pub async fn confirm(&self, id: &str) -> ConfirmationState {
        let mut state = ConfirmationState::new(Target {
            registry: self.registry.kind(),
            id: id.to_string(),
        });
        let max_attempts = self.policy.max_attempts();

        while state.attempts < max_attempts {
            let delay = self.policy.delay_for_attempt(state.attempts);
            debug!(
                attempt = state.attempts + 1,
                max_attempts,
                "Waiting {:?} before checking deletion",
                delay
            );

            let check = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                check = async {
                    tokio::time::sleep(delay).await;
                    self.registry.exists_by_id(id).await
                } => Some(check),
            };

            let Some(check) = check else {
                warn!(attempts = state.attempts, "Confirmation aborted");
                state.finish(ConfirmationStatus::Aborted);
                return state;
            };

            state.attempts += 1;
            match check {
                Ok(Presence::Absent) => {
                    info!(attempts = state.attempts, "Deletion confirmed");
                    state.finish(ConfirmationStatus::Confirmed);
                    return state;
                }
                Err(e) if e.is_not_found() => {
                    info!(attempts = state.attempts, "Deletion confirmed by not-found");
                    state.finish(ConfirmationStatus::Confirmed);
                    return state;
                }
                Ok(Presence::Present) => {
                    debug!(attempts = state.attempts, "Device still present");
                }
                Err(e) => {
                    warn!(attempts = state.attempts, error = %e, "Existence check failed, retrying");
                }
            }
        }

        warn!(
            attempts = state.attempts,
            "Max attempts reached, deletion not confirmed"
        );
        state.finish(ConfirmationStatus::TimedOut);
        state
    }
}
