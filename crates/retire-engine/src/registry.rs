//! Registry capability traits.
//!
//! Every backend implements [`Registry`] plus the capabilities it supports.
//! All three registries support [`SerialLookup`] and [`DeleteOp`]; only the
//! identity directory supports [`UserDirectory`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RegistryResult;
use crate::model::{Lookup, RegistryKind, UserSummary};

/// Base trait for all registry adapters.
pub trait Registry: Send + Sync {
    /// Which registry this adapter talks to.
    fn kind(&self) -> RegistryKind;
}

/// Capability for finding a device by serial number.
#[async_trait]
pub trait SerialLookup: Registry {
    /// Record type this registry returns.
    type Record: Send;

    /// Looks up one serial.
    ///
    /// When the backend returns several matches the first one wins. No match
    /// is `Ok(Lookup::NotFound)`, never an error.
    async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<Self::Record>>;
}

/// Capability for resolving the user behind a logon.
#[async_trait]
pub trait UserDirectory: Registry {
    /// Fetches a user's display name and principal name.
    ///
    /// Failures are absorbed into `NotFound` so that a missing user never
    /// aborts device resolution.
    async fn lookup_user_by_id(&self, user_id: &str) -> Lookup<UserSummary>;
}

/// Result of a delete call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The registry accepted the delete.
    Deleted,
    /// The registry answered with its benign code: already absent or
    /// already queued for deletion.
    AlreadyGone,
}

/// Result of an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// Capability for deleting devices and confirming the deletion.
#[async_trait]
pub trait DeleteOp: Registry {
    /// Issues the delete call for one native id.
    ///
    /// The registry's benign code maps to `DeleteOutcome::AlreadyGone`; any
    /// other failure is returned as an error and is fatal for the stage.
    async fn delete_by_id(&self, id: &str) -> RegistryResult<DeleteOutcome>;

    /// Checks whether the id is still visible, for confirmation polling.
    async fn exists_by_id(&self, id: &str) -> RegistryResult<Presence>;
}
