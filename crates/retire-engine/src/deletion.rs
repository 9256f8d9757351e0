//! Deletion requests and the correlation checks that build them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{MergedDeviceView, RegistryKind};

/// A native id tagged with the batch position it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedId {
    pub index: usize,
    pub id: String,
}

/// The per-registry ids an operator selected for one device.
///
/// A registry the device is absent from is `None` and is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    #[serde(default)]
    pub managed: Option<CorrelatedId>,
    #[serde(default)]
    pub provisioning: Option<CorrelatedId>,
    #[serde(default)]
    pub directory: Option<CorrelatedId>,
}

impl DeviceSelection {
    #[must_use]
    pub fn get(&self, kind: RegistryKind) -> Option<&CorrelatedId> {
        match kind {
            RegistryKind::ManagedDevice => self.managed.as_ref(),
            RegistryKind::Provisioning => self.provisioning.as_ref(),
            RegistryKind::Directory => self.directory.as_ref(),
        }
    }

    /// Checks that every registry id points at the same batch position.
    ///
    /// # Errors
    ///
    /// Returns `CorrelationIssue::IndexMismatch` when the indices disagree.
    pub fn correlation_index(&self) -> Result<Option<usize>, CorrelationIssue> {
        let tagged: Vec<(RegistryKind, usize)> = RegistryKind::PIPELINE
            .iter()
            .filter_map(|kind| self.get(*kind).map(|c| (*kind, c.index)))
            .collect();

        match tagged.first() {
            None => Ok(None),
            Some((_, first)) if tagged.iter().all(|(_, i)| i == first) => Ok(Some(*first)),
            Some(_) => Err(CorrelationIssue::IndexMismatch { indices: tagged }),
        }
    }
}

/// A device that was left out of a deletion because its registry ids could
/// not be tied to one input serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum CorrelationIssue {
    #[error("registry ids disagree on correlation index: {indices:?}")]
    IndexMismatch { indices: Vec<(RegistryKind, usize)> },

    #[error("selected index {index} is outside the resolved batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Native ids to delete, grouped by registry in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionRequest {
    managed: Vec<String>,
    provisioning: Vec<String>,
    directory: Vec<String>,
    rejected: Vec<CorrelationIssue>,
}

impl DeletionRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a request from raw per-registry id lists.
    #[must_use]
    pub fn from_ids<I, S>(managed: I, provisioning: I, directory: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = Self::new();
        for id in managed {
            request.push(RegistryKind::ManagedDevice, id.into());
        }
        for id in provisioning {
            request.push(RegistryKind::Provisioning, id.into());
        }
        for id in directory {
            request.push(RegistryKind::Directory, id.into());
        }
        request
    }

    /// Builds a request that only touches one registry.
    #[must_use]
    pub fn for_registry<I, S>(kind: RegistryKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = Self::new();
        for id in ids {
            request.push(kind, id.into());
        }
        request
    }

    /// Builds a request from operator selections.
    ///
    /// A selection whose registry ids disagree on the correlation index is
    /// rejected as a whole: none of its ids are deleted anywhere.
    #[must_use]
    pub fn from_selections<I>(selections: I) -> Self
    where
        I: IntoIterator<Item = DeviceSelection>,
    {
        let mut request = Self::new();
        for selection in selections {
            if let Err(issue) = selection.correlation_index() {
                request.rejected.push(issue);
                continue;
            }
            for kind in RegistryKind::PIPELINE {
                if let Some(target) = selection.get(kind) {
                    request.push(kind, target.id.clone());
                }
            }
        }
        request
    }

    /// Builds a request from the resolved views at the given batch positions.
    #[must_use]
    pub fn from_views(views: &[MergedDeviceView], indices: &[usize]) -> Self {
        let mut request = Self::new();
        let mut selections = Vec::with_capacity(indices.len());
        for &index in indices {
            match views.get(index) {
                Some(view) if view.index == index => selections.push(view.selection()),
                Some(view) => request.rejected.push(CorrelationIssue::IndexMismatch {
                    indices: RegistryKind::PIPELINE
                        .iter()
                        .filter(|k| view.found_in(**k))
                        .map(|k| (*k, view.index))
                        .collect(),
                }),
                None => request.rejected.push(CorrelationIssue::IndexOutOfRange {
                    index,
                    len: views.len(),
                }),
            }
        }
        let selected = Self::from_selections(selections);
        request.merge(selected);
        request
    }

    /// Ids to delete from the given registry.
    #[must_use]
    pub fn targets(&self, kind: RegistryKind) -> &[String] {
        match kind {
            RegistryKind::ManagedDevice => &self.managed,
            RegistryKind::Provisioning => &self.provisioning,
            RegistryKind::Directory => &self.directory,
        }
    }

    /// Devices left out because of correlation problems.
    #[must_use]
    pub fn rejected(&self) -> &[CorrelationIssue] {
        &self.rejected
    }

    /// Whether no registry has anything to delete.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        RegistryKind::PIPELINE
            .iter()
            .all(|k| self.targets(*k).is_empty())
    }

    fn push(&mut self, kind: RegistryKind, id: String) {
        let ids = match kind {
            RegistryKind::ManagedDevice => &mut self.managed,
            RegistryKind::Provisioning => &mut self.provisioning,
            RegistryKind::Directory => &mut self.directory,
        };
        if !id.is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }

    fn merge(&mut self, other: Self) {
        for kind in RegistryKind::PIPELINE {
            for id in other.targets(kind) {
                self.push(kind, id.clone());
            }
        }
        self.rejected.extend(other.rejected);
    }
}
