//! Device records returned by the registries and the merged per-serial view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::deletion::{CorrelatedId, DeviceSelection};

/// Text shown in place of a value that a registry did not return.
pub const UNKNOWN: &str = "Unknown";

/// One of the three backend registries that track a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// Device-management registry (Intune managed devices).
    ManagedDevice,
    /// Provisioning/enrollment registry (Autopilot device identities).
    Provisioning,
    /// Identity-directory registry (Entra ID devices).
    Directory,
}

impl RegistryKind {
    /// Order in which registries are retired.
    pub const PIPELINE: [RegistryKind; 3] = [
        RegistryKind::ManagedDevice,
        RegistryKind::Provisioning,
        RegistryKind::Directory,
    ];

    /// Returns the snake_case name used in logs and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagedDevice => "managed_device",
            Self::Provisioning => "provisioning",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value a registry either returned or did not.
///
/// Absence is ordinary data here: a device missing from one registry, a
/// device nobody has logged on to, or a user record that could not be read
/// all end up as `NotFound` rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Default for Lookup<T> {
    fn default() -> Self {
        Self::NotFound
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::NotFound,
        }
    }
}

impl<T> Lookup<T> {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Self::Found(v) => Lookup::Found(v),
            Self::NotFound => Lookup::NotFound,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Self::Found(v) => Lookup::Found(f(v)),
            Self::NotFound => Lookup::NotFound,
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> Lookup<U>>(self, f: F) -> Lookup<U> {
        match self {
            Self::Found(v) => f(v),
            Self::NotFound => Lookup::NotFound,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    pub fn found(&self) -> Option<&T> {
        self.as_ref().into_option()
    }
}

impl Lookup<String> {
    /// Treats a missing or blank string the same way.
    pub fn non_empty(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Found(v),
            _ => Self::NotFound,
        }
    }
}

impl<T: fmt::Display> Lookup<T> {
    /// Renders the value, or [`UNKNOWN`] when absent.
    pub fn display_or_unknown(&self) -> String {
        match self {
            Self::Found(v) => v.to_string(),
            Self::NotFound => UNKNOWN.to_string(),
        }
    }
}

/// Ordered serial numbers submitted by the operator.
///
/// Position in the batch is the correlation key across all registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialBatch(Vec<String>);

impl SerialBatch {
    /// Splits newline-delimited input, dropping blank lines.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl FromIterator<String> for SerialBatch {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SerialBatch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The most recent logon reported by the device-management registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonEvent {
    pub user_id: String,
    pub time: Lookup<DateTime<Utc>>,
}

/// Device as seen by the device-management registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDeviceRecord {
    pub id: String,
    pub device_name: Lookup<String>,
    pub user_principal_name: Lookup<String>,
    pub model: Lookup<String>,
    pub serial_number: Lookup<String>,
    pub last_logon: Lookup<LogonEvent>,
}

/// Device as seen by the provisioning registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub id: String,
    pub display_name: Lookup<String>,
    pub serial_number: Lookup<String>,
    pub last_contacted: Lookup<DateTime<Utc>>,
}

/// Device as seen by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: String,
    pub display_name: Lookup<String>,
}

/// Directory user resolved from a logon user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub display_name: Lookup<String>,
    pub user_principal_name: Lookup<String>,
}

/// Last-logon enrichment attached to every merged view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastLogon {
    pub user: Lookup<UserSummary>,
    pub time: Lookup<DateTime<Utc>>,
}

/// Everything the three registries know about one requested serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedDeviceView {
    /// Position of the serial in the submitted batch.
    pub index: usize,
    pub requested_serial: String,
    pub managed: Lookup<ManagedDeviceRecord>,
    pub provisioning: Lookup<ProvisioningRecord>,
    pub directory: Lookup<DirectoryRecord>,
    pub last_logon: LastLogon,
}

impl MergedDeviceView {
    /// Whether the given registry matched this serial.
    #[must_use]
    pub fn found_in(&self, kind: RegistryKind) -> bool {
        self.native_id(kind).is_some()
    }

    /// Whether any registry matched this serial.
    #[must_use]
    pub fn found_anywhere(&self) -> bool {
        RegistryKind::PIPELINE.iter().any(|k| self.found_in(*k))
    }

    /// Native id of the device in the given registry, if present there.
    #[must_use]
    pub fn native_id(&self, kind: RegistryKind) -> Option<&str> {
        match kind {
            RegistryKind::ManagedDevice => self.managed.found().map(|r| r.id.as_str()),
            RegistryKind::Provisioning => self.provisioning.found().map(|r| r.id.as_str()),
            RegistryKind::Directory => self.directory.found().map(|r| r.id.as_str()),
        }
    }

    /// Deletion targets for this device, tagged with its correlation index.
    #[must_use]
    pub fn selection(&self) -> DeviceSelection {
        let tag = |kind| {
            self.native_id(kind).map(|id| CorrelatedId {
                index: self.index,
                id: id.to_string(),
            })
        };

        DeviceSelection {
            managed: tag(RegistryKind::ManagedDevice),
            provisioning: tag(RegistryKind::Provisioning),
            directory: tag(RegistryKind::Directory),
        }
    }
}
