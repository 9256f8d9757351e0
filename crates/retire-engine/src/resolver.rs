//! Fan-out lookup and positional merge.
//!
//! Every serial is looked up in all three registries. The three passes run
//! concurrently and are joined before the merge; within one pass serials are
//! looked up in batch order so index `i` of each pass belongs to serial `i`.

use tracing::{debug, info, instrument};

use crate::error::RegistryResult;
use crate::model::{
    DirectoryRecord, LastLogon, Lookup, ManagedDeviceRecord, MergedDeviceView,
    ProvisioningRecord, SerialBatch,
};
use crate::registry::{SerialLookup, UserDirectory};

/// Resolves serial numbers against the three registries.
pub struct Resolver<M, P, D> {
    managed: M,
    provisioning: P,
    directory: D,
}

impl<M, P, D> Resolver<M, P, D>
where
    M: SerialLookup<Record = ManagedDeviceRecord>,
    P: SerialLookup<Record = ProvisioningRecord>,
    D: SerialLookup<Record = DirectoryRecord> + UserDirectory,
{
    pub fn new(managed: M, provisioning: P, directory: D) -> Self {
        Self {
            managed,
            provisioning,
            directory,
        }
    }

    /// Parses newline-delimited serials and resolves them.
    pub async fn resolve_text(&self, serials: &str) -> RegistryResult<Vec<MergedDeviceView>> {
        self.resolve(&SerialBatch::parse(serials)).await
    }

    /// Resolves a batch into one view per serial, in batch order.
    ///
    /// # Errors
    ///
    /// Returns the first transport or backend error raised by a lookup. A
    /// serial that matches nothing is not an error.
    #[instrument(skip_all, fields(serials = batch.len()))]
    pub async fn resolve(&self, batch: &SerialBatch) -> RegistryResult<Vec<MergedDeviceView>> {
        let (managed, provisioning, directory) = tokio::try_join!(
            self.managed_pass(batch),
            lookup_pass(&self.provisioning, batch),
            lookup_pass(&self.directory, batch),
        )?;

        let views: Vec<MergedDeviceView> = batch
            .iter()
            .zip(managed)
            .zip(provisioning)
            .zip(directory)
            .enumerate()
            .map(|(index, (((serial, (managed, last_logon)), provisioning), directory))| {
                merge(index, serial, managed, provisioning, directory, last_logon)
            })
            .collect();

        info!(
            results = views.len(),
            matched = views.iter().filter(|v| v.found_anywhere()).count(),
            "Resolved serial batch"
        );

        Ok(views)
    }

    /// Managed-device lookups, each followed by its last-logon user lookup.
    async fn managed_pass(
        &self,
        batch: &SerialBatch,
    ) -> RegistryResult<Vec<(Lookup<ManagedDeviceRecord>, LastLogon)>> {
        let entries = lookup_pass(&self.managed, batch).await?;

        let mut enriched = Vec::with_capacity(entries.len());
        for entry in entries {
            let last_logon = match entry.found().and_then(|r| r.last_logon.found()) {
                Some(logon) => LastLogon {
                    user: self.directory.lookup_user_by_id(&logon.user_id).await,
                    time: logon.time.clone(),
                },
                None => LastLogon::default(),
            };
            enriched.push((entry, last_logon));
        }

        Ok(enriched)
    }
}

async fn lookup_pass<L: SerialLookup>(
    registry: &L,
    batch: &SerialBatch,
) -> RegistryResult<Vec<Lookup<L::Record>>> {
    let mut entries = Vec::with_capacity(batch.len());
    for serial in batch {
        let entry = registry.lookup_by_serial(serial).await?;
        if entry.is_found() {
            debug!(registry = %registry.kind(), %serial, "Fetched device");
        } else {
            debug!(registry = %registry.kind(), %serial, "No match for serial");
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Builds the view for one batch position.
///
/// The mapping is identical whether the serial matched in zero, one, two or
/// three registries.
#[must_use]
pub fn merge(
    index: usize,
    serial: &str,
    managed: Lookup<ManagedDeviceRecord>,
    provisioning: Lookup<ProvisioningRecord>,
    directory: Lookup<DirectoryRecord>,
    last_logon: LastLogon,
) -> MergedDeviceView {
    MergedDeviceView {
        index,
        requested_serial: serial.to_string(),
        managed,
        provisioning,
        directory,
        last_logon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::model::{LogonEvent, RegistryKind, UserSummary};
    use crate::registry::Registry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeManaged(HashMap<String, ManagedDeviceRecord>);
    struct FakeProvisioning(HashMap<String, ProvisioningRecord>);
    struct FakeDirectory {
        devices: HashMap<String, DirectoryRecord>,
        users: HashMap<String, UserSummary>,
        user_lookups: Mutex<Vec<String>>,
    }

    impl Registry for FakeManaged {
        fn kind(&self) -> RegistryKind {
            RegistryKind::ManagedDevice
        }
    }

    impl Registry for FakeProvisioning {
        fn kind(&self) -> RegistryKind {
            RegistryKind::Provisioning
        }
    }

    impl Registry for FakeDirectory {
        fn kind(&self) -> RegistryKind {
            RegistryKind::Directory
        }
    }

    /// Contains-match like the real filter: first hit in sorted key order.
    fn first_match<T: Clone>(map: &HashMap<String, T>, serial: &str) -> Lookup<T> {
        let mut keys: Vec<&String> = map.keys().filter(|k| k.contains(serial)).collect();
        keys.sort();
        keys.first().map(|k| map[*k].clone()).into()
    }

    #[async_trait]
    impl SerialLookup for FakeManaged {
        type Record = ManagedDeviceRecord;

        async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<Self::Record>> {
            if serial == "EXPLODE" {
                return Err(RegistryError::Transport {
                    registry: RegistryKind::ManagedDevice,
                    message: "connection reset".into(),
                });
            }
            Ok(first_match(&self.0, serial))
        }
    }

    #[async_trait]
    impl SerialLookup for FakeProvisioning {
        type Record = ProvisioningRecord;

        async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<Self::Record>> {
            Ok(first_match(&self.0, serial))
        }
    }

    #[async_trait]
    impl SerialLookup for FakeDirectory {
        type Record = DirectoryRecord;

        async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<Self::Record>> {
            Ok(first_match(&self.devices, serial))
        }
    }

    #[async_trait]
    impl UserDirectory for FakeDirectory {
        async fn lookup_user_by_id(&self, user_id: &str) -> Lookup<UserSummary> {
            self.user_lookups.lock().unwrap().push(user_id.to_string());
            self.users.get(user_id).cloned().into()
        }
    }

    fn found(s: &str) -> Lookup<String> {
        Lookup::Found(s.to_string())
    }

    fn resolver() -> Resolver<FakeManaged, FakeProvisioning, FakeDirectory> {
        let logon_time = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();

        let managed = FakeManaged(HashMap::from([
            (
                "SN100".to_string(),
                ManagedDeviceRecord {
                    id: "m-100".into(),
                    device_name: found("PC-100"),
                    user_principal_name: found("owner@contoso.com"),
                    model: found("Latitude 7440"),
                    serial_number: found("SN100"),
                    last_logon: Lookup::Found(LogonEvent {
                        user_id: "u-1".into(),
                        time: Lookup::Found(logon_time),
                    }),
                },
            ),
            (
                "SN300".to_string(),
                ManagedDeviceRecord {
                    id: "m-300".into(),
                    device_name: found("PC-300"),
                    user_principal_name: Lookup::NotFound,
                    model: Lookup::NotFound,
                    serial_number: found("SN300"),
                    last_logon: Lookup::Found(LogonEvent {
                        user_id: "u-missing".into(),
                        time: Lookup::NotFound,
                    }),
                },
            ),
        ]));

        let provisioning = FakeProvisioning(HashMap::from([(
            "SN100".to_string(),
            ProvisioningRecord {
                id: "p-100".into(),
                display_name: found("PC-100"),
                serial_number: found("SN100"),
                last_contacted: Lookup::NotFound,
            },
        )]));

        let directory = FakeDirectory {
            devices: HashMap::from([(
                "SN100".to_string(),
                DirectoryRecord {
                    id: "d-100".into(),
                    display_name: found("PC-100"),
                },
            )]),
            users: HashMap::from([(
                "u-1".to_string(),
                UserSummary {
                    display_name: found("Ada Lovelace"),
                    user_principal_name: found("ada@contoso.com"),
                },
            )]),
            user_lookups: Mutex::new(Vec::new()),
        };

        Resolver::new(managed, provisioning, directory)
    }

    #[tokio::test]
    async fn test_found_everywhere_and_nowhere() {
        let resolver = resolver();
        let views = resolver.resolve_text("SN100\nSN200\n").await.unwrap();

        assert_eq!(views.len(), 2);

        let first = &views[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.requested_serial, "SN100");
        assert!(first.managed.is_found());
        assert!(first.provisioning.is_found());
        assert!(first.directory.is_found());
        assert_eq!(first.native_id(RegistryKind::ManagedDevice), Some("m-100"));
        assert_eq!(first.native_id(RegistryKind::Provisioning), Some("p-100"));
        assert_eq!(first.native_id(RegistryKind::Directory), Some("d-100"));
        let user = first.last_logon.user.found().unwrap();
        assert_eq!(user.display_name, found("Ada Lovelace"));
        assert_eq!(user.user_principal_name, found("ada@contoso.com"));
        assert!(first.last_logon.time.is_found());

        let second = &views[1];
        assert_eq!(second.index, 1);
        assert_eq!(second.requested_serial, "SN200");
        assert_eq!(second.managed, Lookup::NotFound);
        assert_eq!(second.provisioning, Lookup::NotFound);
        assert_eq!(second.directory, Lookup::NotFound);
        assert_eq!(second.last_logon, LastLogon::default());
        assert!(!second.found_anywhere());
    }

    #[tokio::test]
    async fn test_output_is_index_aligned_with_input() {
        let resolver = resolver();
        let batch = SerialBatch::parse("SN200\nSN300\nSN100\nSN999");
        let views = resolver.resolve(&batch).await.unwrap();

        assert_eq!(views.len(), batch.len());
        for (i, (view, serial)) in views.iter().zip(batch.iter()).enumerate() {
            assert_eq!(view.index, i);
            assert_eq!(&view.requested_serial, serial);
        }
        assert_eq!(views[1].native_id(RegistryKind::ManagedDevice), Some("m-300"));
        assert_eq!(views[2].native_id(RegistryKind::ManagedDevice), Some("m-100"));
        assert!(!views[3].found_anywhere());
    }

    #[tokio::test]
    async fn test_missing_user_does_not_abort_resolution() {
        let resolver = resolver();
        let views = resolver.resolve_text("SN300").await.unwrap();

        assert!(views[0].managed.is_found());
        assert_eq!(views[0].last_logon.user, Lookup::NotFound);
        assert_eq!(views[0].last_logon.time, Lookup::NotFound);
        assert_eq!(
            *resolver.directory.user_lookups.lock().unwrap(),
            vec!["u-missing".to_string()]
        );
    }

    #[tokio::test]
    async fn test_user_lookup_only_for_devices_with_logons() {
        let resolver = resolver();
        resolver.resolve_text("SN200\nSN100").await.unwrap();
        assert_eq!(
            *resolver.directory.user_lookups.lock().unwrap(),
            vec!["u-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let resolver = resolver();
        let first = resolver.resolve_text("SN100\nSN200\nSN300").await.unwrap();
        let second = resolver.resolve_text("SN100\nSN200\nSN300").await.unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let resolver = resolver();
        assert!(resolver.resolve_text("\n\n").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_fails_resolution() {
        let resolver = resolver();
        let err = resolver.resolve_text("SN100\nEXPLODE").await.unwrap_err();
        assert_eq!(err.registry(), Some(RegistryKind::ManagedDevice));
    }
}
