//! Intune managed devices (device-management registry).

use async_trait::async_trait;
use retire_engine::{
    DeleteOp, DeleteOutcome, LogonEvent, Lookup, ManagedDeviceRecord, Presence, Registry,
    RegistryKind, RegistryResult, SerialLookup,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::graph_client::{
    odata_literal, parse_timestamp, presence, ApiVersion, Consistency, ODataResponse,
};
use crate::GraphClient;

const KIND: RegistryKind = RegistryKind::ManagedDevice;
const COLLECTION: &str = "deviceManagement/managedDevices";
const SELECT: &str = "id,deviceName,userPrincipalName,model,serialNumber,usersLoggedOn";

/// Managed device as returned by the beta endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedDevice {
    id: String,
    device_name: Option<String>,
    user_principal_name: Option<String>,
    model: Option<String>,
    serial_number: Option<String>,
    users_logged_on: Option<Vec<LoggedOnUser>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoggedOnUser {
    user_id: Option<String>,
    last_log_on_date_time: Option<String>,
}

impl From<ManagedDevice> for ManagedDeviceRecord {
    fn from(device: ManagedDevice) -> Self {
        // Graph appends logons, so the last entry is the most recent.
        let last_logon = device
            .users_logged_on
            .and_then(|users| users.into_iter().last())
            .and_then(|user| {
                let time = parse_timestamp(user.last_log_on_date_time.as_deref());
                user.user_id
                    .filter(|id| !id.is_empty())
                    .map(|user_id| LogonEvent { user_id, time })
            })
            .into();

        Self {
            id: device.id,
            device_name: Lookup::non_empty(device.device_name),
            user_principal_name: Lookup::non_empty(device.user_principal_name),
            model: Lookup::non_empty(device.model),
            serial_number: Lookup::non_empty(device.serial_number),
            last_logon,
        }
    }
}

/// Adapter for `deviceManagement/managedDevices`.
#[derive(Debug, Clone)]
pub struct IntuneRegistry {
    client: Arc<GraphClient>,
}

impl IntuneRegistry {
    #[must_use]
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

impl Registry for IntuneRegistry {
    fn kind(&self) -> RegistryKind {
        KIND
    }
}

#[async_trait]
impl SerialLookup for IntuneRegistry {
    type Record = ManagedDeviceRecord;

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<ManagedDeviceRecord>> {
        let url = self.client.collection_url(ApiVersion::Beta, COLLECTION);
        let filter = format!("contains(serialNumber, {})", odata_literal(serial));

        let page: ODataResponse<ManagedDevice> = self
            .client
            .get(
                &url,
                &[("$filter", filter.as_str()), ("$select", SELECT)],
                Consistency::Default,
            )
            .await
            .map_err(|e| e.into_registry_error(KIND))?;

        let found: Lookup<ManagedDeviceRecord> =
            page.value.into_iter().next().map(Into::into).into();
        if found.is_found() {
            info!("Fetched {} from Intune", serial);
        } else {
            info!("No Intune device matches {}", serial);
        }
        Ok(found)
    }
}

#[async_trait]
impl DeleteOp for IntuneRegistry {
    #[instrument(skip(self), fields(registry = %KIND))]
    async fn delete_by_id(&self, id: &str) -> RegistryResult<DeleteOutcome> {
        let url = self
            .client
            .item_url(ApiVersion::V1, COLLECTION, id)
            .map_err(|e| e.into_registry_error(KIND))?;

        info!("Deleting device {}", id);
        match self.client.delete(&url).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.status() == Some(404) => {
                info!("Device {} not found, treating as already deleted", id);
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) => Err(e.into_registry_error(KIND)),
        }
    }

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn exists_by_id(&self, id: &str) -> RegistryResult<Presence> {
        let url = self
            .client
            .item_url(ApiVersion::V1, COLLECTION, id)
            .map_err(|e| e.into_registry_error(KIND))?;

        presence(self.client.get::<serde_json::Value>(&url, &[], Consistency::Default).await)
            .map_err(|e| e.into_registry_error(KIND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_takes_last_logged_on_user() {
        let device: ManagedDevice = serde_json::from_value(serde_json::json!({
            "id": "m-1",
            "deviceName": "PC-1",
            "userPrincipalName": "",
            "model": "Latitude 7440",
            "serialNumber": "SN1",
            "usersLoggedOn": [
                {"userId": "u-old", "lastLogOnDateTime": "2024-01-01T00:00:00Z"},
                {"userId": "u-new", "lastLogOnDateTime": "2024-02-01T00:00:00Z"}
            ]
        }))
        .unwrap();

        let record = ManagedDeviceRecord::from(device);
        assert_eq!(record.device_name, Lookup::Found("PC-1".to_string()));
        assert_eq!(record.user_principal_name, Lookup::NotFound);
        let logon = record.last_logon.into_option().unwrap();
        assert_eq!(logon.user_id, "u-new");
        assert!(logon.time.is_found());
    }

    #[test]
    fn test_record_without_logons() {
        let device: ManagedDevice = serde_json::from_value(serde_json::json!({
            "id": "m-2",
            "usersLoggedOn": null
        }))
        .unwrap();

        let record = ManagedDeviceRecord::from(device);
        assert_eq!(record.last_logon, Lookup::NotFound);
        assert_eq!(record.model, Lookup::NotFound);
    }
}
