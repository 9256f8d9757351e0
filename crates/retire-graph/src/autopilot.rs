//! Windows Autopilot device identities (provisioning registry).
//!
//! Reads of a single identity are served from a cache that lags behind
//! deletes, so existence is checked against the full listing instead.

use async_trait::async_trait;
use retire_engine::{
    DeleteOp, DeleteOutcome, Lookup, Presence, ProvisioningRecord, Registry, RegistryKind,
    RegistryResult, SerialLookup,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::graph_client::{odata_literal, parse_timestamp, ApiVersion, Consistency, ODataResponse};
use crate::GraphClient;

const KIND: RegistryKind = RegistryKind::Provisioning;
const COLLECTION: &str = "deviceManagement/windowsAutopilotDeviceIdentities";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutopilotIdentity {
    id: String,
    display_name: Option<String>,
    serial_number: Option<String>,
    last_contacted_date_time: Option<String>,
}

impl From<AutopilotIdentity> for ProvisioningRecord {
    fn from(identity: AutopilotIdentity) -> Self {
        Self {
            id: identity.id,
            display_name: Lookup::non_empty(identity.display_name),
            serial_number: Lookup::non_empty(identity.serial_number),
            last_contacted: parse_timestamp(identity.last_contacted_date_time.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentityId {
    id: String,
}

/// Adapter for `deviceManagement/windowsAutopilotDeviceIdentities`.
#[derive(Debug, Clone)]
pub struct AutopilotRegistry {
    client: Arc<GraphClient>,
}

impl AutopilotRegistry {
    #[must_use]
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

impl Registry for AutopilotRegistry {
    fn kind(&self) -> RegistryKind {
        KIND
    }
}

#[async_trait]
impl SerialLookup for AutopilotRegistry {
    type Record = ProvisioningRecord;

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<ProvisioningRecord>> {
        let url = self.client.collection_url(ApiVersion::V1, COLLECTION);
        let filter = format!("contains(serialNumber, {})", odata_literal(serial));

        let page: ODataResponse<AutopilotIdentity> = self
            .client
            .get(&url, &[("$filter", filter.as_str())], Consistency::Default)
            .await
            .map_err(|e| e.into_registry_error(KIND))?;

        let found: Lookup<ProvisioningRecord> =
            page.value.into_iter().next().map(Into::into).into();
        if found.is_found() {
            info!("Fetched {} from Autopilot", serial);
        } else {
            info!("No Autopilot identity matches {}", serial);
        }
        Ok(found)
    }
}

#[async_trait]
impl DeleteOp for AutopilotRegistry {
    #[instrument(skip(self), fields(registry = %KIND))]
    async fn delete_by_id(&self, id: &str) -> RegistryResult<DeleteOutcome> {
        let url = self
            .client
            .item_url(ApiVersion::V1, COLLECTION, id)
            .map_err(|e| e.into_registry_error(KIND))?;

        info!("Deleting identity {}", id);
        match self.client.delete(&url).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            // Autopilot answers 400 while a delete for the identity is pending.
            Err(e) if e.status() == Some(400) => {
                info!("Identity {} already queued for deletion", id);
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) => Err(e.into_registry_error(KIND)),
        }
    }

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn exists_by_id(&self, id: &str) -> RegistryResult<Presence> {
        let url = self.client.collection_url(ApiVersion::V1, COLLECTION);

        match self.client.list_all::<IdentityId>(&url, &[]).await {
            Ok(identities) => {
                debug!("Listed {} identities", identities.len());
                if identities.iter().any(|i| i.id == id) {
                    Ok(Presence::Present)
                } else {
                    Ok(Presence::Absent)
                }
            }
            Err(e) if e.status() == Some(404) => Ok(Presence::Absent),
            Err(e) => Err(e.into_registry_error(KIND)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_contacted_identity() {
        let identity: AutopilotIdentity = serde_json::from_value(serde_json::json!({
            "id": "a-1",
            "displayName": "",
            "serialNumber": "SN1",
            "lastContactedDateTime": "0001-01-01T00:00:00Z"
        }))
        .unwrap();

        let record = ProvisioningRecord::from(identity);
        assert_eq!(record.display_name, Lookup::NotFound);
        assert_eq!(record.serial_number, Lookup::Found("SN1".to_string()));
        assert_eq!(record.last_contacted, Lookup::NotFound);
    }
}
