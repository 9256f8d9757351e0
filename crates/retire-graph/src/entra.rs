//! Entra ID devices and users (identity-directory registry).

use async_trait::async_trait;
use retire_engine::{
    DeleteOp, DeleteOutcome, DirectoryRecord, Lookup, Presence, Registry, RegistryKind,
    RegistryResult, SerialLookup, UserDirectory, UserSummary,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::graph_client::{presence, search_clause, ApiVersion, Consistency, ODataResponse};
use crate::GraphClient;

const KIND: RegistryKind = RegistryKind::Directory;
const DEVICES: &str = "devices";
const USERS: &str = "users";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntraDevice {
    id: String,
    display_name: Option<String>,
}

impl From<EntraDevice> for DirectoryRecord {
    fn from(device: EntraDevice) -> Self {
        Self {
            id: device.id,
            display_name: Lookup::non_empty(device.display_name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntraUser {
    display_name: Option<String>,
    user_principal_name: Option<String>,
}

impl From<EntraUser> for UserSummary {
    fn from(user: EntraUser) -> Self {
        Self {
            display_name: Lookup::non_empty(user.display_name),
            user_principal_name: Lookup::non_empty(user.user_principal_name),
        }
    }
}

/// Adapter for Entra `devices`, also resolving `users` for logon enrichment.
///
/// Devices are matched by display name, which the enrollment profile sets to
/// the serial number.
#[derive(Debug, Clone)]
pub struct EntraRegistry {
    client: Arc<GraphClient>,
}

impl EntraRegistry {
    #[must_use]
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }
}

impl Registry for EntraRegistry {
    fn kind(&self) -> RegistryKind {
        KIND
    }
}

#[async_trait]
impl SerialLookup for EntraRegistry {
    type Record = DirectoryRecord;

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn lookup_by_serial(&self, serial: &str) -> RegistryResult<Lookup<DirectoryRecord>> {
        let url = self.client.collection_url(ApiVersion::V1, DEVICES);
        let search = search_clause("displayName", serial);

        // $search on directory objects requires eventual consistency.
        let page: ODataResponse<EntraDevice> = self
            .client
            .get(&url, &[("$search", search.as_str())], Consistency::Eventual)
            .await
            .map_err(|e| e.into_registry_error(KIND))?;

        let found: Lookup<DirectoryRecord> =
            page.value.into_iter().next().map(Into::into).into();
        if found.is_found() {
            info!("Fetched {} from Entra", serial);
        } else {
            info!("No Entra device matches {}", serial);
        }
        Ok(found)
    }
}

#[async_trait]
impl UserDirectory for EntraRegistry {
    #[instrument(skip(self), fields(registry = %KIND))]
    async fn lookup_user_by_id(&self, user_id: &str) -> Lookup<UserSummary> {
        let url = match self.client.item_url(ApiVersion::V1, USERS, user_id) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build user URL: {}", e);
                return Lookup::NotFound;
            }
        };

        match self
            .client
            .get::<EntraUser>(
                &url,
                &[("$select", "displayName,userPrincipalName")],
                Consistency::Default,
            )
            .await
        {
            Ok(user) => {
                info!("Fetched user {}", user_id);
                Lookup::Found(user.into())
            }
            Err(e) => {
                warn!("Failed to fetch user {}: {}", user_id, e);
                Lookup::NotFound
            }
        }
    }
}

#[async_trait]
impl DeleteOp for EntraRegistry {
    #[instrument(skip(self), fields(registry = %KIND))]
    async fn delete_by_id(&self, id: &str) -> RegistryResult<DeleteOutcome> {
        let url = self
            .client
            .item_url(ApiVersion::V1, DEVICES, id)
            .map_err(|e| e.into_registry_error(KIND))?;

        info!("Deleting device {}", id);
        match self.client.delete(&url).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.status() == Some(404) => {
                info!("Device {} not found or already deleted", id);
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) => Err(e.into_registry_error(KIND)),
        }
    }

    #[instrument(skip(self), fields(registry = %KIND))]
    async fn exists_by_id(&self, id: &str) -> RegistryResult<Presence> {
        let url = self
            .client
            .item_url(ApiVersion::V1, DEVICES, id)
            .map_err(|e| e.into_registry_error(KIND))?;

        presence(self.client.get::<serde_json::Value>(&url, &[], Consistency::Default).await)
            .map_err(|e| e.into_registry_error(KIND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_summary_from_partial_user() {
        let user: EntraUser = serde_json::from_value(serde_json::json!({
            "displayName": "Ada Lovelace"
        }))
        .unwrap();

        let summary = UserSummary::from(user);
        assert_eq!(summary.display_name, Lookup::Found("Ada Lovelace".to_string()));
        assert_eq!(summary.user_principal_name, Lookup::NotFound);
    }
}
