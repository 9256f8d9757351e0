//! Common test utilities for retire-graph integration tests.

#![allow(dead_code)]

use retire_graph::{GraphClient, GraphCredentials, GraphEndpoints, RetryConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT_ID: &str = "test-tenant";

pub const MANAGED_DEVICES: &str = "/beta/deviceManagement/managedDevices";
pub const MANAGED_DEVICES_V1: &str = "/v1.0/deviceManagement/managedDevices";
pub const AUTOPILOT_IDENTITIES: &str = "/v1.0/deviceManagement/windowsAutopilotDeviceIdentities";
pub const ENTRA_DEVICES: &str = "/v1.0/devices";

/// Test data factory for Intune managed devices.
pub fn create_managed_device(id: &str, serial: &str, logons: &[(&str, &str)]) -> Value {
    let users_logged_on: Vec<Value> = logons
        .iter()
        .map(|(user_id, time)| json!({"userId": user_id, "lastLogOnDateTime": time}))
        .collect();

    json!({
        "id": id,
        "deviceName": format!("PC-{}", serial),
        "userPrincipalName": "primary@test.onmicrosoft.com",
        "model": "Latitude 7440",
        "serialNumber": serial,
        "usersLoggedOn": users_logged_on
    })
}

/// Test data factory for Autopilot device identities.
pub fn create_autopilot_identity(id: &str, serial: &str) -> Value {
    json!({
        "id": id,
        "displayName": format!("AP-{}", serial),
        "serialNumber": serial,
        "lastContactedDateTime": "2024-05-01T12:00:00Z"
    })
}

/// Test data factory for Entra devices.
pub fn create_entra_device(id: &str, display_name: &str) -> Value {
    json!({
        "id": id,
        "displayName": display_name,
        "deviceId": format!("{}-device", id)
    })
}

/// Test data factory for Entra users.
pub fn create_entra_user(display_name: &str, upn: &str) -> Value {
    json!({
        "displayName": display_name,
        "userPrincipalName": upn
    })
}

/// Wraps items in an OData response format.
pub fn create_odata_response(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error response.
pub fn create_odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Mock server standing in for both the login and the Graph endpoints.
pub struct MockGraphServer {
    pub server: MockServer,
}

impl MockGraphServer {
    /// Creates a new mock server with the token endpoint mounted.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.mock_token_endpoint().await;
        mock
    }

    /// Returns the mock server's base URL.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Builds a Graph client pointed at this server with short retry delays.
    pub fn client(&self) -> Arc<GraphClient> {
        let credentials = GraphCredentials {
            tenant_id: TENANT_ID.to_string(),
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string().into(),
        };
        let endpoints = GraphEndpoints::new(&self.url(), &self.url()).unwrap();
        Arc::new(
            GraphClient::with_retry_config(credentials, endpoints, RetryConfig::for_testing())
                .unwrap(),
        )
    }

    /// Sets up OAuth token endpoint.
    pub async fn mock_token_endpoint(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/oauth2/v2.0/token", TENANT_ID)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_token_response("mock-access-token", 3600)),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up the Intune serial lookup.
    pub async fn mock_managed_lookup(&self, serial: &str, devices: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(MANAGED_DEVICES))
            .and(query_param(
                "$filter",
                format!("contains(serialNumber, '{}')", serial),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(devices, None)),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up the Autopilot serial lookup.
    pub async fn mock_autopilot_lookup(&self, serial: &str, identities: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(AUTOPILOT_IDENTITIES))
            .and(query_param(
                "$filter",
                format!("contains(serialNumber, '{}')", serial),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(identities, None)),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up the Entra display-name search.
    pub async fn mock_entra_search(&self, serial: &str, devices: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(ENTRA_DEVICES))
            .and(query_param("$search", format!("\"displayName:{}\"", serial)))
            .and(header("ConsistencyLevel", "eventual"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(devices, None)),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up a user read.
    pub async fn mock_user(&self, user_id: &str, user: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/users/{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(user))
            .mount(&self.server)
            .await;
    }

    /// Sets up a DELETE on an item that answers with the given status.
    pub async fn mock_delete(&self, item_path: &str, status: u16) {
        let template = if status < 300 {
            ResponseTemplate::new(status)
        } else {
            ResponseTemplate::new(status)
                .set_body_json(create_odata_error("Error", "delete rejected"))
        };

        Mock::given(method("DELETE"))
            .and(path(item_path))
            .respond_with(template)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Sets up a single-item GET that reports the item as deleted.
    pub async fn mock_item_gone(&self, item_path: &str) {
        Mock::given(method("GET"))
            .and(path(item_path))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(create_odata_error("ResourceNotFound", "not found")),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up a single-item GET that still returns the item.
    pub async fn mock_item_present(&self, item_path: &str, item: Value) {
        Mock::given(method("GET"))
            .and(path(item_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(item))
            .mount(&self.server)
            .await;
    }

    /// Sets up the full Autopilot listing used for confirmation.
    pub async fn mock_autopilot_listing(&self, identities: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(AUTOPILOT_IDENTITIES))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(identities, None)),
            )
            .mount(&self.server)
            .await;
    }

    /// Mounts a two-page identity listing linked by `$skiptoken=page2`.
    pub async fn mock_autopilot_pages(&self, first: Vec<Value>, second: Vec<Value>) {
        let next = format!("{}{}?$skiptoken=page2", self.url(), AUTOPILOT_IDENTITIES);
        Mock::given(method("GET"))
            .and(path(AUTOPILOT_IDENTITIES))
            .and(query_param("$skiptoken", "page2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_odata_response(second, None)),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(AUTOPILOT_IDENTITIES))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_odata_response(first, Some(&next))),
            )
            .mount(&self.server)
            .await;
    }
}
