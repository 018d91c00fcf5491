use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use switchboard_core::config::DirectoryConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::CustomerDirectory;

/// Customer directory behind an HTTP API.
///
/// Both endpoints take a JSON body and an access `code` query parameter:
/// `POST {base}/get_customer_info` with `{customer_id}` and
/// `POST {base}/update_customer_info` with `{customer_id, address}`.
pub struct HttpCustomerDirectory {
    http: Client,
    base_url: String,
    access_code: Option<String>,
}

impl HttpCustomerDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| SwitchboardError::Config("directory.base_url is required".into()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SwitchboardError::Config(format!("directory client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_code: config.access_code.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let mut req = self.http.post(self.endpoint(path)).json(&body);
        if let Some(code) = &self.access_code {
            req = req.query(&[("code", code.as_str())]);
        }
        let response = req.send().await.map_err(|e| SwitchboardError::ToolExecution {
            tool: path.to_string(),
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(endpoint = path, %status, "Customer directory request failed");
            return Err(SwitchboardError::ToolExecution {
                tool: path.to_string(),
                message: format!("HTTP {}: {}", status, text),
            });
        }
        Ok(response)
    }
}

impl CustomerDirectory for HttpCustomerDirectory {
    fn fetch_profile(&self, customer_id: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        let customer_id = customer_id.to_string();
        Box::pin(async move {
            let response = self
                .post("get_customer_info", json!({ "customer_id": customer_id }))
                .await?;
            debug!(customer_id = %customer_id, "Fetched customer profile");
            response
                .json()
                .await
                .map_err(|e| SwitchboardError::ToolExecution {
                    tool: "get_customer_info".into(),
                    message: e.to_string(),
                })
        })
    }

    fn update_address(&self, customer_id: &str, address: &str) -> BoxFuture<'_, Result<String>> {
        let body = json!({ "customer_id": customer_id, "address": address });
        Box::pin(async move {
            self.post("update_customer_info", body).await?;
            Ok("success".to_string())
        })
    }
}

/// Directory held in memory, for local runs and tests.
#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with one demo customer, id `0`.
    pub fn with_sample() -> Self {
        let mut customers = HashMap::new();
        customers.insert(
            "0".to_string(),
            json!({
                "customer_id": "0",
                "customer_name": "Jon Doe",
                "customer_phone": "+1 12345",
                "customer_email": "jonhdoe@email.com",
                "customer_address": "100 Queen St W, Toronto, ON M5H 2N2",
                "customer_score": 700,
                "products": [
                    { "type": "mortgage", "term_years": 7, "rate": 10.2, "amount": 200000 }
                ]
            }),
        );
        Self {
            customers: RwLock::new(customers),
        }
    }

    pub async fn insert(&self, customer_id: impl Into<String>, profile: serde_json::Value) {
        self.customers.write().await.insert(customer_id.into(), profile);
    }
}

impl CustomerDirectory for InMemoryCustomerDirectory {
    fn fetch_profile(&self, customer_id: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        let customer_id = customer_id.to_string();
        Box::pin(async move {
            self.customers
                .read()
                .await
                .get(&customer_id)
                .cloned()
                .ok_or_else(|| SwitchboardError::Database(format!("customer {} not found", customer_id)))
        })
    }

    fn update_address(&self, customer_id: &str, address: &str) -> BoxFuture<'_, Result<String>> {
        let customer_id = customer_id.to_string();
        let address = address.to_string();
        Box::pin(async move {
            let mut customers = self.customers.write().await;
            let profile = customers
                .get_mut(&customer_id)
                .ok_or_else(|| SwitchboardError::Database(format!("customer {} not found", customer_id)))?;
            profile["customer_address"] = serde_json::Value::String(address);
            Ok("success".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_update_is_visible() {
        let dir = InMemoryCustomerDirectory::with_sample();
        dir.update_address("0", "123 Main Street, Toronto, ON, M5V 3K8")
            .await
            .unwrap();
        let profile = dir.fetch_profile("0").await.unwrap();
        assert_eq!(profile["customer_address"], "123 Main Street, Toronto, ON, M5V 3K8");
    }

    #[tokio::test]
    async fn unknown_customer_is_error() {
        let dir = InMemoryCustomerDirectory::new();
        assert!(dir.fetch_profile("42").await.is_err());
        assert!(dir.update_address("42", "x").await.is_err());
    }

    #[test]
    fn http_requires_base_url() {
        assert!(HttpCustomerDirectory::new(&DirectoryConfig::default()).is_err());
        let dir = HttpCustomerDirectory::new(&DirectoryConfig {
            base_url: Some("https://crm.example.com/api/".into()),
            access_code: Some("secret".into()),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            dir.endpoint("get_customer_info"),
            "https://crm.example.com/api/get_customer_info"
        );
    }
}
