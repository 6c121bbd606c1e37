use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn send_test_notification(&self, recipient_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/notifications/test", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "recipient_id": recipient_id,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to send test notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!(
                "Failed to send test notification: {} - Response: {}",
                status,
                body
            );
        }

        Ok(())
    }

    pub async fn announce(&self, text: &str, topic: Option<&str>) -> Result<()> {
        let url = format!("{}/notifications/announce", self.base_url);

        let mut body = json!({ "text": text });
        if let Some(topic) = topic {
            body["topic"] = json!(topic);
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to post announcement")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to post announcement: {}", response.status());
        }

        Ok(())
    }

    pub async fn status(&self) -> Result<Value> {
        let url = format!("{}/notifications/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get notifier status")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get notifier status: {}", response.status());
        }

        let api_response: Value = response.json().await.context("Failed to parse response")?;

        // Extract the data from ApiResponse wrapper
        api_response["data"]
            .as_object()
            .context("No data object in response")
            .map(|obj| Value::Object(obj.clone()))
    }

    pub async fn connection_count(&self) -> Result<u64> {
        let status = self.status().await?;
        status["connections"]
            .as_u64()
            .context("No connections count in status response")
    }
}
