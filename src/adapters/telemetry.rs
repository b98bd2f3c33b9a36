use crate::adapters::http::send_with_retry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub type Properties = Map<String, Value>;

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn capture(&self, distinct_id: &str, event: &str, properties: Properties) -> Result<()>;
}

/// Sends the event on a background task. Nothing waits for it and failures are only logged.
pub fn capture_in_background(
    sink: Arc<dyn TelemetrySink>,
    distinct_id: String,
    event: &'static str,
    properties: Properties,
) {
    tokio::spawn(async move {
        if let Err(err) = sink.capture(&distinct_id, event, properties).await {
            tracing::warn!("Telemetry event {} failed: {}", event, err);
        }
    });
}

pub struct PosthogSink {
    client: Client,
    api_key: String,
    host: String,
}

impl PosthogSink {
    pub fn new(api_key: impl Into<String>, host: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            host: host.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for PosthogSink {
    async fn capture(&self, distinct_id: &str, event: &str, properties: Properties) -> Result<()> {
        let payload = json!({
            "api_key": self.api_key,
            "event": event,
            "distinct_id": distinct_id,
            "properties": properties,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let url = format!("{}/capture/", self.host);
        send_with_retry("PostHog", || self.client.post(&url).json(&payload))
            .await
            .with_context(|| format!("Failed to capture {}", event))?;
        Ok(())
    }
}

/// Used when no telemetry backend is configured.
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn capture(&self, distinct_id: &str, event: &str, properties: Properties) -> Result<()> {
        tracing::debug!(
            "telemetry {} for {} ({} properties)",
            event,
            distinct_id,
            properties.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_posthog_capture_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/capture/")
            .match_body(Matcher::PartialJson(json!({
                "api_key": "phc_test",
                "event": "started",
                "distinct_id": "alice",
                "properties": { "repo_name": "widgets" }
            })))
            .with_status(200)
            .with_body("{\"status\":1}")
            .create_async()
            .await;

        let sink = PosthogSink::new("phc_test", server.url()).unwrap();
        let mut properties = Properties::new();
        properties.insert("repo_name".to_string(), json!("widgets"));
        sink.capture("alice", "started", properties).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        NoopSink
            .capture("bob", "failed", Properties::new())
            .await
            .unwrap();
    }
}
