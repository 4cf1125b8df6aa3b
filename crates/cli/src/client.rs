//! API client for the autoscaler's metrics server

use anyhow::{Context, Result};
use reqwest::Client;
use scaler_lib::models::HourlyRollup;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the autoscaler HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request with query parameters
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Hourly usage for one resource between two epoch-second timestamps
    pub async fn metrics(&self, resource: &str, start: i64, end: i64) -> Result<MetricsResponse> {
        self.get(
            "metrics",
            &[
                ("resourceName", resource.to_string()),
                ("startTimestamp", start.to_string()),
                ("endTimestamp", end.to_string()),
            ],
        )
        .await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Vec<HourlyRollup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_metrics_sends_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/metrics")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("resourceName".into(), "etcd-master".into()),
                Matcher::UrlEncoded("startTimestamp".into(), "100".into()),
                Matcher::UrlEncoded("endTimestamp".into(), "200".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"metrics":[{"resource_name":"etcd-master","timestamp":3600,"cpu_value":0.5,"memory_value":1.25}]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client.metrics("etcd-master", 100, 200).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.metrics.len(), 1);
        assert_eq!(response.metrics[0].timestamp, 3600);
        assert_eq!(response.metrics[0].memory_value, 1.25);
    }

    #[tokio::test]
    async fn test_error_status_includes_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/metrics")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"Invalid resource name"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.metrics(" ", 1, 2).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("Invalid resource name"));
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
