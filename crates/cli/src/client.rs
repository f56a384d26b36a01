//! API client for the Rent Pricing service

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// API client for the Rent Pricing service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request, failing on any non-success status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
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

    /// GET a probe endpoint; 503 still carries a status body
    async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Submit one property record for pricing
    pub async fn predict(&self, record: &Map<String, Value>) -> Result<PredictOutcome> {
        let url = self.base_url.join("predict").context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .context("Failed to send request")?;

        match response.status() {
            status if status.is_success() => {
                let prediction = response.json().await.context("Failed to parse response")?;
                Ok(PredictOutcome::Priced(prediction))
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let rejection = response
                    .json()
                    .await
                    .context("Failed to parse validation errors")?;
                Ok(PredictOutcome::Rejected(rejection))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ErrorBody>(&body) {
                    Ok(error) => anyhow::bail!("{} ({}): {}", error.error, status, error.message),
                    Err(_) => anyhow::bail!("API error ({}): {}", status, body),
                }
            }
        }
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.get("models").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_probe("readyz").await
    }
}

// API response types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub price: f64,
    pub algorithm: String,
    pub model_version: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub error: String,
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum PredictOutcome {
    Priced(PricePrediction),
    Rejected(ValidationFailure),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub algorithm: String,
    pub stem: String,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Map<String, Value> {
        json!({"borough": "Manhattan", "algorithm": "LightGBM"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_predict_priced() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(
                r#"{"price": 149.5, "algorithm": "LightGBM", "model_version": "v3", "currency": "USD"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        match client.predict(&record()).await.unwrap() {
            PredictOutcome::Priced(p) => {
                assert_eq!(p.price, 149.5);
                assert_eq!(p.model_version, "v3");
            }
            other => panic!("expected a price, got {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_predict_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(422)
            .with_body(
                r#"{"error": "validation_failed",
                    "fields": {"min_nights": ["min value is 1"]},
                    "hints": {"min_nights": "Minimum nights must be greater than 0!"}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        match client.predict(&record()).await.unwrap() {
            PredictOutcome::Rejected(failure) => {
                assert_eq!(failure.fields["min_nights"], vec!["min value is 1"]);
                assert!(failure.hints.contains_key("min_nights"));
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_predict_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(500)
            .with_body(r#"{"error": "configuration_error", "message": "missing xgb_model.json"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(&record()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("configuration_error"));
        assert!(message.contains("xgb_model.json"));
    }

    #[tokio::test]
    async fn test_health_accepts_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status": "unhealthy", "components": {"artifacts":
                    {"status": "unhealthy", "message": "bins.json missing", "last_check_timestamp": 0}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["artifacts"].message.as_deref(),
            Some("bins.json missing")
        );
    }

    #[tokio::test]
    async fn test_models_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(
                r#"[{"algorithm": "LightGBM", "stem": "lgbm", "loaded": true, "version": "v3",
                     "format": "onnx", "features": 13},
                    {"algorithm": "XGBoost", "stem": "xgb", "loaded": false}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let models = client.models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].features, Some(13));
        assert!(!models[1].loaded);
    }
}
