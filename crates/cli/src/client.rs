//! API client for communicating with the telemetry daemon

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the telemetry daemon
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

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a GET request that also decodes the body of one non-2xx status.
    ///
    /// `/healthz` answers 503 with the same body as 200.
    pub async fn get_accepting<T: DeserializeOwned>(
        &self,
        path: &str,
        accepted: StatusCode,
    ) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let response = if response.status() == accepted {
            response
        } else {
            check_status(response).await?
        };
        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a DELETE request, ignoring any body
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response).await?;
        Ok(())
    }
}

/// Turn non-2xx responses into errors, preferring the server's message
async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => anyhow::bail!("API error ({}): {}", status, err.error),
        Err(_) => anyhow::bail!("API error ({}): {}", status, body),
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingMetadata {
    pub sensor_id: String,
    pub unit: String,
    pub raw_value: f64,
    pub clamped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub timestamp: String,
    pub quality: String,
    pub metadata: ReadingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub sensor_type: String,
    pub unit: String,
    pub range: (f64, f64),
    pub accuracy: f64,
    pub calibration_due: String,
    pub last_reading: Reading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connectivity {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength_dbm: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub version: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub location: Location,
    pub connectivity: Connectivity,
    pub status: String,
    pub last_seen: String,
    pub registered_at: String,
    pub sensors: Vec<Sensor>,
    pub firmware: FirmwareInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: std::collections::BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_JSON: &str = r#"{
        "id": "0b8a7c9e-2f4d-4c55-9a51-6f0e5c2d1a33",
        "name": "bay-7",
        "device_type": "parking_sensor",
        "location": { "latitude": 40.4168, "longitude": -3.7038 },
        "connectivity": { "protocol": "lorawan" },
        "status": "online",
        "last_seen": "2024-05-01T10:00:00Z",
        "registered_at": "2024-05-01T09:00:00Z",
        "sensors": [{
            "id": "s-1",
            "sensor_type": "occupancy",
            "unit": "bool",
            "range": [0.0, 1.0],
            "accuracy": 0.95,
            "calibrated_at": "2024-05-01T09:00:00Z",
            "calibration_due": "2024-05-31T09:00:00Z",
            "last_reading": {
                "value": 0.0,
                "timestamp": "2024-05-01T09:00:00Z",
                "quality": "good",
                "metadata": { "sensor_id": "s-1", "unit": "bool", "raw_value": 0.0, "clamped": false }
            }
        }],
        "firmware": { "version": "1.0.0", "updated_at": "2024-05-01T09:00:00Z" },
        "security": { "encrypted": true, "vulnerabilities": 0 }
    }"#;

    #[tokio::test]
    async fn test_get_device() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/devices/0b8a7c9e-2f4d-4c55-9a51-6f0e5c2d1a33")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DEVICE_JSON)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let device: Device = client
            .get("api/v1/devices/0b8a7c9e-2f4d-4c55-9a51-6f0e5c2d1a33")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(device.name, "bay-7");
        assert_eq!(device.connectivity.protocol, "lorawan");
        assert_eq!(device.sensors.len(), 1);
        assert_eq!(device.sensors[0].last_reading.quality, "good");
    }

    #[tokio::test]
    async fn test_query_parameters_are_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/devices")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("device_type".into(), "camera".into()),
                mockito::Matcher::UrlEncoded("radius_km".into(), "2.5".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let devices: Vec<Device> = client
            .get_with_query(
                "api/v1/devices",
                &[
                    ("device_type", "camera".to_string()),
                    ("radius_km", "2.5".to_string()),
                ],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v1/devices/ghost")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Device not found: ghost","code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.delete("api/v1/devices/ghost").await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("Device not found: ghost"));
    }

    #[tokio::test]
    async fn test_unhealthy_body_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"unhealthy","components":{"simulator":{"status":"unhealthy","message":"Task panicked","checked_at":"2024-05-01T10:00:00Z"}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health: HealthResponse = client
            .get_accepting("healthz", StatusCode::SERVICE_UNAVAILABLE)
            .await
            .unwrap();

        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["simulator"].message.as_deref(),
            Some("Task panicked")
        );

        let err = client
            .get::<HealthResponse>("healthz")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
