// src/cloud_client.rs
//
// Best-effort sighting submission to the cloud backend. A failed or slow
// POST is logged and forgotten; nothing in the capture path waits on it.

use crate::types::SubmissionConfig;
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    pub plate_number: String,
    /// RFC 3339 UTC, e.g. "2026-08-28T09:15:00Z".
    pub timestamp: String,
    pub location_id: String,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_color: Option<String>,
    pub direction: Option<String>,
}

pub struct CloudClient {
    api_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl CloudClient {
    pub fn new(config: &SubmissionConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            api_url: config.api_endpoint.clone(),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    /// POST one sighting. Returns whether the backend accepted it.
    pub async fn send_sighting(&self, sighting: &Sighting) -> bool {
        let url = format!("{}/sightings/", self.api_url);

        match self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(sighting)
            .send()
            .await
        {
            Ok(resp) if resp.status() == reqwest::StatusCode::CREATED => {
                info!(plate = %sighting.plate_number, "sighting sent");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(%status, %body, "sighting rejected by backend");
                false
            }
            Err(e) => {
                error!("failed to send sighting: {e}");
                false
            }
        }
    }
}
