//! Facilitator client
//!
//! Verification and settlement of x402 payments are delegated to an external
//! facilitator. The payment payload is forwarded as-is.

use super::types::{FacilitatorRequest, PaymentRequirements, SettleResponse, VerifyResponse};
use crate::config::X402Config;
use crate::error::{ModexoError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Facilitator: Send + Sync {
    async fn verify(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse>;

    async fn settle(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse>;
}

/// Facilitator reached over HTTP (`{base}/verify`, `{base}/settle`)
pub struct HttpFacilitator {
    http: Client,
    base_url: String,
    x402_version: u32,
}

impl HttpFacilitator {
    pub fn new(config: &X402Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModexoError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.facilitator_url.trim_end_matches('/').to_string(),
            x402_version: config.x402_version,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<T> {
        let body = FacilitatorRequest {
            x402_version: self.x402_version,
            payment_payload: payload,
            payment_requirements: requirements,
        };

        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self.http.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Facilitator {} returned {}: {}", path, status, body);
            return Err(ModexoError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ModexoError::Facilitator(format!("malformed {} response: {}", path, e)))
    }
}

#[async_trait]
impl Facilitator for HttpFacilitator {
    #[instrument(skip_all, fields(resource = %requirements.resource))]
    async fn verify(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        self.post("verify", payload, requirements).await
    }

    #[instrument(skip_all, fields(resource = %requirements.resource))]
    async fn settle(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        self.post("settle", payload, requirements).await
    }
}
