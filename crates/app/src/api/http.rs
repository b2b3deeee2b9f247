//! HTTP client for a live pricing service.

use async_trait::async_trait;
use reqwest::Client;

use reckon::{
    ids::{PricingModelId, TierId},
    wire::{RecalcRequest, RecalcResponse, TierDetailsResponse},
};

use crate::api::{ApiError, PricingApi};

/// Configuration for connecting to a pricing service.
#[derive(Debug, Clone)]
pub struct HttpPricingConfig {
    /// Service base URL, e.g. `"https://pricing.internal"`.
    pub base_url: String,

    /// Bearer token presented on every request.
    pub token: String,
}

/// HTTP client for the pricing service's details and recalculation
/// endpoints.
#[derive(Debug, Clone)]
pub struct HttpPricingApi {
    config: HttpPricingConfig,
    http: Client,
}

impl HttpPricingApi {
    /// Create a new client from the given configuration.
    #[must_use]
    pub fn new(config: HttpPricingConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl PricingApi for HttpPricingApi {
    async fn fetch_tier_details(
        &self,
        pricing_model_id: PricingModelId,
        tier_id: TierId,
    ) -> Result<TierDetailsResponse, ApiError> {
        let url = format!(
            "{}/pricing-models/{pricing_model_id}/tiers/{tier_id}/details",
            self.config.base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(ApiError::UnexpectedResponse(format!(
                "details request failed with status {status}: {text}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn submit_recalculation(
        &self,
        pricing_model_id: PricingModelId,
        tier_id: TierId,
        body: RecalcRequest,
    ) -> Result<RecalcResponse, ApiError> {
        let url = format!(
            "{}/pricing-models/{pricing_model_id}/tiers/{tier_id}/recalculate",
            self.config.base_url
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(ApiError::UnexpectedResponse(format!(
                "recalculation failed with status {status}: {text}"
            )));
        }

        Ok(response.json().await?)
    }
}
