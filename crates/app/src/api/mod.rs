//! Pricing service backends.
//!
//! The calculator session talks to the pricing service through
//! [`PricingApi`]: one implementation speaks HTTP to a live service, the
//! other prices locally from fixture rate cards.

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use reckon::{
    ids::{PricingModelId, TierId},
    wire::{RecalcRequest, RecalcResponse, TierDetailsResponse},
};

pub mod http;
pub mod static_pricing;

pub use http::{HttpPricingApi, HttpPricingConfig};
pub use static_pricing::StaticPricingApi;

/// Errors that can occur when talking to a pricing backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An HTTP transport or serialization error occurred.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned a non-2xx response or unexpected body.
    #[error("unexpected response from the pricing service: {0}")]
    UnexpectedResponse(String),

    /// No rate card is loaded for the requested tier.
    #[error("no rate card for tier {0}")]
    UnknownTier(TierId),

    /// The request named a metric or add-on the rate card does not price.
    #[error("no rate on file for {0:?}")]
    UnknownRate(String),
}

/// The two pricing service endpoints the calculator drives.
#[automock]
#[async_trait]
pub trait PricingApi: Send + Sync {
    /// Fetch the rate table for one `(pricing model, tier)` pair.
    async fn fetch_tier_details(
        &self,
        pricing_model_id: PricingModelId,
        tier_id: TierId,
    ) -> Result<TierDetailsResponse, ApiError>;

    /// Submit a recalculation request and return the repriced fields.
    async fn submit_recalculation(
        &self,
        pricing_model_id: PricingModelId,
        tier_id: TierId,
        body: RecalcRequest,
    ) -> Result<RecalcResponse, ApiError>;
}
