//! Rate Card Fixtures
//!
//! Rate cards give each tier the unit prices and default quantities its
//! rows start from. They are fixture data for demos and tests; a live
//! deployment gets the same numbers from the pricing service.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{fixtures::FixtureError, ids::AddonId, wire::WireValue};

/// Wrapper for rate cards in YAML
#[derive(Debug, Deserialize)]
pub struct RatesFixture {
    /// Map of "product.tier" key -> tier rate fixture
    pub tiers: FxHashMap<String, TierRateFixture>,
}

/// Rate card fixture for one tier
#[derive(Debug, Deserialize)]
pub struct TierRateFixture {
    /// Core rate lines, in display order
    pub core: Vec<RateLineFixture>,

    /// Map of add-on key -> add-on rate fixture
    #[serde(default)]
    pub addons: FxHashMap<String, AddonRateFixture>,
}

/// One core rate line from YAML
#[derive(Debug, Deserialize)]
pub struct RateLineFixture {
    /// The metric key
    pub metric: String,

    /// The output column the metric's result lands in
    pub output: String,

    /// Unit columns for multi-unit rows
    #[serde(default)]
    pub units: Vec<String>,

    /// Price per unit (e.g. "0.40")
    pub unit_price: String,

    /// Default quantity: one number, or a map of unit -> number
    pub quantity: QuantityFixture,
}

/// Add-on rate fixture from YAML
#[derive(Debug, Default, Deserialize)]
pub struct AddonRateFixture {
    /// Output column for a plain add-on's row
    #[serde(default)]
    pub output: Option<String>,

    /// Price per unit for a plain add-on
    #[serde(default)]
    pub unit_price: Option<String>,

    /// Default quantity for a plain add-on
    #[serde(default)]
    pub quantity: Option<QuantityFixture>,

    /// Per-metric rates for a custom-metric add-on
    #[serde(default)]
    pub metrics: Vec<MetricRateFixture>,
}

/// One metric rate line of a custom-metric add-on
#[derive(Debug, Deserialize)]
pub struct MetricRateFixture {
    /// The metric key
    pub metric: String,

    /// The output column for that metric's result
    pub output: String,

    /// Price per unit (e.g. "0.01")
    pub unit_price: String,

    /// Default quantity
    pub quantity: String,
}

/// Quantity from YAML: one number, or per-unit numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuantityFixture {
    /// A single quantity (e.g. "1000")
    Scalar(String),

    /// One quantity per unit column (e.g. `{gb: "500", seats: "25"}`)
    PerUnit(FxHashMap<String, String>),
}

impl QuantityFixture {
    /// Convert to a wire value
    ///
    /// # Errors
    ///
    /// Returns an error if any quantity cannot be parsed as a decimal.
    pub fn try_into_wire(self) -> Result<WireValue, FixtureError> {
        match self {
            Self::Scalar(value) => Ok(WireValue::Scalar(parse_decimal(&value)?)),
            Self::PerUnit(units) => {
                let mut parsed = FxHashMap::default();

                for (unit, value) in units {
                    parsed.insert(unit, parse_decimal(&value)?);
                }

                Ok(WireValue::PerUnit(parsed))
            }
        }
    }
}

/// Rates for one tier, resolved against the loaded book
#[derive(Debug, Clone, PartialEq)]
pub struct TierRateCard {
    /// Core rate lines, in display order
    pub core: Vec<RateLine>,

    /// Rates for the tier's add-ons
    pub addons: Vec<AddonRateCard>,
}

impl TierRateCard {
    /// Get the core rate line for a metric
    pub fn line(&self, metric: &str) -> Option<&RateLine> {
        self.core.iter().find(|line| line.metric == metric)
    }

    /// Get the rate card for an add-on
    pub fn addon(&self, addon_id: AddonId) -> Option<&AddonRateCard> {
        self.addons.iter().find(|card| card.addon_id == addon_id)
    }
}

/// One core rate line, resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RateLine {
    /// The metric key
    pub metric: String,

    /// The output column the metric's result lands in
    pub output: String,

    /// Unit columns for multi-unit rows
    pub units: Vec<String>,

    /// Price per unit
    pub unit_price: Decimal,

    /// Default quantity
    pub quantity: WireValue,
}

impl TryFrom<RateLineFixture> for RateLine {
    type Error = FixtureError;

    fn try_from(fixture: RateLineFixture) -> Result<Self, Self::Error> {
        Ok(Self {
            metric: fixture.metric,
            output: fixture.output,
            units: fixture.units,
            unit_price: parse_decimal(&fixture.unit_price)?,
            quantity: fixture.quantity.try_into_wire()?,
        })
    }
}

/// Rates for one add-on, resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AddonRateCard {
    /// The add-on the rates belong to
    pub addon_id: AddonId,

    /// Output column for a plain add-on's row
    pub output: Option<String>,

    /// Price per unit for a plain add-on
    pub unit_price: Decimal,

    /// Default quantity for a plain add-on
    pub quantity: WireValue,

    /// Per-metric rates for a custom-metric add-on
    pub metrics: Vec<MetricRate>,
}

impl AddonRateCard {
    /// Whether the add-on prices per custom metric
    pub fn has_custom_metrics(&self) -> bool {
        !self.metrics.is_empty()
    }

    /// Get the rate for one custom metric
    pub fn metric(&self, metric: &str) -> Option<&MetricRate> {
        self.metrics.iter().find(|rate| rate.metric == metric)
    }
}

/// One custom metric's rate, resolved
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRate {
    /// The metric key
    pub metric: String,

    /// The output column for that metric's result
    pub output: String,

    /// Price per unit
    pub unit_price: Decimal,

    /// Default quantity
    pub quantity: Decimal,
}

impl TryFrom<MetricRateFixture> for MetricRate {
    type Error = FixtureError;

    fn try_from(fixture: MetricRateFixture) -> Result<Self, Self::Error> {
        Ok(Self {
            metric: fixture.metric,
            output: fixture.output,
            unit_price: parse_decimal(&fixture.unit_price)?,
            quantity: parse_decimal(&fixture.quantity)?,
        })
    }
}

impl AddonRateFixture {
    /// Convert to an [`AddonRateCard`] for the add-on named by `key`
    ///
    /// # Errors
    ///
    /// Returns an error if a number cannot be parsed, or if the fixture
    /// carries neither a unit price nor metric rates.
    pub fn try_into_card(self, key: &str, addon_id: AddonId) -> Result<AddonRateCard, FixtureError> {
        if self.unit_price.is_none() && self.metrics.is_empty() {
            return Err(FixtureError::IncompleteAddonRate(key.to_string()));
        }

        let unit_price = self
            .unit_price
            .as_deref()
            .map(parse_decimal)
            .transpose()?
            .unwrap_or_default();

        let quantity = self
            .quantity
            .map(QuantityFixture::try_into_wire)
            .transpose()?
            .unwrap_or(WireValue::Scalar(Decimal::ONE));

        let metrics = self
            .metrics
            .into_iter()
            .map(MetricRate::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AddonRateCard {
            addon_id,
            output: self.output,
            unit_price,
            quantity,
            metrics,
        })
    }
}

/// Parse a decimal string (e.g. "0.40")
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a decimal.
pub fn parse_decimal(s: &str) -> Result<Decimal, FixtureError> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidDecimal(s.to_string()))
}
