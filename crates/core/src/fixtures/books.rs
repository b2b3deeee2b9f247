//! Price Book Fixtures

use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Wrapper for a price book in YAML
#[derive(Debug, Deserialize)]
pub struct BookFixture {
    /// ISO alpha currency code shared by every value in the book
    pub currency: String,

    /// Map of product key -> product fixture
    pub products: FxHashMap<String, ProductFixture>,
}

/// Product fixture from YAML
#[derive(Debug, Deserialize)]
pub struct ProductFixture {
    /// Product name
    pub name: String,

    /// Pricing model key; products naming the same key share one pricing
    /// model id. Defaults to the product's own key.
    #[serde(default)]
    pub pricing_model: Option<String>,

    /// Map of tier key -> tier fixture
    pub tiers: FxHashMap<String, TierFixture>,
}

/// Tier fixture from YAML
#[derive(Debug, Deserialize)]
pub struct TierFixture {
    /// Tier name
    pub name: String,

    /// Map of add-on key -> add-on fixture
    #[serde(default)]
    pub addons: FxHashMap<String, AddonFixture>,
}

/// Add-on fixture from YAML
#[derive(Debug, Deserialize)]
pub struct AddonFixture {
    /// Add-on name
    pub name: String,

    /// Custom metric lines; empty for plain add-ons
    #[serde(default)]
    pub metrics: Vec<AddonMetricFixture>,
}

/// One custom metric line of an add-on fixture
#[derive(Debug, Deserialize)]
pub struct AddonMetricFixture {
    /// The metric key
    pub metric: String,

    /// The output column for that metric's result
    pub output: String,
}
