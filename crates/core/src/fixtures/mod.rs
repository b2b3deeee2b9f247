//! Fixtures
//!
//! Named catalog, policy, and rate-card sets loaded from YAML. Demos and
//! tests build their price books from these instead of hand-assembling
//! trees.

use std::{fs, path::PathBuf};

use rustc_hash::FxHashMap;
use rusty_money::iso;
use thiserror::Error;

use crate::{
    book::{AddonChoice, AddonMetricDef, PriceBook, ProductEntry, TierEntry},
    fixtures::rates::{RateLine, TierRateCard},
    ids::{AddonId, PricingModelId, ProductId, TierId},
    policy::{DiscountPolicy, ProductDiscount},
};

pub mod books;
pub mod policies;
pub mod rates;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid decimal format
    #[error("Invalid decimal format: {0}")]
    InvalidDecimal(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Product not found
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Tier not found
    #[error("Tier not found: {0}")]
    TierNotFound(String),

    /// Add-on not found
    #[error("Add-on not found: {0}")]
    AddonNotFound(String),

    /// Add-on rate card with nothing to price from
    #[error("Add-on rate needs a unit price or metrics: {0}")]
    IncompleteAddonRate(String),

    /// No rate card loaded for a tier
    #[error("No rate card for tier: {0}")]
    RatesNotFound(String),

    /// No book loaded yet
    #[error("No book loaded yet")]
    NoBook,

    /// No policy loaded yet
    #[error("No policy loaded yet")]
    NoPolicy,
}

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    /// String key -> generated id mappings for lookups
    product_ids: FxHashMap<String, ProductId>,
    tier_ids: FxHashMap<String, TierId>,
    addon_ids: FxHashMap<String, AddonId>,
    pricing_model_ids: FxHashMap<String, PricingModelId>,

    /// The loaded catalog
    book: Option<PriceBook>,

    /// The loaded discount policy
    policy: Option<DiscountPolicy>,

    /// Rate cards keyed by tier
    rates: FxHashMap<TierId, TierRateCard>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            product_ids: FxHashMap::default(),
            tier_ids: FxHashMap::default(),
            addon_ids: FxHashMap::default(),
            pricing_model_ids: FxHashMap::default(),
            book: None,
            policy: None,
            rates: FxHashMap::default(),
        }
    }

    /// Load a price book catalog from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// fixture names an unknown currency.
    pub fn load_book(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("books").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: books::BookFixture = serde_norway::from_str(&contents)?;

        iso::find(&fixture.currency)
            .ok_or_else(|| FixtureError::UnknownCurrency(fixture.currency.clone()))?;

        let mut book = PriceBook::new(&fixture.currency);

        // Entries go in sorted key order so every load builds the same tree.
        let mut products: Vec<(String, books::ProductFixture)> =
            fixture.products.into_iter().collect();
        products.sort_by(|a, b| a.0.cmp(&b.0));

        for (product_key, product_fixture) in products {
            let product_id = ProductId::new();

            let model_key = product_fixture
                .pricing_model
                .unwrap_or_else(|| product_key.clone());

            let pricing_model_id = *self
                .pricing_model_ids
                .entry(model_key)
                .or_insert_with(PricingModelId::new);

            let mut tiers: Vec<(String, books::TierFixture)> =
                product_fixture.tiers.into_iter().collect();
            tiers.sort_by(|a, b| a.0.cmp(&b.0));

            let mut entries = Vec::new();

            for (tier_key, tier_fixture) in tiers {
                let tier_id = TierId::new();
                let full_tier_key = format!("{product_key}.{tier_key}");

                let mut addons: Vec<(String, books::AddonFixture)> =
                    tier_fixture.addons.into_iter().collect();
                addons.sort_by(|a, b| a.0.cmp(&b.0));

                let mut choices = Vec::new();

                for (addon_key, addon_fixture) in addons {
                    let addon_id = AddonId::new();

                    let choice = if addon_fixture.metrics.is_empty() {
                        AddonChoice::plain(addon_id, addon_fixture.name)
                    } else {
                        let metrics = addon_fixture
                            .metrics
                            .into_iter()
                            .map(|line| AddonMetricDef {
                                metric: line.metric,
                                output: line.output,
                            })
                            .collect();

                        AddonChoice::custom(addon_id, addon_fixture.name, metrics)
                    };

                    choices.push(choice);
                    self.addon_ids
                        .insert(format!("{full_tier_key}.{addon_key}"), addon_id);
                }

                entries.push(TierEntry::new(tier_id, tier_fixture.name, choices));
                self.tier_ids.insert(full_tier_key, tier_id);
            }

            book.products.push(ProductEntry::new(
                product_id,
                pricing_model_id,
                product_fixture.name,
                entries,
            ));

            self.product_ids.insert(product_key, product_id);
        }

        self.book = Some(book);

        Ok(self)
    }

    /// Load a discount policy from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it
    /// names a product the loaded book does not have. Load the book first.
    pub fn load_policy(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("policies").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: policies::PolicyFixture = serde_norway::from_str(&contents)?;

        let mut entries = Vec::new();

        for (product_key, ceiling) in fixture.ceilings {
            let product_id = self
                .product_ids
                .get(&product_key)
                .copied()
                .ok_or_else(|| FixtureError::ProductNotFound(product_key.clone()))?;

            entries.push(ProductDiscount {
                product_id,
                discount: policies::parse_percent_points(&ceiling)?,
            });
        }

        self.policy = Some(DiscountPolicy::new(entries));

        Ok(self)
    }

    /// Load rate cards from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if a number
    /// is malformed, or if a card names a tier or add-on the loaded book
    /// does not have. Load the book first.
    pub fn load_rates(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("rates").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: rates::RatesFixture = serde_norway::from_str(&contents)?;

        for (tier_key, tier_fixture) in fixture.tiers {
            let tier_id = self
                .tier_ids
                .get(&tier_key)
                .copied()
                .ok_or_else(|| FixtureError::TierNotFound(tier_key.clone()))?;

            let core = tier_fixture
                .core
                .into_iter()
                .map(RateLine::try_from)
                .collect::<Result<Vec<_>, _>>()?;

            let mut addon_fixtures: Vec<(String, rates::AddonRateFixture)> =
                tier_fixture.addons.into_iter().collect();
            addon_fixtures.sort_by(|a, b| a.0.cmp(&b.0));

            let mut addons = Vec::new();

            for (addon_key, addon_fixture) in addon_fixtures {
                let full_key = format!("{tier_key}.{addon_key}");

                let addon_id = self
                    .addon_ids
                    .get(&full_key)
                    .copied()
                    .ok_or(FixtureError::AddonNotFound(full_key))?;

                addons.push(addon_fixture.try_into_card(&addon_key, addon_id)?);
            }

            self.rates.insert(tier_id, TierRateCard { core, addons });
        }

        Ok(self)
    }

    /// Load a complete fixture set (book, policy, and rates with the same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        let mut fixture = Self::new();

        fixture
            .load_book(name)?
            .load_policy(name)?
            .load_rates(name)?;

        Ok(fixture)
    }

    /// Get a copy of the loaded price book
    ///
    /// # Errors
    ///
    /// Returns an error if no book has been loaded yet.
    pub fn book(&self) -> Result<PriceBook, FixtureError> {
        self.book.clone().ok_or(FixtureError::NoBook)
    }

    /// Get a copy of the loaded discount policy
    ///
    /// # Errors
    ///
    /// Returns an error if no policy has been loaded yet.
    pub fn policy(&self) -> Result<DiscountPolicy, FixtureError> {
        self.policy.clone().ok_or(FixtureError::NoPolicy)
    }

    /// Get all loaded rate cards, keyed by tier
    pub fn rates(&self) -> &FxHashMap<TierId, TierRateCard> {
        &self.rates
    }

    /// Get the rate card for a tier by its "product.tier" key
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is not known or has no rate card.
    pub fn rate_card(&self, key: &str) -> Result<&TierRateCard, FixtureError> {
        let tier_id = self.tier_id(key)?;

        self.rates
            .get(&tier_id)
            .ok_or_else(|| FixtureError::RatesNotFound(key.to_string()))
    }

    /// Get a product id by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found.
    pub fn product_id(&self, key: &str) -> Result<ProductId, FixtureError> {
        self.product_ids
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::ProductNotFound(key.to_string()))
    }

    /// Get a tier id by its "product.tier" key
    ///
    /// # Errors
    ///
    /// Returns an error if the tier is not found.
    pub fn tier_id(&self, key: &str) -> Result<TierId, FixtureError> {
        self.tier_ids
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::TierNotFound(key.to_string()))
    }

    /// Get an add-on id by its "product.tier.addon" key
    ///
    /// # Errors
    ///
    /// Returns an error if the add-on is not found.
    pub fn addon_id(&self, key: &str) -> Result<AddonId, FixtureError> {
        self.addon_ids
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::AddonNotFound(key.to_string()))
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;

    fn write_fixture(base: &Path, category: &str, name: &str, contents: &str) -> TestResult {
        let dir = base.join(category);

        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{name}.yml")), contents)?;

        Ok(())
    }

    #[test]
    fn fixture_loads_book_policy_and_rates() -> TestResult {
        let mut fixture = Fixture::new();

        fixture
            .load_book("demo")?
            .load_policy("demo")?
            .load_rates("demo")?;

        let book = fixture.book()?;

        assert_eq!(book.currency, "USD");
        assert_eq!(book.products.len(), 2);

        let platform_id = fixture.product_id("platform")?;
        let platform = book.product(platform_id).ok_or("missing product")?;

        assert_eq!(platform.name, "Platform");
        assert_eq!(platform.tiers.len(), 2);

        let policy = fixture.policy()?;

        assert_eq!(policy.ceiling_for(platform_id), Some(Decimal::from(25)));

        let card = fixture.rate_card("platform.essentials")?;

        assert_eq!(card.core.len(), 2);
        assert_eq!(card.addons.len(), 2);

        Ok(())
    }

    #[test]
    fn fixture_from_set_loads_all_fixtures() -> TestResult {
        let fixture = Fixture::from_set("demo")?;

        assert_eq!(fixture.product_ids.len(), 2);
        assert_eq!(fixture.tier_ids.len(), 4);
        assert_eq!(fixture.rates.len(), 4);

        Ok(())
    }

    #[test]
    fn fixture_ids_line_up_between_book_and_rates() -> TestResult {
        let fixture = Fixture::from_set("demo")?;

        let book = fixture.book()?;
        let tier_id = fixture.tier_id("platform.essentials")?;
        let support_id = fixture.addon_id("platform.essentials.support")?;

        let tier = book
            .products
            .iter()
            .flat_map(|product| product.tiers.iter())
            .find(|tier| tier.tier_id == tier_id)
            .ok_or("tier missing from book")?;

        assert!(tier.addon(support_id).is_some());

        let card = fixture.rate_card("platform.essentials")?;

        assert!(card.addon(support_id).is_some());

        Ok(())
    }

    #[test]
    fn fixture_custom_metric_addons_carry_catalog_metrics() -> TestResult {
        let fixture = Fixture::from_set("demo")?;

        let book = fixture.book()?;
        let tier_id = fixture.tier_id("platform.essentials")?;
        let pipelines_id = fixture.addon_id("platform.essentials.pipelines")?;

        let tier = book
            .products
            .iter()
            .flat_map(|product| product.tiers.iter())
            .find(|tier| tier.tier_id == tier_id)
            .ok_or("tier missing from book")?;

        let pipelines = tier.addon(pipelines_id).ok_or("add-on missing")?;

        assert!(pipelines.has_custom_metrics());
        assert_eq!(pipelines.metrics.len(), 2);

        Ok(())
    }

    #[test]
    fn fixture_no_book_returns_error() {
        let fixture = Fixture::new();
        let result = fixture.book();

        assert!(matches!(result, Err(FixtureError::NoBook)));
    }

    #[test]
    fn fixture_no_policy_returns_error() {
        let fixture = Fixture::new();
        let result = fixture.policy();

        assert!(matches!(result, Err(FixtureError::NoPolicy)));
    }

    #[test]
    fn fixture_product_not_found_returns_error() {
        let fixture = Fixture::new();
        let result = fixture.product_id("nonexistent");

        assert!(matches!(result, Err(FixtureError::ProductNotFound(_))));
    }

    #[test]
    fn fixture_rejects_unknown_currency() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(
            dir.path(),
            "books",
            "bad",
            "currency: SHELLS\nproducts: {}\n",
        )?;

        let mut fixture = Fixture::with_base_path(dir.path());
        let result = fixture.load_book("bad");

        assert!(matches!(
            result,
            Err(FixtureError::UnknownCurrency(code)) if code == "SHELLS"
        ));

        Ok(())
    }

    #[test]
    fn fixture_policy_rejects_unknown_product() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(dir.path(), "books", "bad", "currency: USD\nproducts: {}\n")?;
        write_fixture(dir.path(), "policies", "bad", "ceilings:\n  ghost: 25%\n")?;

        let mut fixture = Fixture::with_base_path(dir.path());

        fixture.load_book("bad")?;

        let result = fixture.load_policy("bad");

        assert!(matches!(
            result,
            Err(FixtureError::ProductNotFound(key)) if key == "ghost"
        ));

        Ok(())
    }

    #[test]
    fn fixture_rates_reject_unknown_tier() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(dir.path(), "books", "bad", "currency: USD\nproducts: {}\n")?;

        write_fixture(
            dir.path(),
            "rates",
            "bad",
            "tiers:\n  ghost.tier:\n    core: []\n",
        )?;

        let mut fixture = Fixture::with_base_path(dir.path());

        fixture.load_book("bad")?;

        let result = fixture.load_rates("bad");

        assert!(matches!(
            result,
            Err(FixtureError::TierNotFound(key)) if key == "ghost.tier"
        ));

        Ok(())
    }

    #[test]
    fn fixture_products_share_pricing_models_by_key() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(
            dir.path(),
            "books",
            "shared",
            r"
currency: USD
products:
  alpha:
    name: Alpha
    pricing_model: v7
    tiers: {}
  beta:
    name: Beta
    pricing_model: v7
    tiers: {}
  gamma:
    name: Gamma
    tiers: {}
",
        )?;

        let mut fixture = Fixture::with_base_path(dir.path());

        fixture.load_book("shared")?;

        let book = fixture.book()?;
        let alpha_id = fixture.product_id("alpha")?;
        let beta_id = fixture.product_id("beta")?;
        let gamma_id = fixture.product_id("gamma")?;

        let model_of = |id| {
            book.product(id)
                .map(|product| product.pricing_model_id)
                .ok_or("product missing from book")
        };

        assert_eq!(model_of(alpha_id)?, model_of(beta_id)?);
        assert_ne!(model_of(alpha_id)?, model_of(gamma_id)?);

        Ok(())
    }
}
