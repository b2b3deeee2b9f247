//! Discount policy

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ids::ProductId;

/// One product's negotiated discount ceiling, as served by the policy
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDiscount {
    /// The product the ceiling applies to.
    pub product_id: ProductId,

    /// Maximum allowed discount, in percent points.
    pub discount: Decimal,
}

/// The account's discount ceilings, keyed by product. Products without an
/// entry have no ceiling and never trip validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscountPolicy {
    by_product: FxHashMap<ProductId, Decimal>,
}

impl DiscountPolicy {
    /// Build a policy from the endpoint's entry list. Later entries for the
    /// same product replace earlier ones.
    #[must_use]
    pub fn new(entries: Vec<ProductDiscount>) -> Self {
        let by_product = entries
            .into_iter()
            .map(|entry| (entry.product_id, entry.discount))
            .collect();

        Self { by_product }
    }

    /// The ceiling for the given product, if the policy names one.
    #[must_use]
    pub fn ceiling_for(&self, product_id: ProductId) -> Option<Decimal> {
        self.by_product.get(&product_id).copied()
    }

    /// Number of products the policy names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_product.len()
    }

    /// Whether the policy names no products at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }
}

impl From<Vec<ProductDiscount>> for DiscountPolicy {
    fn from(entries: Vec<ProductDiscount>) -> Self {
        Self::new(entries)
    }
}
