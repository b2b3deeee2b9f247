//! Saved quotes
//!
//! Flattening a price book's checked slice into a persistable document, and
//! rebuilding selection state from a saved document on top of a freshly
//! fetched book.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    book::{PriceBook, TierDetails, TotalCell},
    ids::{AddonId, ProductId, QuoteId, TierId},
};

/// A persisted quote document. Only checked products are flattened in; the
/// surrounding product stores and retrieves the document as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuote {
    /// The document's id.
    pub quote_id: QuoteId,

    /// Display name the seller saved the quote under.
    pub quote_name: String,

    /// When the document was flattened.
    pub saved_at: Timestamp,

    /// ISO currency code of the book the quote was built from.
    pub currency: String,

    /// The checked products, in book order.
    pub quote_details: Vec<SavedProduct>,
}

/// One checked product of a saved quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProduct {
    /// The product's id.
    pub product_id: ProductId,

    /// The product's aggregated totals at save time.
    pub total: SmallVec<[TotalCell; 6]>,

    /// The tiers worth keeping: the checked one plus any holding details.
    pub tiers: Vec<SavedTier>,
}

/// One tier of a saved product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTier {
    /// The tier's id.
    pub tier_id: TierId,

    /// Whether this tier was the product's selected tier.
    pub checked: bool,

    /// Ids of the add-ons that were checked under this tier.
    pub addons: Vec<AddonId>,

    /// The tier's rate table, with the seller's entered values.
    pub details: Option<TierDetails>,
}

/// Ids a saved quote referenced that the fresh price book no longer offers.
/// Stale references are expected after catalog changes; the rest of the
/// document is still applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreloadReport {
    /// Saved products missing from the fresh book.
    pub missing_products: Vec<ProductId>,

    /// Saved tiers missing from their product.
    pub missing_tiers: Vec<TierId>,

    /// Saved add-on selections missing from their tier.
    pub missing_addons: Vec<AddonId>,
}

impl PreloadReport {
    /// Whether every saved reference resolved.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing_products.is_empty()
            && self.missing_tiers.is_empty()
            && self.missing_addons.is_empty()
    }
}

/// Flatten the book's checked products into a saved quote document.
///
/// Unchecked products are left out entirely. Within a saved product, tiers
/// are kept when they are checked or already hold details, so entered
/// values survive even on tiers the seller moved away from.
#[must_use]
pub fn save_quote(book: &PriceBook, quote_name: impl Into<String>) -> SavedQuote {
    let quote_details = book
        .checked_products()
        .map(|product| SavedProduct {
            product_id: product.product_id,
            total: product.total.clone(),
            tiers: product
                .tiers
                .iter()
                .filter(|tier| tier.checked || tier.details.is_some())
                .map(|tier| SavedTier {
                    tier_id: tier.tier_id,
                    checked: tier.checked,
                    addons: tier
                        .addons
                        .iter()
                        .filter(|choice| choice.checked)
                        .map(|choice| choice.addon_id)
                        .collect(),
                    details: tier.details.clone(),
                })
                .collect(),
        })
        .collect();

    SavedQuote {
        quote_id: QuoteId::new(),
        quote_name: quote_name.into(),
        saved_at: Timestamp::now(),
        currency: book.currency.clone(),
        quote_details,
    }
}

/// Rebuild selection state and entered values from a saved quote on top of
/// a freshly fetched price book, matching by product, tier and add-on id.
///
/// References the fresh book no longer offers are collected into the
/// returned report; everything else is applied regardless, so a quote
/// survives catalog drift with only its stale lines dropped.
pub fn preload_quote(book: &mut PriceBook, saved: &SavedQuote) -> PreloadReport {
    let mut report = PreloadReport::default();

    for saved_product in &saved.quote_details {
        let Some(product) = book.product_mut(saved_product.product_id) else {
            report.missing_products.push(saved_product.product_id);
            continue;
        };

        product.checked = true;
        product.total = saved_product.total.clone();

        for saved_tier in &saved_product.tiers {
            let Some(tier) = product.tier_mut(saved_tier.tier_id) else {
                report.missing_tiers.push(saved_tier.tier_id);
                continue;
            };

            tier.checked = saved_tier.checked;
            tier.loading = false;
            tier.details = saved_tier.details.clone();

            for addon_id in &saved_tier.addons {
                let choice = tier
                    .addons
                    .iter_mut()
                    .find(|choice| choice.addon_id == *addon_id);

                match choice {
                    Some(choice) => choice.checked = true,
                    None => report.missing_addons.push(*addon_id),
                }
            }
        }
    }

    report
}
