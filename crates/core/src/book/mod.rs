//! Price book tree

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::{
    ids::{AddonId, PricingModelId, ProductId, TierId},
    policy::DiscountPolicy,
};

pub mod cells;
pub mod rows;

pub use cells::{Cell, CellValue, FieldKey, TotalCell, empty_cells, empty_totals};
pub use rows::{AddonHeaderRow, AddonMetricRow, AddonRow, CoreRow, Row};

new_key_type! {
    /// Key of an in-flight recalculation request. A response whose ticket is
    /// no longer live is stale and must be dropped.
    pub struct TicketKey;
}

/// Which half of a tier's rate table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// The base metered/subscription rows.
    Core,

    /// The add-on rows.
    Addons,
}

/// Addresses one row of one tier's rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowTarget {
    /// The product the tier belongs to.
    pub product_id: ProductId,

    /// The tier whose table holds the row.
    pub tier_id: TierId,

    /// Which half of the table.
    pub section: Section,

    /// Index into that section's row list.
    pub row: usize,
}

/// Marks the single row per section with a recalculation in flight. While
/// set, the row's derived price cells are not editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPending {
    /// Index of the pending row within its section.
    pub row: usize,

    /// The in-flight request's ticket.
    pub ticket: TicketKey,
}

/// An ordered list of calculator rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowGroup {
    /// The rows, in display order.
    pub rows: Vec<Row>,
}

/// A tier's fetched rate table: core rows plus the effective add-on rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TierDetails {
    /// Base metered/subscription rows.
    pub core: RowGroup,

    /// Rows for the currently checked add-ons.
    pub addons: RowGroup,
}

impl TierDetails {
    /// The named section's row group.
    #[must_use]
    pub const fn section(&self, section: Section) -> &RowGroup {
        match section {
            Section::Core => &self.core,
            Section::Addons => &self.addons,
        }
    }

    /// Mutable access to the named section's row group.
    pub const fn section_mut(&mut self, section: Section) -> &mut RowGroup {
        match section {
            Section::Core => &mut self.core,
            Section::Addons => &mut self.addons,
        }
    }
}

/// One metric of a custom-metric add-on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonMetricDef {
    /// The metric key.
    pub metric: String,

    /// The output column for that metric's result.
    pub output: String,
}

/// An optional add-on offered under a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct AddonChoice {
    /// The add-on's id.
    pub addon_id: AddonId,

    /// Display name.
    pub name: String,

    /// Whether the add-on is included in the quote.
    pub checked: bool,

    /// Output column for a plain add-on's row. Seeded from the catalog and
    /// refreshed from the tier details payload, so an add-on checked after
    /// the details land still builds a correctly keyed row.
    pub output: Option<String>,

    /// Unit columns, for add-ons metered across several units.
    pub units: SmallVec<[String; 2]>,

    /// Custom metric definitions. Non-empty means the add-on expands into a
    /// header row plus one line per metric.
    pub metrics: Vec<AddonMetricDef>,
}

impl AddonChoice {
    /// A plain, unchecked add-on.
    #[must_use]
    pub fn plain(addon_id: AddonId, name: impl Into<String>) -> Self {
        Self {
            addon_id,
            name: name.into(),
            checked: false,
            output: None,
            units: SmallVec::new(),
            metrics: Vec::new(),
        }
    }

    /// An unchecked add-on that expands into per-metric lines.
    #[must_use]
    pub fn custom(addon_id: AddonId, name: impl Into<String>, metrics: Vec<AddonMetricDef>) -> Self {
        Self {
            metrics,
            ..Self::plain(addon_id, name)
        }
    }

    /// Whether this add-on expands into per-metric lines.
    #[must_use]
    pub fn has_custom_metrics(&self) -> bool {
        !self.metrics.is_empty()
    }
}

/// A pricing tier of a product.
#[derive(Debug, Clone, PartialEq)]
pub struct TierEntry {
    /// The tier's id.
    pub tier_id: TierId,

    /// Display name.
    pub name: String,

    /// Whether this tier is the product's selected tier.
    pub checked: bool,

    /// Whether a details fetch for this tier is in flight.
    pub loading: bool,

    /// The add-ons offered under this tier.
    pub addons: Vec<AddonChoice>,

    /// The fetched rate table. `None` until the tier has been selected and
    /// its details fetch has resolved.
    pub details: Option<TierDetails>,

    /// Pending recalculation marker for the core section.
    pub pending_core: Option<RowPending>,

    /// Pending recalculation marker for the add-on section.
    pub pending_addons: Option<RowPending>,
}

impl TierEntry {
    /// A fresh unchecked tier with no details.
    #[must_use]
    pub fn new(tier_id: TierId, name: impl Into<String>, addons: Vec<AddonChoice>) -> Self {
        Self {
            tier_id,
            name: name.into(),
            checked: false,
            loading: false,
            addons,
            details: None,
            pending_core: None,
            pending_addons: None,
        }
    }

    /// The pending marker for the named section.
    #[must_use]
    pub const fn pending(&self, section: Section) -> Option<RowPending> {
        match section {
            Section::Core => self.pending_core,
            Section::Addons => self.pending_addons,
        }
    }

    /// Replace the pending marker for the named section.
    pub const fn set_pending(&mut self, section: Section, pending: Option<RowPending>) {
        match section {
            Section::Core => self.pending_core = pending,
            Section::Addons => self.pending_addons = pending,
        }
    }

    /// Clear both sections' pending markers.
    pub const fn clear_pending(&mut self) {
        self.pending_core = None;
        self.pending_addons = None;
    }

    /// The row at `index` within the named section, if details are present.
    #[must_use]
    pub fn row(&self, section: Section, index: usize) -> Option<&Row> {
        self.details
            .as_ref()
            .and_then(|details| details.section(section).rows.get(index))
    }

    /// Mutable access to the row at `index` within the named section.
    pub fn row_mut(&mut self, section: Section, index: usize) -> Option<&mut Row> {
        self.details
            .as_mut()
            .and_then(|details| details.section_mut(section).rows.get_mut(index))
    }

    /// The add-on choice with the given id.
    #[must_use]
    pub fn addon(&self, addon_id: AddonId) -> Option<&AddonChoice> {
        self.addons.iter().find(|addon| addon.addon_id == addon_id)
    }
}

/// A product line of the price book.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductEntry {
    /// The product's id.
    pub product_id: ProductId,

    /// The pricing model version this product's tiers are priced against.
    pub pricing_model_id: PricingModelId,

    /// Display name.
    pub name: String,

    /// Whether the product is included in the quote.
    pub checked: bool,

    /// The discount ceiling assigned by the active policy. `None` means no
    /// policy entry, which enforces no ceiling at all.
    pub discount_ceiling: Option<Decimal>,

    /// Aggregated totals across the product's checked tiers.
    pub total: SmallVec<[TotalCell; 6]>,

    /// The product's pricing tiers.
    pub tiers: Vec<TierEntry>,
}

impl ProductEntry {
    /// A fresh unchecked product with empty totals.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        pricing_model_id: PricingModelId,
        name: impl Into<String>,
        tiers: Vec<TierEntry>,
    ) -> Self {
        Self {
            product_id,
            pricing_model_id,
            name: name.into(),
            checked: false,
            discount_ceiling: None,
            total: empty_totals(),
            tiers,
        }
    }

    /// The checked subset of this product's tiers, derived on demand so it
    /// can never drift from the underlying checked flags.
    pub fn checked_tiers(&self) -> impl Iterator<Item = &TierEntry> {
        self.tiers.iter().filter(|tier| tier.checked)
    }

    /// The tier with the given id.
    #[must_use]
    pub fn tier(&self, tier_id: TierId) -> Option<&TierEntry> {
        self.tiers.iter().find(|tier| tier.tier_id == tier_id)
    }

    /// Mutable access to the tier with the given id.
    pub fn tier_mut(&mut self, tier_id: TierId) -> Option<&mut TierEntry> {
        self.tiers.iter_mut().find(|tier| tier.tier_id == tier_id)
    }

    /// The aggregated total for the given column.
    #[must_use]
    pub fn total(&self, key: FieldKey) -> Option<&TotalCell> {
        self.total.iter().find(|total| total.key == key)
    }
}

/// The root aggregate: every product the quote can draw from, plus the
/// grand total across checked products.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBook {
    /// ISO alpha currency code shared by every value in the book.
    pub currency: String,

    /// The products, in catalog order.
    pub products: Vec<ProductEntry>,

    /// Totals summed across checked products. Present only while more than
    /// one product is checked.
    pub grand_total: Option<SmallVec<[TotalCell; 6]>>,
}

impl PriceBook {
    /// An empty book in the given currency.
    #[must_use]
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            products: Vec::new(),
            grand_total: None,
        }
    }

    /// The product with the given id.
    #[must_use]
    pub fn product(&self, product_id: ProductId) -> Option<&ProductEntry> {
        self.products
            .iter()
            .find(|product| product.product_id == product_id)
    }

    /// Mutable access to the product with the given id.
    pub fn product_mut(&mut self, product_id: ProductId) -> Option<&mut ProductEntry> {
        self.products
            .iter_mut()
            .find(|product| product.product_id == product_id)
    }

    /// The checked products, in catalog order.
    pub fn checked_products(&self) -> impl Iterator<Item = &ProductEntry> {
        self.products.iter().filter(|product| product.checked)
    }

    /// The tier with the given id under the given product.
    #[must_use]
    pub fn tier(&self, product_id: ProductId, tier_id: TierId) -> Option<&TierEntry> {
        self.product(product_id)
            .and_then(|product| product.tier(tier_id))
    }

    /// Mutable access to the tier with the given id under the given product.
    pub fn tier_mut(&mut self, product_id: ProductId, tier_id: TierId) -> Option<&mut TierEntry> {
        self.product_mut(product_id)
            .and_then(|product| product.tier_mut(tier_id))
    }

    /// Assign each product's discount ceiling from the given policy.
    /// Products without a policy entry get no ceiling.
    pub fn apply_policy(&mut self, policy: &DiscountPolicy) {
        for product in &mut self.products {
            product.discount_ceiling = policy.ceiling_for(product.product_id);
        }
    }
}
