//! Selection
//!
//! Checkbox and radio semantics over the price book tree: product toggles,
//! single-select tier picks, add-on toggles, and the installation of fetched
//! tier details into the tree.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    book::{
        AddonChoice, AddonMetricDef, PriceBook, Row, TierDetails,
        cells::{Cell, FieldKey, empty_cells},
        rows::{AddonHeaderRow, AddonMetricRow, AddonRow, CoreRow},
    },
    ids::{AddonId, PricingModelId, ProductId, TierId},
    wire::{AddonFields, RowDefinition, TierDetailsResponse, WireValue},
};

/// Selection failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The product id does not appear in the book.
    #[error("product {0} is not in the price book")]
    ProductNotFound(ProductId),

    /// The tier id does not appear under the addressed product.
    #[error("tier {0} is not in the price book")]
    TierNotFound(TierId),

    /// The add-on index does not address a choice under the tier.
    #[error("add-on index {index} is out of range for tier {tier_id} ({len} add-ons)")]
    AddonIndexOutOfRange {
        /// The tier whose add-ons were addressed.
        tier_id: TierId,

        /// The out-of-range index.
        index: usize,

        /// How many add-ons the tier offers.
        len: usize,
    },
}

/// Returned by [`select_tier`] when the picked tier has no cached details
/// and none are currently being fetched. The caller owes the tree a details
/// fetch for this address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedsDetails {
    /// The product the tier belongs to.
    pub product_id: ProductId,

    /// The pricing model to fetch against.
    pub pricing_model_id: PricingModelId,

    /// The tier whose details are missing.
    pub tier_id: TierId,
}

/// Flip a product's inclusion in the quote.
///
/// # Errors
///
/// Returns [`SelectionError::ProductNotFound`] if the id is not in the book.
pub fn toggle_product(book: &mut PriceBook, product_id: ProductId) -> Result<(), SelectionError> {
    let product = book
        .product_mut(product_id)
        .ok_or(SelectionError::ProductNotFound(product_id))?;

    product.checked = !product.checked;

    Ok(())
}

/// Check a tier and uncheck its siblings. At most one tier per product is
/// ever checked; re-picking the checked tier leaves it checked.
///
/// Returns a [`NeedsDetails`] when the picked tier has neither cached
/// details nor a fetch in flight, in which case the tier is marked loading.
///
/// # Errors
///
/// Returns [`SelectionError::ProductNotFound`] or
/// [`SelectionError::TierNotFound`] if the address is stale.
pub fn select_tier(
    book: &mut PriceBook,
    product_id: ProductId,
    tier_id: TierId,
) -> Result<Option<NeedsDetails>, SelectionError> {
    let product = book
        .product_mut(product_id)
        .ok_or(SelectionError::ProductNotFound(product_id))?;
    let pricing_model_id = product.pricing_model_id;

    if product.tier(tier_id).is_none() {
        return Err(SelectionError::TierNotFound(tier_id));
    }

    for tier in &mut product.tiers {
        tier.checked = tier.tier_id == tier_id;
    }

    let tier = product
        .tier_mut(tier_id)
        .ok_or(SelectionError::TierNotFound(tier_id))?;

    if tier.details.is_some() || tier.loading {
        return Ok(None);
    }

    tier.loading = true;

    Ok(Some(NeedsDetails {
        product_id,
        pricing_model_id,
        tier_id,
    }))
}

/// Install a fetched rate table on a tier.
///
/// Core rows mirror the response. Every offered add-on absorbs its payload's
/// column names, so an add-on checked after the fetch still builds correctly
/// keyed rows. Add-on rows themselves are built only for the currently
/// checked add-ons, seeded from the payload where one exists. The table is
/// installed even if the tier was unchecked while the fetch was in flight,
/// so switching back later costs nothing.
///
/// # Errors
///
/// Returns [`SelectionError::ProductNotFound`] or
/// [`SelectionError::TierNotFound`] if the address is stale.
pub fn apply_tier_details(
    book: &mut PriceBook,
    product_id: ProductId,
    tier_id: TierId,
    response: &TierDetailsResponse,
) -> Result<(), SelectionError> {
    let tier = book
        .tier_mut(product_id, tier_id)
        .ok_or(SelectionError::TierNotFound(tier_id))?;

    let mut details = TierDetails::default();
    details.core.rows = response.core.iter().map(core_row).collect();

    let payloads = addon_payloads(response);
    for choice in &mut tier.addons {
        if let Some(fields) = payloads.get(&choice.addon_id) {
            absorb_addon_fields(choice, fields);
        }
    }

    for choice in tier.addons.iter().filter(|choice| choice.checked) {
        let fields = payloads.get(&choice.addon_id).copied();
        details.addons.rows.extend(addon_rows(choice, fields));
    }

    tier.details = Some(details);
    tier.loading = false;

    Ok(())
}

/// Copy an add-on payload's column names onto the choice. Fields the payload
/// leaves empty keep their catalog values.
fn absorb_addon_fields(choice: &mut AddonChoice, fields: &AddonFields) {
    if fields.output_column.is_some() {
        choice.output = fields.output_column.clone();
    }

    if !fields.unit_columns.is_empty() {
        choice.units = fields.unit_columns.iter().cloned().collect();
    }

    if !fields.metrics.is_empty() {
        choice.metrics = fields
            .metrics
            .iter()
            .map(|metric| AddonMetricDef {
                metric: metric.metric_column.clone(),
                output: metric.output_column.clone(),
            })
            .collect();
    }
}

/// Drop a tier's loading marker after a failed details fetch. The tier
/// keeps no details, so re-picking it retries the fetch.
///
/// # Errors
///
/// Returns [`SelectionError::ProductNotFound`] or
/// [`SelectionError::TierNotFound`] if the address is stale.
pub fn tier_details_failed(
    book: &mut PriceBook,
    product_id: ProductId,
    tier_id: TierId,
) -> Result<(), SelectionError> {
    let tier = book
        .tier_mut(product_id, tier_id)
        .ok_or(SelectionError::TierNotFound(tier_id))?;

    tier.loading = false;

    Ok(())
}

/// Flip the add-on at `index` under a tier, rebuilding the add-on section
/// when details are present.
///
/// The section is rebuilt in choice order. Rows belonging to add-ons that
/// stay checked are carried over with their values intact; newly checked
/// add-ons start with empty cells until the next recalculation prices them.
///
/// # Errors
///
/// Returns [`SelectionError::ProductNotFound`], [`SelectionError::TierNotFound`]
/// or [`SelectionError::AddonIndexOutOfRange`] if the address is stale.
pub fn toggle_addon(
    book: &mut PriceBook,
    product_id: ProductId,
    tier_id: TierId,
    index: usize,
) -> Result<(), SelectionError> {
    let tier = book
        .tier_mut(product_id, tier_id)
        .ok_or(SelectionError::TierNotFound(tier_id))?;

    let len = tier.addons.len();
    let choice = tier
        .addons
        .get_mut(index)
        .ok_or(SelectionError::AddonIndexOutOfRange {
            tier_id,
            index,
            len,
        })?;

    choice.checked = !choice.checked;

    let Some(details) = tier.details.as_mut() else {
        return Ok(());
    };

    let mut kept: FxHashMap<AddonId, Vec<Row>> = FxHashMap::default();
    for row in details.addons.rows.drain(..) {
        if let Some(addon_id) = row.addon_id() {
            kept.entry(addon_id).or_default().push(row);
        }
    }

    for choice in tier.addons.iter().filter(|choice| choice.checked) {
        match kept.remove(&choice.addon_id) {
            Some(rows) => details.addons.rows.extend(rows),
            None => details.addons.rows.extend(addon_rows(choice, None)),
        }
    }

    Ok(())
}

/// Index a details response's add-on payloads by parsed add-on id. Entries
/// whose key is not a well-formed id are ignored.
fn addon_payloads(response: &TierDetailsResponse) -> FxHashMap<AddonId, &AddonFields> {
    response
        .addon
        .iter()
        .flat_map(|detail| detail.0.iter())
        .filter_map(|(key, fields)| Some((key.parse::<AddonId>().ok()?, fields)))
        .collect()
}

fn core_row(definition: &RowDefinition) -> Row {
    let mut cells = empty_cells();
    fill_cells(&mut cells, &definition.values);

    Row::Core(CoreRow {
        metric: definition.metric_column.clone(),
        output: definition.output_column.clone(),
        units: definition.unit_columns.iter().cloned().collect(),
        cells,
    })
}

/// Build the display rows for one checked add-on. Custom-metric add-ons
/// expand into a header line plus one row per metric; plain add-ons are a
/// single row.
fn addon_rows(choice: &AddonChoice, fields: Option<&AddonFields>) -> Vec<Row> {
    let header = || {
        Row::AddonHeader(AddonHeaderRow {
            addon_id: choice.addon_id,
            name: choice.name.clone(),
        })
    };

    if let Some(fields) = fields
        && !fields.metrics.is_empty()
    {
        let mut rows = vec![header()];

        for metric in &fields.metrics {
            let mut cells = empty_cells();
            fill_cells(&mut cells, &metric.values);

            rows.push(Row::AddonMetric(AddonMetricRow {
                addon_id: choice.addon_id,
                metric: metric.metric_column.clone(),
                output: metric.output_column.clone(),
                cells,
            }));
        }

        return rows;
    }

    if choice.has_custom_metrics() {
        let mut rows = vec![header()];

        rows.extend(
            choice.metrics.iter().map(|def| {
                Row::new_addon_metric(choice.addon_id, def.metric.clone(), def.output.clone())
            }),
        );

        return rows;
    }

    let mut row = AddonRow {
        addon_id: choice.addon_id,
        output: fields
            .and_then(|fields| fields.output_column.clone())
            .or_else(|| choice.output.clone())
            .unwrap_or_default(),
        units: fields
            .map(|fields| fields.unit_columns.iter().cloned().collect())
            .unwrap_or_else(|| choice.units.clone()),
        cells: empty_cells(),
    };

    if let Some(fields) = fields {
        fill_cells(&mut row.cells, &fields.values);
    }

    vec![Row::Addon(row)]
}

fn fill_cells(cells: &mut SmallVec<[Cell; 6]>, values: &FxHashMap<FieldKey, WireValue>) {
    for cell in cells {
        if let Some(value) = values.get(&cell.key) {
            cell.value = value.clone().into_cell();
        }
    }
}
