//! Recalculation
//!
//! Local cell edits, construction of the holistic request the pricing
//! service recomputes a tier from, and the merge of its response back into
//! the tree. Requests are keyed by metric and add-on id rather than row
//! index, so row order stays a presentation detail.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    book::{
        PriceBook, Row, RowTarget, Section, TierDetails,
        cells::{CellValue, FieldKey},
    },
    ids::{AddonId, ProductId, TierId},
    wire::{AddonOutputValue, AddonRequest, RecalcRequest, RecalcResponse, WireValue},
};

/// Edit and request-construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecalcError {
    /// The tier has no fetched details, so it has no rows to edit.
    #[error("tier {0} has no details")]
    MissingDetails(TierId),

    /// The row address does not exist in the tree.
    #[error("no row at {0:?}")]
    RowNotFound(RowTarget),

    /// The addressed row is a header and carries no cells.
    #[error("row has no editable cells")]
    RowNotEditable,

    /// The row has a recalculation in flight. Its price cells are latched
    /// until the response lands; only the quantity stays interactive.
    #[error("row {0:?} has a recalculation in flight")]
    RowLocked(RowTarget),

    /// The edit's shape does not match the row: a unit name was given for
    /// a single-unit row, or omitted for a multi-unit row.
    #[error("edit value shape does not match the row's unit columns")]
    UnitMismatch,

    /// The settled field is not one of the three that submit a
    /// recalculation. Edits to every other field stay local.
    #[error("edits to {0:?} apply locally and never submit a recalculation")]
    LocalOnlyField(FieldKey),
}

/// Merge failures. A failed merge leaves the tree exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The tier has no fetched details to merge into.
    #[error("tier {0} has no details")]
    MissingDetails(TierId),

    /// The response priced a metric no core row carries.
    #[error("response prices unknown metric {0:?}")]
    UnknownMetric(String),

    /// The response priced an add-on with no rows in the tree.
    #[error("response prices unknown add-on {0}")]
    UnknownAddon(AddonId),

    /// The response priced a custom-metric line that is not in the tree.
    #[error("response prices unknown metric {metric:?} under add-on {addon_id}")]
    UnknownAddonMetric {
        /// The custom add-on the response addressed.
        addon_id: AddonId,

        /// The metric key with no matching row.
        metric: String,
    },

    /// An `addon_output` key was not a well-formed add-on id.
    #[error("add-on key {0:?} is not a well-formed id")]
    InvalidAddonKey(String),
}

/// Write a typed value into a cell. Scalar rows take a plain value; rows
/// metered across several units take one value per named unit, upserted
/// into the cell's per-unit map.
///
/// Any field may be edited locally. While the row has a recalculation in
/// flight its non-quantity cells are latched.
///
/// # Errors
///
/// Returns [`RecalcError::RowLocked`] for a latched cell,
/// [`RecalcError::UnitMismatch`] when the value shape does not fit the
/// row, and an addressing error when the target is stale.
pub fn apply_edit(
    book: &mut PriceBook,
    target: RowTarget,
    field: FieldKey,
    value: Decimal,
    unit: Option<&str>,
) -> Result<(), RecalcError> {
    let tier = book
        .tier_mut(target.product_id, target.tier_id)
        .ok_or(RecalcError::RowNotFound(target))?;

    if field != FieldKey::Qty
        && let Some(pending) = tier.pending(target.section)
        && pending.row == target.row
    {
        return Err(RecalcError::RowLocked(target));
    }

    if tier.details.is_none() {
        return Err(RecalcError::MissingDetails(target.tier_id));
    }

    let row = tier
        .row_mut(target.section, target.row)
        .ok_or(RecalcError::RowNotFound(target))?;

    let multi_unit = row.is_multi_unit();
    let cell = row.cell_mut(field).ok_or(RecalcError::RowNotEditable)?;

    match unit {
        None => {
            if multi_unit {
                return Err(RecalcError::UnitMismatch);
            }
            cell.value = CellValue::Scalar(value);
        }
        Some(unit) => {
            if !multi_unit {
                return Err(RecalcError::UnitMismatch);
            }
            if let CellValue::PerUnit(units) = &mut cell.value {
                units.insert(unit.to_owned(), value);
            } else {
                let mut units = FxHashMap::default();
                units.insert(unit.to_owned(), value);
                cell.value = CellValue::PerUnit(units);
            }
        }
    }

    Ok(())
}

/// Build the request submitted when an edit to `settled` comes to rest.
///
/// Quantity and output-key dictionaries are rebuilt from the tier's current
/// rows each time, since the server recomputes the whole tier holistically.
/// Override dictionaries are carried forward from the previous request so
/// repeated edits accumulate, then the settled row's current value is
/// recorded as an override. Pinning a unit price clears any pinned total
/// price for the same key, and the other way round. An add-on row priced
/// for the first time may have no quantity yet; its override still travels,
/// in a slice holding only the dictionaries.
///
/// # Errors
///
/// Returns [`RecalcError::LocalOnlyField`] when `settled` is not one of
/// the three recalculating fields, and an addressing error when the target
/// is stale.
pub fn build_request(
    book: &PriceBook,
    target: RowTarget,
    settled: FieldKey,
    carried: Option<&RecalcRequest>,
) -> Result<RecalcRequest, RecalcError> {
    if !settled.triggers_recompute() {
        return Err(RecalcError::LocalOnlyField(settled));
    }

    let (mut request, details) = rebuild(book, target, carried)?;

    let row = details
        .section(target.section)
        .rows
        .get(target.row)
        .ok_or(RecalcError::RowNotFound(target))?;
    let key = row_wire_key(row).ok_or(RecalcError::RowNotEditable)?.to_owned();
    let value = row
        .cell(settled)
        .map(|cell| WireValue::from_cell(&cell.value))
        .ok_or(RecalcError::RowNotEditable)?;

    match target.section {
        Section::Core => record_override(
            &mut request.discounted_unit_price_dict,
            &mut request.discounted_total_price_dict,
            settled,
            &key,
            value,
        ),
        Section::Addons => {
            let addon_id = row.addon_id().ok_or(RecalcError::RowNotEditable)?;
            if !request.addons.iter().any(|slice| slice.id == addon_id) {
                // Rebuilding skips rows with no quantity; the override
                // still needs a slice to travel in.
                request.addons.push(carried_addon_slice(carried, addon_id));
            }
            let entry = request
                .addons
                .iter_mut()
                .find(|addon| addon.id == addon_id)
                .ok_or(RecalcError::RowNotFound(target))?;
            record_override(
                &mut entry.discounted_unit_price_dict,
                &mut entry.discounted_total_price_dict,
                settled,
                &key,
                value,
            );
        }
    }

    prune_empty_addons(&mut request);

    Ok(request)
}

/// Build the request submitted by a row reset: the same holistic payload,
/// with every stored discount override for that row removed. Quantities are
/// left as they stand, so the server recomputes the row's auto prices.
///
/// # Errors
///
/// Returns an addressing error when the target is stale.
pub fn reset_row(
    book: &PriceBook,
    target: RowTarget,
    carried: Option<&RecalcRequest>,
) -> Result<RecalcRequest, RecalcError> {
    let (mut request, details) = rebuild(book, target, carried)?;

    let row = details
        .section(target.section)
        .rows
        .get(target.row)
        .ok_or(RecalcError::RowNotFound(target))?;
    let key = row_wire_key(row).ok_or(RecalcError::RowNotEditable)?;

    match target.section {
        Section::Core => {
            request.discounted_unit_price_dict.remove(key);
            request.discounted_total_price_dict.remove(key);
        }
        Section::Addons => {
            let addon_id = row.addon_id().ok_or(RecalcError::RowNotEditable)?;
            if let Some(entry) = request
                .addons
                .iter_mut()
                .find(|addon| addon.id == addon_id)
            {
                entry.discounted_unit_price_dict.remove(key);
                entry.discounted_total_price_dict.remove(key);
            }
        }
    }

    prune_empty_addons(&mut request);

    Ok(request)
}

/// Write a response's values into the addressed tier.
///
/// Core values are matched by metric, plain add-on values by add-on id,
/// and custom-metric values by the pair of add-on id and metric. The merge
/// is atomic: on any unmatched key the tree is left untouched.
///
/// # Errors
///
/// Returns a [`MergeError`] naming the first response key with no matching
/// row.
pub fn merge_response(
    book: &mut PriceBook,
    product_id: ProductId,
    tier_id: TierId,
    response: &RecalcResponse,
) -> Result<(), MergeError> {
    let tier = book
        .tier_mut(product_id, tier_id)
        .ok_or(MergeError::MissingDetails(tier_id))?;
    let mut details = tier
        .details
        .clone()
        .ok_or(MergeError::MissingDetails(tier_id))?;

    for (metric, fields) in &response.core {
        let row = details
            .core
            .rows
            .iter_mut()
            .find(|row| row.metric() == Some(metric))
            .ok_or_else(|| MergeError::UnknownMetric(metric.clone()))?;
        write_fields(row, fields);
    }

    for output in &response.addon_output {
        for (key, value) in &output.0 {
            let addon_id: AddonId = key
                .parse()
                .map_err(|_err| MergeError::InvalidAddonKey(key.clone()))?;

            match value {
                AddonOutputValue::Fields(fields) => {
                    let row = details
                        .addons
                        .rows
                        .iter_mut()
                        .find(|row| {
                            matches!(row, Row::Addon(_)) && row.addon_id() == Some(addon_id)
                        })
                        .ok_or(MergeError::UnknownAddon(addon_id))?;
                    write_fields(row, fields);
                }
                AddonOutputValue::Nested(metrics) => {
                    for (metric, fields) in metrics {
                        let row = details
                            .addons
                            .rows
                            .iter_mut()
                            .find(|row| {
                                row.addon_id() == Some(addon_id)
                                    && row.metric() == Some(metric)
                            })
                            .ok_or_else(|| MergeError::UnknownAddonMetric {
                                addon_id,
                                metric: metric.clone(),
                            })?;
                        write_fields(row, fields);
                    }
                }
            }
        }
    }

    tier.details = Some(details);

    Ok(())
}

/// The key a row's values travel under on the wire: the metric for core
/// and custom-metric rows, the output column for plain add-on rows.
fn row_wire_key(row: &Row) -> Option<&str> {
    row.metric().or_else(|| row.output())
}

/// Rebuild the holistic payload from the tier's current rows, preserving
/// carried override dictionaries.
fn rebuild<'book>(
    book: &'book PriceBook,
    target: RowTarget,
    carried: Option<&RecalcRequest>,
) -> Result<(RecalcRequest, &'book TierDetails), RecalcError> {
    let tier = book
        .tier(target.product_id, target.tier_id)
        .ok_or(RecalcError::RowNotFound(target))?;
    let details = tier
        .details
        .as_ref()
        .ok_or(RecalcError::MissingDetails(target.tier_id))?;

    let mut request = RecalcRequest::default();
    if let Some(carried) = carried {
        request.discounted_unit_price_dict = carried.discounted_unit_price_dict.clone();
        request.discounted_total_price_dict = carried.discounted_total_price_dict.clone();
    }

    for row in &details.core.rows {
        let (Some(metric), Some(output)) = (row.metric(), row.output()) else {
            continue;
        };
        let Some(qty) = row
            .cell(FieldKey::Qty)
            .and_then(|cell| WireValue::from_cell(&cell.value))
        else {
            continue;
        };

        request.quantity_dict.insert(metric.to_owned(), qty);
        request.output_keys.insert(metric.to_owned(), output.to_owned());
    }

    request.addons = rebuild_addons(details, carried);

    Ok((request, details))
}

/// One request slice per add-on with at least one quantified row, in row
/// order, with that add-on's carried overrides attached.
fn rebuild_addons(details: &TierDetails, carried: Option<&RecalcRequest>) -> Vec<AddonRequest> {
    let mut slices: Vec<AddonRequest> = Vec::new();

    for row in &details.addons.rows {
        let Some(addon_id) = row.addon_id() else {
            continue;
        };
        if row.is_header() {
            continue;
        }
        let (Some(key), Some(output)) = (row_wire_key(row), row.output()) else {
            continue;
        };
        let Some(qty) = row
            .cell(FieldKey::Qty)
            .and_then(|cell| WireValue::from_cell(&cell.value))
        else {
            continue;
        };

        let position = match slices.iter().position(|slice| slice.id == addon_id) {
            Some(position) => position,
            None => {
                slices.push(carried_addon_slice(carried, addon_id));
                slices.len() - 1
            }
        };

        let Some(slice) = slices.get_mut(position) else {
            continue;
        };

        slice.units.insert(key.to_owned(), qty);
        slice.addon_output_keys.insert(key.to_owned(), output.to_owned());
    }

    slices
}

/// A fresh request slice for one add-on, with its overrides carried over
/// from the previous request.
fn carried_addon_slice(carried: Option<&RecalcRequest>, addon_id: AddonId) -> AddonRequest {
    let carried = carried
        .into_iter()
        .flat_map(|request| &request.addons)
        .find(|slice| slice.id == addon_id);

    AddonRequest {
        id: addon_id,
        discounted_unit_price_dict: carried
            .map(|slice| slice.discounted_unit_price_dict.clone())
            .unwrap_or_default(),
        discounted_total_price_dict: carried
            .map(|slice| slice.discounted_total_price_dict.clone())
            .unwrap_or_default(),
        ..AddonRequest::default()
    }
}

/// Record the settled row's override, clearing the mutually exclusive one.
/// A settled quantity records no override; a cleared cell removes its own.
fn record_override(
    unit_dict: &mut FxHashMap<String, WireValue>,
    total_dict: &mut FxHashMap<String, WireValue>,
    settled: FieldKey,
    key: &str,
    value: Option<WireValue>,
) {
    match settled {
        FieldKey::DiscountedUnitPrice => {
            total_dict.remove(key);
            match value {
                Some(value) => {
                    unit_dict.insert(key.to_owned(), value);
                }
                None => {
                    unit_dict.remove(key);
                }
            }
        }
        FieldKey::DiscountedTotalPrice => {
            unit_dict.remove(key);
            match value {
                Some(value) => {
                    total_dict.insert(key.to_owned(), value);
                }
                None => {
                    total_dict.remove(key);
                }
            }
        }
        _ => {}
    }
}

fn prune_empty_addons(request: &mut RecalcRequest) {
    request.addons.retain(|slice| {
        !(slice.units.is_empty()
            && slice.addon_output_keys.is_empty()
            && slice.discounted_unit_price_dict.is_empty()
            && slice.discounted_total_price_dict.is_empty())
    });
}

fn write_fields(row: &mut Row, fields: &FxHashMap<FieldKey, WireValue>) {
    let Some(cells) = row.cells_mut() else {
        return;
    };

    for cell in cells {
        if let Some(value) = fields.get(&cell.key) {
            cell.value = value.clone().into_cell();
        }
    }
}
