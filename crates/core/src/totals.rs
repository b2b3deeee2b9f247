//! Aggregation
//!
//! Derives product totals and the grand total from row values, and flags
//! rows whose discount exceeds the account's policy ceiling. Runs
//! synchronously after every tree mutation; callers decide whether the
//! result differs enough to commit.

use num_traits::Zero;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::book::{
    PriceBook, ProductEntry, TierEntry,
    cells::{Cell, FieldKey, TotalCell, empty_totals},
};

/// How the grand total's discount cell is derived.
///
/// The additive default sums the per-product discount percentages as-is.
/// That is deliberately asymmetric with the per-product ratio computation
/// and overstates the blended discount whenever products differ in size;
/// the ratio strategy derives the cell from the grand list and discounted
/// totals instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrandTotalDiscountStrategy {
    /// Sum the per-product discount percentages.
    #[default]
    SummedPercentages,

    /// Recompute from the grand list and discounted totals.
    RatioOfTotals,
}

/// Recompute every product's totals, re-flag ceiling violations, and
/// refresh the grand total.
///
/// A product aggregates whenever at least one of its tiers is checked. Row
/// values are summed per field across the checked tiers' core and add-on
/// rows, skipping header rows, absent cells, and per-unit maps. Products
/// with no checked tier have their totals cleared. The grand total exists
/// only while more than one product is checked.
pub fn recompute(book: &mut PriceBook, strategy: GrandTotalDiscountStrategy) {
    for product in &mut book.products {
        recompute_product(product);
    }

    book.grand_total = grand_total(book, strategy);
}

/// Whether the current selection carries an over-ceiling flag. A quote in
/// this state needs managerial sign-off before it can be sent out.
///
/// Scoped to checked products and their checked tiers: an abandoned tier's
/// cached rows keep whatever flags they had until it is selected again, and
/// an unchecked product's totals are not part of the quote.
#[must_use]
pub fn escalation_required(book: &PriceBook) -> bool {
    let row_flagged = book.checked_products().any(|product| {
        product.checked_tiers().any(|tier| {
            tier.details.as_ref().is_some_and(|details| {
                details
                    .core
                    .rows
                    .iter()
                    .chain(&details.addons.rows)
                    .filter_map(|row| row.cells())
                    .flatten()
                    .any(|cell| cell.error)
            })
        })
    });

    let total_flagged = book
        .checked_products()
        .flat_map(|product| &product.total)
        .chain(book.grand_total.iter().flatten())
        .any(|total| total.error);

    row_flagged || total_flagged
}

fn recompute_product(product: &mut ProductEntry) {
    let ceiling = product.discount_ceiling;
    let mut sums: FxHashMap<FieldKey, Decimal> = FxHashMap::default();
    let mut any_checked = false;

    for tier in &mut product.tiers {
        if !tier.checked {
            continue;
        }
        any_checked = true;
        sum_tier(tier, ceiling, &mut sums);
    }

    if !any_checked {
        product.total = empty_totals();
        return;
    }

    product.total = totals_from_sums(&sums, ceiling);
}

fn sum_tier(tier: &mut TierEntry, ceiling: Option<Decimal>, sums: &mut FxHashMap<FieldKey, Decimal>) {
    let Some(details) = tier.details.as_mut() else {
        return;
    };

    let rows = details
        .core
        .rows
        .iter_mut()
        .chain(details.addons.rows.iter_mut());

    for row in rows {
        let Some(cells) = row.cells_mut() else {
            continue;
        };

        flag_ceiling(cells, ceiling);

        for cell in cells {
            if let Some(value) = cell.value.as_scalar() {
                *sums.entry(cell.key).or_insert_with(Decimal::zero) += value;
            }
        }
    }
}

/// Compare a row's discount against the ceiling and mirror the verdict
/// onto its discounted total cell, where the warning icon actually sits.
fn flag_ceiling(cells: &mut SmallVec<[Cell; 6]>, ceiling: Option<Decimal>) {
    let discount = cells
        .iter()
        .find(|cell| cell.key == FieldKey::Discount)
        .and_then(|cell| cell.value.as_scalar());

    let over = match (discount, ceiling) {
        (Some(discount), Some(ceiling)) => discount > ceiling,
        _ => false,
    };

    for cell in cells {
        if matches!(cell.key, FieldKey::Discount | FieldKey::DiscountedTotalPrice) {
            cell.error = over;
            cell.max_discount = if over { ceiling } else { None };
        }
    }
}

fn totals_from_sums(
    sums: &FxHashMap<FieldKey, Decimal>,
    ceiling: Option<Decimal>,
) -> SmallVec<[TotalCell; 6]> {
    let mut totals = empty_totals();
    for total in &mut totals {
        total.value = sums.get(&total.key).copied();
    }

    let list = sums.get(&FieldKey::ListTotalPrice).copied();
    let discounted = sums.get(&FieldKey::DiscountedTotalPrice).copied();

    if let (Some(list), Some(discounted)) = (list, discounted)
        && list > discounted
        && !list.is_zero()
    {
        let percent = discount_percent(list, discounted);
        let over = ceiling.is_some_and(|ceiling| percent > ceiling);

        for total in &mut totals {
            if total.key == FieldKey::Discount {
                total.value = Some(percent);
                total.error = over;
                total.max_discount = if over { ceiling } else { None };
            }
        }
    }

    totals
}

/// `(list - discounted) / list * 100`, with exactly 100% collapsed to zero
/// and non-integer results stored to two decimal places.
fn discount_percent(list: Decimal, discounted: Decimal) -> Decimal {
    let percent = (list - discounted) / list * Decimal::ONE_HUNDRED;

    if percent == Decimal::ONE_HUNDRED {
        return Decimal::zero();
    }

    round_percent(percent)
}

fn round_percent(percent: Decimal) -> Decimal {
    if percent.fract().is_zero() {
        percent
    } else {
        percent.round_dp(2)
    }
}

fn grand_total(
    book: &PriceBook,
    strategy: GrandTotalDiscountStrategy,
) -> Option<SmallVec<[TotalCell; 6]>> {
    let checked: Vec<&ProductEntry> = book.checked_products().collect();
    if checked.len() < 2 {
        return None;
    }

    let mut totals = empty_totals();
    for total in &mut totals {
        let mut sum: Option<Decimal> = None;
        for product in &checked {
            if let Some(value) = product.total(total.key).and_then(|cell| cell.value) {
                *sum.get_or_insert_with(Decimal::zero) += value;
            }
        }
        total.value = sum;
    }

    if strategy == GrandTotalDiscountStrategy::RatioOfTotals {
        let list = totals
            .iter()
            .find(|total| total.key == FieldKey::ListTotalPrice)
            .and_then(|total| total.value);
        let discounted = totals
            .iter()
            .find(|total| total.key == FieldKey::DiscountedTotalPrice)
            .and_then(|total| total.value);

        if let (Some(list), Some(discounted)) = (list, discounted)
            && list > discounted
            && !list.is_zero()
        {
            let percent = discount_percent(list, discounted);
            for total in &mut totals {
                if total.key == FieldKey::Discount {
                    total.value = Some(percent);
                }
            }
        }
    }

    Some(totals)
}
