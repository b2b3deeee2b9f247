//! Row cells and total fields

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The six value columns every calculator row and total carries, in display
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    /// Quantity of the row's metric.
    Qty,

    /// Undiscounted price per unit.
    ListUnitPrice,

    /// Price per unit after any discount.
    DiscountedUnitPrice,

    /// Undiscounted line total.
    ListTotalPrice,

    /// Discount percentage applied to the line.
    Discount,

    /// Line total after discount.
    DiscountedTotalPrice,
}

impl FieldKey {
    /// All field keys in canonical display order.
    pub const ALL: [Self; 6] = [
        Self::Qty,
        Self::ListUnitPrice,
        Self::DiscountedUnitPrice,
        Self::ListTotalPrice,
        Self::Discount,
        Self::DiscountedTotalPrice,
    ];

    /// Whether an edit to this field sends the row back to the pricing
    /// service. Edits to any other field only apply locally.
    #[must_use]
    pub const fn triggers_recompute(self) -> bool {
        matches!(
            self,
            Self::Qty | Self::DiscountedUnitPrice | Self::DiscountedTotalPrice
        )
    }

    /// Wire name of this field, as used in request and response dictionaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qty => "qty",
            Self::ListUnitPrice => "list_unit_price",
            Self::DiscountedUnitPrice => "discounted_unit_price",
            Self::ListTotalPrice => "list_total_price",
            Self::Discount => "discount",
            Self::DiscountedTotalPrice => "discounted_total_price",
        }
    }
}

/// The value held by one cell: empty, a single number, or a number per unit
/// column for rows priced across several unit dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// A plain scalar value.
    Scalar(Decimal),

    /// One value per unit column key.
    PerUnit(FxHashMap<String, Decimal>),

    /// No value entered or computed yet. Serializes as `null`.
    Absent,
}

impl CellValue {
    /// Whether the cell holds no value.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The scalar value, if this cell holds one.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<Decimal> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::PerUnit(_) | Self::Absent => None,
        }
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        Self::Scalar(value)
    }
}

/// One editable cell of a calculator row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Which column this cell belongs to.
    pub key: FieldKey,

    /// The current value.
    pub value: CellValue,

    /// Set when the value violates the product's discount ceiling.
    pub error: bool,

    /// The ceiling that was violated, recorded alongside `error`.
    pub max_discount: Option<Decimal>,
}

impl Cell {
    /// An empty cell for the given column.
    #[must_use]
    pub const fn empty(key: FieldKey) -> Self {
        Self {
            key,
            value: CellValue::Absent,
            error: false,
            max_discount: None,
        }
    }
}

/// The canonical empty cell set: one [`Cell`] per [`FieldKey`], all absent,
/// in canonical order.
#[must_use]
pub fn empty_cells() -> SmallVec<[Cell; 6]> {
    FieldKey::ALL.iter().map(|key| Cell::empty(*key)).collect()
}

/// One aggregated field of a product or grand total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalCell {
    /// Which column this total belongs to.
    pub key: FieldKey,

    /// The summed value, or `None` when no row contributed.
    pub value: Option<Decimal>,

    /// Set when the aggregated discount violates the product's ceiling.
    pub error: bool,

    /// The ceiling that was violated, recorded alongside `error`.
    pub max_discount: Option<Decimal>,
}

impl TotalCell {
    /// An empty total for the given column.
    #[must_use]
    pub const fn empty(key: FieldKey) -> Self {
        Self {
            key,
            value: None,
            error: false,
            max_discount: None,
        }
    }
}

/// The canonical empty total set, one [`TotalCell`] per [`FieldKey`].
#[must_use]
pub fn empty_totals() -> SmallVec<[TotalCell; 6]> {
    FieldKey::ALL
        .iter()
        .map(|key| TotalCell::empty(*key))
        .collect()
}
