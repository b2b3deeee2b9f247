//! Wire types
//!
//! Serde shapes for the pricing service's tier-details and recalculation
//! endpoints. The calculator tree never leaves the process; these types are
//! the only things that cross the wire.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    book::cells::{CellValue, FieldKey},
    ids::AddonId,
};

/// A priced value on the wire: a plain number, or a per-unit breakdown for
/// rows metered across several units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    /// A single number.
    Scalar(Decimal),

    /// One number per unit column.
    PerUnit(FxHashMap<String, Decimal>),
}

impl WireValue {
    /// The equivalent in-tree cell value.
    #[must_use]
    pub fn into_cell(self) -> CellValue {
        match self {
            Self::Scalar(value) => CellValue::Scalar(value),
            Self::PerUnit(units) => CellValue::PerUnit(units),
        }
    }

    /// The wire form of a cell value, if it has one. Absent cells are not
    /// representable on the wire and are simply left out of payloads.
    #[must_use]
    pub fn from_cell(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Scalar(scalar) => Some(Self::Scalar(*scalar)),
            CellValue::PerUnit(units) => Some(Self::PerUnit(units.clone())),
            CellValue::Absent => None,
        }
    }
}

impl From<Decimal> for WireValue {
    fn from(value: Decimal) -> Self {
        Self::Scalar(value)
    }
}

/// One core row of a tier's rate table, as served by the details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDefinition {
    /// The row's metric key.
    pub metric_column: String,

    /// The output column the metric's result lands in.
    pub output_column: String,

    /// Unit columns for multi-unit rows. Empty or single-entry for plain
    /// scalar rows.
    #[serde(default)]
    pub unit_columns: Vec<String>,

    /// Initial cell values, keyed by field. Missing fields start absent.
    #[serde(default)]
    pub values: FxHashMap<FieldKey, WireValue>,
}

/// Field payload of one add-on within a details response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddonFields {
    /// Output column for plain add-ons. Custom-metric add-ons leave this
    /// unset and carry per-metric outputs instead.
    #[serde(default)]
    pub output_column: Option<String>,

    /// Unit columns, for add-ons metered across several units.
    #[serde(default)]
    pub unit_columns: Vec<String>,

    /// Initial cell values for plain add-ons.
    #[serde(default)]
    pub values: FxHashMap<FieldKey, WireValue>,

    /// Per-metric sub-rows for custom-metric add-ons.
    #[serde(default)]
    pub metrics: Vec<AddonMetricFields>,
}

/// One metric line of a custom-metric add-on in a details response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonMetricFields {
    /// The metric key.
    pub metric_column: String,

    /// The output column for that metric's result.
    pub output_column: String,

    /// Initial cell values.
    #[serde(default)]
    pub values: FxHashMap<FieldKey, WireValue>,
}

/// One add-on entry of a details response: a single-key object mapping the
/// add-on's id to its field payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonDetail(pub FxHashMap<String, AddonFields>);

/// The details endpoint's response for one `(pricing model, tier)` pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TierDetailsResponse {
    /// Core row definitions, in display order.
    pub core: Vec<RowDefinition>,

    /// Add-on payloads keyed by add-on id.
    #[serde(default)]
    pub addon: Vec<AddonDetail>,
}

/// Per-add-on slice of a recalculation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddonRequest {
    /// The add-on's id.
    pub id: AddonId,

    /// Current quantities, keyed by the add-on row's wire key.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub units: FxHashMap<String, WireValue>,

    /// Output column per row wire key.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub addon_output_keys: FxHashMap<String, String>,

    /// Seller-typed unit price overrides. Mutually exclusive per key with
    /// the total price dict.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub discounted_unit_price_dict: FxHashMap<String, WireValue>,

    /// Seller-typed total price overrides.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub discounted_total_price_dict: FxHashMap<String, WireValue>,
}

/// The recalculation endpoint's request body. Maps that would serialize
/// empty are left off the wire entirely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecalcRequest {
    /// Current quantity per core metric.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub quantity_dict: FxHashMap<String, WireValue>,

    /// Output column per core metric.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub output_keys: FxHashMap<String, String>,

    /// Seller-typed unit price overrides per core metric. Mutually
    /// exclusive per key with the total price dict.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub discounted_unit_price_dict: FxHashMap<String, WireValue>,

    /// Seller-typed total price overrides per core metric.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub discounted_total_price_dict: FxHashMap<String, WireValue>,

    /// Per-add-on slices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonRequest>,
}

/// Recalculated fields for one add-on: flat for plain add-ons, nested one
/// level deeper by metric for custom-metric add-ons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddonOutputValue {
    /// `field -> value`, for plain add-on rows.
    Fields(FxHashMap<FieldKey, WireValue>),

    /// `metric -> field -> value`, for custom-metric add-ons.
    Nested(FxHashMap<String, FxHashMap<FieldKey, WireValue>>),
}

/// One add-on entry of a recalculation response: a single-key object
/// mapping the add-on's id to its recalculated fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonOutput(pub FxHashMap<String, AddonOutputValue>);

/// The recalculation endpoint's response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecalcResponse {
    /// Recalculated add-on rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addon_output: Vec<AddonOutput>,

    /// Recalculated core rows, keyed by metric. Every other top-level key
    /// of the payload lands here.
    #[serde(flatten)]
    pub core: FxHashMap<String, FxHashMap<FieldKey, WireValue>>,
}
