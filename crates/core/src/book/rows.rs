//! Calculator rows

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    book::cells::{Cell, FieldKey, empty_cells},
    ids::AddonId,
};

/// A base metered or subscription line of a tier's rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreRow {
    /// The usage dimension this row's quantity is measured against.
    pub metric: String,

    /// The output column the pricing service writes this row's result under.
    pub output: String,

    /// Unit column keys. More than one means the row's values are per-unit
    /// maps rather than scalars.
    pub units: SmallVec<[String; 2]>,

    /// The row's value cells, one per [`FieldKey`].
    pub cells: SmallVec<[Cell; 6]>,
}

/// A plain add-on line, priced independently of the core rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonRow {
    /// The add-on this row belongs to.
    pub addon_id: AddonId,

    /// The output column for this add-on's result.
    pub output: String,

    /// Unit column keys, as for [`CoreRow::units`].
    pub units: SmallVec<[String; 2]>,

    /// The row's value cells, one per [`FieldKey`].
    pub cells: SmallVec<[Cell; 6]>,
}

/// A label row introducing a custom-metric add-on's per-metric lines. Carries
/// no cells and never contributes to totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonHeaderRow {
    /// The add-on this header introduces.
    pub addon_id: AddonId,

    /// The add-on's display name.
    pub name: String,
}

/// One synthetic line per metric of a custom-metric add-on. The metric key
/// distinguishes sibling lines of the same logical add-on during aggregation
/// and response merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonMetricRow {
    /// The add-on this line belongs to.
    pub addon_id: AddonId,

    /// The metric this line is measured against.
    pub metric: String,

    /// The output column for this metric's result.
    pub output: String,

    /// The row's value cells, one per [`FieldKey`].
    pub cells: SmallVec<[Cell; 6]>,
}

/// A row of a tier's rate table. The variants replace shape-sniffing on row
/// fields with explicit discriminants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    /// Base metered/subscription line.
    Core(CoreRow),

    /// Plain add-on line.
    Addon(AddonRow),

    /// Metric-only label row for a custom-metric add-on.
    AddonHeader(AddonHeaderRow),

    /// Per-metric line of a custom-metric add-on.
    AddonMetric(AddonMetricRow),
}

impl Row {
    /// A fresh per-metric add-on row with the canonical empty cell set.
    #[must_use]
    pub fn new_addon_metric(
        addon_id: AddonId,
        metric: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::AddonMetric(AddonMetricRow {
            addon_id,
            metric: metric.into(),
            output: output.into(),
            cells: empty_cells(),
        })
    }

    /// The row's cells, or `None` for header rows.
    #[must_use]
    pub fn cells(&self) -> Option<&SmallVec<[Cell; 6]>> {
        match self {
            Self::Core(row) => Some(&row.cells),
            Self::Addon(row) => Some(&row.cells),
            Self::AddonMetric(row) => Some(&row.cells),
            Self::AddonHeader(_) => None,
        }
    }

    /// Mutable access to the row's cells, or `None` for header rows.
    pub fn cells_mut(&mut self) -> Option<&mut SmallVec<[Cell; 6]>> {
        match self {
            Self::Core(row) => Some(&mut row.cells),
            Self::Addon(row) => Some(&mut row.cells),
            Self::AddonMetric(row) => Some(&mut row.cells),
            Self::AddonHeader(_) => None,
        }
    }

    /// The cell for the given column, or `None` for header rows.
    #[must_use]
    pub fn cell(&self, key: FieldKey) -> Option<&Cell> {
        self.cells()
            .and_then(|cells| cells.iter().find(|cell| cell.key == key))
    }

    /// Mutable access to the cell for the given column.
    pub fn cell_mut(&mut self, key: FieldKey) -> Option<&mut Cell> {
        self.cells_mut()
            .and_then(|cells| cells.iter_mut().find(|cell| cell.key == key))
    }

    /// The metric key, where the row has one.
    #[must_use]
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::Core(row) => Some(&row.metric),
            Self::AddonMetric(row) => Some(&row.metric),
            Self::Addon(_) | Self::AddonHeader(_) => None,
        }
    }

    /// The output column key, where the row has one.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Core(row) => Some(&row.output),
            Self::Addon(row) => Some(&row.output),
            Self::AddonMetric(row) => Some(&row.output),
            Self::AddonHeader(_) => None,
        }
    }

    /// The owning add-on id for add-on rows of any shape.
    #[must_use]
    pub fn addon_id(&self) -> Option<AddonId> {
        match self {
            Self::Addon(row) => Some(row.addon_id),
            Self::AddonHeader(row) => Some(row.addon_id),
            Self::AddonMetric(row) => Some(row.addon_id),
            Self::Core(_) => None,
        }
    }

    /// Whether this is a metric-only label row.
    #[must_use]
    pub const fn is_header(&self) -> bool {
        matches!(self, Self::AddonHeader(_))
    }

    /// Whether the row's values are per-unit maps rather than scalars.
    #[must_use]
    pub fn is_multi_unit(&self) -> bool {
        match self {
            Self::Core(row) => row.units.len() > 1,
            Self::Addon(row) => row.units.len() > 1,
            Self::AddonHeader(_) | Self::AddonMetric(_) => false,
        }
    }
}
