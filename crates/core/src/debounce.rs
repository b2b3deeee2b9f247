//! Debounce
//!
//! Per-cell quiet-period tracking for seller edits. Every keystroke into a
//! recompute-triggering cell restarts that cell's clock; only once a cell
//! has been quiet for the full period does its edit settle and submit a
//! recalculation. The tracker is pure: callers feed it the current instant
//! and drive whatever timer their runtime provides.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::{
    book::{RowTarget, Section, cells::FieldKey},
    ids::TierId,
};

/// Quiet period applied when none is configured.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(1000);

/// Identifies one debounced cell: a row address plus the edited field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditKey {
    /// The row holding the cell.
    pub target: RowTarget,

    /// The edited field.
    pub field: FieldKey,
}

/// Tracks the settle deadline of every recently edited cell.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadlines: FxHashMap<EditKey, Instant>,
}

impl Debouncer {
    /// A tracker with the given quiet period.
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadlines: FxHashMap::default(),
        }
    }

    /// Record a keystroke into a cell, restarting its quiet period.
    pub fn note_edit(&mut self, key: EditKey, now: Instant) {
        self.deadlines.insert(key, now + self.quiet);
    }

    /// Drain every cell whose quiet period has elapsed, earliest deadline
    /// first.
    pub fn due(&mut self, now: Instant) -> Vec<EditKey> {
        let mut expired: Vec<(EditKey, Instant)> = Vec::new();

        self.deadlines.retain(|key, deadline| {
            if *deadline <= now {
                expired.push((*key, *deadline));
                false
            } else {
                true
            }
        });

        expired.sort_by_key(|(_, deadline)| *deadline);
        expired.into_iter().map(|(key, _)| key).collect()
    }

    /// Forget one cell's pending edit.
    pub fn cancel(&mut self, key: &EditKey) {
        self.deadlines.remove(key);
    }

    /// Forget every pending edit on one row. Used when the row is reset.
    pub fn cancel_row(&mut self, target: RowTarget) {
        self.deadlines.retain(|key, _| key.target != target);
    }

    /// Forget every pending edit in one section of a tier. Used when the
    /// section's rows are rebuilt and their indices go stale.
    pub fn cancel_section(&mut self, tier_id: TierId, section: Section) {
        self.deadlines.retain(|key, _| {
            key.target.tier_id != tier_id || key.target.section != section
        });
    }

    /// Forget every pending edit under one tier. Used when the tier is
    /// switched away from.
    pub fn cancel_tier(&mut self, tier_id: TierId) {
        self.deadlines.retain(|key, _| key.target.tier_id != tier_id);
    }

    /// The earliest settle deadline, if any edit is outstanding.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Number of cells with an unsettled edit.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no edits are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        book::Section,
        ids::{ProductId, TierId},
    };

    use super::*;

    fn key_on(tier_id: TierId, row: usize, field: FieldKey) -> EditKey {
        EditKey {
            target: RowTarget {
                product_id: ProductId::new(),
                tier_id,
                section: Section::Core,
                row,
            },
            field,
        }
    }

    #[test]
    fn retyping_restarts_the_quiet_period() {
        let mut debouncer = Debouncer::default();
        let key = key_on(TierId::new(), 0, FieldKey::Qty);
        let start = Instant::now();

        debouncer.note_edit(key, start);
        debouncer.note_edit(key, start + Duration::from_millis(800));

        // The original deadline has passed, but the re-edit moved it.
        assert!(debouncer.due(start + Duration::from_millis(1100)).is_empty());

        let due = debouncer.due(start + Duration::from_millis(1800));
        assert_eq!(due, vec![key], "one settle per burst of keystrokes");
        assert!(debouncer.is_empty());
    }

    #[test]
    fn due_drains_earliest_deadline_first() {
        let mut debouncer = Debouncer::default();
        let tier_id = TierId::new();
        let first = key_on(tier_id, 0, FieldKey::Qty);
        let second = key_on(tier_id, 1, FieldKey::DiscountedUnitPrice);
        let start = Instant::now();

        debouncer.note_edit(second, start + Duration::from_millis(300));
        debouncer.note_edit(first, start);

        let due = debouncer.due(start + Duration::from_secs(5));
        assert_eq!(due, vec![first, second]);
    }

    #[test]
    fn distinct_fields_on_one_row_settle_independently() {
        let mut debouncer = Debouncer::default();
        let tier_id = TierId::new();
        let target = key_on(tier_id, 0, FieldKey::Qty).target;
        let qty = EditKey {
            target,
            field: FieldKey::Qty,
        };
        let price = EditKey {
            target,
            field: FieldKey::DiscountedUnitPrice,
        };
        let start = Instant::now();

        debouncer.note_edit(qty, start);
        debouncer.note_edit(price, start + Duration::from_millis(900));

        let due = debouncer.due(start + Duration::from_millis(1000));
        assert_eq!(due, vec![qty]);
        assert_eq!(debouncer.len(), 1, "the later field must still be waiting");
    }

    #[test]
    fn cancel_section_leaves_the_other_section_waiting() {
        let mut debouncer = Debouncer::default();
        let tier_id = TierId::new();
        let core = key_on(tier_id, 0, FieldKey::Qty);
        let addon = EditKey {
            target: RowTarget {
                section: Section::Addons,
                ..core.target
            },
            field: FieldKey::Qty,
        };
        let start = Instant::now();

        debouncer.note_edit(core, start);
        debouncer.note_edit(addon, start);

        debouncer.cancel_section(tier_id, Section::Addons);

        assert_eq!(debouncer.due(start + DEFAULT_QUIET), vec![core]);
    }

    #[test]
    fn cancel_tier_forgets_only_that_tier() {
        let mut debouncer = Debouncer::default();
        let switched = TierId::new();
        let kept = TierId::new();
        let start = Instant::now();

        debouncer.note_edit(key_on(switched, 0, FieldKey::Qty), start);
        debouncer.note_edit(key_on(switched, 1, FieldKey::Qty), start);
        let surviving = key_on(kept, 0, FieldKey::Qty);
        debouncer.note_edit(surviving, start);

        debouncer.cancel_tier(switched);

        assert_eq!(debouncer.len(), 1);
        assert_eq!(debouncer.next_deadline(), Some(start + DEFAULT_QUIET));
        assert_eq!(debouncer.due(start + DEFAULT_QUIET), vec![surviving]);
    }
}
