//! Store
//!
//! The calculator's event loop core: a pure reducer over the quote state,
//! emitting effects for the IO shell to run, and a store that tracks a
//! revision counter so callers re-render only when the visible tree
//! actually changed.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    book::{PriceBook, RowPending, RowTarget, Section, TicketKey, cells::FieldKey},
    ids::{PricingModelId, ProductId, TierId},
    recalc::{self, MergeError, RecalcError},
    selection::{self, SelectionError},
    totals::{self, GrandTotalDiscountStrategy},
    wire::{RecalcRequest, RecalcResponse, TierDetailsResponse},
};

/// Reducer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A selection event addressed something not in the tree.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// An edit or submit event could not be applied.
    #[error(transparent)]
    Recalc(#[from] RecalcError),
}

/// Everything the calculator tracks: the visible tree plus the bookkeeping
/// for in-flight recalculations.
#[derive(Debug, Clone)]
pub struct QuoteState {
    /// The visible tree.
    pub book: PriceBook,

    /// Live recalculation tickets and the rows they were submitted for.
    pub tickets: SlotMap<TicketKey, RowTarget>,

    /// The last submitted request body per tier, carried forward so
    /// overrides accumulate across submissions.
    pub carried: FxHashMap<TierId, RecalcRequest>,

    /// How the grand total's discount cell is derived.
    pub strategy: GrandTotalDiscountStrategy,
}

/// Everything that can happen to a quote.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    /// The seller flipped a product checkbox.
    ProductToggled {
        /// The toggled product.
        product_id: ProductId,
    },

    /// The seller picked a tier.
    TierSelected {
        /// The product whose tier was picked.
        product_id: ProductId,

        /// The picked tier.
        tier_id: TierId,
    },

    /// A tier details fetch resolved.
    TierDetailsLoaded {
        /// The product the fetch was for.
        product_id: ProductId,

        /// The tier the fetch was for.
        tier_id: TierId,

        /// The fetched rate table.
        response: TierDetailsResponse,
    },

    /// A tier details fetch failed.
    TierDetailsFailed {
        /// The product the fetch was for.
        product_id: ProductId,

        /// The tier the fetch was for.
        tier_id: TierId,
    },

    /// The seller flipped an add-on checkbox.
    AddonToggled {
        /// The product the add-on sits under.
        product_id: ProductId,

        /// The tier the add-on sits under.
        tier_id: TierId,

        /// Index of the add-on in the tier's choice list.
        addon: usize,
    },

    /// The seller typed into a cell. Applied locally at once; whether it
    /// later submits a recalculation is the debouncer's business.
    CellEdited {
        /// The edited row.
        target: RowTarget,

        /// The edited field.
        field: FieldKey,

        /// The typed value.
        value: Decimal,

        /// The unit column, for rows metered across several units.
        unit: Option<String>,
    },

    /// A debounced edit came to rest and should submit.
    EditSettled {
        /// The settled row.
        target: RowTarget,

        /// The settled field.
        field: FieldKey,
    },

    /// The seller reset a row, discarding its discount overrides.
    RowReset {
        /// The reset row.
        target: RowTarget,
    },

    /// A recalculation response arrived.
    RecalcCompleted {
        /// The ticket the request was submitted under.
        ticket: TicketKey,

        /// The response body.
        response: RecalcResponse,
    },

    /// A recalculation request failed.
    RecalcFailed {
        /// The ticket the request was submitted under.
        ticket: TicketKey,
    },
}

/// Work the reducer asks the IO shell to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch a tier's rate table.
    FetchTierDetails {
        /// The product the tier belongs to.
        product_id: ProductId,

        /// The pricing model to fetch against.
        pricing_model_id: PricingModelId,

        /// The tier to fetch.
        tier_id: TierId,
    },

    /// Submit a recalculation request.
    SubmitRecalc {
        /// Ticket to report the outcome under.
        ticket: TicketKey,

        /// The pricing model to recalculate against.
        pricing_model_id: PricingModelId,

        /// The tier the request covers.
        tier_id: TierId,

        /// The request body.
        body: RecalcRequest,
    },

    /// A response arrived but did not match the tree. The state was
    /// cleaned up; the caller decides whether to surface the mismatch.
    MergeRejected {
        /// The tier the response was for.
        tier_id: TierId,

        /// Why the merge was refused.
        error: MergeError,
    },
}

/// A reduced state plus the effects it asks for.
#[derive(Debug)]
pub struct Outcome {
    /// The next state.
    pub state: QuoteState,

    /// Effects for the IO shell, in order.
    pub effects: SmallVec<[Effect; 2]>,
}

/// Apply one event to the state, returning the next state and any effects.
/// The input state is never mutated; failures leave the caller holding it
/// unchanged.
///
/// # Errors
///
/// Returns [`EngineError`] when the event addresses something not in the
/// tree or an edit cannot be applied.
pub fn reduce(state: &QuoteState, event: QuoteEvent) -> Result<Outcome, EngineError> {
    let mut next = state.clone();
    let mut effects: SmallVec<[Effect; 2]> = SmallVec::new();

    match event {
        QuoteEvent::ProductToggled { product_id } => {
            selection::toggle_product(&mut next.book, product_id)?;
        }
        QuoteEvent::TierSelected {
            product_id,
            tier_id,
        } => {
            retire_previous_tier(&mut next, product_id, tier_id)?;

            if let Some(needs) = selection::select_tier(&mut next.book, product_id, tier_id)? {
                effects.push(Effect::FetchTierDetails {
                    product_id: needs.product_id,
                    pricing_model_id: needs.pricing_model_id,
                    tier_id: needs.tier_id,
                });
            }
        }
        QuoteEvent::TierDetailsLoaded {
            product_id,
            tier_id,
            response,
        } => {
            selection::apply_tier_details(&mut next.book, product_id, tier_id, &response)?;
        }
        QuoteEvent::TierDetailsFailed {
            product_id,
            tier_id,
        } => {
            selection::tier_details_failed(&mut next.book, product_id, tier_id)?;
        }
        QuoteEvent::AddonToggled {
            product_id,
            tier_id,
            addon,
        } => {
            retire_addon_section(&mut next, product_id, tier_id, addon)?;
            selection::toggle_addon(&mut next.book, product_id, tier_id, addon)?;
        }
        QuoteEvent::CellEdited {
            target,
            field,
            value,
            unit,
        } => {
            recalc::apply_edit(&mut next.book, target, field, value, unit.as_deref())?;
        }
        QuoteEvent::EditSettled { target, field } => {
            if is_row_pending(&next, target) {
                // The row is latched until its in-flight response lands.
                return Ok(Outcome {
                    state: next,
                    effects,
                });
            }

            submit(&mut next, &mut effects, target, |state| {
                recalc::build_request(
                    &state.book,
                    target,
                    field,
                    state.carried.get(&target.tier_id),
                )
            })?;
        }
        QuoteEvent::RowReset { target } => {
            retire_row_ticket(&mut next, target);
            submit(&mut next, &mut effects, target, |state| {
                recalc::reset_row(&state.book, target, state.carried.get(&target.tier_id))
            })?;
        }
        QuoteEvent::RecalcCompleted { ticket, response } => {
            let Some(target) = next.tickets.remove(ticket) else {
                // Stale ticket: the row it priced was retired meanwhile.
                return Ok(Outcome {
                    state: next,
                    effects,
                });
            };

            clear_pending_for_ticket(&mut next, target, ticket);

            if let Err(error) = recalc::merge_response(
                &mut next.book,
                target.product_id,
                target.tier_id,
                &response,
            ) {
                effects.push(Effect::MergeRejected {
                    tier_id: target.tier_id,
                    error,
                });
            }
        }
        QuoteEvent::RecalcFailed { ticket } => {
            let Some(target) = next.tickets.remove(ticket) else {
                return Ok(Outcome {
                    state: next,
                    effects,
                });
            };

            // The optimistic local edit stands; only the indicator clears.
            clear_pending_for_ticket(&mut next, target, ticket);
        }
    }

    totals::recompute(&mut next.book, next.strategy);

    Ok(Outcome {
        state: next,
        effects,
    })
}

/// Build and record a submission for `target`: allocate a ticket, mark the
/// row pending, carry the body forward, and emit the submit effect.
fn submit<F>(
    state: &mut QuoteState,
    effects: &mut SmallVec<[Effect; 2]>,
    target: RowTarget,
    build: F,
) -> Result<(), EngineError>
where
    F: FnOnce(&QuoteState) -> Result<RecalcRequest, RecalcError>,
{
    let body = build(state)?;

    let pricing_model_id = state
        .book
        .product(target.product_id)
        .map(|product| product.pricing_model_id)
        .ok_or(RecalcError::RowNotFound(target))?;

    let ticket = state.tickets.insert(target);

    if let Some(tier) = state.book.tier_mut(target.product_id, target.tier_id) {
        tier.set_pending(
            target.section,
            Some(RowPending {
                row: target.row,
                ticket,
            }),
        );
    }

    state.carried.insert(target.tier_id, body.clone());

    effects.push(Effect::SubmitRecalc {
        ticket,
        pricing_model_id,
        tier_id: target.tier_id,
        body,
    });

    Ok(())
}

fn is_row_pending(state: &QuoteState, target: RowTarget) -> bool {
    state
        .book
        .tier(target.product_id, target.tier_id)
        .and_then(|tier| tier.pending(target.section))
        .is_some_and(|pending| pending.row == target.row)
}

/// Drop the live ticket behind `target`'s row, if its section is pending
/// on exactly that row. Used by resets so the superseded response cannot
/// land on top of the new one.
fn retire_row_ticket(state: &mut QuoteState, target: RowTarget) {
    let Some(tier) = state.book.tier_mut(target.product_id, target.tier_id) else {
        return;
    };

    if let Some(pending) = tier.pending(target.section)
        && pending.row == target.row
    {
        state.tickets.remove(pending.ticket);
        tier.set_pending(target.section, None);
    }
}

fn clear_pending_for_ticket(state: &mut QuoteState, target: RowTarget, ticket: TicketKey) {
    if let Some(tier) = state.book.tier_mut(target.product_id, target.tier_id)
        && tier
            .pending(target.section)
            .is_some_and(|pending| pending.ticket == ticket)
    {
        tier.set_pending(target.section, None);
    }
}

/// When the checked tier actually changes, retire everything tied to the
/// old one: its tickets, pending markers, and carried request body.
fn retire_previous_tier(
    state: &mut QuoteState,
    product_id: ProductId,
    tier_id: TierId,
) -> Result<(), EngineError> {
    let product = state
        .book
        .product(product_id)
        .ok_or(SelectionError::ProductNotFound(product_id))?;

    let previous = product
        .checked_tiers()
        .map(|tier| tier.tier_id)
        .find(|checked| *checked != tier_id);

    let Some(previous) = previous else {
        return Ok(());
    };

    state.tickets.retain(|_, target| target.tier_id != previous);
    state.carried.remove(&previous);

    if let Some(tier) = state.book.tier_mut(product_id, previous) {
        tier.clear_pending();
    }

    Ok(())
}

/// An add-on toggle rebuilds the tier's add-on section, so row indices in
/// that section go stale: drop its tickets and pending marker, and scrub
/// the toggled add-on's slice from the carried body.
fn retire_addon_section(
    state: &mut QuoteState,
    product_id: ProductId,
    tier_id: TierId,
    addon: usize,
) -> Result<(), EngineError> {
    let tier = state
        .book
        .tier(product_id, tier_id)
        .ok_or(SelectionError::TierNotFound(tier_id))?;

    let len = tier.addons.len();
    let addon_id = tier
        .addons
        .get(addon)
        .map(|choice| choice.addon_id)
        .ok_or(SelectionError::AddonIndexOutOfRange {
            tier_id,
            index: addon,
            len,
        })?;

    state
        .tickets
        .retain(|_, target| !(target.tier_id == tier_id && target.section == Section::Addons));

    if let Some(tier) = state.book.tier_mut(product_id, tier_id) {
        tier.set_pending(Section::Addons, None);
    }

    if let Some(carried) = state.carried.get_mut(&tier_id) {
        carried.addons.retain(|slice| slice.id != addon_id);
    }

    Ok(())
}

/// Owns the state and applies events, bumping a revision counter only when
/// the visible tree changed. Ticket bookkeeping alone never re-renders
/// anything.
#[derive(Debug)]
pub struct Store {
    state: QuoteState,
    revision: u64,
}

impl Store {
    /// A store over the given book, with totals derived immediately.
    #[must_use]
    pub fn new(mut book: PriceBook, strategy: GrandTotalDiscountStrategy) -> Self {
        totals::recompute(&mut book, strategy);

        Self {
            state: QuoteState {
                book,
                tickets: SlotMap::with_key(),
                carried: FxHashMap::default(),
                strategy,
            },
            revision: 0,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> &QuoteState {
        &self.state
    }

    /// The visible tree.
    #[must_use]
    pub const fn book(&self) -> &PriceBook {
        &self.state.book
    }

    /// Bumped every time the visible tree changes.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply one event and return the effects it asks for.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the event cannot be applied; the state
    /// is left untouched in that case.
    pub fn dispatch(&mut self, event: QuoteEvent) -> Result<SmallVec<[Effect; 2]>, EngineError> {
        let outcome = reduce(&self.state, event)?;

        if outcome.state.book != self.state.book {
            self.revision += 1;
        }
        self.state = outcome.state;

        Ok(outcome.effects)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        book::{AddonChoice, CellValue, ProductEntry, TierEntry},
        ids::AddonId,
        wire::{AddonDetail, AddonFields, RowDefinition, WireValue},
    };

    use super::*;

    struct Fixture {
        store: Store,
        product_id: ProductId,
        tier_id: TierId,
        elite_id: TierId,
        support_id: AddonId,
    }

    impl Fixture {
        fn core(&self, row: usize) -> RowTarget {
            RowTarget {
                product_id: self.product_id,
                tier_id: self.tier_id,
                section: Section::Core,
                row,
            }
        }

        fn addon(&self, row: usize) -> RowTarget {
            RowTarget {
                product_id: self.product_id,
                tier_id: self.tier_id,
                section: Section::Addons,
                row,
            }
        }

        fn cell(&self, target: RowTarget, field: FieldKey) -> TestResult<CellValue> {
            let tier = self
                .store
                .book()
                .tier(target.product_id, target.tier_id)
                .ok_or("missing tier")?;
            let row = tier.row(target.section, target.row).ok_or("missing row")?;
            let cell = row.cell(field).ok_or("missing cell")?;

            Ok(cell.value.clone())
        }

        fn pending(&self, section: Section) -> Option<RowPending> {
            self.store
                .book()
                .tier(self.product_id, self.tier_id)
                .and_then(|tier| tier.pending(section))
        }

        /// Type into a cell, let the edit settle, and pull the submit
        /// effect apart.
        fn edit_and_settle(
            &mut self,
            target: RowTarget,
            field: FieldKey,
            value: Decimal,
        ) -> TestResult<(TicketKey, RecalcRequest)> {
            self.store.dispatch(QuoteEvent::CellEdited {
                target,
                field,
                value,
                unit: None,
            })?;

            let effects = self.store.dispatch(QuoteEvent::EditSettled { target, field })?;

            match effects.into_iter().next() {
                Some(Effect::SubmitRecalc { ticket, body, .. }) => Ok((ticket, body)),
                other => Err(format!("expected a submit effect, got {other:?}").into()),
            }
        }
    }

    fn scalar_values(pairs: &[(FieldKey, Decimal)]) -> FxHashMap<FieldKey, WireValue> {
        pairs
            .iter()
            .map(|(key, value)| (*key, WireValue::Scalar(*value)))
            .collect()
    }

    fn details_response(support_id: AddonId) -> TierDetailsResponse {
        let mut payloads = FxHashMap::default();
        payloads.insert(
            support_id.to_string(),
            AddonFields {
                output_column: Some("support_total".into()),
                values: scalar_values(&[(FieldKey::Qty, Decimal::ONE)]),
                ..AddonFields::default()
            },
        );

        TierDetailsResponse {
            core: vec![
                RowDefinition {
                    metric_column: "api_calls".into(),
                    output_column: "api_calls_total".into(),
                    unit_columns: Vec::new(),
                    values: scalar_values(&[
                        (FieldKey::Qty, Decimal::from(1000)),
                        (FieldKey::ListUnitPrice, Decimal::new(40, 2)),
                    ]),
                },
                RowDefinition {
                    metric_column: "users".into(),
                    output_column: "users_total".into(),
                    unit_columns: Vec::new(),
                    values: scalar_values(&[(FieldKey::Qty, Decimal::from(25))]),
                },
            ],
            addon: vec![AddonDetail(payloads)],
        }
    }

    /// A recalculated payload touching a single core metric.
    fn recalc_response(metric: &str, pairs: &[(FieldKey, Decimal)]) -> RecalcResponse {
        let mut core = FxHashMap::default();
        core.insert(metric.to_owned(), scalar_values(pairs));

        RecalcResponse {
            addon_output: Vec::new(),
            core,
        }
    }

    /// One checked product whose Essentials tier has loaded details: two
    /// scalar core rows plus a checked plain add-on.
    fn seeded() -> TestResult<Fixture> {
        let product_id = ProductId::new();
        let tier_id = TierId::new();
        let elite_id = TierId::new();
        let support_id = AddonId::new();

        let mut book = PriceBook::new("USD");
        book.products.push(ProductEntry::new(
            product_id,
            PricingModelId::new(),
            "Platform",
            vec![
                TierEntry::new(
                    tier_id,
                    "Essentials",
                    vec![AddonChoice::plain(support_id, "Premier support")],
                ),
                TierEntry::new(elite_id, "Elite", Vec::new()),
            ],
        ));

        let mut store = Store::new(book, GrandTotalDiscountStrategy::default());

        store.dispatch(QuoteEvent::ProductToggled { product_id })?;
        store.dispatch(QuoteEvent::AddonToggled {
            product_id,
            tier_id,
            addon: 0,
        })?;

        let effects = store.dispatch(QuoteEvent::TierSelected {
            product_id,
            tier_id,
        })?;
        assert!(matches!(
            effects.first(),
            Some(Effect::FetchTierDetails { .. })
        ));

        store.dispatch(QuoteEvent::TierDetailsLoaded {
            product_id,
            tier_id,
            response: details_response(support_id),
        })?;

        Ok(Fixture {
            store,
            product_id,
            tier_id,
            elite_id,
            support_id,
        })
    }

    #[test]
    fn loading_details_feeds_straight_into_totals() -> TestResult {
        let fixture = seeded()?;

        let product = fixture
            .store
            .book()
            .product(fixture.product_id)
            .ok_or("missing product")?;

        let qty = product.total(FieldKey::Qty).ok_or("missing qty total")?;
        assert_eq!(qty.value, Some(Decimal::from(1026)));

        assert_eq!(
            fixture.store.book().grand_total,
            None,
            "one checked product never shows a grand total"
        );

        Ok(())
    }

    #[test]
    fn revision_moves_only_with_the_visible_tree() -> TestResult {
        let mut fixture = seeded()?;
        let revision = fixture.store.revision();

        // A ticket nobody issued is dropped without touching the tree.
        fixture.store.dispatch(QuoteEvent::RecalcFailed {
            ticket: TicketKey::default(),
        })?;
        assert_eq!(fixture.store.revision(), revision);

        fixture.store.dispatch(QuoteEvent::CellEdited {
            target: fixture.core(0),
            field: FieldKey::Qty,
            value: Decimal::from(5000),
            unit: None,
        })?;
        assert_eq!(fixture.store.revision(), revision + 1);

        // Retyping the same value leaves the tree as it was.
        fixture.store.dispatch(QuoteEvent::CellEdited {
            target: fixture.core(0),
            field: FieldKey::Qty,
            value: Decimal::from(5000),
            unit: None,
        })?;
        assert_eq!(fixture.store.revision(), revision + 1);

        Ok(())
    }

    #[test]
    fn tier_details_are_fetched_once_per_tier() -> TestResult {
        let mut fixture = seeded()?;
        let product_id = fixture.product_id;

        let effects = fixture.store.dispatch(QuoteEvent::TierSelected {
            product_id,
            tier_id: fixture.tier_id,
        })?;
        assert!(effects.is_empty(), "cached details must not refetch");

        let effects = fixture.store.dispatch(QuoteEvent::TierSelected {
            product_id,
            tier_id: fixture.elite_id,
        })?;
        assert!(matches!(
            effects.first(),
            Some(Effect::FetchTierDetails { tier_id, .. }) if *tier_id == fixture.elite_id
        ));

        let effects = fixture.store.dispatch(QuoteEvent::TierSelected {
            product_id,
            tier_id: fixture.elite_id,
        })?;
        assert!(effects.is_empty(), "a fetch is already in flight");

        Ok(())
    }

    #[test]
    fn settling_submits_and_latches_the_row() -> TestResult {
        let mut fixture = seeded()?;
        let target = fixture.core(0);

        let (ticket, body) = fixture.edit_and_settle(target, FieldKey::Qty, Decimal::from(5000))?;

        assert_eq!(
            body.quantity_dict.get("api_calls"),
            Some(&WireValue::Scalar(Decimal::from(5000)))
        );
        assert_eq!(
            body.output_keys.get("api_calls"),
            Some(&"api_calls_total".to_owned())
        );
        assert_eq!(body.addons.len(), 1, "the checked add-on rides along");

        assert_eq!(
            fixture.pending(Section::Core),
            Some(RowPending { row: 0, ticket })
        );
        assert_eq!(fixture.store.state().tickets.get(ticket), Some(&target));

        // Quantity stays interactive while the row waits, but a second
        // settle on the waiting row is swallowed.
        fixture.store.dispatch(QuoteEvent::CellEdited {
            target,
            field: FieldKey::Qty,
            value: Decimal::from(6000),
            unit: None,
        })?;
        let effects = fixture.store.dispatch(QuoteEvent::EditSettled {
            target,
            field: FieldKey::Qty,
        })?;
        assert!(effects.is_empty());
        assert_eq!(
            fixture.pending(Section::Core),
            Some(RowPending { row: 0, ticket })
        );

        Ok(())
    }

    #[test]
    fn a_settle_on_another_row_takes_over_the_indicator() -> TestResult {
        let mut fixture = seeded()?;

        let (first, _) = fixture.edit_and_settle(fixture.core(0), FieldKey::Qty, Decimal::from(5000))?;
        let (second, body) =
            fixture.edit_and_settle(fixture.core(1), FieldKey::Qty, Decimal::from(40))?;

        // The new body reads the whole current table, not just its row.
        assert_eq!(
            body.quantity_dict.get("api_calls"),
            Some(&WireValue::Scalar(Decimal::from(5000)))
        );
        assert_eq!(
            body.quantity_dict.get("users"),
            Some(&WireValue::Scalar(Decimal::from(40)))
        );

        assert_eq!(
            fixture.pending(Section::Core),
            Some(RowPending { row: 1, ticket: second })
        );

        // The superseded ticket stayed live; its response still merges
        // without disturbing the newer row's indicator.
        fixture.store.dispatch(QuoteEvent::RecalcCompleted {
            ticket: first,
            response: recalc_response("api_calls", &[(FieldKey::Discount, Decimal::from(10))]),
        })?;
        assert_eq!(
            fixture.cell(fixture.core(0), FieldKey::Discount)?,
            CellValue::Scalar(Decimal::from(10))
        );
        assert_eq!(
            fixture.pending(Section::Core),
            Some(RowPending { row: 1, ticket: second })
        );

        fixture.store.dispatch(QuoteEvent::RecalcCompleted {
            ticket: second,
            response: recalc_response("users", &[(FieldKey::Discount, Decimal::from(5))]),
        })?;
        assert_eq!(fixture.pending(Section::Core), None);

        Ok(())
    }

    #[test]
    fn failed_recalcs_keep_typed_values() -> TestResult {
        let mut fixture = seeded()?;
        let target = fixture.core(0);

        let (ticket, _) = fixture.edit_and_settle(target, FieldKey::Qty, Decimal::from(5000))?;

        let effects = fixture.store.dispatch(QuoteEvent::RecalcFailed { ticket })?;
        assert!(effects.is_empty(), "a failed request is not retried");

        assert_eq!(fixture.pending(Section::Core), None);
        assert!(fixture.store.state().tickets.is_empty());
        assert_eq!(
            fixture.cell(target, FieldKey::Qty)?,
            CellValue::Scalar(Decimal::from(5000)),
            "the local edit stands"
        );

        Ok(())
    }

    #[test]
    fn mismatched_responses_are_rejected_and_cleaned_up() -> TestResult {
        let mut fixture = seeded()?;
        let target = fixture.core(0);

        let (ticket, _) = fixture.edit_and_settle(target, FieldKey::Qty, Decimal::from(5000))?;

        let effects = fixture.store.dispatch(QuoteEvent::RecalcCompleted {
            ticket,
            response: recalc_response("segments", &[(FieldKey::Discount, Decimal::from(5))]),
        })?;

        assert!(matches!(
            effects.first(),
            Some(Effect::MergeRejected {
                error: MergeError::UnknownMetric(metric),
                ..
            }) if metric == "segments"
        ));

        assert_eq!(fixture.pending(Section::Core), None);
        assert!(fixture.store.state().tickets.is_empty());
        assert_eq!(
            fixture.cell(target, FieldKey::Discount)?,
            CellValue::Absent,
            "a refused merge must not leave half a response behind"
        );

        Ok(())
    }

    #[test]
    fn switching_tiers_retires_the_old_tiers_requests() -> TestResult {
        let mut fixture = seeded()?;
        let target = fixture.core(0);

        let (ticket, _) = fixture.edit_and_settle(target, FieldKey::Qty, Decimal::from(5000))?;

        let effects = fixture.store.dispatch(QuoteEvent::TierSelected {
            product_id: fixture.product_id,
            tier_id: fixture.elite_id,
        })?;
        assert!(matches!(
            effects.first(),
            Some(Effect::FetchTierDetails { tier_id, .. }) if *tier_id == fixture.elite_id
        ));

        assert!(fixture.store.state().tickets.is_empty());
        assert!(!fixture.store.state().carried.contains_key(&fixture.tier_id));
        assert_eq!(fixture.pending(Section::Core), None);

        // The orphaned response is dropped on the floor.
        let revision = fixture.store.revision();
        fixture.store.dispatch(QuoteEvent::RecalcCompleted {
            ticket,
            response: recalc_response("api_calls", &[(FieldKey::Discount, Decimal::from(10))]),
        })?;
        assert_eq!(fixture.store.revision(), revision);
        assert_eq!(fixture.cell(target, FieldKey::Discount)?, CellValue::Absent);

        Ok(())
    }

    #[test]
    fn toggling_an_addon_scrubs_its_carried_slice() -> TestResult {
        let mut fixture = seeded()?;

        let (_, body) = fixture.edit_and_settle(fixture.addon(0), FieldKey::Qty, Decimal::from(4))?;
        assert!(
            body.addons
                .iter()
                .any(|slice| slice.id == fixture.support_id)
        );

        fixture.store.dispatch(QuoteEvent::AddonToggled {
            product_id: fixture.product_id,
            tier_id: fixture.tier_id,
            addon: 0,
        })?;

        assert!(fixture.store.state().tickets.is_empty());
        assert_eq!(fixture.pending(Section::Addons), None);

        let carried = fixture
            .store
            .state()
            .carried
            .get(&fixture.tier_id)
            .ok_or("carried body dropped")?;
        assert!(carried.addons.is_empty(), "the toggled slice is scrubbed");
        assert!(
            !carried.quantity_dict.is_empty(),
            "the core portion keeps carrying"
        );

        Ok(())
    }
}
