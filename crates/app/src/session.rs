//! Quote session.
//!
//! Glue between the pure calculator core and a pricing backend: owns the
//! store, debounces keystrokes into settled edits, runs the reducer's
//! effects against a [`PricingApi`], and queues the failures a frontend
//! may want to surface.

use std::{collections::VecDeque, fmt, mem, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use smallvec::SmallVec;
use tokio::time;
use tracing::warn;

use reckon::{
    book::{FieldKey, PriceBook, RowTarget, Section},
    debounce::{DEFAULT_QUIET, Debouncer, EditKey},
    ids::{ProductId, TierId},
    recalc::MergeError,
    store::{Effect, EngineError, QuoteEvent, Store},
    totals::GrandTotalDiscountStrategy,
};

use crate::api::{ApiError, PricingApi};

/// Something that went wrong off the happy path, queued for the caller to
/// drain. The tree is already cleaned up by the time an event is queued.
#[derive(Debug)]
pub enum SessionEvent {
    /// A tier details fetch failed; the tier's loading flag was cleared.
    DetailsFailed {
        /// The product the fetch was for.
        product_id: ProductId,

        /// The tier the fetch was for.
        tier_id: TierId,

        /// What the backend reported.
        error: ApiError,
    },

    /// A recalculation failed; the typed values stand and nothing retries.
    RecalcFailed {
        /// The tier the request covered.
        tier_id: TierId,

        /// What the backend reported.
        error: ApiError,
    },

    /// A response arrived that did not match the tree and was dropped.
    MergeRejected {
        /// The tier the response was for.
        tier_id: TierId,

        /// Why the merge was refused.
        error: MergeError,
    },
}

/// Debounced edits an event makes stale.
enum StaleScope {
    Tier(TierId),
    Section(TierId, Section),
    Row(RowTarget),
}

/// Drives a [`Store`] against a pricing backend.
pub struct QuoteSession {
    store: Store,
    debouncer: Debouncer,
    api: Arc<dyn PricingApi>,
    events: Vec<SessionEvent>,
}

impl QuoteSession {
    /// A session over the given book, debouncing edits for the default
    /// quiet period.
    #[must_use]
    pub fn new(
        book: PriceBook,
        strategy: GrandTotalDiscountStrategy,
        api: Arc<dyn PricingApi>,
    ) -> Self {
        Self::with_quiet_period(book, strategy, api, DEFAULT_QUIET)
    }

    /// A session with a custom quiet period between the last keystroke on
    /// a cell and its recalculation.
    #[must_use]
    pub fn with_quiet_period(
        book: PriceBook,
        strategy: GrandTotalDiscountStrategy,
        api: Arc<dyn PricingApi>,
        quiet: Duration,
    ) -> Self {
        Self {
            store: Store::new(book, strategy),
            debouncer: Debouncer::new(quiet),
            api,
            events: Vec::new(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The visible tree.
    #[must_use]
    pub const fn book(&self) -> &PriceBook {
        self.store.book()
    }

    /// Number of edits still waiting out their quiet period.
    #[must_use]
    pub fn pending_edits(&self) -> usize {
        self.debouncer.len()
    }

    /// Drain the queued failure events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.events)
    }

    /// Apply one event, forget debounced edits the event made stale, and
    /// run whatever effects the reducer asks for.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the event cannot be applied; the state
    /// and the debouncer are left untouched in that case.
    pub async fn dispatch(&mut self, event: QuoteEvent) -> Result<(), EngineError> {
        let stale = stale_scope(self.store.book(), &event);
        let effects = self.store.dispatch(event)?;

        match stale {
            Some(StaleScope::Tier(tier_id)) => self.debouncer.cancel_tier(tier_id),
            Some(StaleScope::Section(tier_id, section)) => {
                self.debouncer.cancel_section(tier_id, section);
            }
            Some(StaleScope::Row(target)) => self.debouncer.cancel_row(target),
            None => {}
        }

        self.run_effects(effects).await
    }

    /// Type into a cell. The value lands in the tree at once; fields the
    /// server reprices start (or restart) their quiet period.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the edit cannot be applied.
    pub async fn edit_cell(
        &mut self,
        target: RowTarget,
        field: FieldKey,
        value: Decimal,
        unit: Option<String>,
    ) -> Result<(), EngineError> {
        self.dispatch(QuoteEvent::CellEdited {
            target,
            field,
            value,
            unit,
        })
        .await?;

        if field.triggers_recompute() {
            self.debouncer
                .note_edit(EditKey { target, field }, time::Instant::now().into_std());
        }

        Ok(())
    }

    /// Wait out every pending quiet period, submitting each edit as it
    /// settles. Returns once nothing remains debounced.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a settled edit cannot be submitted.
    pub async fn run_until_idle(&mut self) -> Result<(), EngineError> {
        while let Some(deadline) = self.debouncer.next_deadline() {
            time::sleep_until(time::Instant::from_std(deadline)).await;

            let now = time::Instant::now().into_std();
            for key in self.debouncer.due(now) {
                self.dispatch(QuoteEvent::EditSettled {
                    target: key.target,
                    field: key.field,
                })
                .await?;
            }
        }

        Ok(())
    }

    /// Run effects to completion. Each completion feeds back through the
    /// reducer, which may ask for more work; the queue drains in order.
    async fn run_effects(&mut self, effects: SmallVec<[Effect; 2]>) -> Result<(), EngineError> {
        let mut queue: VecDeque<Effect> = effects.into_iter().collect();

        while let Some(effect) = queue.pop_front() {
            let followups = match effect {
                Effect::FetchTierDetails {
                    product_id,
                    pricing_model_id,
                    tier_id,
                } => match self.api.fetch_tier_details(pricing_model_id, tier_id).await {
                    Ok(response) => self.store.dispatch(QuoteEvent::TierDetailsLoaded {
                        product_id,
                        tier_id,
                        response,
                    })?,
                    Err(error) => {
                        warn!(%product_id, %tier_id, %error, "tier details fetch failed");

                        let effects = self.store.dispatch(QuoteEvent::TierDetailsFailed {
                            product_id,
                            tier_id,
                        })?;

                        self.events.push(SessionEvent::DetailsFailed {
                            product_id,
                            tier_id,
                            error,
                        });

                        effects
                    }
                },
                Effect::SubmitRecalc {
                    ticket,
                    pricing_model_id,
                    tier_id,
                    body,
                } => match self
                    .api
                    .submit_recalculation(pricing_model_id, tier_id, body)
                    .await
                {
                    Ok(response) => self
                        .store
                        .dispatch(QuoteEvent::RecalcCompleted { ticket, response })?,
                    Err(error) => {
                        warn!(%tier_id, %error, "recalculation failed");

                        let effects = self.store.dispatch(QuoteEvent::RecalcFailed { ticket })?;

                        self.events.push(SessionEvent::RecalcFailed { tier_id, error });

                        effects
                    }
                },
                Effect::MergeRejected { tier_id, error } => {
                    warn!(%tier_id, %error, "recalculation response did not match the tree");

                    self.events.push(SessionEvent::MergeRejected { tier_id, error });

                    SmallVec::new()
                }
            };

            queue.extend(followups);
        }

        Ok(())
    }
}

impl fmt::Debug for QuoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteSession")
            .field("store", &self.store)
            .field("debouncer", &self.debouncer)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// What the debouncer should forget if this event applies: switching tiers
/// retires the old tier's edits wholesale, an add-on toggle rebuilds the
/// add-on section's rows out from under their keys, and a reset supersedes
/// anything still waiting on its row.
fn stale_scope(book: &PriceBook, event: &QuoteEvent) -> Option<StaleScope> {
    match event {
        QuoteEvent::TierSelected {
            product_id,
            tier_id,
        } => book
            .product(*product_id)
            .and_then(|product| {
                product
                    .checked_tiers()
                    .map(|tier| tier.tier_id)
                    .find(|checked| checked != tier_id)
            })
            .map(StaleScope::Tier),
        QuoteEvent::AddonToggled { tier_id, .. } => {
            Some(StaleScope::Section(*tier_id, Section::Addons))
        }
        QuoteEvent::RowReset { target } => Some(StaleScope::Row(*target)),
        _ => None,
    }
}
