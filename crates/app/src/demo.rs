//! Scripted seller walkthrough against the fixture rate cards.
//!
//! Builds a quote the way a seller would: check products, pick tiers,
//! attach add-ons, type into cells, and wait out the quiet period before
//! printing the repriced quote and its summary.

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use humanize_duration::{Truncate, prelude::DurationExt};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use reckon::{
    book::{FieldKey, Row, RowTarget, Section},
    fixtures::{Fixture, FixtureError},
    ids::{ProductId, TierId},
    store::{EngineError, QuoteEvent},
    summary::{QuoteSummary, SummaryError},
    totals::GrandTotalDiscountStrategy,
};

use crate::{
    api::StaticPricingApi,
    session::{QuoteSession, SessionEvent},
};

/// Failures surfaced by the walkthrough.
#[derive(Debug, Error)]
pub enum DemoError {
    /// Fixture data could not be loaded.
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    /// The calculator refused an event.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The summary could not be built or printed.
    #[error(transparent)]
    Summary(#[from] SummaryError),

    /// Output could not be written.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The fixture set has no row the script expects to edit.
    #[error("fixture set has no row for {0}")]
    MissingRow(String),
}

/// Knobs for the walkthrough.
#[derive(Debug)]
pub struct DemoOptions {
    /// Directory holding the fixture sets.
    pub fixtures: PathBuf,

    /// Name of the fixture set to drive.
    pub set: String,

    /// How the grand total's discount cell is derived.
    pub strategy: GrandTotalDiscountStrategy,
}

/// Run the walkthrough, printing the quote once it settles.
///
/// # Errors
///
/// Returns a [`DemoError`] when fixture data is missing or the calculator
/// refuses one of the scripted edits.
pub async fn run(options: DemoOptions) -> Result<(), DemoError> {
    let mut fixture = Fixture::with_base_path(&options.fixtures);
    fixture
        .load_book(&options.set)?
        .load_policy(&options.set)?
        .load_rates(&options.set)?;

    let mut book = fixture.book()?;
    book.apply_policy(&fixture.policy()?);

    let platform = fixture.product_id("platform")?;
    let essentials = fixture.tier_id("platform.essentials")?;
    let archive = fixture.product_id("archive")?;
    let standard = fixture.tier_id("archive.standard")?;

    info!(set = %options.set, "fixture set loaded");

    let api = Arc::new(StaticPricingApi::new(fixture.rates().clone()));
    let mut session = QuoteSession::new(book, options.strategy, api);

    let started = Instant::now();
    let mut out = io::stdout();

    // Check both products and pick a tier for each; the static backend
    // serves each tier's rate table as it is selected.
    session
        .dispatch(QuoteEvent::ProductToggled {
            product_id: platform,
        })
        .await?;
    session
        .dispatch(QuoteEvent::TierSelected {
            product_id: platform,
            tier_id: essentials,
        })
        .await?;
    session
        .dispatch(QuoteEvent::ProductToggled {
            product_id: archive,
        })
        .await?;
    session
        .dispatch(QuoteEvent::TierSelected {
            product_id: archive,
            tier_id: standard,
        })
        .await?;

    // Attach every add-on the essentials tier offers.
    let addon_count = session
        .book()
        .tier(platform, essentials)
        .map(|tier| tier.addons.len())
        .unwrap_or_default();
    for addon in 0..addon_count {
        session
            .dispatch(QuoteEvent::AddonToggled {
                product_id: platform,
                tier_id: essentials,
                addon,
            })
            .await?;
    }

    // Grow the api call commitment, then concede a rate: 0.32 against the
    // 0.40 list is a 20% discount, inside the platform's 25% ceiling.
    let api_calls = core_row(&session, platform, essentials, "api_calls")?;
    session
        .edit_cell(api_calls, FieldKey::Qty, Decimal::from(2500), None)
        .await?;
    session
        .edit_cell(
            api_calls,
            FieldKey::DiscountedUnitPrice,
            Decimal::new(32, 2),
            None,
        )
        .await?;

    // Knock the support retainer down to a round number instead of a rate.
    let support = addon_row(&session, platform, essentials, "support_total")?;
    session
        .edit_cell(
            support,
            FieldKey::DiscountedTotalPrice,
            Decimal::from(79),
            None,
        )
        .await?;

    // Archive pricing dips past its 10% ceiling, which flags the quote for
    // approval without blocking it.
    let objects = core_row(&session, archive, standard, "objects")?;
    session
        .edit_cell(objects, FieldKey::Qty, Decimal::from(80_000), None)
        .await?;
    session
        .edit_cell(
            objects,
            FieldKey::DiscountedUnitPrice,
            Decimal::new(8, 4),
            None,
        )
        .await?;

    writeln!(
        out,
        "waiting out the quiet period on {} edited cells...",
        session.pending_edits()
    )?;
    session.run_until_idle().await?;

    for event in session.take_events() {
        match event {
            SessionEvent::DetailsFailed { tier_id, error, .. } => {
                writeln!(out, "tier {tier_id} details fetch failed: {error}")?;
            }
            SessionEvent::RecalcFailed { tier_id, error } => {
                writeln!(out, "tier {tier_id} recalculation failed: {error}")?;
            }
            SessionEvent::MergeRejected { tier_id, error } => {
                writeln!(out, "tier {tier_id} response discarded: {error}")?;
            }
        }
    }

    let summary = QuoteSummary::from_book(session.book())?;
    summary.write_to(&mut out)?;

    writeln!(out)?;
    writeln!(
        out,
        "quote revision {} priced in {}",
        session.store().revision(),
        format_elapsed(started.elapsed())
    )?;

    Ok(())
}

/// Target of the core row pricing the given metric.
fn core_row(
    session: &QuoteSession,
    product_id: ProductId,
    tier_id: TierId,
    metric: &str,
) -> Result<RowTarget, DemoError> {
    row_target(session, product_id, tier_id, Section::Core, |row| {
        row.metric() == Some(metric)
    })
    .ok_or_else(|| DemoError::MissingRow(metric.to_owned()))
}

/// Target of the add-on row writing the given output column.
fn addon_row(
    session: &QuoteSession,
    product_id: ProductId,
    tier_id: TierId,
    output: &str,
) -> Result<RowTarget, DemoError> {
    row_target(session, product_id, tier_id, Section::Addons, |row| {
        row.output() == Some(output)
    })
    .ok_or_else(|| DemoError::MissingRow(output.to_owned()))
}

fn row_target(
    session: &QuoteSession,
    product_id: ProductId,
    tier_id: TierId,
    section: Section,
    pred: impl FnMut(&Row) -> bool,
) -> Option<RowTarget> {
    let tier = session.book().tier(product_id, tier_id)?;
    let row = tier
        .details
        .as_ref()?
        .section(section)
        .rows
        .iter()
        .position(pred)?;

    Some(RowTarget {
        product_id,
        tier_id,
        section,
        row,
    })
}

fn format_elapsed(duration: Duration) -> String {
    if duration < Duration::from_millis(1) {
        return "< 1ms".to_string();
    }

    format!("{}", duration.human(Truncate::Nano))
}
