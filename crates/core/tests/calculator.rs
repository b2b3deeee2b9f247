//! End-to-end calculator flows, driven through the [`Store`] against the
//! demo fixture catalog: selection and lazy details, settled edits and
//! their recalculation round trips, and the aggregated totals that follow.

use reckon::{
    book::{FieldKey, PriceBook, RowTarget, Section, TicketKey},
    fixtures::Fixture,
    ids::{ProductId, TierId},
    store::{Effect, QuoteEvent, Store},
    totals::{self, GrandTotalDiscountStrategy},
    wire::{RecalcRequest, RecalcResponse, RowDefinition, TierDetailsResponse, WireValue},
};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use testresult::TestResult;

/// Scalar wire values for the given fields.
fn scalar_values(pairs: &[(FieldKey, Decimal)]) -> FxHashMap<FieldKey, WireValue> {
    pairs
        .iter()
        .map(|(key, value)| (*key, WireValue::Scalar(*value)))
        .collect()
}

/// A core row as the details endpoint serves it before any discount: list
/// and discounted sides equal, total derived from quantity and unit price.
fn priced_row(metric: &str, output: &str, qty: Decimal, unit_price: Decimal) -> RowDefinition {
    let total = qty * unit_price;

    RowDefinition {
        metric_column: metric.to_owned(),
        output_column: output.to_owned(),
        unit_columns: Vec::new(),
        values: scalar_values(&[
            (FieldKey::Qty, qty),
            (FieldKey::ListUnitPrice, unit_price),
            (FieldKey::DiscountedUnitPrice, unit_price),
            (FieldKey::ListTotalPrice, total),
            (FieldKey::Discount, Decimal::ZERO),
            (FieldKey::DiscountedTotalPrice, total),
        ]),
    }
}

/// Details for the Essentials tier: one `api_calls` row at 1000 * 0.40.
fn essentials_details() -> TierDetailsResponse {
    TierDetailsResponse {
        core: vec![priced_row(
            "api_calls",
            "api_calls_total",
            Decimal::from(1000),
            Decimal::new(40, 2),
        )],
        addon: Vec::new(),
    }
}

/// A recalculation response carrying new values for one core metric.
fn recalc_response(metric: &str, fields: FxHashMap<FieldKey, WireValue>) -> RecalcResponse {
    let mut core = FxHashMap::default();
    core.insert(metric.to_owned(), fields);

    RecalcResponse {
        addon_output: Vec::new(),
        core,
    }
}

/// Check the product, pick the tier, and land the given details payload,
/// as the page would once the fetch round trip completes.
fn check_and_load(
    store: &mut Store,
    product_id: ProductId,
    tier_id: TierId,
    response: TierDetailsResponse,
) -> TestResult {
    store.dispatch(QuoteEvent::ProductToggled { product_id })?;

    let effects = store.dispatch(QuoteEvent::TierSelected { product_id, tier_id })?;
    assert!(matches!(
        effects.first(),
        Some(Effect::FetchTierDetails { .. })
    ));

    store.dispatch(QuoteEvent::TierDetailsLoaded {
        product_id,
        tier_id,
        response,
    })?;

    Ok(())
}

/// The ticket and request body of a submitted recalculation.
fn submitted(effects: &[Effect]) -> TestResult<(TicketKey, RecalcRequest)> {
    match effects.first() {
        Some(Effect::SubmitRecalc { ticket, body, .. }) => Ok((*ticket, body.clone())),
        _ => Err("expected a recalculation submission".into()),
    }
}

fn product_total(book: &PriceBook, product_id: ProductId, key: FieldKey) -> Option<Decimal> {
    book.product(product_id)?
        .total(key)
        .and_then(|cell| cell.value)
}

fn grand_total(book: &PriceBook, key: FieldKey) -> Option<Decimal> {
    book.grand_total
        .as_ref()?
        .iter()
        .find(|cell| cell.key == key)
        .and_then(|cell| cell.value)
}

#[test]
fn a_fresh_selection_prices_from_the_details_payload() -> TestResult {
    let fixture = Fixture::from_set("demo")?;
    let product_id = fixture.product_id("platform")?;
    let tier_id = fixture.tier_id("platform.essentials")?;

    let mut store = Store::new(fixture.book()?, GrandTotalDiscountStrategy::default());

    store.dispatch(QuoteEvent::ProductToggled { product_id })?;
    let effects = store.dispatch(QuoteEvent::TierSelected { product_id, tier_id })?;

    // Selecting a tier with no details yet asks the shell to fetch them.
    let Some(Effect::FetchTierDetails {
        tier_id: fetched, ..
    }) = effects.first()
    else {
        return Err("expected a fetch effect".into());
    };
    assert_eq!(*fetched, tier_id);

    // api_calls: 1000 * 0.40 = 400; storage: (500 + 25) * 0.02 = 10.50.
    let mut storage_qty = FxHashMap::default();
    storage_qty.insert("gb".to_owned(), Decimal::from(500));
    storage_qty.insert("seats".to_owned(), Decimal::from(25));

    let mut storage_values = scalar_values(&[
        (FieldKey::ListUnitPrice, Decimal::new(2, 2)),
        (FieldKey::DiscountedUnitPrice, Decimal::new(2, 2)),
        (FieldKey::ListTotalPrice, Decimal::new(1050, 2)),
        (FieldKey::Discount, Decimal::ZERO),
        (FieldKey::DiscountedTotalPrice, Decimal::new(1050, 2)),
    ]);
    storage_values.insert(FieldKey::Qty, WireValue::PerUnit(storage_qty));

    let response = TierDetailsResponse {
        core: vec![
            priced_row(
                "api_calls",
                "api_calls_total",
                Decimal::from(1000),
                Decimal::new(40, 2),
            ),
            RowDefinition {
                metric_column: "storage".to_owned(),
                output_column: "storage_total".to_owned(),
                unit_columns: vec!["gb".to_owned(), "seats".to_owned()],
                values: storage_values,
            },
        ],
        addon: Vec::new(),
    };

    store.dispatch(QuoteEvent::TierDetailsLoaded {
        product_id,
        tier_id,
        response,
    })?;

    // Product totals sum both rows: 400 + 10.50, list and discounted alike.
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::ListTotalPrice),
        Some(Decimal::new(41050, 2)),
    );
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::DiscountedTotalPrice),
        Some(Decimal::new(41050, 2)),
    );
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::Discount),
        Some(Decimal::ZERO),
    );

    // A lone checked product carries no grand total.
    assert!(store.book().grand_total.is_none());

    // Each event changed the tree, so each committed a revision.
    assert_eq!(store.revision(), 3);

    Ok(())
}

#[test]
fn an_edit_settles_into_a_request_and_the_response_lands() -> TestResult {
    let fixture = Fixture::from_set("demo")?;
    let product_id = fixture.product_id("platform")?;
    let tier_id = fixture.tier_id("platform.essentials")?;

    let mut store = Store::new(fixture.book()?, GrandTotalDiscountStrategy::default());
    check_and_load(&mut store, product_id, tier_id, essentials_details())?;

    let target = RowTarget {
        product_id,
        tier_id,
        section: Section::Core,
        row: 0,
    };

    // Bump the quantity to 2000 and let the edit settle.
    store.dispatch(QuoteEvent::CellEdited {
        target,
        field: FieldKey::Qty,
        value: Decimal::from(2000),
        unit: None,
    })?;
    let effects = store.dispatch(QuoteEvent::EditSettled {
        target,
        field: FieldKey::Qty,
    })?;
    let (ticket, body) = submitted(&effects)?;

    // The request resends the full current input set, with no overrides.
    assert_eq!(
        body.quantity_dict.get("api_calls"),
        Some(&WireValue::Scalar(Decimal::from(2000))),
    );
    assert_eq!(
        body.output_keys.get("api_calls"),
        Some(&"api_calls_total".to_owned()),
    );
    assert!(body.discounted_unit_price_dict.is_empty());
    assert!(body.discounted_total_price_dict.is_empty());

    // The row is latched while its recalculation is in flight.
    let pending = store
        .book()
        .tier(product_id, tier_id)
        .and_then(|tier| tier.pending(Section::Core))
        .ok_or("expected a pending marker")?;
    assert_eq!(pending.row, 0);

    // The service reprices the row: 2000 * 0.40 = 800 list, 10% off = 720.
    let response = recalc_response(
        "api_calls",
        scalar_values(&[
            (FieldKey::Qty, Decimal::from(2000)),
            (FieldKey::ListUnitPrice, Decimal::new(40, 2)),
            (FieldKey::DiscountedUnitPrice, Decimal::new(36, 2)),
            (FieldKey::ListTotalPrice, Decimal::from(800)),
            (FieldKey::Discount, Decimal::from(10)),
            (FieldKey::DiscountedTotalPrice, Decimal::from(720)),
        ]),
    );
    store.dispatch(QuoteEvent::RecalcCompleted { ticket, response })?;

    // The merge lands on the row and the pending marker clears.
    let row_price = store
        .book()
        .tier(product_id, tier_id)
        .and_then(|tier| tier.row(Section::Core, 0))
        .and_then(|row| row.cell(FieldKey::DiscountedTotalPrice))
        .and_then(|cell| cell.value.as_scalar());
    assert_eq!(row_price, Some(Decimal::from(720)));
    assert!(
        store
            .book()
            .tier(product_id, tier_id)
            .and_then(|tier| tier.pending(Section::Core))
            .is_none()
    );

    // Totals follow the merged row.
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::ListTotalPrice),
        Some(Decimal::from(800)),
    );
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::DiscountedTotalPrice),
        Some(Decimal::from(720)),
    );
    assert_eq!(
        product_total(store.book(), product_id, FieldKey::Discount),
        Some(Decimal::from(10)),
    );

    Ok(())
}

#[test]
fn price_overrides_exclude_each_other_across_requests() -> TestResult {
    let fixture = Fixture::from_set("demo")?;
    let product_id = fixture.product_id("platform")?;
    let tier_id = fixture.tier_id("platform.essentials")?;

    let mut store = Store::new(fixture.book()?, GrandTotalDiscountStrategy::default());
    check_and_load(&mut store, product_id, tier_id, essentials_details())?;

    let target = RowTarget {
        product_id,
        tier_id,
        section: Section::Core,
        row: 0,
    };

    // Pin the unit price at 0.30.
    store.dispatch(QuoteEvent::CellEdited {
        target,
        field: FieldKey::DiscountedUnitPrice,
        value: Decimal::new(30, 2),
        unit: None,
    })?;
    let effects = store.dispatch(QuoteEvent::EditSettled {
        target,
        field: FieldKey::DiscountedUnitPrice,
    })?;
    let (ticket, body) = submitted(&effects)?;

    assert_eq!(
        body.discounted_unit_price_dict.get("api_calls"),
        Some(&WireValue::Scalar(Decimal::new(30, 2))),
    );
    assert!(body.discounted_total_price_dict.is_empty());

    // 1000 * 0.30 = 300 discounted, 25% off list.
    store.dispatch(QuoteEvent::RecalcCompleted {
        ticket,
        response: recalc_response(
            "api_calls",
            scalar_values(&[
                (FieldKey::Qty, Decimal::from(1000)),
                (FieldKey::ListUnitPrice, Decimal::new(40, 2)),
                (FieldKey::DiscountedUnitPrice, Decimal::new(30, 2)),
                (FieldKey::ListTotalPrice, Decimal::from(400)),
                (FieldKey::Discount, Decimal::from(25)),
                (FieldKey::DiscountedTotalPrice, Decimal::from(300)),
            ]),
        ),
    })?;

    // Pinning the total price instead retires the unit-price override.
    store.dispatch(QuoteEvent::CellEdited {
        target,
        field: FieldKey::DiscountedTotalPrice,
        value: Decimal::from(250),
        unit: None,
    })?;
    let effects = store.dispatch(QuoteEvent::EditSettled {
        target,
        field: FieldKey::DiscountedTotalPrice,
    })?;
    let (_ticket, body) = submitted(&effects)?;

    assert_eq!(
        body.discounted_total_price_dict.get("api_calls"),
        Some(&WireValue::Scalar(Decimal::from(250))),
    );
    assert!(!body.discounted_unit_price_dict.contains_key("api_calls"));

    // Quantities still ride along on every request.
    assert_eq!(
        body.quantity_dict.get("api_calls"),
        Some(&WireValue::Scalar(Decimal::from(1000))),
    );

    Ok(())
}

/// Check Platform Essentials (400 list, served 25% off) and Archive
/// Standard (100 list, undiscounted), so the quote has two checked
/// products to aggregate.
fn two_product_store(strategy: GrandTotalDiscountStrategy) -> TestResult<Store> {
    let fixture = Fixture::from_set("demo")?;
    let platform = fixture.product_id("platform")?;
    let essentials = fixture.tier_id("platform.essentials")?;
    let archive = fixture.product_id("archive")?;
    let standard = fixture.tier_id("archive.standard")?;

    let mut store = Store::new(fixture.book()?, strategy);

    let platform_details = TierDetailsResponse {
        core: vec![RowDefinition {
            metric_column: "api_calls".to_owned(),
            output_column: "api_calls_total".to_owned(),
            unit_columns: Vec::new(),
            values: scalar_values(&[
                (FieldKey::Qty, Decimal::from(1000)),
                (FieldKey::ListUnitPrice, Decimal::new(40, 2)),
                (FieldKey::DiscountedUnitPrice, Decimal::new(30, 2)),
                (FieldKey::ListTotalPrice, Decimal::from(400)),
                (FieldKey::Discount, Decimal::from(25)),
                (FieldKey::DiscountedTotalPrice, Decimal::from(300)),
            ]),
        }],
        addon: Vec::new(),
    };
    check_and_load(&mut store, platform, essentials, platform_details)?;

    let archive_details = TierDetailsResponse {
        core: vec![priced_row(
            "objects",
            "objects_total",
            Decimal::from(100_000),
            Decimal::new(1, 3),
        )],
        addon: Vec::new(),
    };
    check_and_load(&mut store, archive, standard, archive_details)?;

    Ok(store)
}

#[test]
fn two_checked_products_roll_into_a_grand_total() -> TestResult {
    let store = two_product_store(GrandTotalDiscountStrategy::SummedPercentages)?;

    // Platform discounts 400 to 300, Archive stays at 100.
    assert_eq!(
        grand_total(store.book(), FieldKey::ListTotalPrice),
        Some(Decimal::from(500)),
    );
    assert_eq!(
        grand_total(store.book(), FieldKey::DiscountedTotalPrice),
        Some(Decimal::from(400)),
    );

    // The default strategy adds the products' percentages: 25 + 0.
    assert_eq!(
        grand_total(store.book(), FieldKey::Discount),
        Some(Decimal::from(25)),
    );

    // Weighting by totals instead blends them: (500 - 400) / 500 = 20%.
    let store = two_product_store(GrandTotalDiscountStrategy::RatioOfTotals)?;
    assert_eq!(
        grand_total(store.book(), FieldKey::Discount),
        Some(Decimal::from(20)),
    );

    Ok(())
}

#[test]
fn policy_ceilings_escalate_the_quote() -> TestResult {
    let fixture = Fixture::from_set("demo")?;
    let product_id = fixture.product_id("platform")?;
    let tier_id = fixture.tier_id("platform.essentials")?;

    // Platform's ceiling is 25% in the demo policy.
    let mut book = fixture.book()?;
    book.apply_policy(&fixture.policy()?);

    let mut store = Store::new(book, GrandTotalDiscountStrategy::default());
    check_and_load(&mut store, product_id, tier_id, essentials_details())?;

    let target = RowTarget {
        product_id,
        tier_id,
        section: Section::Core,
        row: 0,
    };

    store.dispatch(QuoteEvent::CellEdited {
        target,
        field: FieldKey::DiscountedUnitPrice,
        value: Decimal::new(28, 2),
        unit: None,
    })?;
    let effects = store.dispatch(QuoteEvent::EditSettled {
        target,
        field: FieldKey::DiscountedUnitPrice,
    })?;
    let (ticket, _body) = submitted(&effects)?;

    // The service prices the row 30% off, five points over the ceiling.
    store.dispatch(QuoteEvent::RecalcCompleted {
        ticket,
        response: recalc_response(
            "api_calls",
            scalar_values(&[
                (FieldKey::Qty, Decimal::from(1000)),
                (FieldKey::ListUnitPrice, Decimal::new(40, 2)),
                (FieldKey::DiscountedUnitPrice, Decimal::new(28, 2)),
                (FieldKey::ListTotalPrice, Decimal::from(400)),
                (FieldKey::Discount, Decimal::from(30)),
                (FieldKey::DiscountedTotalPrice, Decimal::from(280)),
            ]),
        ),
    })?;

    // Both the discount and the discounted total flag the violation.
    let product = store.book().product(product_id).ok_or("product missing")?;
    let discount = product
        .total(FieldKey::Discount)
        .ok_or("discount total missing")?;
    assert!(discount.error);
    assert_eq!(discount.max_discount, Some(Decimal::from(25)));

    let total = product
        .total(FieldKey::DiscountedTotalPrice)
        .ok_or("discounted total missing")?;
    assert!(total.error);

    assert!(totals::escalation_required(store.book()));

    Ok(())
}
