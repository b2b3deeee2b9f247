//! Fixture-backed pricing.
//!
//! A [`PricingApi`] that prices every request locally from rate cards, so
//! demos and tests run without a pricing service. Derivations are the
//! simple ones a real deployment delegates to the service: quantity times
//! list price, with seller overrides taking precedence on the discounted
//! side and the discount percentage read back off the totals.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use reckon::{
    book::FieldKey,
    fixtures::rates::TierRateCard,
    ids::{PricingModelId, TierId},
    wire::{
        AddonDetail, AddonFields, AddonMetricFields, AddonOutput, AddonOutputValue, RecalcRequest,
        RecalcResponse, RowDefinition, TierDetailsResponse, WireValue,
    },
};

use crate::api::{ApiError, PricingApi};

/// Prices tier details and recalculations from in-memory rate cards.
#[derive(Debug, Clone)]
pub struct StaticPricingApi {
    rates: FxHashMap<TierId, TierRateCard>,
}

impl StaticPricingApi {
    /// A backend over the given rate cards.
    #[must_use]
    pub fn new(rates: FxHashMap<TierId, TierRateCard>) -> Self {
        Self { rates }
    }

    fn card(&self, tier_id: TierId) -> Result<&TierRateCard, ApiError> {
        self.rates.get(&tier_id).ok_or(ApiError::UnknownTier(tier_id))
    }
}

#[async_trait]
impl PricingApi for StaticPricingApi {
    async fn fetch_tier_details(
        &self,
        _pricing_model_id: PricingModelId,
        tier_id: TierId,
    ) -> Result<TierDetailsResponse, ApiError> {
        let card = self.card(tier_id)?;

        let core = card
            .core
            .iter()
            .map(|line| {
                let mut values = priced_fields(&line.quantity, line.unit_price, None, None);
                values.insert(FieldKey::Qty, line.quantity.clone());

                RowDefinition {
                    metric_column: line.metric.clone(),
                    output_column: line.output.clone(),
                    unit_columns: line.units.clone(),
                    values,
                }
            })
            .collect();

        let addon = card
            .addons
            .iter()
            .map(|addon| {
                let fields = if addon.has_custom_metrics() {
                    AddonFields {
                        metrics: addon
                            .metrics
                            .iter()
                            .map(|rate| {
                                let quantity = WireValue::Scalar(rate.quantity);
                                let mut values =
                                    priced_fields(&quantity, rate.unit_price, None, None);
                                values.insert(FieldKey::Qty, quantity);

                                AddonMetricFields {
                                    metric_column: rate.metric.clone(),
                                    output_column: rate.output.clone(),
                                    values,
                                }
                            })
                            .collect(),
                        ..AddonFields::default()
                    }
                } else {
                    let mut values = priced_fields(&addon.quantity, addon.unit_price, None, None);
                    values.insert(FieldKey::Qty, addon.quantity.clone());

                    AddonFields {
                        output_column: addon.output.clone(),
                        unit_columns: unit_columns(&addon.quantity),
                        values,
                        metrics: Vec::new(),
                    }
                };

                let mut payload = FxHashMap::default();
                payload.insert(addon.addon_id.to_string(), fields);

                AddonDetail(payload)
            })
            .collect();

        Ok(TierDetailsResponse { core, addon })
    }

    async fn submit_recalculation(
        &self,
        _pricing_model_id: PricingModelId,
        tier_id: TierId,
        body: RecalcRequest,
    ) -> Result<RecalcResponse, ApiError> {
        let card = self.card(tier_id)?;

        let mut core = FxHashMap::default();

        for (metric, quantity) in &body.quantity_dict {
            let line = card
                .line(metric)
                .ok_or_else(|| ApiError::UnknownRate(metric.clone()))?;

            core.insert(
                metric.clone(),
                priced_fields(
                    quantity,
                    line.unit_price,
                    body.discounted_unit_price_dict.get(metric),
                    body.discounted_total_price_dict.get(metric),
                ),
            );
        }

        let mut addon_output = Vec::new();

        for slice in &body.addons {
            let addon = card
                .addon(slice.id)
                .ok_or_else(|| ApiError::UnknownRate(slice.id.to_string()))?;

            let value = if addon.has_custom_metrics() {
                let mut metrics = FxHashMap::default();

                for (metric, quantity) in &slice.units {
                    let rate = addon
                        .metric(metric)
                        .ok_or_else(|| ApiError::UnknownRate(metric.clone()))?;

                    metrics.insert(
                        metric.clone(),
                        priced_fields(
                            quantity,
                            rate.unit_price,
                            slice.discounted_unit_price_dict.get(metric),
                            slice.discounted_total_price_dict.get(metric),
                        ),
                    );
                }

                AddonOutputValue::Nested(metrics)
            } else {
                // Plain add-on rows key their dicts by the output column.
                let key = addon.output.as_deref().unwrap_or_default();
                let quantity = slice
                    .units
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| addon.quantity.clone());

                AddonOutputValue::Fields(priced_fields(
                    &quantity,
                    addon.unit_price,
                    slice.discounted_unit_price_dict.get(key),
                    slice.discounted_total_price_dict.get(key),
                ))
            };

            let mut payload = FxHashMap::default();
            payload.insert(slice.id.to_string(), value);

            addon_output.push(AddonOutput(payload));
        }

        Ok(RecalcResponse { addon_output, core })
    }
}

/// Every derived field of one priced row except the quantity itself.
/// Recalculation responses leave the quantity out so a value typed while
/// the request was in flight is not clobbered on merge; the details
/// endpoint adds it back for fresh rows.
fn priced_fields(
    quantity: &WireValue,
    list_price: Decimal,
    unit_override: Option<&WireValue>,
    total_override: Option<&WireValue>,
) -> FxHashMap<FieldKey, WireValue> {
    let magnitude = sum_units(quantity);
    let list_total = magnitude * list_price;

    let (discounted_unit, discounted_total) = if let Some(total) = total_override {
        let total = sum_units(total);
        let unit = if magnitude.is_zero() {
            list_price
        } else {
            total / magnitude
        };

        (WireValue::Scalar(unit), total)
    } else if let Some(unit) = unit_override {
        (unit.clone(), override_total(quantity, list_price, unit))
    } else {
        (WireValue::Scalar(list_price), list_total)
    };

    let discount = if list_total.is_zero() {
        Decimal::ZERO
    } else {
        (((list_total - discounted_total) / list_total) * Decimal::ONE_HUNDRED).round_dp(2)
    };

    let mut fields = FxHashMap::default();
    fields.insert(FieldKey::ListUnitPrice, WireValue::Scalar(list_price));
    fields.insert(FieldKey::DiscountedUnitPrice, discounted_unit);
    fields.insert(FieldKey::ListTotalPrice, WireValue::Scalar(list_total));
    fields.insert(
        FieldKey::DiscountedTotalPrice,
        WireValue::Scalar(discounted_total),
    );
    fields.insert(FieldKey::Discount, WireValue::Scalar(discount));

    fields
}

/// A quantity's scalar magnitude: the value itself, or the sum across its
/// unit columns.
fn sum_units(value: &WireValue) -> Decimal {
    match value {
        WireValue::Scalar(value) => *value,
        WireValue::PerUnit(units) => units.values().copied().sum(),
    }
}

/// The discounted total under a unit-price override. Units the override
/// does not name stay at list price.
fn override_total(quantity: &WireValue, list_price: Decimal, unit_override: &WireValue) -> Decimal {
    match (quantity, unit_override) {
        (_, WireValue::Scalar(price)) => sum_units(quantity) * *price,
        (WireValue::PerUnit(quantities), WireValue::PerUnit(prices)) => quantities
            .iter()
            .map(|(unit, quantity)| *quantity * prices.get(unit).copied().unwrap_or(list_price))
            .sum(),
        (WireValue::Scalar(quantity), WireValue::PerUnit(_)) => *quantity * list_price,
    }
}

/// Unit columns implied by a per-unit default quantity, in a stable order.
fn unit_columns(quantity: &WireValue) -> Vec<String> {
    match quantity {
        WireValue::Scalar(_) => Vec::new(),
        WireValue::PerUnit(units) => {
            let mut columns: Vec<String> = units.keys().cloned().collect();
            columns.sort_unstable();
            columns
        }
    }
}
