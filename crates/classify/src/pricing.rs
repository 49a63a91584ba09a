//! GHS and supplement pricing.
//!
//! The GHS base price is adjusted for short (EXB) and long (EXH) stays,
//! then scaled by the sector coefficient. Supplements are priced linearly
//! from their day counts.

use crate::types::ClassifyResult;
use pmsi_stays::StayFlags;
use pmsi_tables::{GhsCode, GhsPriceInfo, SupplementCounters, SupplementType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::ops::AddAssign;

/// Flat reduction of minored GHS for stays with expensive drugs.
const MINORATION_CENTS: i64 = 4000;

/// Price of one result, or the sum of several.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pricing {
    pub results_count: usize,
    pub stays_count: usize,
    pub failures_count: usize,

    pub duration: i64,
    pub ghs_duration: i64,

    pub ghs: GhsCode,
    /// Negative for EXB days, positive for EXH days.
    pub exb_exh: i32,
    pub ghs_coefficient: Decimal,
    /// GHS price before EXB/EXH.
    pub ghs_cents: i64,
    /// GHS price after EXB/EXH.
    pub price_cents: i64,

    pub supplement_days: SupplementCounters<i32>,
    pub supplement_cents: SupplementCounters<i64>,

    pub total_cents: i64,
}

/// Sums counts, durations and cents. Per-result values (GHS, EXB/EXH days,
/// coefficient) keep the left-hand value.
impl AddAssign<&Pricing> for Pricing {
    fn add_assign(&mut self, other: &Pricing) {
        self.results_count += other.results_count;
        self.stays_count += other.stays_count;
        self.failures_count += other.failures_count;
        self.duration += other.duration;
        self.ghs_duration += other.ghs_duration;
        self.ghs_cents += other.ghs_cents;
        self.price_cents += other.price_cents;
        self.supplement_days += &other.supplement_days;
        self.supplement_cents += &other.supplement_cents;
        self.total_cents += other.total_cents;
    }
}

/// `cents` scaled by `coefficient`, truncated toward zero.
pub(crate) fn apply_coefficient(coefficient: Decimal, cents: i64) -> i64 {
    (coefficient * Decimal::from(cents))
        .trunc()
        .to_i64()
        .unwrap_or_default()
}

/// Prices one GHS stay of `duration` nights.
///
/// Returns the adjusted price; `pricing` receives the GHS price, the
/// EXB/EXH day count and the coefficient.
pub fn price_ghs(
    price_info: &GhsPriceInfo,
    coefficient: Decimal,
    duration: i32,
    death: bool,
    ucd: bool,
    pricing: &mut Pricing,
) -> i64 {
    let mut ghs_cents = price_info.ghs_cents;
    if price_info.minoration && ucd {
        ghs_cents -= MINORATION_CENTS;
    }

    let mut price_cents = ghs_cents;
    if duration < price_info.exb_threshold && !death {
        pricing.exb_exh = -(price_info.exb_threshold - duration);
        if price_info.exb_once {
            price_cents -= price_info.exb_cents;
        } else {
            price_cents += price_info.exb_cents * i64::from(pricing.exb_exh);
        }
    } else if price_info.exh_threshold != 0
        && duration + i32::from(death) >= price_info.exh_threshold
    {
        pricing.exb_exh = duration + i32::from(death) + 1 - price_info.exh_threshold;
        price_cents += price_info.exh_cents * i64::from(pricing.exb_exh);
    }

    pricing.ghs_coefficient = coefficient;
    pricing.ghs_cents += apply_coefficient(coefficient, ghs_cents);
    apply_coefficient(coefficient, price_cents)
}

/// Prices one classification result.
///
/// With `with_coefficient` unset, prices are not scaled by the sector
/// coefficient (used to weight stays before dispensation).
pub fn price(result: &ClassifyResult, with_coefficient: bool) -> Pricing {
    let mut pricing = Pricing {
        results_count: 1,
        stays_count: result.stays_count,
        failures_count: usize::from(result.ghm.is_error()),
        duration: i64::from(result.duration),
        ghs_duration: i64::from(result.ghs_duration),
        ghs: result.ghs,
        ..Default::default()
    };

    let Some(index) = result.index else {
        return pricing;
    };
    if result.ghs == GhsCode::NONE {
        return pricing;
    }

    // The table coefficient is reported even when it is not applied
    let table_coefficient = index.ghs_coefficient(result.sector);
    let coefficient = if with_coefficient {
        table_coefficient
    } else {
        Decimal::ONE
    };

    match index.find_ghs_price(result.ghs, result.sector) {
        Some(price_info) => {
            let death = result.stays.last().is_some_and(|stay| stay.exit.mode == b'9');
            let ucd = result
                .stays
                .first()
                .is_some_and(|stay| stay.flags.contains(StayFlags::UCD));
            pricing.price_cents = price_ghs(
                price_info,
                coefficient,
                result.ghs_duration,
                death,
                ucd,
                &mut pricing,
            );
            pricing.ghs_coefficient = table_coefficient;
        }
        None => {
            tracing::error!(
                ghs = %result.ghs,
                sector = %result.sector,
                date = %index.limit_dates[0],
                "cannot find price for GHS"
            );
            pricing.ghs_coefficient = table_coefficient;
        }
    }

    let unit_prices = index.supplement_prices(result.sector);
    pricing.supplement_days = result.supplement_days;
    for ty in SupplementType::ALL {
        let days = i64::from(result.supplement_days[ty]);
        pricing.supplement_cents[ty] = apply_coefficient(coefficient, days * unit_prices[ty]);
    }

    pricing.total_cents =
        pricing.price_cents + pricing.supplement_cents.values.iter().sum::<i64>();
    pricing
}

/// Prices every result.
pub fn price_all(results: &[ClassifyResult], with_coefficient: bool) -> Vec<Pricing> {
    results
        .iter()
        .map(|result| price(result, with_coefficient))
        .collect()
}

/// Sum of `pricings`.
pub fn summarize(pricings: &[Pricing]) -> Pricing {
    let mut summary = Pricing::default();
    for pricing in pricings {
        summary += pricing;
    }
    summary
}
