//! Dispensation of admission prices across the units that treated the
//! patient.
//!
//! Each stay of an admission gets a weight according to the dispense mode;
//! the admission GHS price is split in proportion to the weights, while
//! supplements stay with the stay that earned them. Rounding remainders go
//! to the last stay so that shares always add up to the admission price.

use crate::pricing::{price_all, Pricing};
use crate::types::ClassifyResult;
use pmsi_tables::{SupplementType, UnitCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How stays of an admission are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispenseMode {
    /// GHS price of the stay classified alone.
    E,
    /// Price with EXB/EXH of the stay classified alone.
    Ex,
    /// `Ex` when the admission had EXB days, `E` otherwise.
    Ex2,
    /// Days (at least one per stay).
    J,
    /// Days times `Ex`.
    ExJ,
    /// Days times `Ex2`.
    ExJ2,
}

impl DispenseMode {
    pub const ALL: [DispenseMode; 6] = [
        DispenseMode::E,
        DispenseMode::Ex,
        DispenseMode::Ex2,
        DispenseMode::J,
        DispenseMode::ExJ,
        DispenseMode::ExJ2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DispenseMode::E => "E",
            DispenseMode::Ex => "Ex",
            DispenseMode::Ex2 => "Ex2",
            DispenseMode::J => "J",
            DispenseMode::ExJ => "ExJ",
            DispenseMode::ExJ2 => "ExJ2",
        }
    }
}

impl fmt::Display for DispenseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dispense mode '{0}' (expected E, Ex, Ex2, J, ExJ or ExJ2)")]
pub struct UnknownDispenseMode(pub String);

impl FromStr for DispenseMode {
    type Err = UnknownDispenseMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DispenseMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDispenseMode(s.to_string()))
    }
}

/// Share of the dispensed prices owed to one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Due {
    pub unit: UnitCode,
    #[serde(flatten)]
    pub pricing: Pricing,
}

fn round_cents(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or_default()
}

fn compute_coefficients(
    pricing: &Pricing,
    mono_pricings: &[Pricing],
    mode: DispenseMode,
    coefficients: &mut Vec<Decimal>,
) -> Decimal {
    coefficients.clear();
    coefficients.extend(mono_pricings.iter().map(|mono_pricing| {
        let days = Decimal::from(mono_pricing.duration.max(1));
        let price = Decimal::from(mono_pricing.price_cents);
        let ghs = Decimal::from(mono_pricing.ghs_cents);
        let ex2 = if pricing.exb_exh < 0 { price } else { ghs };

        match mode {
            DispenseMode::E => ghs,
            DispenseMode::Ex => price,
            DispenseMode::Ex2 => ex2,
            DispenseMode::J => days,
            DispenseMode::ExJ => days * price,
            DispenseMode::ExJ2 => days * ex2,
        }
    }));
    coefficients.iter().sum()
}

/// Splits each admission pricing over its stays.
///
/// `mono_pricings` holds the pricings of every stay, admission after
/// admission, priced without the sector coefficient; the returned vector
/// is parallel to it.
pub fn dispense_pricings(
    pricings: &[Pricing],
    mono_pricings: &[Pricing],
    mode: DispenseMode,
) -> Vec<Pricing> {
    let mut out = Vec::with_capacity(mono_pricings.len());
    let mut coefficients = Vec::new();

    let mut offset = 0;
    for pricing in pricings {
        let end = (offset + pricing.stays_count).min(mono_pricings.len());
        let sub_mono_pricings = &mono_pricings[offset..end];
        offset = end;
        if sub_mono_pricings.is_empty() {
            continue;
        }

        let mut total = compute_coefficients(pricing, sub_mono_pricings, mode, &mut coefficients);
        if total.is_zero() {
            total = compute_coefficients(
                pricing,
                sub_mono_pricings,
                DispenseMode::J,
                &mut coefficients,
            );
        }

        let start = out.len();
        let mut dispensed_ghs_cents = 0;
        let mut dispensed_price_cents = 0;
        for (mono_pricing, &coefficient) in sub_mono_pricings.iter().zip(&coefficients) {
            let mut mono_pricing = mono_pricing.clone();

            // DIP is shared by days (plus one per stay), whatever the mode
            let dip_cents = pricing.supplement_cents[SupplementType::Dip];
            if dip_cents != 0 {
                let share = Decimal::from(dip_cents) * Decimal::from(mono_pricing.duration + 1)
                    / Decimal::from(pricing.duration + sub_mono_pricings.len() as i64);
                let mono_dip_cents = round_cents(share);
                mono_pricing.total_cents +=
                    mono_dip_cents - mono_pricing.supplement_cents[SupplementType::Dip];
                mono_pricing.supplement_cents[SupplementType::Dip] = mono_dip_cents;
            }

            let supplement_cents = mono_pricing.total_cents - mono_pricing.price_cents;
            mono_pricing.ghs_cents =
                round_cents(Decimal::from(pricing.ghs_cents) * coefficient / total);
            mono_pricing.price_cents =
                round_cents(Decimal::from(pricing.price_cents) * coefficient / total);
            mono_pricing.total_cents = mono_pricing.price_cents + supplement_cents;

            dispensed_ghs_cents += mono_pricing.ghs_cents;
            dispensed_price_cents += mono_pricing.price_cents;
            out.push(mono_pricing);
        }

        if let Some(last) = out[start..].last_mut() {
            last.ghs_cents += pricing.ghs_cents - dispensed_ghs_cents;
            last.price_cents += pricing.price_cents - dispensed_price_cents;
            last.total_cents += pricing.price_cents - dispensed_price_cents;
        }
    }

    out
}

/// Dispenses the prices of `results` across units.
///
/// `mono_results` must hold the per-stay results of the same admissions,
/// in the same order (see [`ClassifyFlags::mono`](crate::ClassifyFlags)).
/// Dues are sorted by unit.
pub fn dispense(
    results: &[ClassifyResult],
    mono_results: &[ClassifyResult],
    mode: DispenseMode,
) -> Vec<Due> {
    let pricings = price_all(results, true);
    let mono_pricings = price_all(mono_results, false);
    let mono_pricings = dispense_pricings(&pricings, &mono_pricings, mode);

    let mut dues: BTreeMap<UnitCode, Pricing> = BTreeMap::new();
    for (mono_result, mono_pricing) in mono_results.iter().zip(&mono_pricings) {
        let unit = mono_result
            .stays
            .first()
            .map(|stay| stay.unit)
            .unwrap_or_default();
        *dues.entry(unit).or_default() += mono_pricing;
    }

    tracing::debug!(mode = %mode, units = dues.len(), "dispensed prices");

    dues.into_iter()
        .map(|(unit, pricing)| Due { unit, pricing })
        .collect()
}
