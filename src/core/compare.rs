//! Calculator conversions and cash-out channel comparisons
//!
//! All amounts are in the city's payout currency unless the name says USDT.

use super::config::CityConfig;
use anyhow::{Result, anyhow};
use serde::Serialize;

/// Bank transfer rate relative to the exchange rate.
pub const BANK_RATE_FACTOR: f64 = 0.97;
/// ATM withdrawal rate relative to the exchange rate.
pub const ATM_RATE_FACTOR: f64 = 0.95;
/// Below this USDT amount the ATM loss estimate is not shown.
pub const MIN_ATM_ESTIMATE_USDT: f64 = 100.0;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Finds a city by slug, or the first configured city when no slug is given.
pub fn find_city<'a>(cities: &'a [CityConfig], slug: Option<&str>) -> Result<&'a CityConfig> {
    match slug {
        None => cities
            .first()
            .ok_or_else(|| anyhow!("No cities configured")),
        Some(slug) => cities
            .iter()
            .find(|c| c.slug.eq_ignore_ascii_case(slug))
            .ok_or_else(|| {
                let known: Vec<&str> = cities.iter().map(|c| c.slug.as_str()).collect();
                anyhow!("Unknown city: {} (known: {})", slug, known.join(", "))
            }),
    }
}

/// Live rate adjusted by the city's modifier.
pub fn effective_rate(rate: f64, city: &CityConfig) -> f64 {
    rate * city.base_rate_modifier
}

/// USDT amount to payout currency, rounded to cents.
pub fn usdt_to_fiat(amount: f64, rate: f64) -> f64 {
    round2(amount * rate)
}

/// Payout currency amount back to USDT, rounded to cents. A non-positive rate yields 0.
pub fn fiat_to_usdt(amount: f64, rate: f64) -> f64 {
    if rate <= 0.0 || rate.is_nan() {
        return 0.0;
    }
    round2(amount / rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateComparison {
    pub exchange_amount: f64,
    pub bank_amount: f64,
    pub atm_amount: f64,
    /// Extra received through the exchange compared with a bank transfer.
    pub savings: f64,
}

impl RateComparison {
    pub fn new(amount_usdt: f64, rate: f64) -> Self {
        let exchange_amount = amount_usdt * rate;
        let bank_amount = amount_usdt * rate * BANK_RATE_FACTOR;
        let atm_amount = amount_usdt * rate * ATM_RATE_FACTOR;
        RateComparison {
            exchange_amount,
            bank_amount,
            atm_amount,
            savings: exchange_amount - bank_amount,
        }
    }
}

/// Fee model for withdrawing cash from a local ATM with a foreign card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmFeeSchedule {
    pub fee_per_withdrawal: f64,
    pub withdrawal_limit: f64,
    /// Spread the card issuer takes on conversion, 0.04 = 4%.
    pub conversion_loss: f64,
}

impl Default for AtmFeeSchedule {
    // Thai ATMs
    fn default() -> Self {
        AtmFeeSchedule {
            fee_per_withdrawal: 220.0,
            withdrawal_limit: 25_000.0,
            conversion_loss: 0.04,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AtmLoss {
    pub ideal_amount: f64,
    pub withdrawals: u32,
    pub total_fees: f64,
    pub conversion_loss: f64,
    pub total_loss: f64,
    pub received: f64,
}

impl AtmLoss {
    /// Estimates what is lost cashing out `amount_usdt` through ATMs.
    ///
    /// Returns `None` for amounts under [`MIN_ATM_ESTIMATE_USDT`] and for amounts too
    /// large to count withdrawals for.
    pub fn estimate(amount_usdt: f64, rate: f64, schedule: &AtmFeeSchedule) -> Option<Self> {
        if amount_usdt.is_nan() || amount_usdt < MIN_ATM_ESTIMATE_USDT {
            return None;
        }
        let ideal_amount = amount_usdt * rate;
        let withdrawals = (ideal_amount / schedule.withdrawal_limit).ceil();
        if !(0.0..=f64::from(u32::MAX)).contains(&withdrawals) {
            return None;
        }
        let withdrawals = withdrawals as u32;
        let total_fees = f64::from(withdrawals) * schedule.fee_per_withdrawal;
        let conversion_loss = ideal_amount * schedule.conversion_loss;
        let total_loss = total_fees + conversion_loss;

        Some(AtmLoss {
            ideal_amount,
            withdrawals,
            total_fees,
            conversion_loss,
            total_loss,
            received: ideal_amount - total_loss,
        })
    }
}

/// Everything the `compare` view shows for one amount in one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityQuote {
    pub city: String,
    pub currency: String,
    pub amount_usdt: f64,
    pub rate: f64,
    pub receive: f64,
    pub comparison: RateComparison,
    pub atm_loss: Option<AtmLoss>,
}

impl CityQuote {
    pub fn new(city: &CityConfig, amount_usdt: f64, live_rate: f64) -> Self {
        let rate = effective_rate(live_rate, city);
        CityQuote {
            city: city.display_name.clone(),
            currency: city.currency.clone(),
            amount_usdt,
            rate,
            receive: usdt_to_fiat(amount_usdt, rate),
            comparison: RateComparison::new(amount_usdt, rate),
            atm_loss: AtmLoss::estimate(amount_usdt, rate, &AtmFeeSchedule::default()),
        }
    }

    /// Quote for the USDT needed to receive `amount_fiat` in the city's currency.
    pub fn from_fiat(city: &CityConfig, amount_fiat: f64, live_rate: f64) -> Self {
        let amount_usdt = fiat_to_usdt(amount_fiat, effective_rate(live_rate, city));
        Self::new(city, amount_usdt, live_rate)
    }
}
