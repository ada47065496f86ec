//! Exchange-rate lookup seam.

use crate::expense::Currency;

/// Source of conversion rates between a submitted currency and a company
/// base currency. Implementations may call out over the network; the
/// service layer treats any failure as rate = 1 and flags the expense
/// rather than blocking creation (availability over accuracy).
pub trait RateProvider {
    fn rate(&self, from: &Currency, to: &Currency) -> anyhow::Result<f64>;
}

/// Fixed in-memory rate table, for tests and offline use.
#[derive(Debug, Default)]
pub struct FixedRates {
    rates: Vec<(Currency, Currency, f64)>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.rates.push((from, to, rate));
        self
    }
}

impl RateProvider for FixedRates {
    fn rate(&self, from: &Currency, to: &Currency) -> anyhow::Result<f64> {
        self.rates
            .iter()
            .find(|(f, t, _)| f == from && t == to)
            .map(|(_, _, rate)| *rate)
            .ok_or_else(|| anyhow::anyhow!("no rate configured for {from}->{to}"))
    }
}
