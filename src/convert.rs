use tracing::warn;

use crate::config::{EngineConfig, MissingRatePolicy};
use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::ledger::ExchangeRateSource;

/// converts amounts between currencies by routing through the hub currency
///
/// The rate table only stores hub-relative rates; every other pair is
/// derived from the two hub legs. What happens when a leg is missing is
/// policy: assume a 1.0 rate (lossy, the default) or refuse the pair.
pub struct CurrencyConverter {
    hub: String,
    policy: MissingRatePolicy,
}

impl CurrencyConverter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            hub: config.hub_currency.clone(),
            policy: config.missing_rate_policy,
        }
    }

    /// stored hub rate, treating zero or negative entries as absent
    fn stored_rate(&self, rates: &impl ExchangeRateSource, currency: &str) -> Result<Option<Rate>> {
        Ok(rates
            .hub_rate(&self.hub, currency)?
            .filter(|r| r.is_valid()))
    }

    fn fallback(&self, from: &str, to: &str) -> Result<Rate> {
        match self.policy {
            MissingRatePolicy::AssumeUnity => {
                warn!(from, to, "no rate path, assuming 1.0");
                Ok(Rate::ONE)
            }
            MissingRatePolicy::Fail => Err(EngineError::UnsupportedCurrencyPair {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// effective rate from one currency to another
    pub fn rate(&self, rates: &impl ExchangeRateSource, from: &str, to: &str) -> Result<Rate> {
        if from == to {
            return Ok(Rate::ONE);
        }
        if from == self.hub {
            return match self.stored_rate(rates, to)? {
                Some(rate) => Ok(rate),
                None => self.fallback(from, to),
            };
        }
        if to == self.hub {
            return match self.stored_rate(rates, from)? {
                Some(rate) => Ok(rate.invert()),
                None => self.fallback(from, to),
            };
        }
        // neither side is the hub: chain the inbound and outbound legs,
        // falling back for the whole pair if either leg is missing
        match (self.stored_rate(rates, from)?, self.stored_rate(rates, to)?) {
            (Some(inbound), Some(outbound)) => Ok(inbound.invert().chain(outbound)),
            _ => self.fallback(from, to),
        }
    }

    /// convert an amount between currencies
    pub fn convert(
        &self,
        rates: &impl ExchangeRateSource,
        amount: Money,
        from: &str,
        to: &str,
    ) -> Result<Money> {
        Ok(amount.convert(self.rate(rates, from, to)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryRates;
    use rust_decimal_macros::dec;

    fn rates() -> InMemoryRates {
        let mut table = InMemoryRates::new();
        table.set_rate("USD", "EUR", Rate::from_decimal(dec!(0.92)));
        table.set_rate("USD", "GBP", Rate::from_decimal(dec!(0.79)));
        table.set_rate("USD", "JPY", Rate::from_decimal(dec!(150.0)));
        table
    }

    fn converter() -> CurrencyConverter {
        CurrencyConverter::new(&EngineConfig::new("USD"))
    }

    #[test]
    fn test_identity_rate() {
        let c = converter();
        assert_eq!(c.rate(&rates(), "EUR", "EUR").unwrap(), Rate::ONE);
    }

    #[test]
    fn test_hub_outbound() {
        let c = converter();
        let amount = c
            .convert(&rates(), Money::from_major(100), "USD", "EUR")
            .unwrap();
        assert_eq!(amount.round_dp(2).to_string(), "92.00");
    }

    #[test]
    fn test_hub_inbound_uses_reciprocal() {
        let c = converter();
        let amount = c
            .convert(&rates(), Money::from_major(92), "EUR", "USD")
            .unwrap();
        assert_eq!(amount.round_dp(2).to_string(), "100.00");
    }

    #[test]
    fn test_cross_rate_routes_through_hub() {
        let c = converter();
        let amount = c
            .convert(&rates(), Money::from_major(100), "EUR", "GBP")
            .unwrap();
        // 100 / 0.92 * 0.79
        assert_eq!(amount.round_dp(2).to_string(), "85.87");
    }

    #[test]
    fn test_missing_rate_assumes_unity_by_default() {
        let c = converter();
        let amount = c
            .convert(&rates(), Money::from_major(100), "CHF", "EUR")
            .unwrap();
        assert_eq!(amount, Money::from_major(100));
    }

    #[test]
    fn test_missing_rate_fails_under_strict_policy() {
        let c = CurrencyConverter::new(&EngineConfig::new("USD").with_strict_rates());
        let err = c
            .convert(&rates(), Money::from_major(100), "CHF", "EUR")
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedCurrencyPair { .. }));
    }

    #[test]
    fn test_invalid_stored_rate_treated_as_missing() {
        let mut table = rates();
        table.set_rate("USD", "XXX", Rate::from_decimal(dec!(0)));
        let c = converter();
        assert_eq!(c.rate(&table, "USD", "XXX").unwrap(), Rate::ONE);
    }

    #[test]
    fn test_conversion_transitivity() {
        let c = converter();
        let table = rates();
        let x = Money::from_major(250);

        let via = c
            .convert(
                &table,
                c.convert(&table, x, "EUR", "GBP").unwrap(),
                "GBP",
                "JPY",
            )
            .unwrap();
        let direct = c.convert(&table, x, "EUR", "JPY").unwrap();

        let diff = (via - direct).abs();
        assert!(diff < Money::from_str_exact("0.01").unwrap());
    }

    #[test]
    fn test_conversion_inverse_consistency() {
        let c = converter();
        let table = rates();
        let x = Money::from_str_exact("123.45").unwrap();

        let round_trip = c
            .convert(
                &table,
                c.convert(&table, x, "USD", "EUR").unwrap(),
                "EUR",
                "USD",
            )
            .unwrap();

        let diff = (round_trip - x).abs();
        assert!(diff < Money::from_str_exact("0.01").unwrap());
    }
}
