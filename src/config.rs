use serde::{Deserialize, Serialize};

/// behavior when no rate path exists for a currency pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingRatePolicy {
    /// substitute a 1.0 rate and log a warning (lossy, current default)
    AssumeUnity,
    /// refuse the conversion with UnsupportedCurrencyPair
    Fail,
}

/// engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// currency all stored rates are relative to
    pub hub_currency: String,
    /// how to treat currency pairs with no rate path
    pub missing_rate_policy: MissingRatePolicy,
    /// decimal places applied to amounts at read time
    pub report_scale: u32,
}

impl EngineConfig {
    pub fn new(hub_currency: impl Into<String>) -> Self {
        Self {
            hub_currency: hub_currency.into(),
            missing_rate_policy: MissingRatePolicy::AssumeUnity,
            report_scale: 2,
        }
    }

    /// fail hard on unresolvable currency pairs instead of assuming 1.0
    pub fn with_strict_rates(mut self) -> Self {
        self.missing_rate_policy = MissingRatePolicy::Fail;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new("USD")
    }
}
