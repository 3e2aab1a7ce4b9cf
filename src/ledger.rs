use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::types::{Category, PaymentId, PaymentStatus, SubscriptionId};

/// one payment event from the ledger
///
/// Read-only to the engine; the surrounding application writes these and
/// then invokes the engine's hooks. The billing period is the date range
/// the payment pays for, which may span several calendar months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub payment_date: NaiveDate,
    pub amount_paid: Money,
    pub currency: String,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub status: PaymentStatus,
}

/// source-of-truth payment table
pub trait PaymentLedger {
    /// fetch a single payment by id
    fn fetch_by_id(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// fetch every succeeded payment, ordered by payment date then id
    fn fetch_all_succeeded(&self) -> Result<Vec<Payment>>;

    /// fetch the payments for a set of ids, skipping ids that no longer exist
    fn fetch_by_ids(&self, ids: &BTreeSet<PaymentId>) -> Result<Vec<Payment>>;
}

/// hub-relative exchange rate table, refreshed by an external scheduler
pub trait ExchangeRateSource {
    /// rate for (hub → currency), if stored
    fn hub_rate(&self, hub: &str, currency: &str) -> Result<Option<Rate>>;

    /// distinct target currencies stored for the hub
    ///
    /// This set is dynamic and must be re-read per aggregation operation,
    /// never cached across operations.
    fn supported_currencies(&self, hub: &str) -> Result<Vec<String>>;
}

/// subscription id → category mapping, used only for breakdowns
pub trait SubscriptionDirectory {
    fn category_of(&self, id: SubscriptionId) -> Result<Option<Category>>;
}

/// in-memory payment ledger for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    payments: BTreeMap<PaymentId, Payment>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }

    pub fn remove(&mut self, id: PaymentId) -> Option<Payment> {
        self.payments.remove(&id)
    }

    /// update a payment's status in place, returning the old status
    pub fn set_status(&mut self, id: PaymentId, status: PaymentStatus) -> Option<PaymentStatus> {
        self.payments.get_mut(&id).map(|p| {
            let old = p.status;
            p.status = status;
            old
        })
    }

    /// replace a payment record wholesale (operator correction)
    pub fn update(&mut self, payment: Payment) -> Option<Payment> {
        self.payments.insert(payment.id, payment)
    }
}

impl PaymentLedger for InMemoryLedger {
    fn fetch_by_id(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.get(&id).cloned())
    }

    fn fetch_all_succeeded(&self) -> Result<Vec<Payment>> {
        let mut succeeded: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| p.status.is_succeeded())
            .cloned()
            .collect();
        succeeded.sort_by(|a, b| {
            a.payment_date
                .cmp(&b.payment_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(succeeded)
    }

    fn fetch_by_ids(&self, ids: &BTreeSet<PaymentId>) -> Result<Vec<Payment>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.payments.get(id).cloned())
            .collect())
    }
}

/// in-memory exchange rate table
#[derive(Debug, Default)]
pub struct InMemoryRates {
    rates: BTreeMap<(String, String), Rate>,
}

impl InMemoryRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, from: &str, to: &str, rate: Rate) {
        self.rates.insert((from.to_string(), to.to_string()), rate);
    }

    pub fn remove_rate(&mut self, from: &str, to: &str) {
        self.rates.remove(&(from.to_string(), to.to_string()));
    }
}

impl ExchangeRateSource for InMemoryRates {
    fn hub_rate(&self, hub: &str, currency: &str) -> Result<Option<Rate>> {
        Ok(self
            .rates
            .get(&(hub.to_string(), currency.to_string()))
            .copied())
    }

    fn supported_currencies(&self, hub: &str) -> Result<Vec<String>> {
        Ok(self
            .rates
            .keys()
            .filter(|(from, _)| from == hub)
            .map(|(_, to)| to.clone())
            .collect())
    }
}

/// in-memory subscription directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    categories: BTreeMap<SubscriptionId, Category>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_category(&mut self, id: SubscriptionId, category: impl Into<Category>) {
        self.categories.insert(id, category.into());
    }
}

impl SubscriptionDirectory for InMemoryDirectory {
    fn category_of(&self, id: SubscriptionId) -> Result<Option<Category>> {
        Ok(self.categories.get(&id).cloned())
    }
}
