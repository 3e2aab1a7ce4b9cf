use chrono::Datelike;

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::ledger::Payment;
use crate::types::{BillingCycle, MonthKey, PaymentId};

/// a single payment's share of one calendar month
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub month_key: MonthKey,
    pub amount: Money,
    pub currency: String,
    pub payment_id: PaymentId,
}

/// derives a payment's effective billing cycle from its billing-period span
/// and splits the amount across the calendar months it covers
///
/// The cycle comes from the payment's own dates only. A nominal cycle stored
/// on the subscription is ignored, so allocation stays correct when that
/// metadata is stale.
pub struct ProrationClassifier;

impl ProrationClassifier {
    pub fn new() -> Self {
        Self
    }

    /// whole months between period start and end
    fn span_months(&self, payment: &Payment) -> i32 {
        let start = payment.billing_period_start;
        let end = payment.billing_period_end;
        (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32)
    }

    /// infer the effective cycle; end before start is rejected
    pub fn infer_cycle(&self, payment: &Payment) -> Result<BillingCycle> {
        if payment.billing_period_end < payment.billing_period_start {
            return Err(EngineError::InvalidBillingPeriod {
                start: payment.billing_period_start,
                end: payment.billing_period_end,
            });
        }
        Ok(BillingCycle::from_span_months(self.span_months(payment)))
    }

    /// compute the per-month allocations for a payment
    ///
    /// Monthly payments land entirely in the month of the payment date.
    /// Quarterly and yearly payments spread across consecutive months
    /// starting at the month of the billing-period start. Each share is the
    /// amount divided evenly, with no remainder redistribution.
    pub fn classify(&self, payment: &Payment) -> Result<Vec<Allocation>> {
        let cycle = self.infer_cycle(payment)?;
        let months = cycle.distribution_months();
        let per_month = payment.amount_paid.split_across(months);

        let first = match cycle {
            BillingCycle::Monthly => MonthKey::from_date(payment.payment_date),
            BillingCycle::Quarterly | BillingCycle::Yearly => {
                MonthKey::from_date(payment.billing_period_start)
            }
        };

        let mut allocations = Vec::with_capacity(months as usize);
        let mut month_key = first;
        for _ in 0..months {
            allocations.push(Allocation {
                month_key,
                amount: per_month,
                currency: payment.currency.clone(),
                payment_id: payment.id,
            });
            month_key = month_key.next();
        }
        Ok(allocations)
    }

    /// the allocation for one specific month, if the payment covers it
    pub fn allocation_for(&self, payment: &Payment, month_key: MonthKey) -> Result<Option<Allocation>> {
        Ok(self
            .classify(payment)?
            .into_iter()
            .find(|a| a.month_key == month_key))
    }
}

impl Default for ProrationClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use chrono::NaiveDate;

    fn payment(amount: &str, paid: &str, start: &str, end: &str) -> Payment {
        Payment {
            id: 1,
            subscription_id: 10,
            payment_date: paid.parse::<NaiveDate>().unwrap(),
            amount_paid: Money::from_str_exact(amount).unwrap(),
            currency: "USD".to_string(),
            billing_period_start: start.parse().unwrap(),
            billing_period_end: end.parse().unwrap(),
            status: PaymentStatus::Succeeded,
        }
    }

    #[test]
    fn test_monthly_allocation_targets_payment_month() {
        let classifier = ProrationClassifier::new();
        let p = payment("9.99", "2025-01-15", "2025-01-10", "2025-02-10");

        let allocations = classifier.classify(&p).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].month_key.as_key(), "202501");
        assert_eq!(allocations[0].amount, Money::from_str_exact("9.99").unwrap());
    }

    #[test]
    fn test_monthly_allocation_follows_payment_date_not_period_start() {
        let classifier = ProrationClassifier::new();
        // period starts in December, payment made in January
        let p = payment("5.00", "2025-01-02", "2024-12-28", "2025-01-28");

        let allocations = classifier.classify(&p).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].month_key.as_key(), "202501");
    }

    #[test]
    fn test_quarterly_allocation() {
        let classifier = ProrationClassifier::new();
        let p = payment("30.00", "2025-01-01", "2025-01-01", "2025-04-01");

        let allocations = classifier.classify(&p).unwrap();
        let keys: Vec<String> = allocations.iter().map(|a| a.month_key.as_key()).collect();
        assert_eq!(keys, vec!["202501", "202502", "202503"]);
        for a in &allocations {
            assert_eq!(a.amount, Money::from_major(10));
        }
    }

    #[test]
    fn test_quarterly_starts_at_period_start_month() {
        let classifier = ProrationClassifier::new();
        // paid in March for a quarter starting in April
        let p = payment("30.00", "2025-03-25", "2025-04-01", "2025-07-01");

        let allocations = classifier.classify(&p).unwrap();
        let keys: Vec<String> = allocations.iter().map(|a| a.month_key.as_key()).collect();
        assert_eq!(keys, vec!["202504", "202505", "202506"]);
    }

    #[test]
    fn test_yearly_allocation() {
        let classifier = ProrationClassifier::new();
        let p = payment("120.00", "2025-01-01", "2025-01-01", "2026-01-01");

        let allocations = classifier.classify(&p).unwrap();
        assert_eq!(allocations.len(), 12);
        assert_eq!(allocations[0].month_key.as_key(), "202501");
        assert_eq!(allocations[11].month_key.as_key(), "202512");
        for a in &allocations {
            assert_eq!(a.amount, Money::from_major(10));
        }
    }

    #[test]
    fn test_yearly_allocation_wraps_year_boundary() {
        let classifier = ProrationClassifier::new();
        let p = payment("120.00", "2024-07-01", "2024-07-01", "2025-07-01");

        let allocations = classifier.classify(&p).unwrap();
        assert_eq!(allocations[0].month_key.as_key(), "202407");
        assert_eq!(allocations[5].month_key.as_key(), "202412");
        assert_eq!(allocations[6].month_key.as_key(), "202501");
        assert_eq!(allocations[11].month_key.as_key(), "202506");
    }

    #[test]
    fn test_invalid_billing_period_rejected() {
        let classifier = ProrationClassifier::new();
        let p = payment("9.99", "2025-01-15", "2025-02-10", "2025-01-10");

        let err = classifier.classify(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidBillingPeriod { .. }));
    }

    #[test]
    fn test_cycle_boundaries() {
        let classifier = ProrationClassifier::new();

        let same_month = payment("10", "2025-01-05", "2025-01-01", "2025-01-31");
        assert_eq!(classifier.infer_cycle(&same_month).unwrap(), BillingCycle::Monthly);

        let two_months = payment("10", "2025-01-05", "2025-01-01", "2025-03-01");
        assert_eq!(classifier.infer_cycle(&two_months).unwrap(), BillingCycle::Quarterly);

        let four_months = payment("10", "2025-01-05", "2025-01-01", "2025-05-01");
        assert_eq!(classifier.infer_cycle(&four_months).unwrap(), BillingCycle::Yearly);
    }

    #[test]
    fn test_allocation_for_specific_month() {
        let classifier = ProrationClassifier::new();
        let p = payment("30.00", "2025-01-01", "2025-01-01", "2025-04-01");

        let feb = MonthKey::new(2025, 2).unwrap();
        let hit = classifier.allocation_for(&p, feb).unwrap();
        assert_eq!(hit.unwrap().amount, Money::from_major(10));

        let may = MonthKey::new(2025, 5).unwrap();
        assert!(classifier.allocation_for(&p, may).unwrap().is_none());
    }
}
