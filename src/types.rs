use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// stable identifier of a payment event, owned by the external ledger
pub type PaymentId = i64;

/// weak reference to the subscription a payment belongs to
pub type SubscriptionId = i64;

/// category label used in aggregate breakdowns
pub type Category = String;

/// category assigned when a subscription is missing or unmapped
pub const FALLBACK_CATEGORY: &str = "other";

/// payment status as recorded in the ledger
///
/// Only `Succeeded` payments contribute to aggregates; every other status
/// disqualifies the payment without deleting it from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Pending,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }
}

/// effective billing cycle, derived from a payment's own billing-period span
///
/// Never read from stored subscription metadata: the dates on the payment
/// are the only input, which keeps allocation correct when the nominal
/// cycle recorded elsewhere has gone stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    /// infer the cycle from whole months between period start and end
    pub fn from_span_months(span: i32) -> Self {
        if span <= 1 {
            BillingCycle::Monthly
        } else if span <= 3 {
            BillingCycle::Quarterly
        } else {
            BillingCycle::Yearly
        }
    }

    /// number of calendar months the payment is spread across
    pub fn distribution_months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Quarterly => 3,
            BillingCycle::Yearly => 12,
        }
    }
}

/// one calendar month, keyed as a zero-padded "YYYYMM" string
///
/// Field order makes the derived `Ord` chronological, matching the
/// lexicographic order of the string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// create from year and 1-based month; month outside 1..=12 is rejected
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(MonthKey { year, month })
        } else {
            None
        }
    }

    /// month containing the given date
    pub fn from_date(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// the following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            MonthKey {
                year: self.year + 1,
                month: 1,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// zero-padded "YYYYMM" key
    pub fn as_key(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("month key must be 6 digits, got {:?}", s));
        }
        let year: i32 = s[..4]
            .parse()
            .map_err(|_| format!("invalid year in month key {:?}", s))?;
        let month: u32 = s[4..]
            .parse()
            .map_err(|_| format!("invalid month in month key {:?}", s))?;
        MonthKey::new(year, month).ok_or_else(|| format!("month out of range in key {:?}", s))
    }
}
