use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{MonthKey, PaymentId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("payment not found: {payment_id}")]
    PaymentNotFound {
        payment_id: PaymentId,
    },

    #[error("no aggregate for month: {month_key}")]
    MonthNotFound {
        month_key: MonthKey,
    },

    #[error("invalid billing period: end {end} precedes start {start}")]
    InvalidBillingPeriod {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("no rate path from {from} to {to}")]
    UnsupportedCurrencyPair {
        from: String,
        to: String,
    },

    #[error("invalid month: year {year}, month {month}")]
    InvalidMonth {
        year: i32,
        month: u32,
    },

    #[error("exclusive section unavailable: {message}")]
    LockContention {
        message: String,
    },

    #[error("persistence failure: {message}")]
    Persistence {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
