pub mod config;
pub mod convert;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod proration;
pub mod store;
pub mod types;

// re-export key types
pub use config::{EngineConfig, MissingRatePolicy};
pub use convert::CurrencyConverter;
pub use decimal::{Money, Rate};
pub use engine::{AggregationEngine, RecalculationReport, Sources};
pub use errors::{EngineError, Result};
pub use events::{AggregationEvent, EventStore};
pub use ledger::{
    ExchangeRateSource, InMemoryDirectory, InMemoryLedger, InMemoryRates, Payment, PaymentLedger,
    SubscriptionDirectory,
};
pub use proration::{Allocation, ProrationClassifier};
pub use store::{
    AggregateRow, AggregateStore, CategorySlice, InMemoryAggregateStore, MonthlyAggregate,
};
pub use types::{
    BillingCycle, Category, MonthKey, PaymentId, PaymentStatus, SubscriptionId, FALLBACK_CATEGORY,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
