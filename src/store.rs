use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::types::{Category, MonthKey, PaymentId};

/// per-category slice of a month's aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CategorySlice {
    pub payment_ids: BTreeSet<PaymentId>,
    pub amounts: BTreeMap<String, Money>,
}

/// denormalized per-month summary record
///
/// Owned entirely by the engine. A month with no contributing payments is
/// deleted, never kept at zero, so existence of a record implies at least
/// one contributor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub month_key: MonthKey,
    pub contributing_payment_ids: BTreeSet<PaymentId>,
    /// total per supported currency
    pub amounts: BTreeMap<String, Money>,
    pub category_breakdown: BTreeMap<Category, CategorySlice>,
    pub updated_at: DateTime<Utc>,
}

impl MonthlyAggregate {
    pub fn new(month_key: MonthKey, updated_at: DateTime<Utc>) -> Self {
        Self {
            month_key,
            contributing_payment_ids: BTreeSet::new(),
            amounts: BTreeMap::new(),
            category_breakdown: BTreeMap::new(),
            updated_at,
        }
    }

    pub fn year(&self) -> i32 {
        self.month_key.year()
    }

    pub fn month(&self) -> u32 {
        self.month_key.month()
    }

    pub fn is_empty(&self) -> bool {
        self.contributing_payment_ids.is_empty()
    }

    /// copy with every amount normalized to report scale
    pub fn rounded(&self, scale: u32) -> Self {
        let mut copy = self.clone();
        for amount in copy.amounts.values_mut() {
            *amount = amount.round_dp(scale);
        }
        for slice in copy.category_breakdown.values_mut() {
            for amount in slice.amounts.values_mut() {
                *amount = amount.round_dp(scale);
            }
        }
        copy
    }
}

/// persisted shape of an aggregate record
///
/// The id set and breakdown are serialized blobs; amounts sit in one
/// numeric field per supported currency so reporting queries stay flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub month_key: String,
    pub year: i32,
    pub month: u32,
    pub contributing_payment_ids: String,
    pub category_breakdown: String,
    pub amounts: BTreeMap<String, Money>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRow {
    /// materialize an aggregate into its persisted shape
    pub fn from_aggregate(aggregate: &MonthlyAggregate) -> Result<Self> {
        let ids = serde_json::to_string(&aggregate.contributing_payment_ids)
            .map_err(|e| EngineError::Persistence {
                message: format!("serializing payment ids: {e}"),
            })?;
        let breakdown = serde_json::to_string(&aggregate.category_breakdown)
            .map_err(|e| EngineError::Persistence {
                message: format!("serializing category breakdown: {e}"),
            })?;
        Ok(Self {
            month_key: aggregate.month_key.as_key(),
            year: aggregate.year(),
            month: aggregate.month(),
            contributing_payment_ids: ids,
            category_breakdown: breakdown,
            amounts: aggregate.amounts.clone(),
            updated_at: aggregate.updated_at,
        })
    }

    /// rebuild the aggregate from its persisted shape
    pub fn into_aggregate(self) -> Result<MonthlyAggregate> {
        let month_key: MonthKey = self
            .month_key
            .parse()
            .map_err(|e| EngineError::Persistence { message: e })?;
        let contributing_payment_ids: BTreeSet<PaymentId> =
            serde_json::from_str(&self.contributing_payment_ids).map_err(|e| {
                EngineError::Persistence {
                    message: format!("parsing payment ids: {e}"),
                }
            })?;
        let category_breakdown: BTreeMap<Category, CategorySlice> =
            serde_json::from_str(&self.category_breakdown).map_err(|e| {
                EngineError::Persistence {
                    message: format!("parsing category breakdown: {e}"),
                }
            })?;
        Ok(MonthlyAggregate {
            month_key,
            contributing_payment_ids,
            amounts: self.amounts,
            category_breakdown,
            updated_at: self.updated_at,
        })
    }
}

/// persistence seam for aggregate records
pub trait AggregateStore {
    fn get(&self, month_key: MonthKey) -> Result<Option<MonthlyAggregate>>;

    fn put(&mut self, aggregate: MonthlyAggregate) -> Result<()>;

    /// delete one month; true if a record existed
    fn delete(&mut self, month_key: MonthKey) -> Result<bool>;

    fn delete_all(&mut self) -> Result<()>;

    /// months whose contributor set includes the payment
    fn months_containing(&self, payment_id: PaymentId) -> Result<Vec<MonthKey>>;

    /// records with start ≤ month_key ≤ end, ascending
    fn range(&self, start: MonthKey, end: MonthKey) -> Result<Vec<MonthlyAggregate>>;

    /// add a per-currency field to the schema; true if it was added,
    /// false if it already existed (never an error)
    fn ensure_currency(&mut self, currency: &str) -> Result<bool>;
}

/// in-memory aggregate store
///
/// Rows are kept in materialized form, keyed by the string month key, so
/// the serialization boundary is exercised the same way a table-backed
/// store would exercise it.
#[derive(Debug, Default)]
pub struct InMemoryAggregateStore {
    rows: BTreeMap<String, AggregateRow>,
    currency_columns: BTreeSet<String>,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// currently materialized currency columns
    pub fn currency_columns(&self) -> &BTreeSet<String> {
        &self.currency_columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl AggregateStore for InMemoryAggregateStore {
    fn get(&self, month_key: MonthKey) -> Result<Option<MonthlyAggregate>> {
        match self.rows.get(&month_key.as_key()) {
            Some(row) => Ok(Some(row.clone().into_aggregate()?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, aggregate: MonthlyAggregate) -> Result<()> {
        let mut row = AggregateRow::from_aggregate(&aggregate)?;
        // materialize a field for every known column, zero when absent
        for currency in &self.currency_columns {
            row.amounts.entry(currency.clone()).or_insert(Money::ZERO);
        }
        for currency in row.amounts.keys() {
            self.currency_columns.insert(currency.clone());
        }
        self.rows.insert(row.month_key.clone(), row);
        Ok(())
    }

    fn delete(&mut self, month_key: MonthKey) -> Result<bool> {
        Ok(self.rows.remove(&month_key.as_key()).is_some())
    }

    fn delete_all(&mut self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }

    fn months_containing(&self, payment_id: PaymentId) -> Result<Vec<MonthKey>> {
        let mut months = Vec::new();
        for row in self.rows.values() {
            let ids: BTreeSet<PaymentId> =
                serde_json::from_str(&row.contributing_payment_ids).map_err(|e| {
                    EngineError::Persistence {
                        message: format!("parsing payment ids: {e}"),
                    }
                })?;
            if ids.contains(&payment_id) {
                months.push(row.month_key.parse().map_err(|e| EngineError::Persistence {
                    message: e,
                })?);
            }
        }
        Ok(months)
    }

    fn range(&self, start: MonthKey, end: MonthKey) -> Result<Vec<MonthlyAggregate>> {
        self.rows
            .range(start.as_key()..=end.as_key())
            .map(|(_, row)| row.clone().into_aggregate())
            .collect()
    }

    fn ensure_currency(&mut self, currency: &str) -> Result<bool> {
        if self.currency_columns.contains(currency) {
            return Ok(false);
        }
        self.currency_columns.insert(currency.to_string());
        for row in self.rows.values_mut() {
            row.amounts.entry(currency.to_string()).or_insert(Money::ZERO);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn month(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    fn aggregate(key: MonthKey, ids: &[PaymentId], usd: &str) -> MonthlyAggregate {
        let mut agg = MonthlyAggregate::new(key, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        agg.contributing_payment_ids = ids.iter().copied().collect();
        agg.amounts
            .insert("USD".to_string(), Money::from_str_exact(usd).unwrap());
        agg
    }

    #[test]
    fn test_row_round_trip() {
        let mut agg = aggregate(month(2025, 1), &[1, 2], "19.98");
        let mut slice = CategorySlice::default();
        slice.payment_ids.insert(1);
        slice
            .amounts
            .insert("USD".to_string(), Money::from_str_exact("9.99").unwrap());
        agg.category_breakdown.insert("streaming".to_string(), slice);

        let row = AggregateRow::from_aggregate(&agg).unwrap();
        assert_eq!(row.month_key, "202501");
        assert_eq!(row.year, 2025);
        assert_eq!(row.month, 1);

        let back = row.into_aggregate().unwrap();
        assert_eq!(back, agg);
    }

    #[test]
    fn test_ensure_currency_is_idempotent() {
        let mut store = InMemoryAggregateStore::new();
        store.put(aggregate(month(2025, 1), &[1], "9.99")).unwrap();

        assert!(store.ensure_currency("EUR").unwrap());
        assert!(!store.ensure_currency("EUR").unwrap());
        assert!(store.currency_columns().contains("EUR"));

        let agg = store.get(month(2025, 1)).unwrap().unwrap();
        assert_eq!(agg.amounts.get("EUR"), Some(&Money::ZERO));
        // the existing column is untouched
        assert_eq!(
            agg.amounts.get("USD"),
            Some(&Money::from_str_exact("9.99").unwrap())
        );
    }

    #[test]
    fn test_put_backfills_known_columns() {
        let mut store = InMemoryAggregateStore::new();
        store.ensure_currency("EUR").unwrap();
        store.put(aggregate(month(2025, 3), &[7], "5.00")).unwrap();

        let agg = store.get(month(2025, 3)).unwrap().unwrap();
        assert_eq!(agg.amounts.get("EUR"), Some(&Money::ZERO));
    }

    #[test]
    fn test_range_is_inclusive_and_ascending() {
        let mut store = InMemoryAggregateStore::new();
        for m in [month(2024, 12), month(2025, 1), month(2025, 6), month(2025, 12), month(2026, 1)] {
            store.put(aggregate(m, &[1], "1.00")).unwrap();
        }

        let found = store.range(month(2025, 1), month(2025, 12)).unwrap();
        let keys: Vec<String> = found.iter().map(|a| a.month_key.as_key()).collect();
        assert_eq!(keys, vec!["202501", "202506", "202512"]);
    }

    #[test]
    fn test_months_containing() {
        let mut store = InMemoryAggregateStore::new();
        store.put(aggregate(month(2025, 1), &[1, 2], "2.00")).unwrap();
        store.put(aggregate(month(2025, 2), &[2], "1.00")).unwrap();
        store.put(aggregate(month(2025, 3), &[3], "1.00")).unwrap();

        let months = store.months_containing(2).unwrap();
        assert_eq!(months, vec![month(2025, 1), month(2025, 2)]);
    }

    #[test]
    fn test_delete_semantics() {
        let mut store = InMemoryAggregateStore::new();
        store.put(aggregate(month(2025, 1), &[1], "1.00")).unwrap();

        assert!(store.delete(month(2025, 1)).unwrap());
        assert!(!store.delete(month(2025, 1)).unwrap());
        assert!(store.get(month(2025, 1)).unwrap().is_none());
    }
}
