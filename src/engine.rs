use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::convert::CurrencyConverter;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::events::{AggregationEvent, EventStore};
use crate::ledger::{ExchangeRateSource, Payment, PaymentLedger, SubscriptionDirectory};
use crate::proration::{Allocation, ProrationClassifier};
use crate::store::{AggregateStore, CategorySlice, MonthlyAggregate};
use crate::types::{MonthKey, PaymentId, PaymentStatus, FALLBACK_CATEGORY};

/// the external collaborators an operation reads from
///
/// Bundled so every entry point takes one parameter instead of three; the
/// engine never writes through any of these.
pub struct Sources<'a, L, R, D> {
    pub ledger: &'a L,
    pub rates: &'a R,
    pub directory: &'a D,
}

/// outcome of a bulk recalculation
///
/// The bulk path is best-effort per payment: failures are counted and the
/// run continues, so a partially bad ledger still yields a usable report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculationReport {
    pub processed: usize,
    pub failed: usize,
}

struct EngineInner<S> {
    store: S,
    events: EventStore,
}

/// maintains the monthly aggregate store as the payment ledger mutates
///
/// All mutating operations serialize on one engine-wide mutex: two payments
/// landing in the same month must never interleave a read-recompute-write,
/// and a full recalculation holds the lock for its whole run.
pub struct AggregationEngine<S: AggregateStore> {
    config: EngineConfig,
    classifier: ProrationClassifier,
    converter: CurrencyConverter,
    inner: Mutex<EngineInner<S>>,
}

impl<S: AggregateStore> AggregationEngine<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        let converter = CurrencyConverter::new(&config);
        Self {
            config,
            classifier: ProrationClassifier::new(),
            converter,
            inner: Mutex::new(EngineInner {
                store,
                events: EventStore::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineInner<S>>> {
        self.inner.lock().map_err(|e| EngineError::LockContention {
            message: e.to_string(),
        })
    }

    /// incorporate a newly recorded payment into the aggregates
    ///
    /// A missing or non-succeeded payment is a logged no-op, not an error;
    /// the ledger write that triggered the hook has already happened.
    /// Classification and store failures propagate, leaving every month
    /// either fully recomputed or untouched.
    pub fn process_new_payment<L, R, D>(
        &self,
        payment_id: PaymentId,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let mut inner = self.lock()?;
        self.process_new_payment_locked(&mut inner, payment_id, sources, time)
    }

    fn process_new_payment_locked<L, R, D>(
        &self,
        inner: &mut EngineInner<S>,
        payment_id: PaymentId,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let payment = match sources.ledger.fetch_by_id(payment_id)? {
            Some(p) => p,
            None => {
                info!(payment_id, "payment not found, skipping aggregation");
                inner.events.emit(AggregationEvent::PaymentIgnored {
                    payment_id,
                    status: None,
                });
                return Ok(());
            }
        };
        if !payment.status.is_succeeded() {
            debug!(payment_id, status = ?payment.status, "payment not succeeded, skipping aggregation");
            inner.events.emit(AggregationEvent::PaymentIgnored {
                payment_id,
                status: Some(payment.status),
            });
            return Ok(());
        }

        let allocations = self.classifier.classify(&payment)?;
        for allocation in &allocations {
            self.upsert_month(
                inner,
                allocation.month_key,
                std::slice::from_ref(allocation),
                sources,
                time,
            )?;
        }
        Ok(())
    }

    /// react to a payment's status change or in-place edit
    pub fn handle_payment_status_transition<L, R, D>(
        &self,
        payment_id: PaymentId,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let mut inner = self.lock()?;
        inner.events.emit(AggregationEvent::StatusTransitionHandled {
            payment_id,
            old_status,
            new_status,
        });

        match (old_status.is_succeeded(), new_status.is_succeeded()) {
            // newly qualifying payment
            (false, true) => {
                self.process_new_payment_locked(&mut inner, payment_id, sources, time)
            }
            // disqualified, or edited while still succeeded
            (true, _) => {
                self.recalculate_affected_months_locked(&mut inner, payment_id, sources, time)
            }
            (false, false) => {
                debug!(payment_id, "status change between non-succeeded states, nothing to do");
                Ok(())
            }
        }
    }

    /// rebuild every month whose contributor set includes the payment
    pub fn recalculate_affected_months<L, R, D>(
        &self,
        payment_id: PaymentId,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let mut inner = self.lock()?;
        self.recalculate_affected_months_locked(&mut inner, payment_id, sources, time)
    }

    fn recalculate_affected_months_locked<L, R, D>(
        &self,
        inner: &mut EngineInner<S>,
        payment_id: PaymentId,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let affected = inner.store.months_containing(payment_id)?;
        for month_key in affected {
            self.upsert_month(inner, month_key, &[], sources, time)?;
        }
        Ok(())
    }

    /// drop every aggregate and rebuild from the full ledger
    ///
    /// Best-effort per payment: a payment that fails to classify or convert
    /// is logged, counted, and skipped, and the run continues. The old
    /// aggregates are gone once this starts, so a failed run must be
    /// retried to completion by the caller.
    pub fn recalculate_all_monthly_expenses<L, R, D>(
        &self,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<RecalculationReport>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let mut inner = self.lock()?;
        inner.events.emit(AggregationEvent::RecalculationStarted {
            timestamp: time.now(),
        });

        inner.store.delete_all()?;
        let payments = sources.ledger.fetch_all_succeeded()?;

        let mut report = RecalculationReport {
            processed: 0,
            failed: 0,
        };
        for payment in &payments {
            match self.apply_payment(&mut inner, payment, sources, time) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(payment_id = payment.id, error = %e, "skipping payment during recalculation");
                    inner.events.emit(AggregationEvent::PaymentSkipped {
                        payment_id: payment.id,
                        reason: e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        inner.events.emit(AggregationEvent::RecalculationCompleted {
            processed: report.processed,
            failed: report.failed,
            timestamp: time.now(),
        });
        Ok(report)
    }

    fn apply_payment<L, R, D>(
        &self,
        inner: &mut EngineInner<S>,
        payment: &Payment,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let allocations = self.classifier.classify(payment)?;
        for allocation in &allocations {
            self.upsert_month(
                inner,
                allocation.month_key,
                std::slice::from_ref(allocation),
                sources,
                time,
            )?;
        }
        Ok(())
    }

    /// merge new contributors into a month and recompute it from scratch
    ///
    /// The existing record's totals are never patched incrementally: the
    /// full contributor set is reloaded from the ledger and everything is
    /// recomputed, which is what makes repeated runs idempotent. Nothing is
    /// written until the recompute has fully succeeded.
    fn upsert_month<L, R, D>(
        &self,
        inner: &mut EngineInner<S>,
        month_key: MonthKey,
        new_allocations: &[Allocation],
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<()>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let existing = inner.store.get(month_key)?;

        let mut candidate_ids: BTreeSet<PaymentId> = existing
            .as_ref()
            .map(|agg| agg.contributing_payment_ids.clone())
            .unwrap_or_default();
        candidate_ids.extend(new_allocations.iter().map(|a| a.payment_id));

        let rebuilt = self.rebuild_month(month_key, &candidate_ids, sources, time)?;

        match rebuilt {
            Some(aggregate) => {
                let payment_count = aggregate.contributing_payment_ids.len();
                for currency in aggregate.amounts.keys() {
                    if inner.store.ensure_currency(currency)? {
                        inner.events.emit(AggregationEvent::CurrencyColumnAdded {
                            currency: currency.clone(),
                        });
                    }
                }
                inner.store.put(aggregate)?;
                let event = if existing.is_some() {
                    AggregationEvent::MonthUpdated {
                        month_key,
                        payment_count,
                        timestamp: time.now(),
                    }
                } else {
                    AggregationEvent::MonthCreated {
                        month_key,
                        payment_count,
                        timestamp: time.now(),
                    }
                };
                inner.events.emit(event);
            }
            None => {
                // an empty month is deleted, never kept at zero
                if existing.is_some() {
                    inner.store.delete(month_key)?;
                    inner.events.emit(AggregationEvent::MonthDeleted {
                        month_key,
                        timestamp: time.now(),
                    });
                }
            }
        }
        Ok(())
    }

    /// recompute one month's record from its candidate contributors
    ///
    /// Pure reads only; returns `None` when no candidate still qualifies.
    fn rebuild_month<L, R, D>(
        &self,
        month_key: MonthKey,
        candidate_ids: &BTreeSet<PaymentId>,
        sources: &Sources<'_, L, R, D>,
        time: &SafeTimeProvider,
    ) -> Result<Option<MonthlyAggregate>>
    where
        L: PaymentLedger,
        R: ExchangeRateSource,
        D: SubscriptionDirectory,
    {
        let payments = sources.ledger.fetch_by_ids(candidate_ids)?;

        // a contributor must still be succeeded and still cover this month
        let mut contributors: Vec<(Payment, Allocation)> = Vec::new();
        for payment in payments {
            if !payment.status.is_succeeded() {
                continue;
            }
            if let Some(allocation) = self.classifier.allocation_for(&payment, month_key)? {
                contributors.push((payment, allocation));
            }
        }

        if contributors.is_empty() {
            return Ok(None);
        }

        // supported currencies are derived fresh from the rate table on
        // every rebuild; the hub itself is always included
        let mut currencies: BTreeSet<String> = sources
            .rates
            .supported_currencies(&self.config.hub_currency)?
            .into_iter()
            .collect();
        currencies.insert(self.config.hub_currency.clone());

        let mut aggregate = MonthlyAggregate::new(month_key, time.now());
        for (payment, allocation) in &contributors {
            aggregate.contributing_payment_ids.insert(payment.id);

            let category = sources
                .directory
                .category_of(payment.subscription_id)?
                .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
            let slice = aggregate
                .category_breakdown
                .entry(category)
                .or_insert_with(CategorySlice::default);
            slice.payment_ids.insert(payment.id);

            for currency in &currencies {
                let converted = self.converter.convert(
                    sources.rates,
                    allocation.amount,
                    &allocation.currency,
                    currency,
                )?;
                *aggregate
                    .amounts
                    .entry(currency.clone())
                    .or_insert(Money::ZERO) += converted;
                *slice
                    .amounts
                    .entry(currency.clone())
                    .or_insert(Money::ZERO) += converted;
            }
        }
        Ok(Some(aggregate))
    }

    /// aggregates with start ≤ month ≤ end, ascending, at report scale
    pub fn get_monthly_expenses(
        &self,
        start_year: i32,
        start_month: u32,
        end_year: i32,
        end_month: u32,
    ) -> Result<Vec<MonthlyAggregate>> {
        let start = MonthKey::new(start_year, start_month).ok_or(EngineError::InvalidMonth {
            year: start_year,
            month: start_month,
        })?;
        let end = MonthKey::new(end_year, end_month).ok_or(EngineError::InvalidMonth {
            year: end_year,
            month: end_month,
        })?;

        let inner = self.lock()?;
        let records = inner.store.range(start, end)?;
        Ok(records
            .into_iter()
            .map(|agg| agg.rounded(self.config.report_scale))
            .collect())
    }

    /// drain the audit events emitted since the last drain
    pub fn take_events(&self) -> Result<Vec<AggregationEvent>> {
        let mut inner = self.lock()?;
        Ok(inner.events.take_events())
    }
}
