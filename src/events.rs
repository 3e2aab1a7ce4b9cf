use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MonthKey, PaymentId, PaymentStatus};

/// audit events emitted while aggregates are maintained
///
/// Callers can drain these after an operation to see what maintenance
/// happened without re-reading the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregationEvent {
    // month lifecycle
    MonthCreated {
        month_key: MonthKey,
        payment_count: usize,
        timestamp: DateTime<Utc>,
    },
    MonthUpdated {
        month_key: MonthKey,
        payment_count: usize,
        timestamp: DateTime<Utc>,
    },
    MonthDeleted {
        month_key: MonthKey,
        timestamp: DateTime<Utc>,
    },

    // payment handling
    PaymentIgnored {
        payment_id: PaymentId,
        status: Option<PaymentStatus>,
    },
    StatusTransitionHandled {
        payment_id: PaymentId,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },

    // bulk recalculation
    RecalculationStarted {
        timestamp: DateTime<Utc>,
    },
    PaymentSkipped {
        payment_id: PaymentId,
        reason: String,
    },
    RecalculationCompleted {
        processed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    // schema evolution
    CurrencyColumnAdded {
        currency: String,
    },
}

/// in-memory event store
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<AggregationEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: AggregationEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<AggregationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[AggregationEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_events_drains() {
        let mut store = EventStore::new();
        store.emit(AggregationEvent::CurrencyColumnAdded {
            currency: "EUR".to_string(),
        });
        assert_eq!(store.events().len(), 1);

        let drained = store.take_events();
        assert_eq!(drained.len(), 1);
        assert!(store.events().is_empty());
    }
}
