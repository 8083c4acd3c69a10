//! Test stores: `OrderStore` implementations that fail on demand.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderhook_core::error::DomainError;
use orderhook_core::order::{Order, OrderUpdate, UpsertOutcome};
use orderhook_core::repository::OrderStore;
use orderhook_store::InMemoryOrderStore;

/// An order store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingOrderStore {
    upserts: AtomicU32,
}

impl FailingOrderStore {
    /// Number of upserts attempted so far.
    #[must_use]
    pub fn upsert_attempts(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FailingOrderStore {
    async fn get(&self, _order_id: &str) -> Result<Option<Order>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn upsert(
        &self,
        _update: &OrderUpdate,
        _now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DomainError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn prune_deliveries(&self, _processed_before: DateTime<Utc>) -> Result<u64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// An order store whose first `failures` upserts fail with an infrastructure
/// error; later calls go to an in-memory store.
#[derive(Debug)]
pub struct FlakyOrderStore {
    remaining_failures: AtomicU32,
    upserts: AtomicU32,
    inner: InMemoryOrderStore,
}

impl FlakyOrderStore {
    /// Creates a store that fails `failures` upserts before recovering.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            upserts: AtomicU32::new(0),
            inner: InMemoryOrderStore::new(),
        }
    }

    /// Number of upserts attempted so far, failed ones included.
    #[must_use]
    pub fn upsert_attempts(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FlakyOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<Order>, DomainError> {
        self.inner.get(order_id).await
    }

    async fn upsert(
        &self,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DomainError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DomainError::Infrastructure("deadlock detected".into()));
        }
        self.inner.upsert(update, now).await
    }

    async fn prune_deliveries(&self, processed_before: DateTime<Utc>) -> Result<u64, DomainError> {
        self.inner.prune_deliveries(processed_before).await
    }
}
