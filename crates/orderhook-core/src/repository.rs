//! Order store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::order::{Order, OrderUpdate, UpsertOutcome};

/// Persistence port for orders.
///
/// Implementations must make `upsert` an atomic read-modify-write per
/// `order_id`: concurrent upserts for one order serialize, upserts for
/// different orders do not wait on each other. A delivery key that was
/// already processed yields [`UpsertOutcome::Duplicate`] without any write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order by its partner identifier.
    async fn get(&self, order_id: &str) -> Result<Option<Order>, DomainError>;

    /// Creates or updates an order, resolving the status transition with
    /// [`crate::order::resolve_update`] while the order is locked.
    async fn upsert(
        &self,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DomainError>;

    /// Forgets delivery keys processed before `processed_before` and returns
    /// how many were removed. A delivery redelivered after its key is gone
    /// is resolved against the order's status again.
    async fn prune_deliveries(&self, processed_before: DateTime<Utc>)
    -> Result<u64, DomainError>;
}
