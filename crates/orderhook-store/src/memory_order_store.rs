//! In-memory implementation of the `OrderStore` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use orderhook_core::error::DomainError;
use orderhook_core::order::{Order, OrderUpdate, UpsertOutcome, resolve_update};
use orderhook_core::repository::OrderStore;

/// State for one order id. Guarded by its own async mutex so that upserts
/// for one order serialize while other orders proceed.
#[derive(Debug, Default)]
struct Slot {
    order: Option<Order>,
    deliveries: HashMap<String, DateTime<Utc>>,
}

/// Process-local order store.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<Slot>>>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no order has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, order_id: &str) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(order_id.to_owned()).or_default().clone()
    }

    fn existing_slot(&self, order_id: &str) -> Option<Arc<AsyncMutex<Slot>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(order_id)
            .cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<Order>, DomainError> {
        let Some(slot) = self.existing_slot(order_id) else {
            return Ok(None);
        };
        Ok(slot.lock().await.order.clone())
    }

    async fn upsert(
        &self,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DomainError> {
        let slot = self.slot(&update.order_id);
        let mut slot = slot.lock().await;

        if slot.deliveries.contains_key(update.delivery.as_str()) {
            if let Some(order) = &slot.order {
                return Ok(UpsertOutcome::Duplicate(order.clone()));
            }
        }

        let outcome = resolve_update(slot.order.clone(), update, now);
        if outcome.is_write() {
            slot.order = Some(outcome.order().clone());
        }
        slot.deliveries
            .insert(update.delivery.as_str().to_owned(), now);

        Ok(outcome)
    }

    async fn prune_deliveries(
        &self,
        processed_before: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let slots: Vec<_> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut removed = 0;
        for slot in slots {
            let mut slot = slot.lock().await;
            let before = slot.deliveries.len();
            slot.deliveries.retain(|_, at| *at >= processed_before);
            removed += (before - slot.deliveries.len()) as u64;
        }
        Ok(removed)
    }
}
