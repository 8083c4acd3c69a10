//! Event dispatcher for the Orders context.
//!
//! Routes a verified [`OrderEvent`] to the handler for its type. Handlers
//! persist through the `OrderStore` port, retrying transient store failures,
//! and talk to the partner only after the store has committed.

use orderhook_core::clock::Clock;
use orderhook_core::error::DomainError;
use orderhook_core::order::UpsertOutcome;
use orderhook_core::partner::{PartnerGateway, SyncStatus};
use orderhook_core::repository::OrderStore;
use orderhook_core::retry::{RetryPolicy, retry_transient};
use tracing::{error, info, instrument};

use crate::domain::events::{EventType, OrderEvent};

/// `sync_status` reason reported when an item has no `pos_item_id`.
pub const POS_ITEM_ID_NOT_FOUND: &str = "pos_item_id_not_found";

/// Dependencies a dispatch needs.
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    /// Source of `now`.
    pub clock: &'a dyn Clock,
    /// Order persistence.
    pub store: &'a dyn OrderStore,
    /// Partner for the event's environment.
    pub partner: &'a dyn PartnerGateway,
    /// Backoff for transient store failures.
    pub persist_retry: &'a RetryPolicy,
}

/// What dispatching an event did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The event reached the store.
    Recorded(UpsertOutcome),
    /// A new order was refused because an item is not mapped to the
    /// restaurant's menu. The partner was sent this status.
    UnmappedItems(SyncStatus),
}

/// Dispatches `event` to its handler.
///
/// # Errors
///
/// Returns `DomainError::UnsupportedEvent` for event types with no handler,
/// `DomainError::MalformedEvent` if the event's status cannot be read, and
/// `DomainError::Infrastructure` once store retries are exhausted. Partner
/// failures are logged, not returned.
#[instrument(
    skip(event, ctx),
    fields(
        event_id = %event.event_id,
        event_type = %event.event_type,
        order_id = %event.order_id,
        environment = %event.environment,
    )
)]
pub async fn dispatch(
    event: &OrderEvent,
    ctx: &DispatchContext<'_>,
) -> Result<DispatchOutcome, DomainError> {
    match &event.event_type {
        EventType::OrderNew => handle_order_new(event, ctx).await,
        EventType::OrderStatusUpdate => handle_status_update(event, ctx).await,
        EventType::Unknown(name) => Err(DomainError::UnsupportedEvent(name.clone())),
    }
}

async fn handle_order_new(
    event: &OrderEvent,
    ctx: &DispatchContext<'_>,
) -> Result<DispatchOutcome, DomainError> {
    if event.has_unmapped_items() {
        let status = SyncStatus::failed(POS_ITEM_ID_NOT_FOUND, "id not found", ctx.clock.now());
        info!("refusing order with unmapped items");
        if let Err(err) = ctx.partner.sync_status(&event.order_id, &status).await {
            error!(error = %err, "failed to report unmapped items to partner");
        }
        return Ok(DispatchOutcome::UnmappedItems(status));
    }

    let outcome = persist(event, ctx).await?;

    if outcome.is_write() {
        let status = SyncStatus::succeeded(ctx.clock.now());
        if let Err(err) = ctx.partner.sync_status(&event.order_id, &status).await {
            error!(
                error = %err,
                "order stored but partner sync_status failed"
            );
        }
    }

    Ok(DispatchOutcome::Recorded(outcome))
}

async fn handle_status_update(
    event: &OrderEvent,
    ctx: &DispatchContext<'_>,
) -> Result<DispatchOutcome, DomainError> {
    let outcome = persist(event, ctx).await?;
    Ok(DispatchOutcome::Recorded(outcome))
}

async fn persist(
    event: &OrderEvent,
    ctx: &DispatchContext<'_>,
) -> Result<UpsertOutcome, DomainError> {
    let update = event.to_update(event.target_status()?);
    let now = ctx.clock.now();
    let update = &update;

    let outcome = retry_transient(ctx.persist_retry, "order_upsert", |_attempt| {
        ctx.store.upsert(update, now)
    })
    .await?;

    info!(
        outcome = outcome.label(),
        status = %outcome.order().status,
        version = outcome.order().version,
        "order event recorded"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use orderhook_core::error::{DomainError, PartnerError};
    use orderhook_core::order::{OrderStatus, PartnerEnvironment, UpsertOutcome};
    use orderhook_core::partner::{SyncState, SyncStatus};
    use orderhook_core::repository::OrderStore;
    use orderhook_core::retry::RetryPolicy;
    use orderhook_store::InMemoryOrderStore;
    use orderhook_test_support::{
        FailingOrderStore, FixedClock, FlakyOrderStore, PartnerCall, RecordingPartner,
    };
    use serde_json::{Value, json};

    use super::{DispatchContext, DispatchOutcome, POS_ITEM_ID_NOT_FOUND, dispatch};
    use crate::domain::events::OrderEvent;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn payload(event: &str, order_id: &str, status: &str, at: &str) -> Value {
        json!({
            "event": event,
            "body": {"order": {
                "id": order_id,
                "status": status,
                "status_log": [{"at": at, "status": status}],
                "items": [{
                    "pos_item_id": "burger-1",
                    "name": "Burger",
                    "quantity": 1,
                    "modifiers": []
                }]
            }}
        })
    }

    fn event(payload: &Value) -> OrderEvent {
        let raw = serde_json::to_vec(payload).unwrap();
        OrderEvent::from_payload(&raw, PartnerEnvironment::Sandbox, fixed_now()).unwrap()
    }

    fn recorded(outcome: DispatchOutcome) -> UpsertOutcome {
        match outcome {
            DispatchOutcome::Recorded(outcome) => outcome,
            other => panic!("expected Recorded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_order_is_stored_and_synced() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };
        let event = event(&payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z"));

        // Act
        let outcome = recorded(dispatch(&event, &ctx).await.unwrap());

        // Assert
        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(
            store.get("A1").await.unwrap().unwrap().status,
            OrderStatus::Placed
        );
        assert_eq!(
            partner.calls(),
            vec![PartnerCall::SyncStatus {
                order_id: "A1".into(),
                status: SyncStatus::succeeded(fixed_now()),
            }]
        );
    }

    #[tokio::test]
    async fn test_redelivered_new_order_is_synced_once() {
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };
        let event = event(&payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z"));

        dispatch(&event, &ctx).await.unwrap();
        let second = recorded(dispatch(&event, &ctx).await.unwrap());

        assert!(matches!(second, UpsertOutcome::Duplicate(_)));
        assert_eq!(partner.calls().len(), 1);
        assert_eq!(store.get("A1").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_unmapped_item_is_reported_failed_and_not_stored() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };
        let mut payload = payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z");
        payload["body"]["order"]["items"][0]["pos_item_id"] = json!("");

        // Act
        let outcome = dispatch(&event(&payload), &ctx).await.unwrap();

        // Assert
        let status = match outcome {
            DispatchOutcome::UnmappedItems(status) => status,
            other => panic!("expected UnmappedItems, got {other:?}"),
        };
        assert_eq!(status.status, SyncState::Failed);
        assert_eq!(status.reason.as_deref(), Some(POS_ITEM_ID_NOT_FOUND));
        assert!(store.is_empty());
        assert_eq!(
            partner.calls(),
            vec![PartnerCall::SyncStatus {
                order_id: "A1".into(),
                status,
            }]
        );
    }

    #[tokio::test]
    async fn test_status_update_is_stored_without_partner_call() {
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let outcome = recorded(
            dispatch(
                &event(&payload(
                    "order.status_update",
                    "A1",
                    "accepted",
                    "2026-01-15T09:59:00Z",
                )),
                &ctx,
            )
            .await
            .unwrap(),
        );

        assert_eq!(outcome.order().status, OrderStatus::Accepted);
        assert!(partner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_accept_after_cancel_is_stale() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };
        let accepted = payload("order.status_update", "A1", "accepted", "2026-01-15T09:59:00Z");
        let cancelled = payload("order.status_update", "A1", "canceled", "2026-01-15T10:01:00Z");
        let late_accept =
            payload("order.status_update", "A1", "accepted", "2026-01-15T09:59:30Z");

        // Act
        dispatch(&event(&accepted), &ctx).await.unwrap();
        dispatch(&event(&cancelled), &ctx).await.unwrap();
        let outcome = recorded(dispatch(&event(&late_accept), &ctx).await.unwrap());

        // Assert
        assert!(matches!(outcome, UpsertOutcome::Stale(_)));
        assert_eq!(
            store.get("A1").await.unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_new_order_after_status_update_fills_in_order_and_syncs() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };
        let mut accepted =
            payload("order.status_update", "A1", "accepted", "2026-01-15T09:59:30Z");
        accepted["body"]["order"]["items"] = json!([]);
        let mut new_order = payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z");
        new_order["body"]["order"]["order_number"] = json!("0042");

        // Act
        dispatch(&event(&accepted), &ctx).await.unwrap();
        let outcome = recorded(dispatch(&event(&new_order), &ctx).await.unwrap());

        // Assert
        assert!(matches!(outcome, UpsertOutcome::Merged(_)));
        let order = store.get("A1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.fields.order_number.as_deref(), Some("0042"));
        assert_eq!(order.fields.items.len(), 1);
        assert_eq!(order.version, 2);
        assert_eq!(
            partner.calls(),
            vec![PartnerCall::SyncStatus {
                order_id: "A1".into(),
                status: SyncStatus::succeeded(fixed_now()),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_unsupported() {
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let result = dispatch(
            &event(&payload("rider.assigned", "A1", "placed", "2026-01-15T09:59:00Z")),
            &ctx,
        )
        .await;

        match result {
            Err(DomainError::UnsupportedEvent(name)) => assert_eq!(name, "rider.assigned"),
            other => panic!("expected UnsupportedEvent, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let clock = FixedClock(fixed_now());
        let store = FlakyOrderStore::new(2);
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let outcome = recorded(
            dispatch(
                &event(&payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z")),
                &ctx,
            )
            .await
            .unwrap(),
        );

        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(store.upsert_attempts(), 3);
        assert_eq!(partner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_store_retries_surface_infrastructure_error() {
        let clock = FixedClock(fixed_now());
        let store = FailingOrderStore::default();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let result = dispatch(
            &event(&payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z")),
            &ctx,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert_eq!(store.upsert_attempts(), 3);
        assert!(partner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_partner_failure_after_commit_keeps_order() {
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::failing(PartnerError::Unavailable {
            status: 503,
            body: "down".into(),
        });
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let outcome = dispatch(
            &event(&payload("order.new", "A1", "placed", "2026-01-15T09:59:00Z")),
            &ctx,
        )
        .await;

        assert!(matches!(
            outcome,
            Ok(DispatchOutcome::Recorded(UpsertOutcome::Created(_)))
        ));
        assert!(store.get("A1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_status_is_malformed() {
        let clock = FixedClock(fixed_now());
        let store = InMemoryOrderStore::new();
        let partner = RecordingPartner::new();
        let retry = RetryPolicy::immediate(3);
        let ctx = DispatchContext {
            clock: &clock,
            store: &store,
            partner: &partner,
            persist_retry: &retry,
        };

        let result = dispatch(
            &event(&payload(
                "order.status_update",
                "A1",
                "teleported",
                "2026-01-15T09:59:00Z",
            )),
            &ctx,
        )
        .await;

        assert!(matches!(result, Err(DomainError::MalformedEvent(_))));
    }
}
