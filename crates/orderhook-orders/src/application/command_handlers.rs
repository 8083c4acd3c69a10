//! Command handlers for the Orders context.
//!
//! Operator decisions are sent to the partner first and written to the store
//! only once the partner has accepted them, so the local status never claims
//! something the partner does not know about.

use orderhook_core::clock::Clock;
use orderhook_core::error::DomainError;
use orderhook_core::order::{DeliveryKey, OrderFields, OrderStatus, OrderUpdate, UpsertOutcome};
use orderhook_core::partner::{OrderDecision, PartnerGateways};
use orderhook_core::repository::OrderStore;
use orderhook_core::retry::{RetryPolicy, retry_transient};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::query_handlers::OrderView;
use crate::domain::commands::{AcceptOrder, ConfirmOrder, RejectOrder};

/// Dependencies shared by the operator command handlers.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    /// Source of `now`.
    pub clock: &'a dyn Clock,
    /// Order persistence.
    pub store: &'a dyn OrderStore,
    /// Partner gateways by environment.
    pub partners: &'a PartnerGateways,
    /// Backoff for transient store failures.
    pub persist_retry: &'a RetryPolicy,
}

/// Handles the `AcceptOrder` command: checks the order may be accepted, tells
/// the partner, then records the new status.
///
/// # Errors
///
/// Returns `DomainError::OrderNotFound` for unknown orders,
/// `DomainError::Validation` if the order can no longer be accepted,
/// `DomainError::Partner` if the partner call fails, and
/// `DomainError::Infrastructure` if the store fails.
pub async fn handle_accept_order(
    command: &AcceptOrder,
    ctx: &CommandContext<'_>,
) -> Result<OrderView, DomainError> {
    apply_decision(
        &command.order_id,
        command.correlation_id,
        OrderDecision::Accepted,
        ctx,
    )
    .await
}

/// Handles the `RejectOrder` command: checks the order may be rejected, tells
/// the partner, then records the new status.
///
/// # Errors
///
/// Same as [`handle_accept_order`].
pub async fn handle_reject_order(
    command: &RejectOrder,
    ctx: &CommandContext<'_>,
) -> Result<OrderView, DomainError> {
    apply_decision(
        &command.order_id,
        command.correlation_id,
        OrderDecision::Rejected,
        ctx,
    )
    .await
}

/// Handles the `ConfirmOrder` command: checks the order may move to
/// preparation, tells the partner, then records the new status.
///
/// # Errors
///
/// Same as [`handle_accept_order`].
pub async fn handle_confirm_order(
    command: &ConfirmOrder,
    ctx: &CommandContext<'_>,
) -> Result<OrderView, DomainError> {
    apply_decision(
        &command.order_id,
        command.correlation_id,
        OrderDecision::Confirmed,
        ctx,
    )
    .await
}

async fn apply_decision(
    order_id: &str,
    correlation_id: Uuid,
    decision: OrderDecision,
    ctx: &CommandContext<'_>,
) -> Result<OrderView, DomainError> {
    let (command, target) = match decision {
        OrderDecision::Accepted => ("accept", OrderStatus::Accepted),
        OrderDecision::Rejected => ("reject", OrderStatus::Rejected),
        OrderDecision::Confirmed => ("confirm", OrderStatus::InProgress),
    };

    if order_id.trim().is_empty() {
        return Err(DomainError::Validation("order id must not be empty".into()));
    }

    let order = ctx
        .store
        .get(order_id)
        .await?
        .ok_or_else(|| DomainError::OrderNotFound(order_id.to_owned()))?;

    if order.status == target {
        return Err(DomainError::Validation(format!(
            "order is already {}",
            order.status
        )));
    }
    if !order.status.can_transition_to(target) {
        return Err(DomainError::Validation(format!(
            "cannot {command} order in status {}",
            order.status
        )));
    }

    let gateway = ctx.partners.for_environment(order.environment)?;
    match decision {
        OrderDecision::Accepted => gateway.accept(order_id).await?,
        OrderDecision::Rejected => gateway.reject(order_id).await?,
        OrderDecision::Confirmed => gateway.confirm(order_id).await?,
    }

    let update = OrderUpdate {
        order_id: order_id.to_owned(),
        environment: order.environment,
        status: target,
        fields: OrderFields::default(),
        delivery: DeliveryKey::for_command(order_id, command, &correlation_id.to_string()),
        event_type: format!("command.{command}"),
    };
    let now = ctx.clock.now();
    let update = &update;
    let outcome = retry_transient(ctx.persist_retry, "order_upsert", |_attempt| {
        ctx.store.upsert(update, now)
    })
    .await?;

    if let UpsertOutcome::Stale(current) = &outcome {
        warn!(
            order_id,
            %correlation_id,
            status = %current.status,
            "partner accepted {command} but the order moved on meanwhile"
        );
    } else {
        info!(order_id, %correlation_id, status = %target, "operator {command} recorded");
    }

    Ok(OrderView::from(outcome.order().clone()))
}
