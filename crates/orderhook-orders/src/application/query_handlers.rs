//! Query handlers for the Orders context.

use chrono::{DateTime, Utc};
use orderhook_core::error::DomainError;
use orderhook_core::order::{Order, OrderFields, OrderStatus, PartnerEnvironment};
use orderhook_core::repository::OrderStore;
use serde::Serialize;

/// Read-only view of an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    /// The partner order identifier.
    pub order_id: String,
    /// The partner environment the order belongs to.
    pub environment: PartnerEnvironment,
    /// Current status.
    pub status: OrderStatus,
    /// Number of writes applied.
    pub version: i64,
    /// Descriptive order data.
    pub fields: OrderFields,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Latest write.
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            environment: order.environment,
            status: order.status,
            version: order.version,
            fields: order.fields,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Retrieves an order by its partner identifier.
///
/// # Errors
///
/// Returns `DomainError::OrderNotFound` if the order is unknown, or
/// `DomainError::Infrastructure` if the store fails.
pub async fn get_order_by_id(
    order_id: &str,
    store: &dyn OrderStore,
) -> Result<OrderView, DomainError> {
    store
        .get(order_id)
        .await?
        .map(OrderView::from)
        .ok_or_else(|| DomainError::OrderNotFound(order_id.to_owned()))
}
