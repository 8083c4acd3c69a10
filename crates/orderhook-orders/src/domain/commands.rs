//! Operator commands for the Orders context.

use uuid::Uuid;

/// Command to accept an order on the partner platform.
#[derive(Debug, Clone)]
pub struct AcceptOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The partner order identifier.
    pub order_id: String,
}

/// Command to reject an order on the partner platform.
#[derive(Debug, Clone)]
pub struct RejectOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The partner order identifier.
    pub order_id: String,
}

/// Command to confirm on the partner platform that an order is being
/// prepared.
#[derive(Debug, Clone)]
pub struct ConfirmOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The partner order identifier.
    pub order_id: String,
}
