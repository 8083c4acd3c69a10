//! Partner webhook events for the Orders context.
//!
//! The partner posts an envelope of the form
//! `{"event": "order.new", "body": {"order": {...}}}`. Parsing turns it into
//! an [`OrderEvent`], which is immutable from then on and carries everything
//! the dispatcher needs, the idempotency key included.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use orderhook_core::error::DomainError;
use orderhook_core::order::{
    Customer, DeliveryKey, Money, OrderFields, OrderItem, OrderStatus, OrderUpdate,
    PartnerEnvironment,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Event type string for a newly placed order.
pub const ORDER_NEW_EVENT_TYPE: &str = "order.new";
/// Event type string for a status change on an existing order.
pub const ORDER_STATUS_UPDATE_EVENT_TYPE: &str = "order.status_update";

/// Kind of partner event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// `order.new`
    OrderNew,
    /// `order.status_update`
    OrderStatusUpdate,
    /// Any event this service has no handler for.
    Unknown(String),
}

impl EventType {
    /// Maps the partner's event name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            ORDER_NEW_EVENT_TYPE => Self::OrderNew,
            ORDER_STATUS_UPDATE_EVENT_TYPE => Self::OrderStatusUpdate,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The event name as the partner spells it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OrderNew => ORDER_NEW_EVENT_TYPE,
            Self::OrderStatusUpdate => ORDER_STATUS_UPDATE_EVENT_TYPE,
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    body: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    order: PartnerOrder,
}

#[derive(Debug, Deserialize)]
struct PartnerOrder {
    id: Value,
    #[serde(default)]
    order_number: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_log: Vec<StatusLogEntry>,
    #[serde(default)]
    prepare_for: Option<String>,
    #[serde(default)]
    start_preparing_at: Option<String>,
    #[serde(default)]
    items: Vec<OrderItem>,
    #[serde(default)]
    customer: Option<Customer>,
    #[serde(default)]
    location_id: Option<Value>,
    #[serde(default)]
    restaurant: Option<Restaurant>,
    #[serde(default)]
    total_price: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct StatusLogEntry {
    at: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Restaurant {
    #[serde(default)]
    name: Option<String>,
}

/// A verified partner event, ready for dispatch.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    /// Locally assigned identifier, for logs.
    pub event_id: Uuid,
    /// Kind of event.
    pub event_type: EventType,
    /// Partner order identifier.
    pub order_id: String,
    /// Environment whose webhook received the event.
    pub environment: PartnerEnvironment,
    /// When this service received the request.
    pub received_at: DateTime<Utc>,
    /// Latest `status_log` timestamp in the payload, if any.
    pub occurred_at: Option<DateTime<Utc>>,
    /// The body as received.
    pub raw_payload: Value,
    /// Order status as the partner spells it.
    pub status: Option<String>,
    /// Descriptive order data.
    pub fields: OrderFields,
    /// Idempotency key for this delivery.
    pub delivery: DeliveryKey,
}

impl OrderEvent {
    /// Parses a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MalformedEvent` if the body is not JSON, does not
    /// have the envelope shape, or carries no order id.
    pub fn from_payload(
        raw: &[u8],
        environment: PartnerEnvironment,
        received_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let raw_payload: Value = serde_json::from_slice(raw)
            .map_err(|e| DomainError::MalformedEvent(format!("body is not JSON: {e}")))?;
        let envelope = WebhookEnvelope::deserialize(&raw_payload)
            .map_err(|e| DomainError::MalformedEvent(format!("unexpected envelope: {e}")))?;

        let event_type = EventType::parse(&envelope.event);
        let order = envelope.body.order;
        let order_id = text(&order.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DomainError::MalformedEvent("order id is missing".into()))?;

        let mut log: Vec<(DateTime<Utc>, Option<String>)> = order
            .status_log
            .into_iter()
            .filter_map(|entry| parse_timestamp(&entry.at).map(|at| (at, entry.status)))
            .collect();
        log.sort_by_key(|(at, _)| *at);

        let occurred_at = log.last().map(|(at, _)| *at);
        let status = order
            .status
            .or_else(|| log.iter().rev().find_map(|(_, status)| status.clone()));

        let delivery = match occurred_at {
            Some(at) => DeliveryKey::for_event(&order_id, event_type.as_str(), at),
            None => DeliveryKey::for_payload(&order_id, event_type.as_str(), raw),
        };

        let fields = OrderFields {
            order_number: order.order_number.as_ref().and_then(text),
            location_id: order.location_id.as_ref().and_then(text),
            restaurant_name: order.restaurant.and_then(|r| r.name),
            total_price: order.total_price,
            customer: order.customer,
            items: order.items,
            placed_at: log.first().map(|(at, _)| *at),
            prepare_for: order.prepare_for.as_deref().and_then(parse_timestamp),
            start_preparing_at: order.start_preparing_at.as_deref().and_then(parse_timestamp),
        };

        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type,
            order_id,
            environment,
            received_at,
            occurred_at,
            raw_payload,
            status,
            fields,
            delivery,
        })
    }

    /// Returns `true` if any item or modifier lacks a `pos_item_id`.
    #[must_use]
    pub fn has_unmapped_items(&self) -> bool {
        self.fields.items.iter().any(OrderItem::has_unmapped_entries)
    }

    /// The status this event moves the order to.
    ///
    /// A new order without a status is `placed`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MalformedEvent` if the status is not one the
    /// partner documents, or if a status update carries none.
    pub fn target_status(&self) -> Result<OrderStatus, DomainError> {
        match (&self.status, &self.event_type) {
            (Some(raw), _) => OrderStatus::from_partner(raw)
                .ok_or_else(|| DomainError::MalformedEvent(format!("unknown order status: {raw}"))),
            (None, EventType::OrderNew) => Ok(OrderStatus::Placed),
            (None, _) => Err(DomainError::MalformedEvent(
                "status update carries no status".into(),
            )),
        }
    }

    /// The store update this event asks for.
    #[must_use]
    pub fn to_update(&self, status: OrderStatus) -> OrderUpdate {
        OrderUpdate {
            order_id: self.order_id.clone(),
            environment: self.environment,
            status,
            fields: self.fields.clone(),
            delivery: self.delivery.clone(),
            event_type: self.event_type.as_str().to_owned(),
        }
    }
}

/// Partner identifiers arrive as strings or numbers depending on the field.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|at| at.and_utc())
        })
}
