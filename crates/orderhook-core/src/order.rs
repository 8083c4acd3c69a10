//! Order model and status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Partner deployment an order arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerEnvironment {
    /// The partner's sandbox, fed by the dev webhook.
    Sandbox,
    /// The partner's live platform.
    Production,
}

impl PartnerEnvironment {
    /// Stable lowercase name, used in storage and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for PartnerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartnerEnvironment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(DomainError::Validation(format!(
                "unknown partner environment: {other}"
            ))),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed by the customer, not yet acted on.
    Placed,
    /// Accepted by the restaurant.
    Accepted,
    /// Rejected by the restaurant. Terminal.
    Rejected,
    /// Being prepared.
    InProgress,
    /// Handed over. Terminal.
    Completed,
    /// Cancelled by the customer or the platform. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Maps a status string as the partner spells it.
    #[must_use]
    pub fn from_partner(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" | "placed" => Some(Self::Placed),
            "accepted" => Some(Self::Accepted),
            "confirmed" | "in_progress" | "preparing" => Some(Self::InProgress),
            "completed" | "succeeded" | "delivered" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "canceled" | "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Placed => 0,
            Self::Accepted => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Rejected | Self::Cancelled => 3,
        }
    }

    /// Whether an order in `self` may move to `next`.
    ///
    /// Staying in the same status is allowed (a field refresh). Leaving a
    /// terminal status, or moving backwards, is not.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Rejected | Self::Cancelled) || next.rank() > self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_partner(s)
            .ok_or_else(|| DomainError::Validation(format!("unknown order status: {s}")))
    }
}

/// An amount in the currency's minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (pence, cents).
    pub fractional: i64,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency_code: Option<String>,
}

/// Customer contact details as shared by the partner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer first name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Masked contact number.
    #[serde(default)]
    pub contact_number: Option<String>,
    /// Access code for the masked number.
    #[serde(default)]
    pub contact_access_code: Option<String>,
}

/// An ordered item or modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The restaurant's own identifier for the item, if mapped.
    #[serde(default)]
    pub pos_item_id: Option<String>,
    /// Customer-facing name.
    #[serde(default)]
    pub name: String,
    /// Kitchen-facing name.
    #[serde(default)]
    pub operational_name: Option<String>,
    /// Number of units.
    #[serde(default)]
    pub quantity: u32,
    /// Price for all units, modifiers excluded.
    #[serde(default)]
    pub total_price: Option<Money>,
    /// Nested modifiers.
    #[serde(default)]
    pub modifiers: Vec<OrderItem>,
}

impl OrderItem {
    /// Returns `true` if this item or any nested modifier lacks a
    /// `pos_item_id`.
    #[must_use]
    pub fn has_unmapped_entries(&self) -> bool {
        let unmapped = self
            .pos_item_id
            .as_deref()
            .is_none_or(|id| id.trim().is_empty());
        unmapped || self.modifiers.iter().any(OrderItem::has_unmapped_entries)
    }
}

/// Descriptive order data carried by partner events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    /// Human-readable order number.
    #[serde(default)]
    pub order_number: Option<String>,
    /// Partner location (site) identifier.
    #[serde(default)]
    pub location_id: Option<String>,
    /// Restaurant name as known to the partner.
    #[serde(default)]
    pub restaurant_name: Option<String>,
    /// Order total.
    #[serde(default)]
    pub total_price: Option<Money>,
    /// Customer contact details.
    #[serde(default)]
    pub customer: Option<Customer>,
    /// Ordered items.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// When the customer placed the order.
    #[serde(default)]
    pub placed_at: Option<DateTime<Utc>>,
    /// When the order should be ready.
    #[serde(default)]
    pub prepare_for: Option<DateTime<Utc>>,
    /// When the kitchen should start preparing.
    #[serde(default)]
    pub start_preparing_at: Option<DateTime<Utc>>,
}

impl OrderFields {
    /// Overwrites every field `other` carries; absent fields are kept.
    pub fn merge_from(&mut self, other: &OrderFields) {
        fn take<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }

        take(&mut self.order_number, other.order_number.as_ref());
        take(&mut self.location_id, other.location_id.as_ref());
        take(&mut self.restaurant_name, other.restaurant_name.as_ref());
        take(&mut self.total_price, other.total_price.as_ref());
        take(&mut self.customer, other.customer.as_ref());
        take(&mut self.placed_at, other.placed_at.as_ref());
        take(&mut self.prepare_for, other.prepare_for.as_ref());
        take(&mut self.start_preparing_at, other.start_preparing_at.as_ref());
        if !other.items.is_empty() {
            self.items.clone_from(&other.items);
        }
    }

    /// Copies in the fields `self` lacks from `other`; fields already set are
    /// kept. Returns `true` if anything changed.
    pub fn fill_missing_from(&mut self, other: &OrderFields) -> bool {
        fn fill<T: Clone>(slot: &mut Option<T>, value: Option<&T>) -> bool {
            match (slot.as_ref(), value) {
                (None, Some(value)) => {
                    *slot = Some(value.clone());
                    true
                }
                _ => false,
            }
        }

        let mut changed = fill(&mut self.order_number, other.order_number.as_ref());
        changed |= fill(&mut self.location_id, other.location_id.as_ref());
        changed |= fill(&mut self.restaurant_name, other.restaurant_name.as_ref());
        changed |= fill(&mut self.total_price, other.total_price.as_ref());
        changed |= fill(&mut self.customer, other.customer.as_ref());
        changed |= fill(&mut self.placed_at, other.placed_at.as_ref());
        changed |= fill(&mut self.prepare_for, other.prepare_for.as_ref());
        changed |= fill(&mut self.start_preparing_at, other.start_preparing_at.as_ref());
        if self.items.is_empty() && !other.items.is_empty() {
            self.items.clone_from(&other.items);
            changed = true;
        }
        changed
    }
}

/// Authoritative order state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Partner order identifier.
    pub order_id: String,
    /// Partner environment the order belongs to.
    pub environment: PartnerEnvironment,
    /// Current status.
    pub status: OrderStatus,
    /// Descriptive data.
    pub fields: OrderFields,
    /// Number of writes applied.
    pub version: i64,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Latest write.
    pub updated_at: DateTime<Utc>,
}

/// Identifies one delivery of one partner event, for idempotency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    /// Key for a partner event stamped with `occurred_at`.
    #[must_use]
    pub fn for_event(order_id: &str, event_type: &str, occurred_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{order_id}|{event_type}|{}",
            occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        ))
    }

    /// Key for a partner event with no usable timestamp; the body digest
    /// stands in for it.
    #[must_use]
    pub fn for_payload(order_id: &str, event_type: &str, raw_body: &[u8]) -> Self {
        let digest = hex::encode(Sha256::digest(raw_body));
        Self(format!("{order_id}|{event_type}|sha256:{digest}"))
    }

    /// Key for an operator command, unique per correlation id.
    #[must_use]
    pub fn for_command(order_id: &str, command: &str, correlation_id: &str) -> Self {
        Self(format!("{order_id}|command.{command}|{correlation_id}"))
    }

    /// The key as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A requested change to one order: `upsert(order_id, status, fields)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    /// Order to create or update.
    pub order_id: String,
    /// Environment the change came from.
    pub environment: PartnerEnvironment,
    /// Target status.
    pub status: OrderStatus,
    /// Fields to merge.
    pub fields: OrderFields,
    /// Idempotency key for this change.
    pub delivery: DeliveryKey,
    /// Event type that produced the change, for the delivery log.
    pub event_type: String,
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The order did not exist and was created.
    Created(Order),
    /// The order was updated.
    Applied(Order),
    /// The status change was refused, but fields the order lacked were
    /// filled in from the update.
    Merged(Order),
    /// The update would regress status; the order was left as is.
    Stale(Order),
    /// This delivery was already processed; nothing changed.
    Duplicate(Order),
}

impl UpsertOutcome {
    /// The order as it stands after the upsert.
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(order)
            | Self::Applied(order)
            | Self::Merged(order)
            | Self::Stale(order)
            | Self::Duplicate(order) => order,
        }
    }

    /// Returns `true` if the upsert wrote new state.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Applied(_) | Self::Merged(_))
    }

    /// Short label for logs and responses.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Applied(_) => "applied",
            Self::Merged(_) => "merged",
            Self::Stale(_) => "stale",
            Self::Duplicate(_) => "duplicate",
        }
    }
}

/// Resolves `update` against the current state of the order.
///
/// Store adapters call this while holding the order's lock and persist the
/// result only when [`UpsertOutcome::is_write`] holds. Duplicate detection
/// happens in the adapter before this is reached.
#[must_use]
pub fn resolve_update(
    current: Option<Order>,
    update: &OrderUpdate,
    now: DateTime<Utc>,
) -> UpsertOutcome {
    let Some(mut order) = current else {
        return UpsertOutcome::Created(Order {
            order_id: update.order_id.clone(),
            environment: update.environment,
            status: update.status,
            fields: update.fields.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        });
    };

    if !order.status.can_transition_to(update.status) {
        if !order.fields.fill_missing_from(&update.fields) {
            return UpsertOutcome::Stale(order);
        }
        order.version += 1;
        order.updated_at = now;
        return UpsertOutcome::Merged(order);
    }

    order.status = update.status;
    order.fields.merge_from(&update.fields);
    order.version += 1;
    order.updated_at = now;
    UpsertOutcome::Applied(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn update(order_id: &str, status: OrderStatus, tag: &str) -> OrderUpdate {
        OrderUpdate {
            order_id: order_id.to_owned(),
            environment: PartnerEnvironment::Sandbox,
            status,
            fields: OrderFields::default(),
            delivery: DeliveryKey::for_command(order_id, tag, tag),
            event_type: "order.status_update".to_owned(),
        }
    }

    #[test]
    fn test_partner_status_aliases_map_to_canonical_statuses() {
        assert_eq!(OrderStatus::from_partner("canceled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_partner("Cancelled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_partner("pending"), Some(OrderStatus::Placed));
        assert_eq!(OrderStatus::from_partner("confirmed"), Some(OrderStatus::InProgress));
        assert_eq!(OrderStatus::from_partner("succeeded"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::from_partner("teleported"), None);
    }

    #[test]
    fn test_forward_transitions_are_allowed() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Accepted));
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Accepted.can_transition_to(OrderStatus::InProgress));
        assert!(OrderStatus::InProgress.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Rejected));
    }

    #[test]
    fn test_backward_and_terminal_exits_are_refused() {
        assert!(!OrderStatus::Accepted.can_transition_to(OrderStatus::Placed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Accepted));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Accepted));
    }

    #[test]
    fn test_same_status_is_a_field_refresh() {
        assert!(OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Placed));
    }

    #[test]
    fn test_resolve_update_creates_missing_order() {
        let outcome = resolve_update(None, &update("A1", OrderStatus::Placed, "a"), fixed_now());

        match outcome {
            UpsertOutcome::Created(order) => {
                assert_eq!(order.order_id, "A1");
                assert_eq!(order.status, OrderStatus::Placed);
                assert_eq!(order.version, 1);
                assert_eq!(order.created_at, fixed_now());
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn test_accept_then_cancel_then_replayed_accept_stays_cancelled() {
        // Arrange
        let now = fixed_now();
        let placed = resolve_update(None, &update("A1", OrderStatus::Placed, "p"), now);

        // Act
        let accepted = resolve_update(
            Some(placed.order().clone()),
            &update("A1", OrderStatus::Accepted, "a"),
            now,
        );
        let cancelled = resolve_update(
            Some(accepted.order().clone()),
            &update("A1", OrderStatus::Cancelled, "c"),
            now,
        );
        let replayed = resolve_update(
            Some(cancelled.order().clone()),
            &update("A1", OrderStatus::Accepted, "a2"),
            now,
        );

        // Assert
        assert!(matches!(accepted, UpsertOutcome::Applied(_)));
        assert!(matches!(cancelled, UpsertOutcome::Applied(_)));
        match replayed {
            UpsertOutcome::Stale(order) => {
                assert_eq!(order.status, OrderStatus::Cancelled);
                assert_eq!(order.version, 3);
            }
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[test]
    fn test_late_new_order_fills_fields_without_regressing_status() {
        // Arrange
        let now = fixed_now();
        let later = now + chrono::Duration::seconds(30);
        let accepted = resolve_update(None, &update("A1", OrderStatus::Accepted, "a"), now);
        let mut late_new = update("A1", OrderStatus::Placed, "n");
        late_new.fields = OrderFields {
            order_number: Some("0042".into()),
            items: vec![OrderItem {
                pos_item_id: Some("burger-1".into()),
                name: "Burger".into(),
                quantity: 1,
                ..OrderItem::default()
            }],
            ..OrderFields::default()
        };

        // Act
        let outcome = resolve_update(Some(accepted.order().clone()), &late_new, later);

        // Assert
        assert!(outcome.is_write());
        match outcome {
            UpsertOutcome::Merged(order) => {
                assert_eq!(order.status, OrderStatus::Accepted);
                assert_eq!(order.fields.order_number.as_deref(), Some("0042"));
                assert_eq!(order.fields.items.len(), 1);
                assert_eq!(order.version, 2);
                assert_eq!(order.updated_at, later);
            }
            other => panic!("expected Merged, got {other:?}"),
        }
    }

    #[test]
    fn test_refused_transition_does_not_overwrite_existing_fields() {
        let mut fields = OrderFields {
            order_number: Some("0042".into()),
            ..OrderFields::default()
        };
        let older = OrderFields {
            order_number: Some("0041".into()),
            ..OrderFields::default()
        };

        assert!(!fields.fill_missing_from(&older));
        assert_eq!(fields.order_number.as_deref(), Some("0042"));
    }

    #[test]
    fn test_merge_keeps_fields_the_update_does_not_carry() {
        let mut fields = OrderFields {
            order_number: Some("0042".into()),
            total_price: Some(Money {
                fractional: 1299,
                currency_code: Some("GBP".into()),
            }),
            ..OrderFields::default()
        };
        let incoming = OrderFields {
            location_id: Some("site-7".into()),
            ..OrderFields::default()
        };

        fields.merge_from(&incoming);

        assert_eq!(fields.order_number.as_deref(), Some("0042"));
        assert_eq!(fields.location_id.as_deref(), Some("site-7"));
        assert_eq!(fields.total_price.unwrap().fractional, 1299);
    }

    #[test]
    fn test_unmapped_modifier_is_detected() {
        let item = OrderItem {
            pos_item_id: Some("burger-1".into()),
            name: "Burger".into(),
            quantity: 1,
            modifiers: vec![OrderItem {
                pos_item_id: Some(String::new()),
                name: "Extra cheese".into(),
                quantity: 1,
                ..OrderItem::default()
            }],
            ..OrderItem::default()
        };

        assert!(item.has_unmapped_entries());
    }

    #[test]
    fn test_delivery_keys_distinguish_timestamps_and_bodies() {
        let at = fixed_now();
        let later = at + chrono::Duration::seconds(1);

        assert_eq!(
            DeliveryKey::for_event("A1", "order.new", at),
            DeliveryKey::for_event("A1", "order.new", at)
        );
        assert_ne!(
            DeliveryKey::for_event("A1", "order.new", at),
            DeliveryKey::for_event("A1", "order.new", later)
        );
        assert_ne!(
            DeliveryKey::for_payload("A1", "order.new", b"{\"a\":1}"),
            DeliveryKey::for_payload("A1", "order.new", b"{\"a\":2}")
        );
    }
}
