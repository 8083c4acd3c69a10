//! Partner API abstraction.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PartnerError;
use crate::order::PartnerEnvironment;

/// Body of a `sync_status` call: tells the partner whether an order reached
/// the restaurant's system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// `succeeded` or `failed`.
    pub status: SyncState,
    /// Machine-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-text failure notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Timestamp in partner format (millisecond precision, `Z` suffix).
    pub occurred_at: String,
}

/// Outcome reported through `sync_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The order was received.
    Succeeded,
    /// The order could not be taken.
    Failed,
}

impl SyncStatus {
    /// A successful sync stamped at `at`.
    #[must_use]
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            status: SyncState::Succeeded,
            reason: None,
            notes: None,
            occurred_at: partner_timestamp(at),
        }
    }

    /// A failed sync with a reason and notes, stamped at `at`.
    #[must_use]
    pub fn failed(reason: &str, notes: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: SyncState::Failed,
            reason: Some(reason.to_owned()),
            notes: Some(notes.to_owned()),
            occurred_at: partner_timestamp(at),
        }
    }
}

/// Formats a timestamp the way the partner expects it.
#[must_use]
pub fn partner_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Status the restaurant can set on a partner order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDecision {
    /// Accept the order.
    Accepted,
    /// Reject the order.
    Rejected,
    /// Confirm the order is being prepared.
    Confirmed,
}

/// Outbound port to the partner platform.
#[async_trait]
pub trait PartnerGateway: Send + Sync {
    /// Reports whether an order was received.
    async fn sync_status(&self, order_id: &str, status: &SyncStatus) -> Result<(), PartnerError>;

    /// Sets the order's status on the partner side.
    async fn update_order_status(
        &self,
        order_id: &str,
        decision: OrderDecision,
    ) -> Result<(), PartnerError>;

    /// Accepts an order.
    async fn accept(&self, order_id: &str) -> Result<(), PartnerError> {
        self.update_order_status(order_id, OrderDecision::Accepted)
            .await
    }

    /// Rejects an order.
    async fn reject(&self, order_id: &str) -> Result<(), PartnerError> {
        self.update_order_status(order_id, OrderDecision::Rejected)
            .await
    }

    /// Confirms an order is being prepared.
    async fn confirm(&self, order_id: &str) -> Result<(), PartnerError> {
        self.update_order_status(order_id, OrderDecision::Confirmed)
            .await
    }
}

/// The partner gateways configured for each environment.
#[derive(Clone, Default)]
pub struct PartnerGateways {
    /// Gateway for the sandbox, if configured.
    pub sandbox: Option<Arc<dyn PartnerGateway>>,
    /// Gateway for production, if configured.
    pub production: Option<Arc<dyn PartnerGateway>>,
}

impl PartnerGateways {
    /// Returns the gateway for `environment`.
    ///
    /// # Errors
    ///
    /// Returns `PartnerError::NotConfigured` if no gateway is registered for
    /// the environment.
    pub fn for_environment(
        &self,
        environment: PartnerEnvironment,
    ) -> Result<&dyn PartnerGateway, PartnerError> {
        let gateway = match environment {
            PartnerEnvironment::Sandbox => self.sandbox.as_deref(),
            PartnerEnvironment::Production => self.production.as_deref(),
        };
        gateway.ok_or_else(|| PartnerError::NotConfigured(environment.to_string()))
    }
}

impl fmt::Debug for PartnerGateways {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerGateways")
            .field("sandbox", &self.sandbox.is_some())
            .field("production", &self.production.is_some())
            .finish()
    }
}
