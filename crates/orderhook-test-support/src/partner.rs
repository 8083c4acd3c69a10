//! Test partner: a `PartnerGateway` that records calls instead of sending
//! them.

use std::sync::Mutex;

use async_trait::async_trait;
use orderhook_core::error::PartnerError;
use orderhook_core::partner::{OrderDecision, PartnerGateway, SyncStatus};

/// One call made against a `RecordingPartner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerCall {
    /// A `sync_status` call.
    SyncStatus {
        /// The order the call was about.
        order_id: String,
        /// The reported status.
        status: SyncStatus,
    },
    /// An `update_order_status` call.
    UpdateOrderStatus {
        /// The order the call was about.
        order_id: String,
        /// The decision sent.
        decision: OrderDecision,
    },
}

/// A partner gateway that records every call and answers with a configured
/// result.
#[derive(Debug, Default)]
pub struct RecordingPartner {
    calls: Mutex<Vec<PartnerCall>>,
    failure: Option<PartnerError>,
}

impl RecordingPartner {
    /// A partner that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A partner that records every call and then fails it with `error`.
    #[must_use]
    pub fn failing(error: PartnerError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    /// Returns a snapshot of the calls made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<PartnerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: PartnerCall) -> Result<(), PartnerError> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PartnerGateway for RecordingPartner {
    async fn sync_status(&self, order_id: &str, status: &SyncStatus) -> Result<(), PartnerError> {
        self.record(PartnerCall::SyncStatus {
            order_id: order_id.to_owned(),
            status: status.clone(),
        })
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        decision: OrderDecision,
    ) -> Result<(), PartnerError> {
        self.record(PartnerCall::UpdateOrderStatus {
            order_id: order_id.to_owned(),
            decision,
        })
    }
}
