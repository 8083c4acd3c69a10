//! Shared application state.

use std::fmt;
use std::sync::Arc;

use orderhook_core::clock::Clock;
use orderhook_core::order::PartnerEnvironment;
use orderhook_core::partner::{PartnerGateway, PartnerGateways};
use orderhook_core::repository::OrderStore;
use orderhook_core::retry::RetryPolicy;
use orderhook_core::secret::Secret;

/// A partner environment's webhook secret paired with its API gateway.
#[derive(Clone)]
pub struct PartnerEndpoint {
    /// Key the partner signs webhook deliveries with.
    pub webhook_secret: Secret,
    /// Client for the partner's Orders API.
    pub gateway: Arc<dyn PartnerGateway>,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// Order persistence.
    pub order_store: Arc<dyn OrderStore>,
    /// Backoff for transient store failures.
    pub persist_retry: RetryPolicy,
    sandbox: Option<PartnerEndpoint>,
    production: Option<PartnerEndpoint>,
    partners: PartnerGateways,
}

impl AppState {
    /// Create new application state with no partner environment enabled.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        order_store: Arc<dyn OrderStore>,
        persist_retry: RetryPolicy,
    ) -> Self {
        Self {
            clock,
            order_store,
            persist_retry,
            sandbox: None,
            production: None,
            partners: PartnerGateways::default(),
        }
    }

    /// Enables the webhook and partner calls for `environment`.
    #[must_use]
    pub fn with_partner(
        mut self,
        environment: PartnerEnvironment,
        webhook_secret: Secret,
        gateway: Arc<dyn PartnerGateway>,
    ) -> Self {
        let endpoint = PartnerEndpoint {
            webhook_secret,
            gateway: gateway.clone(),
        };
        match environment {
            PartnerEnvironment::Sandbox => {
                self.sandbox = Some(endpoint);
                self.partners.sandbox = Some(gateway);
            }
            PartnerEnvironment::Production => {
                self.production = Some(endpoint);
                self.partners.production = Some(gateway);
            }
        }
        self
    }

    /// The endpoint for `environment`, if enabled.
    #[must_use]
    pub fn partner(&self, environment: PartnerEnvironment) -> Option<&PartnerEndpoint> {
        match environment {
            PartnerEnvironment::Sandbox => self.sandbox.as_ref(),
            PartnerEnvironment::Production => self.production.as_ref(),
        }
    }

    /// Gateways for every enabled environment.
    #[must_use]
    pub fn partners(&self) -> &PartnerGateways {
        &self.partners
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("persist_retry", &self.persist_retry)
            .field("partners", &self.partners)
            .finish_non_exhaustive()
    }
}
