//! Housekeeping for the delivery log.

use std::time::Duration;

use chrono::TimeDelta;
use orderhook_core::clock::Clock;
use orderhook_core::error::DomainError;
use orderhook_core::repository::OrderStore;
use tracing::{info, instrument};

/// Removes delivery keys older than `retention`.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `retention` does not fit a timestamp
/// offset, and `DomainError::Infrastructure` if the store fails.
#[instrument(skip(clock, store))]
pub async fn prune_processed_deliveries(
    clock: &dyn Clock,
    store: &dyn OrderStore,
    retention: Duration,
) -> Result<u64, DomainError> {
    let retention = TimeDelta::from_std(retention)
        .map_err(|e| DomainError::Validation(format!("invalid delivery retention: {e}")))?;
    let cutoff = clock.now() - retention;

    let removed = store.prune_deliveries(cutoff).await?;
    info!(removed, %cutoff, "pruned processed deliveries");
    Ok(removed)
}
