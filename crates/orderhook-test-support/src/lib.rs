//! Shared test doubles for the orderhook webhook service.

mod clock;
mod partner;
mod store;

pub use clock::FixedClock;
pub use partner::{PartnerCall, RecordingPartner};
pub use store::{FailingOrderStore, FlakyOrderStore};
