//! Orders bounded context.
//!
//! Turns verified partner webhook payloads into order events, dispatches
//! them against the order store, and runs operator commands that need a
//! round trip to the partner.

pub mod application;
pub mod domain;
