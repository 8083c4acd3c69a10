//! orderhook core: shared order model and ports.
//!
//! This crate defines the order state machine, the traits the storage and
//! partner adapters implement, and the error and retry types every other
//! crate depends on. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod order;
pub mod partner;
pub mod repository;
pub mod retry;
pub mod secret;
