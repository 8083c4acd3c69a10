//! orderhook HTTP server library.
//!
//! Exposes the router, configuration, state and telemetry setup so that
//! `main.rs` and the integration tests assemble the same application.

pub mod config;
pub mod error;
pub mod routes;
pub mod signature;
pub mod state;
pub mod telemetry;
