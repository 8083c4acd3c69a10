//! orderhook partner: client for the delivery partner's Orders API.
//!
//! Authenticates with OAuth2 client credentials, caches the bearer token,
//! and retries transient failures with backoff. Non-retryable 4xx answers
//! are returned as [`orderhook_core::error::PartnerError::Rejected`].

pub mod client;
mod token;

pub use client::{HttpPartnerClient, PartnerClientConfig};
