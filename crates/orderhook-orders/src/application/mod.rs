//! Application layer for the Orders context.

pub mod command_handlers;
pub mod dispatcher;
pub mod maintenance;
pub mod query_handlers;
