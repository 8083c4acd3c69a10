//! Domain layer for the Orders context.

pub mod commands;
pub mod events;
