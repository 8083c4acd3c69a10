//! orderhook store: `OrderStore` adapters.
//!
//! `PgOrderStore` is the production adapter. `InMemoryOrderStore` backs local
//! runs without a database and the test suites.

pub mod memory_order_store;
pub mod pg_order_store;

pub use memory_order_store::InMemoryOrderStore;
pub use pg_order_store::{MIGRATOR, PgOrderStore};
