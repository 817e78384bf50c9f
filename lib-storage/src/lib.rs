//! Boson DHT storage layer.
//!
//! Defines the `DataStorage` contract every backend honors (monotonicity,
//! ownership, and expiration rules in one place), an in-memory backend for
//! single-process nodes, and a schema-migrated relational backend over
//! SQLite/PostgreSQL for nodes that need durable, queryable storage.

pub mod contract;
pub mod error;
pub mod memory;
pub mod migrator;
pub mod relational;

pub use contract::{validate_put, validate_put_peer, DataStorage, Lifecycle};
pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use migrator::Migration;
pub use relational::RelationalStorage;
