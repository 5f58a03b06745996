//! Persistence layer: libSQL-backed namespaced key-value storage.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{KvStore, UpdateFn};
