//! `KvStore` trait: the narrow durable-store interface the core depends on.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Read-modify-write callback for [`KvStore::update`].
///
/// Receives the current value (`None` if absent) and returns the value to store.
/// Returning an error aborts the transaction without writing.
pub type UpdateFn<'a> = dyn FnMut(Option<Vec<u8>>) -> Result<Vec<u8>, DatabaseError> + Send + 'a;

/// Transactional byte store partitioned into namespaces.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one value.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, DatabaseError>;

    /// Insert or overwrite one value.
    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), DatabaseError>;

    /// Remove one value. Returns whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, DatabaseError>;

    /// All entries of a namespace in key order.
    async fn scan(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, DatabaseError>;

    /// Atomic read-modify-write of one key within a single transaction.
    ///
    /// Returns the value written.
    async fn update(
        &self,
        namespace: &str,
        key: &str,
        f: &mut UpdateFn<'_>,
    ) -> Result<Vec<u8>, DatabaseError>;
}
