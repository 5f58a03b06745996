//! libSQL backend: async `KvStore` implementation.
//!
//! Supports local file and in-memory databases. Every operation holds the
//! store lock, so a read-modify-write transaction never interleaves with
//! another statement on the shared connection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, TransactionBehavior, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{KvStore, UpdateFn};

/// libSQL-backed key-value store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::with_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::with_database(db).await
    }

    async fn with_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        })
    }
}

async fn read_value(
    conn: &Connection,
    namespace: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("get {namespace}/{key}: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => {
            let value: Vec<u8> = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("get {namespace}/{key} row parse: {e}")))?;
            Ok(Some(value))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("get {namespace}/{key}: {e}"))),
    }
}

async fn write_value(
    conn: &Connection,
    namespace: &str,
    key: &str,
    value: Vec<u8>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO kv (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![namespace, key, value],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("put {namespace}/{key}: {e}")))?;
    Ok(())
}

#[async_trait]
impl KvStore for LibSqlStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        let _guard = self.lock.lock().await;
        read_value(&self.conn, namespace, key).await
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), DatabaseError> {
        let _guard = self.lock.lock().await;
        write_value(&self.conn, namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, DatabaseError> {
        let _guard = self.lock.lock().await;
        let affected = self
            .conn
            .execute(
                "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete {namespace}/{key}: {e}")))?;
        Ok(affected > 0)
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, DatabaseError> {
        let _guard = self.lock.lock().await;
        let mut rows = self
            .conn
            .query(
                "SELECT key, value FROM kv WHERE namespace = ?1 ORDER BY key",
                params![namespace],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("scan {namespace}: {e}")))?;

        let mut entries = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let key: String = row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("scan {namespace} key: {e}")))?;
                    let value: Vec<u8> = row
                        .get(1)
                        .map_err(|e| DatabaseError::Query(format!("scan {namespace} value: {e}")))?;
                    entries.push((key, value));
                }
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("scan {namespace}: {e}"))),
            }
        }
        Ok(entries)
    }

    async fn update(
        &self,
        namespace: &str,
        key: &str,
        f: &mut UpdateFn<'_>,
    ) -> Result<Vec<u8>, DatabaseError> {
        let _guard = self.lock.lock().await;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| DatabaseError::Query(format!("begin update {namespace}/{key}: {e}")))?;

        let result = match read_value(&tx, namespace, key).await.and_then(|current| f(current)) {
            Ok(next) => write_value(&tx, namespace, key, next.clone())
                .await
                .map(|()| next),
            Err(e) => Err(e),
        };

        match result {
            Ok(next) => {
                tx.commit().await.map_err(|e| {
                    DatabaseError::Query(format!("commit update {namespace}/{key}: {e}"))
                })?;
                debug!(namespace, key, "Updated entry");
                Ok(next)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(namespace, key, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.get("ns", "a").await.unwrap().is_none());

        store.put("ns", "a", b"one".to_vec()).await.unwrap();
        store.put("ns", "a", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("ns", "a").await.unwrap(), Some(b"two".to_vec()));

        assert!(store.delete("ns", "a").await.unwrap());
        assert!(!store.delete("ns", "a").await.unwrap());
        assert!(store.get("ns", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_is_namespaced_and_ordered() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.put("photos", "b", b"2".to_vec()).await.unwrap();
        store.put("photos", "a", b"1".to_vec()).await.unwrap();
        store.put("other", "c", b"3".to_vec()).await.unwrap();

        let entries = store.scan("photos").await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn update_sees_current_value() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut append = |current: Option<Vec<u8>>| -> Result<Vec<u8>, DatabaseError> {
            let mut value = current.unwrap_or_default();
            value.push(b'x');
            Ok(value)
        };
        store.update("ns", "k", &mut append).await.unwrap();
        let written = store.update("ns", "k", &mut append).await.unwrap();
        assert_eq!(written, b"xx".to_vec());
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(b"xx".to_vec()));
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.put("ns", "k", b"keep".to_vec()).await.unwrap();

        let mut fail = |_: Option<Vec<u8>>| -> Result<Vec<u8>, DatabaseError> {
            Err(DatabaseError::Serialization("boom".into()))
        };
        assert!(store.update("ns", "k", &mut fail).await.is_err());
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(b"keep".to_vec()));

        // The store is still usable after the rollback.
        store.put("ns", "k", b"next".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut incr = |current: Option<Vec<u8>>| -> Result<Vec<u8>, DatabaseError> {
                    let n = current.map(|v| v[0]).unwrap_or(0);
                    Ok(vec![n + 1])
                };
                store.update("ns", "counter", &mut incr).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("ns", "counter").await.unwrap(), Some(vec![20]));
    }
}
