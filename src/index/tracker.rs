//! Durable per-photo index state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DatabaseError, IndexError};
use crate::index::model::{ElementState, IndexName, IndexState, IndexStatus, IndexVersion};
use crate::index::record;
use crate::library::PhotoId;
use crate::store::KvStore;

/// Store namespace holding one tracker record per photo.
pub const TRACKER_NAMESPACE: &str = "index_tracker";

/// Records which derived indexes exist, and at which version, for every photo.
#[async_trait]
pub trait IndexTracker: Send + Sync {
    /// Set the version currently expected for `name`.
    fn register_index(&self, name: IndexName, version: IndexVersion);

    fn registered_version(&self, name: &IndexName) -> Option<IndexVersion>;

    /// Registered indexes with their versions.
    fn registered(&self) -> Vec<(IndexName, IndexVersion)>;

    /// Record the outcome of indexing `id` with `name` at the registered version.
    async fn update(
        &self,
        name: &IndexName,
        id: &PhotoId,
        error: Option<&crate::Error>,
    ) -> crate::Result<()>;

    /// Stored state and whether the photo has ever been tracked.
    async fn get(&self, id: &PhotoId) -> crate::Result<(IndexState, bool)>;

    /// Registered indexes that are absent or older than registered.
    async fn get_missing_indexes(&self, id: &PhotoId) -> crate::Result<Vec<IndexName>>;

    /// Every tracked photo. Unreadable records are skipped.
    async fn get_element_status(&self) -> crate::Result<Vec<ElementState>>;
}

/// [`IndexTracker`] over a [`KvStore`] namespace.
pub struct StoreIndexTracker {
    store: Arc<dyn KvStore>,
    indexes: RwLock<BTreeMap<IndexName, IndexVersion>>,
}

impl StoreIndexTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    async fn load(&self, id: &PhotoId) -> Result<Option<IndexState>, DatabaseError> {
        match self.store.get(TRACKER_NAMESPACE, id.as_str()).await? {
            Some(bytes) => record::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IndexTracker for StoreIndexTracker {
    fn register_index(&self, name: IndexName, version: IndexVersion) {
        debug!(index = %name, version, "Registered index");
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, version);
    }

    fn registered_version(&self, name: &IndexName) -> Option<IndexVersion> {
        self.indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    fn registered(&self) -> Vec<(IndexName, IndexVersion)> {
        self.indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, version)| (name.clone(), *version))
            .collect()
    }

    async fn update(
        &self,
        name: &IndexName,
        id: &PhotoId,
        error: Option<&crate::Error>,
    ) -> crate::Result<()> {
        let version = self
            .registered_version(name)
            .ok_or_else(|| IndexError::UnknownIndex(name.to_string()))?;
        let status = match error {
            Some(e) => {
                debug!(index = %name, photo = %id, error = %e, "Recording index failure");
                IndexStatus::ErrorOnIndex
            }
            None => IndexStatus::Indexed,
        };

        let mut apply = |current: Option<Vec<u8>>| -> Result<Vec<u8>, DatabaseError> {
            let mut state = match current.map(|bytes| record::decode(&bytes)) {
                Some(Ok(state)) => state,
                Some(Err(e)) => {
                    warn!(photo = %id, error = %e, "Replacing malformed index record");
                    IndexState::new()
                }
                None => IndexState::new(),
            };
            state.set(name.clone(), status, version);
            record::encode(&state)
        };
        self.store
            .update(TRACKER_NAMESPACE, id.as_str(), &mut apply)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &PhotoId) -> crate::Result<(IndexState, bool)> {
        Ok(match self.load(id).await? {
            Some(state) => (state, true),
            None => (IndexState::new(), false),
        })
    }

    async fn get_missing_indexes(&self, id: &PhotoId) -> crate::Result<Vec<IndexName>> {
        let state = self.load(id).await?.unwrap_or_default();
        Ok(self
            .registered()
            .into_iter()
            .filter(|(name, version)| {
                let entry = state.status_for(name);
                entry.status == IndexStatus::NotIndexed || entry.version < *version
            })
            .map(|(name, _)| name)
            .collect())
    }

    async fn get_element_status(&self) -> crate::Result<Vec<ElementState>> {
        let entries = self.store.scan(TRACKER_NAMESPACE).await?;
        let mut elements = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match record::decode(&bytes) {
                Ok(state) => elements.push(ElementState {
                    id: PhotoId::new(key),
                    state,
                }),
                Err(e) => warn!(photo = %key, error = %e, "Failed to decode index status"),
            }
        }
        Ok(elements)
    }
}
