//! Reverse geocoding and the deferred "geo" index.

pub mod nominatim;
pub mod tasks;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DatabaseError, GeocodeError};
use crate::index::DeferredIndex;
use crate::index::model::IndexVersion;
use crate::library::{Coordinates, Photo, PhotoId, PhotoLibrary};
use crate::store::KvStore;
use crate::tasks::TaskContext;

pub use nominatim::NominatimProvider;
pub use tasks::{GeoLookupTask, register_tasks};

pub const GEO_NAMESPACE: &str = "geo";

/// Resolved postal address of a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postcode: String,
}

/// Coordinates to address lookup.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> Result<Address, GeocodeError>;
}

/// Resolves photo locations and stores the addresses.
pub struct Geocoder {
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn KvStore>,
}

impl Geocoder {
    pub const INDEX: &'static str = "geo";
    pub const VERSION: IndexVersion = 1;

    pub fn new(provider: Arc<dyn LocationProvider>, store: Arc<dyn KvStore>) -> Self {
        Self { provider, store }
    }

    /// Look up `coordinates` and store the address for `id`.
    ///
    /// Returns [`GeocodeError::Cancelled`] without calling the provider once
    /// `cancel` has fired, or if it fires during the lookup.
    pub async fn resolve_and_store_location(
        &self,
        cancel: &CancellationToken,
        id: &PhotoId,
        coordinates: Coordinates,
    ) -> crate::Result<Address> {
        if cancel.is_cancelled() {
            return Err(GeocodeError::Cancelled.into());
        }
        let address = tokio::select! {
            _ = cancel.cancelled() => return Err(GeocodeError::Cancelled.into()),
            result = self.provider.reverse(coordinates) => result?,
        };

        let bytes = serde_json::to_vec(&address)
            .map_err(|e| DatabaseError::Serialization(format!("address of {id}: {e}")))?;
        self.store.put(GEO_NAMESPACE, id.as_str(), bytes).await?;
        info!(photo = %id, address = %address.display_name, "Resolved location");
        Ok(address)
    }

    /// Stored address of a photo, if resolved.
    pub async fn location_of(&self, id: &PhotoId) -> crate::Result<Option<Address>> {
        match self.store.get(GEO_NAMESPACE, id.as_str()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                DatabaseError::Serialization(format!("address of {id}: {e}"))
            })?)),
            None => Ok(None),
        }
    }
}

/// Deferred "geo" index backed by a [`Geocoder`].
pub struct GeoIndex {
    geocoder: Arc<Geocoder>,
}

impl GeoIndex {
    pub fn new(geocoder: Arc<Geocoder>) -> Self {
        Self { geocoder }
    }
}

#[async_trait]
impl DeferredIndex for GeoIndex {
    async fn index(
        &self,
        ctx: &TaskContext,
        _library: &dyn PhotoLibrary,
        photo: &Photo,
    ) -> crate::Result<()> {
        let Some(coordinates) = photo.location else {
            debug!(photo = %photo.id, "No coordinates, nothing to resolve");
            return Ok(());
        };
        self.geocoder
            .resolve_and_store_location(ctx.cancellation(), &photo.id, coordinates)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Provider answering from a fixed address, or failing.
    #[derive(Default)]
    pub struct FixedProvider {
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationProvider for FixedProvider {
        async fn reverse(&self, coordinates: Coordinates) -> Result<Address, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeocodeError::Request("service unavailable".into()));
            }
            Ok(Address {
                display_name: format!("{:.1},{:.1}", coordinates.lat, coordinates.lon),
                country: "Switzerland".into(),
                country_code: "ch".into(),
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use uuid::Uuid;

    use super::testing::FixedProvider;
    use super::*;
    use crate::library::Format;
    use crate::store::LibSqlStore;
    use crate::tasks::testing::test_library;

    async fn geocoder(fail: bool) -> (Arc<FixedProvider>, Geocoder) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let provider = Arc::new(FixedProvider {
            fail,
            ..Default::default()
        });
        (provider.clone(), Geocoder::new(provider, store))
    }

    fn photo(location: Option<Coordinates>) -> Photo {
        Photo {
            id: PhotoId::new("p1"),
            path: "2024/01/01/p1.jpg".into(),
            date_taken: Utc::now(),
            location,
            format: Format::Jpeg,
            orientation: 1,
            size: 1,
            hash: "h".into(),
            schema: 3,
        }
    }

    #[tokio::test]
    async fn resolved_address_is_stored() {
        let (_provider, geocoder) = geocoder(false).await;
        let id = PhotoId::new("p1");
        let address = geocoder
            .resolve_and_store_location(&CancellationToken::new(), &id, Coordinates::new(46.5, 6.6))
            .await
            .unwrap();
        assert_eq!(address.country_code, "ch");
        assert_eq!(geocoder.location_of(&id).await.unwrap(), Some(address));
    }

    #[tokio::test]
    async fn cancelled_lookup_skips_provider() {
        let (provider, geocoder) = geocoder(false).await;
        let token = CancellationToken::new();
        token.cancel();
        let err = geocoder
            .resolve_and_store_location(&token, &PhotoId::new("p1"), Coordinates::new(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Geocode(GeocodeError::Cancelled)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn geo_index_without_coordinates_succeeds_without_lookup() {
        let (provider, geocoder) = geocoder(false).await;
        let (_dir, library) = test_library().await;
        let index = GeoIndex::new(Arc::new(geocoder));
        let ctx = TaskContext::new(Uuid::new_v4(), CancellationToken::new());

        index.index(&ctx, library.as_ref(), &photo(None)).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        index
            .index(&ctx, library.as_ref(), &photo(Some(Coordinates::new(1.0, 2.0))))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_reported() {
        let (_provider, geocoder) = geocoder(true).await;
        let (_dir, library) = test_library().await;
        let index = GeoIndex::new(Arc::new(geocoder));
        let ctx = TaskContext::new(Uuid::new_v4(), CancellationToken::new());
        let err = index
            .index(&ctx, library.as_ref(), &photo(Some(Coordinates::new(1.0, 2.0))))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Geocode(GeocodeError::Request(_))));
    }
}
