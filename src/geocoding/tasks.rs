//! `geoResolve` task.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::geocoding::Geocoder;
use crate::library::{Coordinates, PhotoId, PhotoLibrary};
use crate::tasks::{
    Task, TaskContext, TaskExecutor, TaskRegistry, decode_parameters, encode_parameters,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoLookupParams {
    #[serde(rename = "photoID")]
    photo_id: PhotoId,
    gps: Coordinates,
}

/// Resolves and stores the address of one photo.
pub struct GeoLookupTask {
    geocoder: Arc<Geocoder>,
    params: Option<GeoLookupParams>,
}

impl GeoLookupTask {
    pub const KIND: &'static str = "geoResolve";

    pub fn new(geocoder: Arc<Geocoder>) -> Self {
        Self {
            geocoder,
            params: None,
        }
    }

    pub fn with(geocoder: Arc<Geocoder>, photo_id: PhotoId, gps: Coordinates) -> Self {
        Self {
            geocoder,
            params: Some(GeoLookupParams { photo_id, gps }),
        }
    }
}

#[async_trait]
impl Task for GeoLookupTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn describe(&self) -> String {
        match &self.params {
            Some(p) => format!("Looking up location of photo {}", p.photo_id),
            None => "Looking up location of photo".to_string(),
        }
    }

    fn parameters(&self) -> serde_json::Value {
        encode_parameters(&self.params)
    }

    fn configure(&mut self, parameters: serde_json::Value) -> Result<(), TaskError> {
        self.params = Some(decode_parameters(Self::KIND, parameters)?);
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        _executor: &dyn TaskExecutor,
        _library: &dyn PhotoLibrary,
    ) -> crate::Result<()> {
        let params = self.params.as_ref().ok_or_else(|| TaskError::InvalidParameters {
            name: Self::KIND.to_string(),
            reason: "missing photoID and gps".to_string(),
        })?;
        self.geocoder
            .resolve_and_store_location(ctx.cancellation(), &params.photo_id, params.gps)
            .await?;
        Ok(())
    }
}

pub fn register_tasks(geocoder: &Arc<Geocoder>, registry: &mut TaskRegistry) -> Result<(), TaskError> {
    let geocoder = geocoder.clone();
    registry.register(
        GeoLookupTask::KIND,
        Arc::new(move || Box::new(GeoLookupTask::new(geocoder.clone())) as Box<dyn Task>),
    )
}
