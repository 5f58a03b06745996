//! Direct "date" index: photos grouped by the day they were taken.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::index::DirectIndex;
use crate::index::model::IndexVersion;
use crate::library::{Photo, PhotoId};
use crate::store::KvStore;

pub const DATES_NAMESPACE: &str = "dates";

pub struct DateIndex {
    store: Arc<dyn KvStore>,
}

impl DateIndex {
    pub const NAME: &'static str = "date";
    pub const VERSION: IndexVersion = 1;

    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(day: NaiveDate, id: &PhotoId) -> String {
        format!("{}/{}", day.format("%Y-%m-%d"), id)
    }

    /// Ids of photos taken on `day`, in id order.
    pub async fn photos_on(&self, day: NaiveDate) -> crate::Result<Vec<PhotoId>> {
        let prefix = format!("{}/", day.format("%Y-%m-%d"));
        Ok(self
            .store
            .scan(DATES_NAMESPACE)
            .await?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&prefix).map(PhotoId::from))
            .collect())
    }
}

#[async_trait]
impl DirectIndex for DateIndex {
    async fn index(&self, photo: &Photo) -> crate::Result<()> {
        let key = Self::key(photo.date_taken.date_naive(), &photo.id);
        self.store
            .put(DATES_NAMESPACE, &key, photo.id.as_str().as_bytes().to_vec())
            .await?;
        Ok(())
    }
}
