//! Index tracking model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::library::PhotoId;

/// Identifier of a derived index, e.g. `date` or `geo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IndexName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Semantics version of an index computation. Bumping it marks every item stale.
pub type IndexVersion = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexStatus {
    #[default]
    NotIndexed,
    Indexed,
    ErrorOnIndex,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotIndexed => "not_indexed",
            Self::Indexed => "indexed",
            Self::ErrorOnIndex => "error_on_index",
        };
        write!(f, "{s}")
    }
}

/// Status of one index for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexEntry {
    pub status: IndexStatus,
    pub version: IndexVersion,
}

impl IndexEntry {
    pub fn new(status: IndexStatus, version: IndexVersion) -> Self {
        Self { status, version }
    }
}

/// Per-item map of index name to status. Absent names read as `NotIndexed@0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexState(BTreeMap<IndexName, IndexEntry>);

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_for(&self, name: &IndexName) -> IndexEntry {
        self.0.get(name).copied().unwrap_or_default()
    }

    pub fn set(&mut self, name: IndexName, status: IndexStatus, version: IndexVersion) {
        self.0.insert(name, IndexEntry::new(status, version));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&IndexName, &IndexEntry)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Snapshot of one tracked item, as returned by backlog scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    pub id: PhotoId,
    pub state: IndexState,
}
