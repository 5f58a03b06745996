//! Photo model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version written for newly added photos.
pub const CURRENT_SCHEMA: u32 = 3;

/// EXIF orientation for an upright image.
pub const DEFAULT_ORIENTATION: u8 = 1;

const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1e_2c7a_4b5d_4e8f_9a0b_1c2d_3e4f_5a6b);
const CONTENT_NAMESPACE: Uuid = Uuid::from_u128(0x0c9b_8a7f_6e5d_4c3b_2a19_0807_0605_0403);

/// Stable photo identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(String);

impl PhotoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhotoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// GPS position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    #[serde(rename = "long")]
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Supported media formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Heic,
}

impl Format {
    /// Recognise a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "heic" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Canonical extension used inside the library.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Heic => "heic",
        }
    }
}

/// Description of a photo about to be added.
#[derive(Debug, Clone)]
pub struct PhotoSource {
    /// File name without extension.
    pub name: String,
    pub date_taken: DateTime<Utc>,
    pub location: Option<Coordinates>,
    pub format: Format,
}

/// A photo stored in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: PhotoId,
    /// Path relative to the library's photo directory.
    pub path: PathBuf,
    pub date_taken: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinates>,
    pub format: Format,
    #[serde(default)]
    pub orientation: u8,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub schema: u32,
}

impl Photo {
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Sort order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Directory, file name and id a photo gets inside the library.
pub(crate) fn canonicalize(source: &PhotoSource) -> (PathBuf, String, PhotoId) {
    let dir = PathBuf::from(source.date_taken.format("%Y/%m/%d").to_string());
    let filename = format!("{}.{}", source.name, source.format.extension());
    let seed = format!(
        "{}{}",
        source.date_taken.to_rfc3339(),
        filename.to_lowercase()
    );
    let id = Uuid::new_v5(&ID_NAMESPACE, seed.as_bytes()).simple().to_string();
    (dir, filename, PhotoId(id))
}

/// Content fingerprint used for duplicate detection.
pub fn content_hash(content: &[u8]) -> String {
    Uuid::new_v5(&CONTENT_NAMESPACE, content).simple().to_string()
}
