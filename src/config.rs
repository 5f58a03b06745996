//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Service configuration, read from `PHOTOS_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Library base directory. Photo files live under `photos/`.
    pub library_dir: PathBuf,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// HTTP port.
    pub port: u16,
    /// Submission queue capacity (0 = unbounded).
    pub queue_capacity: usize,
    /// Periodic backlog catch-up interval (None = disabled).
    pub reindex_interval: Option<Duration>,
    /// How long shutdown waits for in-flight work.
    pub shutdown_timeout: Duration,
    /// Reverse geocoding endpoint.
    pub geocoder_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let library_dir = PathBuf::from("./gophotos");
        Self {
            db_path: library_dir.join("photos.db"),
            library_dir,
            port: 8080,
            queue_capacity: 0,
            reindex_interval: None,
            shutdown_timeout: Duration::from_secs(5),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let library_dir = lookup("PHOTOS_LIBRARY_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.library_dir);
        let db_path = lookup("PHOTOS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| library_dir.join("photos.db"));

        let port = parse_var(&lookup, "PHOTOS_PORT")?.unwrap_or(defaults.port);
        let queue_capacity =
            parse_var(&lookup, "PHOTOS_QUEUE_CAPACITY")?.unwrap_or(defaults.queue_capacity);
        let reindex_interval = parse_var::<u64>(&lookup, "PHOTOS_REINDEX_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let shutdown_timeout = parse_var(&lookup, "PHOTOS_SHUTDOWN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);
        let geocoder_url = lookup("PHOTOS_GEOCODER_URL").unwrap_or(defaults.geocoder_url);

        Ok(Self {
            library_dir,
            db_path,
            port,
            queue_capacity,
            reindex_interval,
            shutdown_timeout,
            geocoder_url,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
