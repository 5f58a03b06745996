//! Photo library service: serial task executor, index tracking and indexing.

pub mod api;
pub mod config;
pub mod dateindex;
pub mod error;
pub mod geocoding;
pub mod importer;
pub mod index;
pub mod library;
pub mod store;
pub mod tasks;

pub use error::{Error, Result};
