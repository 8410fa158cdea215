//! # TourGen Common Library
//!
//! Shared code for the TourGen crates:
//! - Error type shared by configuration and geodesy helpers
//! - Configuration file discovery and TOML loading
//! - Geodesy helpers (coordinate validation, distances, bounding boxes, offsets)
//! - Text normalization used for dedup and persistence keys

pub mod config;
pub mod error;
pub mod geo;
pub mod text;

pub use error::{Error, Result};
pub use geo::{BoundingBox, GeoPoint};
