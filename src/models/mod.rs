// Data models
// Query parameters, loaded datasets and Earth Engine REST wire types

pub mod dataset;
pub mod earth_engine;
pub mod query;

pub use dataset::{Dataset, ImageRecord};
pub use query::{BoundingBox, Query};
