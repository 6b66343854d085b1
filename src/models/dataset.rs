// Loaded dataset returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::earth_engine::EeImage;

/// Metadata for one image in a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bands: Vec<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub size_bytes: Option<u64>,
}

impl From<EeImage> for ImageRecord {
    fn from(image: EeImage) -> Self {
        let id = image
            .id
            .unwrap_or_else(|| asset_id_from_name(&image.name).to_string());

        Self {
            id,
            start_time: image.start_time.as_deref().and_then(parse_timestamp),
            end_time: image.end_time.as_deref().and_then(parse_timestamp),
            bands: image.bands.into_iter().map(|b| b.id).collect(),
            properties: image.properties.unwrap_or(serde_json::Value::Null),
            size_bytes: image.size_bytes.and_then(|s| s.parse().ok()),
            name: image.name,
        }
    }
}

/// Result of a load: the images of a collection matching a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub collection: String,
    pub images: Vec<ImageRecord>,
}

impl Dataset {
    pub fn new(collection: impl Into<String>, images: Vec<ImageRecord>) -> Self {
        Self {
            collection: collection.into(),
            images,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Earliest start and latest end time across all images
    pub fn time_extent(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.images.iter().filter_map(|i| i.start_time).min()?;
        let end = self
            .images
            .iter()
            .filter_map(|i| i.end_time.or(i.start_time))
            .max()?;
        Some((start, end))
    }
}

/// Strip the `projects/<project>/assets/` prefix from a full asset name
fn asset_id_from_name(name: &str) -> &str {
    name.split_once("/assets/").map(|(_, id)| id).unwrap_or(name)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
