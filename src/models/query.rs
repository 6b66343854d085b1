// Query parameters for a dataset load

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

/// Geographic bounding box in longitude/latitude degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, String> {
        if !(min_x < max_x && min_y < max_y) {
            return Err(format!(
                "Invalid bounding box: min must be below max ({},{},{},{})",
                min_x, min_y, max_x, max_y
            ));
        }
        if min_x < -180.0 || max_x > 180.0 || min_y < -90.0 || max_y > 90.0 {
            return Err("Bounding box must lie within [-180,180] x [-90,90]".to_string());
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Closed GeoJSON polygon ring, counter-clockwise
    pub fn to_geojson(&self) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [self.min_x, self.min_y],
                [self.max_x, self.min_y],
                [self.max_x, self.max_y],
                [self.min_x, self.max_y],
                [self.min_x, self.min_y],
            ]]
        })
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    /// Parse `min_x,min_y,max_x,max_y`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Invalid bounding box '{}': {}", s, e))?;

        match parts.as_slice() {
            [min_x, min_y, max_x, max_y] => Self::new(*min_x, *min_y, *max_x, *max_y),
            _ => Err(format!(
                "Invalid bounding box '{}': expected min_x,min_y,max_x,max_y",
                s
            )),
        }
    }
}

/// A dataset query against an image collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Collection asset id, e.g. `COPERNICUS/S2_SR` or a full `projects/.../assets/...` name
    pub collection: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bbox: Option<BoundingBox>,
    /// Earth Engine list filter expression, e.g. `CLOUDY_PIXEL_PERCENTAGE < 10`
    pub filter: Option<String>,
    /// Maximum number of images to return
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            start_time: None,
            end_time: None,
            bbox: None,
            filter: None,
            limit: None,
        }
    }

    pub fn with_time_range(
        mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string parameters for `listImages` (paging excluded)
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start_time {
            params.push(("startTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(end) = self.end_time {
            params.push(("endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(ref bbox) = self.bbox {
            params.push(("region", bbox.to_geojson().to_string()));
        }
        if let Some(ref filter) = self.filter {
            params.push(("filter", filter.clone()));
        }
        params
    }
}
