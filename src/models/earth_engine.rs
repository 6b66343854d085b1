// Earth Engine REST API wire types (listImages)

use serde::Deserialize;

/// `projects.assets.listImages` response page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListImagesResponse {
    #[serde(default)]
    pub images: Vec<EeImage>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Image asset as returned by Earth Engine
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EeImage {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub bands: Vec<EeBand>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
    #[serde(default)]
    pub size_bytes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EeBand {
    pub id: String,
}
