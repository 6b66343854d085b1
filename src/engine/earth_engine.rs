use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

use super::QueryEngine;
use crate::auth::SessionSnapshot;
use crate::error::QueryError;
use crate::models::earth_engine::ListImagesResponse;
use crate::models::{Dataset, ImageRecord, Query};

/// Connection settings for the Earth Engine REST API
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// API root, e.g. `https://earthengine-highvolume.googleapis.com/v1`
    pub base_url: String,
    /// Project that public collection ids resolve under
    pub project: String,
    pub page_size: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Extra PEM root certificates to trust
    pub ca_bundle: Option<PathBuf>,
}

/// Earth Engine REST client listing collection images
pub struct EarthEngineClient {
    /// Shared HTTP client with connection pooling
    client: Client,
    settings: EngineSettings,
}

impl EarthEngineClient {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout);

        if let Some(ref path) = settings.ca_bundle {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read CA bundle: {}", path.display()))?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .with_context(|| format!("Invalid CA bundle: {}", path.display()))?;
            tracing::debug!("Trusting {} certificates from {}", certs.len(), path.display());
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client, settings })
    }

    /// Full `listImages` URL for a collection
    fn list_images_url(&self, collection: &str) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        if collection.starts_with("projects/") {
            format!("{}/{}:listImages", base, collection)
        } else {
            format!(
                "{}/projects/{}/assets/{}:listImages",
                base, self.settings.project, collection
            )
        }
    }

    async fn fetch_page(
        &self,
        url: &str,
        query: &Query,
        page_size: u32,
        page_token: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<ListImagesResponse, QueryError> {
        let mut request = self
            .client
            .get(url)
            .query(&query.to_params())
            .query(&[("pageSize", page_size.to_string())]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        tracing::debug!(url = %url, page_token = ?page_token, "Sending listImages request");

        let response = request.send().await.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else {
                "request_error"
            };
            tracing::warn!(error_kind, error = %e, url = %url, "HTTP request error");
            QueryError::from_io_message(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                "Earth Engine request failed"
            );
            return Err(QueryError::from_status(status.as_u16(), error_text));
        }

        response
            .json::<ListImagesResponse>()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QueryEngine for EarthEngineClient {
    async fn load(&self, query: &Query, auth: &SessionSnapshot) -> Result<Dataset, QueryError> {
        let url = self.list_images_url(&query.collection);
        let bearer = auth.bearer_token.as_deref();
        let limit = query.limit.unwrap_or(usize::MAX);

        let mut images: Vec<ImageRecord> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = limit - images.len();
            let page_size = self
                .settings
                .page_size
                .min(u32::try_from(remaining).unwrap_or(u32::MAX))
                .max(1);

            let page = self
                .fetch_page(
                    &url,
                    query,
                    page_size,
                    page_token.as_deref(),
                    bearer,
                )
                .await?;

            images.extend(page.images.into_iter().map(ImageRecord::from));

            if images.len() >= limit {
                images.truncate(limit);
                break;
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(
            collection = %query.collection,
            images = images.len(),
            "Loaded dataset"
        );

        Ok(Dataset::new(query.collection.clone(), images))
    }
}
