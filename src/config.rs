use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{CredentialSource, OAuthSettings, EARTH_ENGINE_SCOPES};
use crate::engine::EngineSettings;
use crate::loader::LoaderSettings;
use crate::models::{BoundingBox, Query};

/// CA bundle used when CURL_CA_BUNDLE is not set
const DEFAULT_CA_BUNDLE: &str = "/etc/ssl/certs/ca-certificates.crt";

/// odc-gee - load Earth Engine collections with automatic credential refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Collection asset id (e.g. COPERNICUS/S2_SR)
    #[arg(short, long)]
    pub collection: String,

    /// Start of the time range (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End of the time range (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Bounding box as min_x,min_y,max_x,max_y in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// Earth Engine filter expression
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Maximum number of images to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Path to a service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<String>,

    /// Earth Engine REST API root
    #[arg(
        long,
        env = "EE_API_URL",
        default_value = "https://earthengine-highvolume.googleapis.com/v1"
    )]
    pub api_url: String,

    /// Project that collection ids resolve under
    #[arg(long, env = "EE_PROJECT", default_value = "earthengine-public")]
    pub project: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "300")]
    pub http_timeout: u64,

    /// Refresh-and-retry cycles allowed on UNAUTHENTICATED
    #[arg(long, env = "AUTH_MAX_RETRIES", default_value = "1")]
    pub auth_retries: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Query
    pub collection: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bbox: Option<BoundingBox>,
    pub filter: Option<String>,
    pub limit: Option<usize>,

    // Credentials
    pub service_account_key: PathBuf,
    pub user_credentials_file: PathBuf,
    pub oauth_token_url: String,
    pub oauth_auth_url: String,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_redirect_uri: String,
    pub auth_max_retries: u32,

    // Earth Engine API
    pub api_url: String,
    pub project: String,
    pub page_size: u32,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub ca_bundle: Option<PathBuf>,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments, reading the remaining settings from the environment
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let service_account_key = args
            .credentials
            .map(|s| expand_tilde(&s))
            .or_else(|| dirs::home_dir().map(|h| h.join(".config/odc-gee/credentials.json")))
            .context("Cannot determine the service account key path; set GOOGLE_APPLICATION_CREDENTIALS")?;

        let user_credentials_file = std::env::var("EE_CREDENTIALS_FILE")
            .ok()
            .map(|s| expand_tilde(&s))
            .or_else(|| dirs::home_dir().map(|h| h.join(".config/earthengine/credentials")))
            .context("Cannot determine the Earth Engine credentials path; set EE_CREDENTIALS_FILE")?;

        let config = Config {
            collection: args.collection,
            start_time: args
                .start
                .as_deref()
                .map(parse_datetime)
                .transpose()
                .context("Invalid --start")?,
            end_time: args
                .end
                .as_deref()
                .map(parse_datetime)
                .transpose()
                .context("Invalid --end")?,
            bbox: args
                .bbox
                .as_deref()
                .map(|s| s.parse::<BoundingBox>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
            filter: args.filter,
            limit: args.limit,

            service_account_key,
            user_credentials_file,
            oauth_token_url: std::env::var("EE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            oauth_auth_url: std::env::var("EE_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/auth".to_string()),
            oauth_client_id: std::env::var("EE_CLIENT_ID").ok(),
            oauth_client_secret: std::env::var("EE_CLIENT_SECRET").ok(),
            oauth_redirect_uri: std::env::var("EE_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8085".to_string()),
            auth_max_retries: args.auth_retries,

            api_url: args.api_url,
            project: args.project,
            page_size: std::env::var("EE_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            http_request_timeout: args.http_timeout,
            ca_bundle: resolve_ca_bundle(std::env::var("CURL_CA_BUNDLE").ok()),

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            anyhow::bail!("Collection id must not be empty");
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if self.page_size == 0 {
            anyhow::bail!("EE_PAGE_SIZE must be greater than zero");
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                anyhow::bail!("Start time {} is after end time {}", start, end);
            }
        }

        if let Some(ref path) = self.ca_bundle {
            if !path.exists() {
                anyhow::bail!("CURL_CA_BUNDLE does not exist: {}", path.display());
            }
        }

        Ok(())
    }

    pub fn credential_source(&self) -> CredentialSource {
        CredentialSource::KeyFile(self.service_account_key.clone())
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            token_url: self.oauth_token_url.clone(),
            auth_url: self.oauth_auth_url.clone(),
            client_id: self.oauth_client_id.clone(),
            client_secret: self.oauth_client_secret.clone(),
            redirect_uri: self.oauth_redirect_uri.clone(),
            scopes: EARTH_ENGINE_SCOPES.iter().map(|s| s.to_string()).collect(),
            credentials_file: self.user_credentials_file.clone(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            base_url: self.api_url.clone(),
            project: self.project.clone(),
            page_size: self.page_size,
            connect_timeout: Duration::from_secs(self.http_connect_timeout),
            request_timeout: Duration::from_secs(self.http_request_timeout),
            ca_bundle: self.ca_bundle.clone(),
        }
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            max_auth_retries: self.auth_max_retries,
            query_timeout: Duration::from_secs(self.http_request_timeout),
        }
    }

    pub fn query(&self) -> Query {
        let mut query =
            Query::new(self.collection.clone()).with_time_range(self.start_time, self.end_time);
        if let Some(bbox) = self.bbox {
            query = query.with_bbox(bbox);
        }
        if let Some(ref filter) = self.filter {
            query = query.with_filter(filter.clone());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        query
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Explicit bundle if given, otherwise the system bundle when present
fn resolve_ca_bundle(explicit: Option<String>) -> Option<PathBuf> {
    match explicit {
        Some(s) if !s.is_empty() => Some(expand_tilde(&s)),
        _ => {
            let default = PathBuf::from(DEFAULT_CA_BUNDLE);
            default.exists().then_some(default)
        }
    }
}

/// Parse an RFC 3339 timestamp or a plain date (midnight UTC)
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse datetime: {}", s))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .with_context(|| format!("Failed to parse datetime: {}", s))
}
