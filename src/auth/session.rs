// Session authentication context
// Explicit replacement for process-wide environment variables

use std::path::PathBuf;
use tokio::sync::RwLock;

/// Environment variable name the GDAL Earth Engine driver reads the bearer token from
pub const BEARER_ENV: &str = "EEDA_BEARER";

/// Environment variable name for the service-account key file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Authentication state as of one moment, handed to the query engine per call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub bearer_token: Option<String>,
    pub credentials_path: Option<PathBuf>,
    /// Generation of `bearer_token`
    pub generation: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    bearer_token: Option<String>,
    credentials_path: Option<PathBuf>,
    generation: u64,
}

/// Authentication context of a loader session.
///
/// Only the credential manager publishes into it. `generation` increases by
/// one each time a bearer token is published, which lets concurrent
/// refreshers detect that someone else already renewed the token. Query
/// engines see it through a [`SessionSnapshot`] so the token they send and
/// the generation the loader compares against are always the same pair.
#[derive(Debug, Default)]
pub struct SessionContext {
    state: RwLock<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently active bearer token
    pub async fn bearer_token(&self) -> Option<String> {
        self.state.read().await.bearer_token.clone()
    }

    /// Service-account key file activated for this session
    pub async fn credentials_path(&self) -> Option<PathBuf> {
        self.state.read().await.credentials_path.clone()
    }

    /// Number of bearer tokens published so far
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Token, credentials path and generation, read under one lock
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            bearer_token: state.bearer_token.clone(),
            credentials_path: state.credentials_path.clone(),
            generation: state.generation,
        }
    }

    /// Export as environment-variable pairs for child processes that follow
    /// the GDAL / Google SDK conventions
    pub async fn env_pairs(&self) -> Vec<(&'static str, String)> {
        let state = self.state.read().await;
        let mut pairs = Vec::new();
        if let Some(ref path) = state.credentials_path {
            pairs.push((CREDENTIALS_ENV, path.to_string_lossy().to_string()));
        }
        if let Some(ref token) = state.bearer_token {
            pairs.push((BEARER_ENV, token.clone()));
        }
        pairs
    }

    pub(crate) async fn publish_token(&self, token: String) -> u64 {
        let mut state = self.state.write().await;
        state.bearer_token = Some(token);
        state.generation += 1;
        state.generation
    }

    pub(crate) async fn set_credentials_path(&self, path: PathBuf) {
        let mut state = self.state.write().await;
        state.credentials_path = Some(path);
    }
}
