use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    CredentialManager, CredentialProvider, CredentialSource, SessionContext, SessionSnapshot,
};
use crate::engine::QueryEngine;
use crate::error::{LoadError, QueryError, Result};
use crate::models::{Dataset, Query};

/// Retry and timeout settings for the loader
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Refresh-and-retry cycles allowed per `load` call on UNAUTHENTICATED
    pub max_auth_retries: u32,

    /// Upper bound on a single engine call
    pub query_timeout: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_auth_retries: 1,
            query_timeout: Duration::from_secs(300),
        }
    }
}

/// Loads datasets through a query engine with transparent credential refresh.
///
/// An `UNAUTHENTICATED` failure triggers a refresh of the bearer token and a
/// retry of the identical query, at most `max_auth_retries` times per call.
/// Every other failure is returned unchanged. Service-account tokens are not
/// refreshed on failure; they are re-minted before a call once expired.
pub struct AuthenticatedLoader<E> {
    engine: E,
    credentials: CredentialManager,
    settings: LoaderSettings,
}

impl<E: QueryEngine> AuthenticatedLoader<E> {
    /// Acquire credentials and build the loader.
    /// Credential failures are fatal and surface as [`LoadError::Credential`].
    pub async fn connect(
        engine: E,
        provider: &dyn CredentialProvider,
        source: &CredentialSource,
        session: Arc<SessionContext>,
        settings: LoaderSettings,
    ) -> Result<Self> {
        let credentials = CredentialManager::connect(provider, source, session).await?;
        Ok(Self::new(engine, credentials, settings))
    }

    pub fn new(engine: E, credentials: CredentialManager, settings: LoaderSettings) -> Self {
        Self {
            engine,
            credentials,
            settings,
        }
    }

    /// Run `query`, refreshing credentials and retrying on UNAUTHENTICATED
    pub async fn load(&self, query: &Query) -> Result<Dataset> {
        let mut retries = 0;

        loop {
            self.credentials.ensure_fresh().await?;

            // Token and generation in one read, so a rejection is charged to the token sent
            let auth = self.credentials.session().snapshot().await;

            let message = match self.execute(query, &auth).await {
                Ok(dataset) => return Ok(dataset),
                Err(LoadError::Query(QueryError::Unauthenticated(message))) => message,
                Err(e) => return Err(e),
            };

            if retries >= self.settings.max_auth_retries {
                tracing::warn!(
                    retries,
                    collection = %query.collection,
                    "Still UNAUTHENTICATED after refreshing credentials, giving up"
                );
                return Err(QueryError::Unauthenticated(message).into());
            }

            tracing::warn!(
                collection = %query.collection,
                "Received UNAUTHENTICATED, refreshing credentials and retrying..."
            );

            if !self.credentials.refresh_after(auth.generation).await? {
                tracing::debug!("Credentials cannot be refreshed, returning original error");
                return Err(QueryError::Unauthenticated(message).into());
            }

            retries += 1;
        }
    }

    /// Force a credential refresh. `Ok(false)` when credentials are not refreshable.
    pub async fn refresh(&self) -> Result<bool> {
        self.credentials.refresh().await
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    async fn execute(&self, query: &Query, auth: &SessionSnapshot) -> Result<Dataset> {
        match tokio::time::timeout(self.settings.query_timeout, self.engine.load(query, auth))
            .await
        {
            Ok(result) => result.map_err(LoadError::from),
            Err(_) => {
                tracing::error!(
                    timeout = ?self.settings.query_timeout,
                    collection = %query.collection,
                    "Query timed out"
                );
                Err(LoadError::Timeout(self.settings.query_timeout))
            }
        }
    }
}
