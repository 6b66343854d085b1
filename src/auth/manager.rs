use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::session::SessionContext;
use super::types::{Credential, CredentialProvider, CredentialSource, MintHandle, RefreshHandle};
use crate::error::{LoadError, Result};

/// Credential manager
/// Owns the session credential and its optional refresh handle, and is the
/// only writer of the bearer token in the session context
pub struct CredentialManager {
    /// Current credential
    credential: RwLock<Credential>,

    /// Refresh transport (interactive credentials only)
    refresh_handle: Option<RefreshHandle>,

    /// Re-mints an expired service-account token
    mint_handle: Option<MintHandle>,

    /// Session context the query engine reads from
    session: Arc<SessionContext>,

    /// Serializes refreshes so concurrent callers collapse into one
    refresh_lock: Mutex<()>,

    /// Number of refreshes that reached the token endpoint
    refresh_count: AtomicU64,
}

impl CredentialManager {
    /// Acquire credentials eagerly. Any failure here is fatal and not retried.
    pub async fn connect(
        provider: &dyn CredentialProvider,
        source: &CredentialSource,
        session: Arc<SessionContext>,
    ) -> Result<Self> {
        if let Some(key_file) = source.existing_key_file() {
            let (credential, minter) = provider
                .from_key_file(key_file)
                .await
                .map_err(LoadError::Credential)?;

            // Activate for the session
            session.set_credentials_path(key_file.to_path_buf()).await;
            if let Some(token) = credential.access_token() {
                session.publish_token(token.to_string()).await;
            }

            tracing::info!("Authenticated with service account key {}", key_file.display());

            return Ok(Self::with_parts(credential, None, session).with_mint_handle(minter));
        }

        if let CredentialSource::KeyFile(path) = source {
            tracing::info!(
                "No key file at {}, using interactive authentication",
                path.display()
            );
        }

        let (credential, handle) = provider
            .interactive()
            .await
            .map_err(LoadError::Credential)?;
        let manager = Self::with_parts(credential, Some(handle), session);

        // Populate the active bearer token before any query is issued
        manager.refresh().await.map_err(|e| match e {
            LoadError::Refresh(err) => LoadError::Credential(err),
            other => other,
        })?;

        tracing::info!("Authenticated with interactive credentials");

        Ok(manager)
    }

    fn with_parts(
        credential: Credential,
        refresh_handle: Option<RefreshHandle>,
        session: Arc<SessionContext>,
    ) -> Self {
        Self {
            credential: RwLock::new(credential),
            refresh_handle,
            mint_handle: None,
            session,
            refresh_lock: Mutex::new(()),
            refresh_count: AtomicU64::new(0),
        }
    }

    fn with_mint_handle(mut self, mint_handle: MintHandle) -> Self {
        self.mint_handle = Some(mint_handle);
        self
    }

    /// Whether a refresh handle is present
    pub fn can_refresh(&self) -> bool {
        self.refresh_handle.is_some()
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Snapshot of the current credential
    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }

    /// Number of refreshes performed against the refresh transport
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Re-mint the service-account token if it has expired.
    /// Interactive credentials are renewed through `refresh` on UNAUTHENTICATED instead.
    pub async fn ensure_fresh(&self) -> Result<()> {
        let Some(minter) = self.mint_handle.as_ref() else {
            return Ok(());
        };

        if !self.service_account_expired().await {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;

        // Renewed by a concurrent caller while we waited
        if !self.service_account_expired().await {
            return Ok(());
        }

        tracing::info!("Service account token expired, minting a new one");

        let token = minter.mint().await.map_err(LoadError::Refresh)?;

        self.credential.write().await.apply_token(&token);
        let generation = self.session.publish_token(token.access_token).await;

        tracing::debug!(generation, "Published renewed service account token");

        Ok(())
    }

    async fn service_account_expired(&self) -> bool {
        let credential = self.credential.read().await;
        credential.is_service_account()
            && credential
                .expires_at()
                .is_some_and(|expires_at| expires_at <= Utc::now())
    }

    /// Refresh the bearer token.
    /// Returns `Ok(false)` without side effects when no refresh handle is present.
    pub async fn refresh(&self) -> Result<bool> {
        let observed = self.session.generation().await;
        self.refresh_after(observed).await
    }

    /// Refresh unless a token newer than `observed_generation` has already been
    /// published, in which case the caller simply uses that one
    pub async fn refresh_after(&self, observed_generation: u64) -> Result<bool> {
        let Some(handle) = self.refresh_handle.as_ref() else {
            return Ok(false);
        };

        let _guard = self.refresh_lock.lock().await;

        if self.session.generation().await > observed_generation {
            tracing::debug!("Token already refreshed by a concurrent caller");
            return Ok(true);
        }

        let user = match &*self.credential.read().await {
            Credential::Interactive(user) => user.clone(),
            Credential::ServiceAccount { .. } => return Ok(false),
        };

        let token = handle.refresh(&user).await.map_err(LoadError::Refresh)?;

        self.credential.write().await.apply_token(&token);
        let generation = self.session.publish_token(token.access_token).await;
        self.refresh_count.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(generation, "Published refreshed bearer token");

        Ok(true)
    }
}
