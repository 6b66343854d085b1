// Credential loading from key files and the persisted credentials store

use anyhow::{Context, Result};
use std::path::Path;

use super::types::{ServiceAccountKey, StoredCredentials, UserCredentials, EARTH_ENGINE_SCOPES};

/// Load and validate a service-account JSON key file
pub fn load_service_account_key(path: &Path) -> Result<ServiceAccountKey> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service account key: {}", path.display()))?;

    let key: ServiceAccountKey = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse service account key: {}", path.display()))?;

    if let Some(ref key_type) = key.key_type {
        if key_type != "service_account" {
            anyhow::bail!(
                "Key file {} has type '{}', expected 'service_account'",
                path.display(),
                key_type
            );
        }
    }

    if key.client_email.is_empty() {
        anyhow::bail!("Service account key must contain client_email");
    }

    if !key.private_key.contains("PRIVATE KEY") {
        anyhow::bail!("Service account key does not contain a PEM private key");
    }

    Ok(key)
}

/// Load persisted interactive credentials, if any
pub fn load_stored_credentials(path: &Path) -> Result<Option<StoredCredentials>> {
    if !path.exists() {
        tracing::debug!("No stored credentials at {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stored credentials: {}", path.display()))?;

    let stored: StoredCredentials = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse stored credentials: {}", path.display()))?;

    if stored.refresh_token.is_empty() {
        anyhow::bail!("Stored credentials must contain refresh_token");
    }

    Ok(Some(stored))
}

/// Persist interactive credentials, creating parent directories as needed
pub fn save_stored_credentials(path: &Path, stored: &StoredCredentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(stored).context("Failed to serialize credentials")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write stored credentials: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions: {}", path.display()))?;
    }

    Ok(())
}

/// Build user credentials from the persisted form.
/// Client id and secret fall back to the configured ones when not stored.
pub fn user_credentials_from_stored(
    stored: StoredCredentials,
    default_client_id: Option<&str>,
    default_client_secret: Option<&str>,
) -> UserCredentials {
    UserCredentials {
        refresh_token: stored.refresh_token,
        client_id: stored
            .client_id
            .or_else(|| default_client_id.map(str::to_string)),
        client_secret: stored
            .client_secret
            .or_else(|| default_client_secret.map(str::to_string)),
        scopes: stored
            .scopes
            .unwrap_or_else(|| EARTH_ENGINE_SCOPES.iter().map(|s| s.to_string()).collect()),
        access_token: None,
        expires_at: None,
    }
}
