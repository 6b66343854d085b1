// Authentication types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// OAuth2 scopes requested for Earth Engine access
pub const EARTH_ENGINE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/earthengine",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// Where credentials come from
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    /// Service-account JSON key file.
    /// Falls back to the interactive flow when the file does not exist.
    KeyFile(PathBuf),

    /// Interactive OAuth2 flow with a persisted refresh token
    Interactive,
}

impl CredentialSource {
    /// The key file to use, if it exists on disk
    pub fn existing_key_file(&self) -> Option<&Path> {
        match self {
            CredentialSource::KeyFile(path) if path.exists() => Some(path.as_path()),
            _ => None,
        }
    }
}

/// Refreshable user credentials obtained from the interactive flow
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub refresh_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Credential owned by the loader for its whole lifetime
#[derive(Debug, Clone)]
pub enum Credential {
    /// Non-interactive credential from a key file. Never refreshed on demand;
    /// its token is re-minted from the key once it expires.
    ServiceAccount {
        key_file: PathBuf,
        client_email: String,
        project_id: Option<String>,
        access_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Refreshable credential from the interactive flow
    Interactive(UserCredentials),
}

impl Credential {
    pub fn is_service_account(&self) -> bool {
        matches!(self, Credential::ServiceAccount { .. })
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            Credential::ServiceAccount { access_token, .. } => access_token.as_deref(),
            Credential::Interactive(user) => user.access_token.as_deref(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Credential::ServiceAccount { expires_at, .. } => *expires_at,
            Credential::Interactive(user) => user.expires_at,
        }
    }

    /// Store a freshly refreshed token in place
    pub fn apply_token(&mut self, token: &TokenData) {
        match self {
            Credential::ServiceAccount {
                access_token,
                expires_at,
                ..
            } => {
                *access_token = Some(token.access_token.clone());
                *expires_at = Some(token.expires_at);
            }
            Credential::Interactive(user) => {
                user.access_token = Some(token.access_token.clone());
                user.expires_at = Some(token.expires_at);
                if let Some(ref new_refresh_token) = token.refresh_token {
                    user.refresh_token = new_refresh_token.clone();
                }
            }
        }
    }
}

/// Token data from a refresh or exchange response
#[derive(Debug, Clone, PartialEq)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Capability to obtain a new bearer token for user credentials
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credentials: &UserCredentials) -> anyhow::Result<TokenData>;
}

/// Refresh capability, present only for interactive credentials
pub type RefreshHandle = Arc<dyn TokenRefresher>;

/// Capability to mint a new token from a service-account key
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(&self) -> anyhow::Result<TokenData>;
}

/// Minting capability bound to one service-account key
pub type MintHandle = Arc<dyn TokenMinter>;

/// Source of credentials for the loader
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Build a service-account credential from a key file, holding its first
    /// token, along with the minter that renews that token on expiry
    async fn from_key_file(&self, path: &Path) -> anyhow::Result<(Credential, MintHandle)>;

    /// Run the interactive flow, returning the credential and its refresh handle
    async fn interactive(&self) -> anyhow::Result<(Credential, RefreshHandle)>;
}

/// OAuth2 token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Refresh-token grant form
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub grant_type: &'a str,
    pub refresh_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<&'a str>,
}

/// Authorization-code exchange form
#[derive(Debug, Serialize)]
pub struct CodeExchangeRequest<'a> {
    pub grant_type: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<&'a str>,
}

/// Service-account JSON key file
#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Claims of the JWT-bearer assertion signed with the service-account key
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Persisted interactive credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user_credentials() -> UserCredentials {
        UserCredentials {
            refresh_token: "refresh-1".to_string(),
            client_id: Some("client".to_string()),
            client_secret: None,
            scopes: vec![],
            access_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_apply_token_rotates_refresh_token() {
        let mut credential = Credential::Interactive(user_credentials());
        let expires_at = Utc::now() + Duration::hours(1);

        credential.apply_token(&TokenData {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-2".to_string()),
            expires_at,
        });

        assert_eq!(credential.access_token(), Some("access-1"));
        assert_eq!(credential.expires_at(), Some(expires_at));
        match credential {
            Credential::Interactive(user) => assert_eq!(user.refresh_token, "refresh-2"),
            _ => panic!("expected interactive credential"),
        }
    }

    #[test]
    fn test_apply_token_keeps_refresh_token_when_absent() {
        let mut credential = Credential::Interactive(user_credentials());
        credential.apply_token(&TokenData {
            access_token: "access-1".to_string(),
            refresh_token: None,
            expires_at: Utc::now(),
        });

        match credential {
            Credential::Interactive(user) => assert_eq!(user.refresh_token, "refresh-1"),
            _ => panic!("expected interactive credential"),
        }
    }

    #[test]
    fn test_existing_key_file() {
        let source = CredentialSource::KeyFile(PathBuf::from("/definitely/not/here.json"));
        assert!(source.existing_key_file().is_none());
        assert!(CredentialSource::Interactive.existing_key_file().is_none());

        let file = tempfile::NamedTempFile::new().unwrap();
        let source = CredentialSource::KeyFile(file.path().to_path_buf());
        assert_eq!(source.existing_key_file(), Some(file.path()));
    }

    #[test]
    fn test_stored_credentials_roundtrip_skips_empty_fields() {
        let stored = StoredCredentials {
            refresh_token: "r".to_string(),
            client_id: None,
            client_secret: None,
            scopes: None,
        };
        let json = serde_json::to_string(&stored).unwrap();
        assert_eq!(json, r#"{"refresh_token":"r"}"#);
    }
}
