//! Google credential provider
//!
//! Supplies the two credential entry points the loader consumes:
//! - service-account key files, exchanged for a token with a signed JWT assertion
//! - interactive user credentials, taken from the persisted credentials file or,
//!   when none exist yet, from a PKCE authorization-code flow where the user
//!   pastes the verification code back into the terminal

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use super::credentials;
use super::pkce::{random_token, PkcePair};
use super::refresh::{self, OAuthRefresher, ServiceAccountMinter};
use super::types::{
    CodeExchangeRequest, Credential, CredentialProvider, MintHandle, RefreshHandle,
    StoredCredentials, TokenMinter, UserCredentials,
};

/// OAuth2 settings for both credential flows
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub token_url: String,
    pub auth_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub credentials_file: PathBuf,
}

/// Asks the user to authorize and returns what they paste back
pub trait AuthorizationPrompt: Send + Sync {
    fn ask_code(&self, auth_url: &str) -> Result<String>;
}

/// Terminal prompt
pub struct TerminalPrompt;

impl AuthorizationPrompt for TerminalPrompt {
    fn ask_code(&self, auth_url: &str) -> Result<String> {
        println!();
        println!("To authorize access to Earth Engine, open this URL in a browser:");
        println!();
        println!("  {}", auth_url);
        println!();
        println!("Sign in, grant access, then paste the authorization code");
        println!("(or the full URL you were redirected to) below.");
        println!();

        dialoguer::Input::<String>::new()
            .with_prompt("Authorization code")
            .interact_text()
            .context("Failed to read authorization code")
    }
}

/// What the user pasted back after authorizing
#[derive(Debug, Clone, PartialEq)]
pub enum PastedAuthorization {
    /// Bare authorization code
    Code(String),

    /// Full redirect URL
    Redirect { code: String, state: Option<String> },
}

impl PastedAuthorization {
    /// The authorization code, once a pasted redirect's `state` matches the one we sent
    pub fn verified_code(self, expected_state: &str) -> Result<String> {
        match self {
            PastedAuthorization::Code(code) => Ok(code),
            PastedAuthorization::Redirect { code, state } => match state.as_deref() {
                Some(s) if s == expected_state => Ok(code),
                Some(s) => anyhow::bail!(
                    "OAuth state mismatch: expected {}, got {}",
                    expected_state,
                    s
                ),
                None => anyhow::bail!("Redirect URL is missing the state parameter"),
            },
        }
    }
}

/// Parse what the user pasted: a redirect URL carrying `code` and `state`, or the bare code
pub fn extract_authorization_code(input: &str) -> Option<PastedAuthorization> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(input) {
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        return code.map(|code| PastedAuthorization::Redirect { code, state });
    }

    Some(PastedAuthorization::Code(input.to_string()))
}

/// Credential provider backed by Google's OAuth2 endpoints
pub struct GoogleCredentialProvider {
    client: Client,
    settings: OAuthSettings,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl GoogleCredentialProvider {
    pub fn new(client: Client, settings: OAuthSettings) -> Self {
        Self {
            client,
            settings,
            prompt: Arc::new(TerminalPrompt),
        }
    }

    /// Replace the terminal prompt
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    fn build_auth_url(&self, client_id: &str, challenge: &str, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.settings.auth_url)
            .with_context(|| format!("Invalid auth URL: {}", self.settings.auth_url))?;

        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }

    /// Run the authorization-code flow and persist the resulting refresh token
    async fn authorize(&self) -> Result<UserCredentials> {
        let client_id = self
            .settings
            .client_id
            .clone()
            .context("EE_CLIENT_ID is required for interactive authentication")?;

        let pkce = PkcePair::generate();
        let state = random_token(32);
        let auth_url = self.build_auth_url(&client_id, &pkce.challenge, &state)?;

        let prompt = self.prompt.clone();
        let pasted = tokio::task::spawn_blocking(move || prompt.ask_code(&auth_url))
            .await
            .context("Authorization prompt panicked")??;

        let code = extract_authorization_code(&pasted)
            .context("No authorization code was provided")?
            .verified_code(&state)?;

        let request = CodeExchangeRequest {
            grant_type: "authorization_code",
            code: &code,
            code_verifier: &pkce.verifier,
            redirect_uri: &self.settings.redirect_uri,
            client_id: &client_id,
            client_secret: self.settings.client_secret.as_deref(),
        };
        let token =
            refresh::exchange_authorization_code(&self.client, &self.settings.token_url, &request)
                .await?;

        let refresh_token = token
            .refresh_token
            .clone()
            .context("Authorization code exchange did not return a refresh_token")?;

        let stored = StoredCredentials {
            refresh_token,
            client_id: Some(client_id),
            client_secret: self.settings.client_secret.clone(),
            scopes: Some(self.settings.scopes.clone()),
        };
        credentials::save_stored_credentials(&self.settings.credentials_file, &stored)?;
        tracing::info!(
            "Saved Earth Engine credentials to {}",
            self.settings.credentials_file.display()
        );

        let mut user = credentials::user_credentials_from_stored(stored, None, None);
        user.access_token = Some(token.access_token);
        user.expires_at = Some(token.expires_at);
        Ok(user)
    }
}

#[async_trait]
impl CredentialProvider for GoogleCredentialProvider {
    async fn from_key_file(&self, path: &Path) -> Result<(Credential, MintHandle)> {
        tracing::info!("Loading service account key from {}", path.display());
        let key = credentials::load_service_account_key(path)?;

        let minter = ServiceAccountMinter::new(
            self.client.clone(),
            self.settings.token_url.clone(),
            key,
            self.settings.scopes.clone(),
        );
        let token = minter.mint().await?;

        let credential = Credential::ServiceAccount {
            key_file: path.to_path_buf(),
            client_email: minter.client_email().to_string(),
            project_id: minter.project_id().map(str::to_string),
            access_token: Some(token.access_token),
            expires_at: Some(token.expires_at),
        };

        let handle: MintHandle = Arc::new(minter);
        Ok((credential, handle))
    }

    async fn interactive(&self) -> Result<(Credential, RefreshHandle)> {
        let user = match credentials::load_stored_credentials(&self.settings.credentials_file)? {
            Some(stored) => {
                tracing::info!(
                    "Using stored Earth Engine credentials from {}",
                    self.settings.credentials_file.display()
                );
                credentials::user_credentials_from_stored(
                    stored,
                    self.settings.client_id.as_deref(),
                    self.settings.client_secret.as_deref(),
                )
            }
            None => {
                tracing::info!("No stored Earth Engine credentials, starting authorization flow");
                self.authorize().await?
            }
        };

        let handle: RefreshHandle = Arc::new(
            OAuthRefresher::new(self.client.clone(), self.settings.token_url.clone())
                .with_credentials_file(self.settings.credentials_file.clone()),
        );

        Ok((Credential::Interactive(user), handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::EARTH_ENGINE_SCOPES;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with a fixed string; `{state}` is replaced by the state in the auth URL
    struct FixedPrompt {
        answer: String,
        calls: AtomicUsize,
    }

    impl FixedPrompt {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AuthorizationPrompt for FixedPrompt {
        fn ask_code(&self, auth_url: &str) -> Result<String> {
            assert!(auth_url.contains("code_challenge_method=S256"));
            self.calls.fetch_add(1, Ordering::SeqCst);

            let state = Url::parse(auth_url)?
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            Ok(self.answer.replace("{state}", &state))
        }
    }

    fn settings(server_url: &str, credentials_file: PathBuf) -> OAuthSettings {
        OAuthSettings {
            token_url: format!("{}/token", server_url),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            client_id: Some("client-id".to_string()),
            client_secret: None,
            redirect_uri: "http://localhost:8085".to_string(),
            scopes: EARTH_ENGINE_SCOPES.iter().map(|s| s.to_string()).collect(),
            credentials_file,
        }
    }

    #[test]
    fn test_extract_authorization_code() {
        assert_eq!(
            extract_authorization_code("  4/0Abc  "),
            Some(PastedAuthorization::Code("4/0Abc".to_string()))
        );
        assert_eq!(
            extract_authorization_code("http://localhost:8085/?state=x&code=4%2F0Abc&scope=s"),
            Some(PastedAuthorization::Redirect {
                code: "4/0Abc".to_string(),
                state: Some("x".to_string()),
            })
        );
        assert_eq!(extract_authorization_code("http://localhost:8085/?state=x"), None);
        assert_eq!(extract_authorization_code("   "), None);
    }

    #[test]
    fn test_verified_code() {
        let bare = PastedAuthorization::Code("4/0Abc".to_string());
        assert_eq!(bare.verified_code("expected").unwrap(), "4/0Abc");

        let matching = PastedAuthorization::Redirect {
            code: "4/0Abc".to_string(),
            state: Some("expected".to_string()),
        };
        assert_eq!(matching.verified_code("expected").unwrap(), "4/0Abc");

        let forged = PastedAuthorization::Redirect {
            code: "4/forged".to_string(),
            state: Some("other".to_string()),
        };
        let err = forged.verified_code("expected").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));

        let missing = PastedAuthorization::Redirect {
            code: "4/0Abc".to_string(),
            state: None,
        };
        assert!(missing.verified_code("expected").is_err());
    }

    #[test]
    fn test_build_auth_url() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GoogleCredentialProvider::new(
            Client::new(),
            settings("http://unused", dir.path().join("credentials")),
        );

        let url = provider
            .build_auth_url("client-id", "challenge", "state-1")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client-id");
        assert_eq!(pairs["code_challenge"], "challenge");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["access_type"], "offline");
        assert!(pairs["scope"].contains("auth/earthengine"));
    }

    #[tokio::test]
    async fn test_interactive_uses_stored_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, r#"{"refresh_token":"1//stored"}"#).unwrap();

        let prompt = FixedPrompt::new("unused");
        let provider = GoogleCredentialProvider::new(Client::new(), settings("http://unused", path))
            .with_prompt(prompt.clone());

        let (credential, _handle) = provider.interactive().await.unwrap();

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
        match credential {
            Credential::Interactive(user) => {
                assert_eq!(user.refresh_token, "1//stored");
                assert_eq!(user.client_id.as_deref(), Some("client-id"));
            }
            _ => panic!("expected interactive credential"),
        }
    }

    #[tokio::test]
    async fn test_interactive_runs_authorization_flow_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".into(), "4/pasted".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.first","refresh_token":"1//new","expires_in":3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("earthengine/credentials");
        let prompt = FixedPrompt::new("http://localhost:8085/?state={state}&code=4/pasted");
        let provider = GoogleCredentialProvider::new(Client::new(), settings(&server.url(), path.clone()))
            .with_prompt(prompt.clone());

        let (credential, _handle) = provider.interactive().await.unwrap();

        mock.assert_async().await;
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(credential.access_token(), Some("ya29.first"));

        let stored = credentials::load_stored_credentials(&path).unwrap().unwrap();
        assert_eq!(stored.refresh_token, "1//new");
        assert_eq!(stored.client_id.as_deref(), Some("client-id"));
    }

    #[tokio::test]
    async fn test_authorization_requires_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings("http://unused", dir.path().join("credentials"));
        settings.client_id = None;

        let provider = GoogleCredentialProvider::new(Client::new(), settings);
        let err = match provider.interactive().await {
            Err(e) => e,
            Ok(_) => panic!("expected missing client id to fail"),
        };
        assert!(err.to_string().contains("EE_CLIENT_ID"));
    }

    #[tokio::test]
    async fn test_authorization_rejects_forged_state() {
        let mut server = mockito::Server::new_async().await;
        let exchange = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        let prompt = FixedPrompt::new("http://localhost:8085/?state=attacker-state&code=4/forged");
        let provider = GoogleCredentialProvider::new(Client::new(), settings(&server.url(), path.clone()))
            .with_prompt(prompt.clone());

        let err = match provider.interactive().await {
            Err(e) => e,
            Ok(_) => panic!("expected forged state to be rejected"),
        };

        assert!(err.to_string().contains("state mismatch"));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        exchange.assert_async().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_authorization_accepts_bare_code() {
        let mut server = mockito::Server::new_async().await;
        let exchange = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".into(), "4/bare".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.bare","refresh_token":"1//bare","expires_in":3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let provider = GoogleCredentialProvider::new(
            Client::new(),
            settings(&server.url(), dir.path().join("credentials")),
        )
        .with_prompt(FixedPrompt::new("4/bare"));

        let (credential, _handle) = provider.interactive().await.unwrap();

        exchange.assert_async().await;
        assert_eq!(credential.access_token(), Some("ya29.bare"));
    }

    #[tokio::test]
    async fn test_from_key_file_rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, r#"{"type":"authorized_user","client_email":"a","private_key":"b"}"#)
            .unwrap();

        let provider = GoogleCredentialProvider::new(
            Client::new(),
            settings("http://unused", dir.path().join("credentials")),
        );
        assert!(provider.from_key_file(&path).await.is_err());
    }
}
