// Authentication module
// Credential acquisition, token refresh and the session context

mod credentials;
mod manager;
mod pkce;
mod provider;
mod refresh;
mod session;
mod types;

pub use manager::CredentialManager;
pub use provider::{
    extract_authorization_code, AuthorizationPrompt, GoogleCredentialProvider, OAuthSettings,
    PastedAuthorization, TerminalPrompt,
};
pub use refresh::{OAuthRefresher, ServiceAccountMinter};
pub use session::{SessionContext, SessionSnapshot, BEARER_ENV, CREDENTIALS_ENV};
pub use types::{
    Credential, CredentialProvider, CredentialSource, MintHandle, RefreshHandle, TokenData,
    TokenMinter, TokenRefresher, UserCredentials, EARTH_ENGINE_SCOPES,
};
