// PKCE helpers for the interactive authorization-code flow (RFC 7636)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

const VERIFIER_LENGTH: usize = 64;

/// Unreserved URI characters allowed in a code verifier
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Random string from the verifier charset
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

/// S256 challenge: BASE64URL(SHA256(verifier))
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = random_token(VERIFIER_LENGTH);
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}
