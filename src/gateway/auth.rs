//! Submission authentication.
//!
//! A request passes when its `Origin` starts with one of the allowed
//! origins, or when it carries `Authorization: Bearer <key>` with the
//! configured key. Only the SHA-256 digest of the key is kept in memory.

use super::ApiError;
use axum::http::{header, HeaderMap};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Holds the submission key and the origins trusted without one.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
    allowed_origins: Vec<String>,
}

impl ApiKey {
    pub fn new(key: &str, allowed_origins: Vec<String>) -> Self {
        Self {
            digest: digest(key),
            allowed_origins,
        }
    }

    /// A fresh random key: 64 hex characters.
    pub fn generate() -> String {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Check a request's headers.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if self.origin_allowed(headers) {
            return Ok(());
        }

        let token = extract_bearer(headers).ok_or_else(|| {
            ApiError::Unauthorized("Missing or invalid Authorization header".into())
        })?;

        if !constant_time_eq(&digest(token), &self.digest) {
            return Err(ApiError::Unauthorized("Invalid API key".into()));
        }

        Ok(())
    }

    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        let Some(origin) = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };

        self.allowed_origins
            .iter()
            .any(|allowed| origin.starts_with(allowed.as_str()))
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("digest", &"<redacted>")
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (left, right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}
