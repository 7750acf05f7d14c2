//! Client configuration, error type and wire response shapes.

use crate::keystore::KeyStoreError;
use seal_crypto::{EnvelopeError, HandshakeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Client-side errors. Protocol failures pass through from the crypto
/// layer; transport problems are flattened into the first three variants.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned status {0}")]
    TransportStatus(u16),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// No usable session keys: no handshake yet, or the TTL expired.
    #[error("no session keys available")]
    NoSessionKeys,

    #[error("invalid server response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// Connection settings for [`crate::CofferClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, no trailing slash.
    pub base_url: String,
    /// Bearer token attached to every authenticated request.
    pub access_token: Option<String>,
    /// Timeout for handshake and session calls.
    pub request_timeout: Duration,
    /// Timeout for file transfers.
    pub upload_timeout: Duration,
    /// How long cached session keys stay usable.
    pub key_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(600),
            key_ttl: Duration::from_secs(8 * 60 * 60),
        }
    }
}

/// Body of a session test message.
#[derive(Debug, Serialize)]
pub(crate) struct SessionMessageRequest {
    pub encrypted_message: String,
    pub client_signature: String,
}

/// Server reply to a session test: the plaintext it recovered.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionMessageResponse {
    pub plaintext: String,
}

/// Stored-file metadata returned by the upload endpoint. `url` is a
/// presigned download link for the encrypted blob.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub created_at: String,
    pub obj_id: String,
    pub url: String,
    pub mime_type: String,
}
