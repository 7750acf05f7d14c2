//! HTTP client for the Coffer encrypted file store.
//!
//! This crate drives the SEAL protocol over HTTP:
//! - two-round mutual-auth handshake against the server
//! - signed, encrypted session test messages
//! - encrypted file upload and presigned-URL download
//! - session key caching with TTL and password-wrapped persistence
//!
//! All key material lives in [`KeyStore`]; the HTTP layer itself is
//! stateless and safe to clone across tasks.

#![forbid(unsafe_code)]

pub mod client;
pub mod keystore;
pub mod session;
pub mod types;

pub use client::CofferClient;
pub use keystore::{EnvelopeRecord, KeyStore, KeyStoreError};
pub use session::Session;
pub use types::{ClientConfig, ClientError, FileRecord};
