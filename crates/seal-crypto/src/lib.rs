//! Cryptographic core of the SEAL protocol.
//!
//! This crate provides:
//! - Ephemeral RSA-3072 + ECDSA P-256 handshake identities
//! - The two-round mutual-authentication handshake state machine
//! - HMAC-based session key derivation from the shared secret
//! - Encrypt-then-MAC envelopes for session messages and file blobs
//! - A DER ↔ raw codec for ECDSA signatures on the wire
//!
//! # Design
//!
//! There is no PKI: both sides generate fresh keypairs per handshake and
//! prove possession with nonce-bound signatures. A successful handshake
//! yields one 32-byte secret; everything after it is symmetric
//! (AES-256-CBC + HMAC-SHA-256, verified before decryption).
//!
//! The crate is transport-agnostic. Wire messages are plain serde structs;
//! carrying them over HTTP is the client crate's job.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod sigcodec;

pub use envelope::{EnvelopeError, OpenedMessage};
pub use handshake::{HandshakeClient, HandshakeError, HandshakeOutcome};
pub use kdf::{derive_keys, SessionKeys};
pub use keys::{ChannelSigner, EphemeralIdentity, ServerIdentity};
pub use sigcodec::MalformedSignature;
