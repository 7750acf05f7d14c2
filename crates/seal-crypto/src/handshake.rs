//! Mutual-authentication handshake.
//!
//! Two round trips establish a shared secret without any PKI:
//!
//! ```text
//! client                                server
//!   | -- Init { pubkeys, nonce1, sig1 } -->|
//!   |<-- { pubkeys, nonce2, sig2, id } --- |
//!   | -- Finalize { enc(payload), sig3 } ->|
//!   |<-- { sig4 } ------------------------ |
//! ```
//!
//! The client proves key possession with `signature1`, the server binds its
//! keys to both nonces and the assigned client id with `signature2`, and the
//! finalize payload `ks ‖ nonce3 ‖ nonce2` is confirmed by both sides with
//! `signature3`/`signature4`. The secret travels under RSA-OAEP to the
//! server's ephemeral RSA key.
//!
//! The machine is strictly linear. Any verification failure parks it in
//! `Failed` permanently; retrying means building a new [`HandshakeClient`]
//! with fresh keys and nonces.

use crate::keys::{ChannelSigner, EphemeralIdentity, KeyError, ServerIdentity};
use crate::sigcodec;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Handshake nonces are 8 bytes on the wire.
pub const NONCE_LEN: usize = 8;
/// The shared secret carried in the finalize payload.
pub const SECRET_LEN: usize = 32;

/// Handshake failures.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(#[from] KeyError),

    /// The server failed to prove possession of the keys it presented.
    /// Covers every init-response defect: bad signature, unparseable keys,
    /// broken encodings. The handshake never proceeds past it.
    #[error("server signature verification failed")]
    ServerSignatureInvalid,

    /// The server's confirmation over the finalize payload did not verify.
    #[error("finalize confirmation signature invalid")]
    FinalizeSignatureInvalid,

    #[error("secret encryption failed: {0}")]
    Encryption(String),

    #[error("operation not valid in state {0}")]
    InvalidState(&'static str),
}

/// First client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub ecdsa_pub_client: String,
    pub rsa_pub_client: String,
    pub nonce1: String,
    pub signature1: String,
}

/// Server reply to init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub rsa_pub_server: String,
    pub ecdsa_pub_server: String,
    pub nonce2: String,
    pub signature2: String,
    pub client_id: String,
}

/// Second client message. `encrypted` is the RSA-OAEP ciphertext of
/// `ks ‖ nonce3 ‖ nonce2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub encrypted: String,
    pub signature3: String,
}

/// Server confirmation of the finalize payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub signature4: String,
}

/// Result of a completed handshake, handed to the channel layer.
pub struct HandshakeOutcome {
    pub client_id: String,
    pub shared_secret: Zeroizing<[u8; SECRET_LEN]>,
    pub signer: ChannelSigner,
}

enum State {
    KeysGenerated,
    InitSent {
        nonce1: [u8; NONCE_LEN],
    },
    InitVerified {
        server: ServerIdentity,
        nonce2: [u8; NONCE_LEN],
        client_id: String,
    },
    FinalizeSent {
        server: ServerIdentity,
        ks: Zeroizing<[u8; SECRET_LEN]>,
        nonce2: [u8; NONCE_LEN],
        nonce3: [u8; NONCE_LEN],
        client_id: String,
    },
    Failed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::KeysGenerated => "KeysGenerated",
            State::InitSent { .. } => "InitSent",
            State::InitVerified { .. } => "InitVerified",
            State::FinalizeSent { .. } => "FinalizeSent",
            State::Failed => "Failed",
        }
    }
}

/// Client side of the handshake state machine.
///
/// Owns one [`EphemeralIdentity`] for its whole life; the transport layer
/// drives it by exchanging the four wire messages in order.
pub struct HandshakeClient {
    identity: EphemeralIdentity,
    state: State,
}

impl HandshakeClient {
    /// Generate fresh keys and start in `KeysGenerated`.
    pub fn new() -> Result<Self, HandshakeError> {
        Ok(Self::with_identity(EphemeralIdentity::generate()?))
    }

    pub(crate) fn with_identity(identity: EphemeralIdentity) -> Self {
        Self {
            identity,
            state: State::KeysGenerated,
        }
    }

    /// The id the server assigned, once the init response has verified.
    pub fn client_id(&self) -> Option<&str> {
        match &self.state {
            State::InitVerified { client_id, .. } | State::FinalizeSent { client_id, .. } => {
                Some(client_id)
            }
            _ => None,
        }
    }

    /// Build the init request. Valid only once, from `KeysGenerated`.
    pub fn init_request(&mut self) -> Result<InitRequest, HandshakeError> {
        if !matches!(self.state, State::KeysGenerated) {
            return Err(HandshakeError::InvalidState(self.state.name()));
        }

        let mut nonce1 = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce1);

        let mut signed = Vec::new();
        signed.extend_from_slice(self.identity.rsa_public_der());
        signed.extend_from_slice(self.identity.ecdsa_public_der());
        signed.extend_from_slice(&nonce1);
        let (r, s) = self.identity.sign(&signed);

        let request = InitRequest {
            ecdsa_pub_client: BASE64.encode(self.identity.ecdsa_public_der()),
            rsa_pub_client: BASE64.encode(self.identity.rsa_public_der()),
            nonce1: BASE64.encode(nonce1),
            signature1: BASE64.encode(sigcodec::raw_to_der(&r, &s)),
        };

        self.state = State::InitSent { nonce1 };
        Ok(request)
    }

    /// Verify the server's init response.
    ///
    /// On any defect the machine moves to `Failed` and stays there.
    pub fn verify_init(&mut self, response: &InitResponse) -> Result<(), HandshakeError> {
        let nonce1 = match &self.state {
            State::InitSent { nonce1 } => *nonce1,
            other => return Err(HandshakeError::InvalidState(other.name())),
        };

        match Self::check_init(&nonce1, response) {
            Ok((server, nonce2)) => {
                self.state = State::InitVerified {
                    server,
                    nonce2,
                    client_id: response.client_id.clone(),
                };
                Ok(())
            }
            Err(()) => {
                self.state = State::Failed;
                Err(HandshakeError::ServerSignatureInvalid)
            }
        }
    }

    // Decode and verify, collapsing every failure into one unit error so
    // the caller cannot distinguish a forged signature from a broken field.
    fn check_init(
        nonce1: &[u8; NONCE_LEN],
        response: &InitResponse,
    ) -> Result<(ServerIdentity, [u8; NONCE_LEN]), ()> {
        let rsa_der = BASE64.decode(&response.rsa_pub_server).map_err(drop)?;
        let ecdsa_der = BASE64.decode(&response.ecdsa_pub_server).map_err(drop)?;
        let nonce2: [u8; NONCE_LEN] = BASE64
            .decode(&response.nonce2)
            .map_err(drop)?
            .try_into()
            .map_err(drop)?;
        let sig_der = BASE64.decode(&response.signature2).map_err(drop)?;

        let server = ServerIdentity::from_der(&rsa_der, &ecdsa_der).map_err(drop)?;
        let (r, s) = sigcodec::der_to_raw(&sig_der).map_err(drop)?;

        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(&rsa_der);
        verify_data.extend_from_slice(&ecdsa_der);
        verify_data.extend_from_slice(&nonce2);
        verify_data.extend_from_slice(nonce1);
        verify_data.extend_from_slice(response.client_id.as_bytes());

        if server.verify(&verify_data, &r, &s) {
            Ok((server, nonce2))
        } else {
            Err(())
        }
    }

    /// Generate the shared secret and build the finalize request.
    pub fn finalize_request(&mut self) -> Result<FinalizeRequest, HandshakeError> {
        let (server, nonce2, client_id) =
            match std::mem::replace(&mut self.state, State::Failed) {
                State::InitVerified {
                    server,
                    nonce2,
                    client_id,
                } => (server, nonce2, client_id),
                other => {
                    let name = other.name();
                    self.state = other;
                    return Err(HandshakeError::InvalidState(name));
                }
            };

        let mut ks = Zeroizing::new([0u8; SECRET_LEN]);
        OsRng.fill_bytes(ks.as_mut());
        let mut nonce3 = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce3);

        let payload = finalize_payload(&ks, &nonce3, &nonce2);
        let (r, s) = self.identity.sign(&payload);
        let encrypted = server
            .encrypt_secret(&payload)
            .map_err(|e| HandshakeError::Encryption(e.to_string()))?;

        let request = FinalizeRequest {
            encrypted: BASE64.encode(encrypted),
            signature3: BASE64.encode(sigcodec::raw_to_der(&r, &s)),
        };

        self.state = State::FinalizeSent {
            server,
            ks,
            nonce2,
            nonce3,
            client_id,
        };
        Ok(request)
    }

    /// Verify the server's confirmation and hand over the channel secrets.
    ///
    /// Consumes the machine either way; a failed confirmation means a full
    /// restart with fresh keys.
    pub fn establish(mut self, response: &FinalizeResponse) -> Result<HandshakeOutcome, HandshakeError> {
        let (server, ks, nonce2, nonce3, client_id) =
            match std::mem::replace(&mut self.state, State::Failed) {
                State::FinalizeSent {
                    server,
                    ks,
                    nonce2,
                    nonce3,
                    client_id,
                } => (server, ks, nonce2, nonce3, client_id),
                other => return Err(HandshakeError::InvalidState(other.name())),
            };

        let payload = finalize_payload(&ks, &nonce3, &nonce2);
        let verified = BASE64
            .decode(&response.signature4)
            .ok()
            .and_then(|der| sigcodec::der_to_raw(&der).ok())
            .map(|(r, s)| server.verify(&payload, &r, &s))
            .unwrap_or(false);

        if !verified {
            return Err(HandshakeError::FinalizeSignatureInvalid);
        }

        Ok(HandshakeOutcome {
            client_id,
            shared_secret: ks,
            signer: self.identity.into_channel_signer(),
        })
    }
}

fn finalize_payload(
    ks: &[u8; SECRET_LEN],
    nonce3: &[u8; NONCE_LEN],
    nonce2: &[u8; NONCE_LEN],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(SECRET_LEN + 2 * NONCE_LEN);
    payload.extend_from_slice(ks);
    payload.extend_from_slice(nonce3);
    payload.extend_from_slice(nonce2);
    payload
}
