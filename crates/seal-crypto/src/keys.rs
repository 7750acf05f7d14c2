//! Ephemeral handshake identities.
//!
//! Every handshake attempt starts from a brand-new key set:
//!
//! - an RSA-3072 keypair (e = 65537) whose public half the peer may use for
//!   RSA-OAEP-SHA-256,
//! - an ECDSA P-256 keypair used for all handshake and channel signatures.
//!
//! Public keys travel as SubjectPublicKeyInfo DER. Nothing here is persisted;
//! a failed handshake throws the whole identity away and a retry generates a
//! fresh one.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// RSA modulus size for ephemeral identities.
pub const RSA_KEY_BITS: usize = 3072;

/// Key generation, export and asymmetric-encryption errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("public key export failed: {0}")]
    Export(String),

    #[error("invalid peer public key: {0}")]
    InvalidPublicKey(String),

    #[error("asymmetric encryption failed: {0}")]
    Encryption(String),
}

/// Fresh client-side key material for one handshake attempt.
pub struct EphemeralIdentity {
    rsa: RsaPrivateKey,
    ecdsa: SigningKey,
    rsa_pub_der: Vec<u8>,
    ecdsa_pub_der: Vec<u8>,
}

impl EphemeralIdentity {
    /// Generate a new identity using the OS CSPRNG.
    ///
    /// RSA-3072 generation is the dominant cost of a handshake; expect
    /// noticeable latency in debug builds.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with_bits(RSA_KEY_BITS)
    }

    /// Generate with a caller-chosen RSA modulus size.
    ///
    /// Kept crate-private so tests can use small moduli without the
    /// production surface ever accepting one.
    pub(crate) fn generate_with_bits(bits: usize) -> Result<Self, KeyError> {
        let rsa = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let ecdsa = SigningKey::random(&mut OsRng);

        let rsa_pub_der = rsa
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| KeyError::Export(e.to_string()))?
            .into_vec();
        let ecdsa_pub_der = ecdsa
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| KeyError::Export(e.to_string()))?
            .into_vec();

        Ok(Self {
            rsa,
            ecdsa,
            rsa_pub_der,
            ecdsa_pub_der,
        })
    }

    /// RSA public key as SPKI DER.
    pub fn rsa_public_der(&self) -> &[u8] {
        &self.rsa_pub_der
    }

    /// ECDSA public key as SPKI DER.
    pub fn ecdsa_public_der(&self) -> &[u8] {
        &self.ecdsa_pub_der
    }

    /// ECDSA-SHA-256 signature over `message`, as raw `(r, s)` scalars.
    pub fn sign(&self, message: &[u8]) -> ([u8; 32], [u8; 32]) {
        let sig: Signature = self.ecdsa.sign(message);
        let bytes: [u8; 64] = sig.to_bytes().into();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        (r, s)
    }

    /// Consume the identity, keeping only the ECDSA signing key.
    ///
    /// Called once the handshake is established; the RSA private key has no
    /// further use and is dropped here.
    pub fn into_channel_signer(self) -> ChannelSigner {
        ChannelSigner { key: self.ecdsa }
    }
}

/// The ECDSA signing key retained by an established channel.
///
/// Signs session envelopes after the handshake completes. Cloneable so a
/// session handle can be shared across tasks.
#[derive(Clone)]
pub struct ChannelSigner {
    key: SigningKey,
}

impl ChannelSigner {
    /// Sign `message` and return the signature as ASN.1 DER.
    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let sig: Signature = self.key.sign(message);
        let bytes: [u8; 64] = sig.to_bytes().into();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        crate::sigcodec::raw_to_der(&r, &s)
    }
}

/// Peer public keys parsed from the init response.
pub struct ServerIdentity {
    rsa_pub: RsaPublicKey,
    ecdsa_pub: VerifyingKey,
    rsa_pub_der: Vec<u8>,
    ecdsa_pub_der: Vec<u8>,
}

impl ServerIdentity {
    /// Parse both public keys from SPKI DER.
    pub fn from_der(rsa_der: &[u8], ecdsa_der: &[u8]) -> Result<Self, KeyError> {
        let rsa_pub = RsaPublicKey::from_public_key_der(rsa_der)
            .map_err(|e| KeyError::InvalidPublicKey(format!("rsa: {e}")))?;
        let ecdsa_pub = VerifyingKey::from_public_key_der(ecdsa_der)
            .map_err(|e| KeyError::InvalidPublicKey(format!("ecdsa: {e}")))?;

        Ok(Self {
            rsa_pub,
            ecdsa_pub,
            rsa_pub_der: rsa_der.to_vec(),
            ecdsa_pub_der: ecdsa_der.to_vec(),
        })
    }

    /// RSA public key as SPKI DER, exactly as received.
    pub fn rsa_public_der(&self) -> &[u8] {
        &self.rsa_pub_der
    }

    /// ECDSA public key as SPKI DER, exactly as received.
    pub fn ecdsa_public_der(&self) -> &[u8] {
        &self.ecdsa_pub_der
    }

    /// Verify a raw `(r, s)` ECDSA-SHA-256 signature.
    pub fn verify(&self, message: &[u8], r: &[u8; 32], s: &[u8; 32]) -> bool {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(r);
        raw[32..].copy_from_slice(s);

        let sig = match Signature::from_slice(&raw) {
            Ok(s) => s,
            Err(_) => return false,
        };
        self.ecdsa_pub.verify(message, &sig).is_ok()
    }

    /// RSA-OAEP-SHA-256 encrypt `plaintext` to the peer.
    pub fn encrypt_secret(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.rsa_pub
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| KeyError::Encryption(e.to_string()))
    }
}
