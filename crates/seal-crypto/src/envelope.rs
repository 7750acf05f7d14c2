//! Authenticated encryption envelopes.
//!
//! Both channel formats are encrypt-then-MAC: AES-256-CBC with PKCS#7
//! padding under `k_enc`, then HMAC-SHA-256 under `k_mac` over `iv ‖ ct`.
//!
//! Session messages frame the payload before encryption:
//!
//! ```text
//! plaintext frame:  timestamp_ms(8, BE) ‖ nonce(16) ‖ payload
//! wire:             iv(16) ‖ ct ‖ tag(32)
//! ```
//!
//! File blobs carry the nonce outside the ciphertext instead:
//!
//! ```text
//! wire:             nonce(16) ‖ iv(16) ‖ ct ‖ tag(32)
//! ```
//!
//! The leading file nonce is a reserved transport field; it is not covered
//! by the tag. Opening always verifies the tag in constant time before any
//! block is decrypted, and a mismatch aborts the whole operation.

use crate::kdf::SessionKeys;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block and IV size.
pub const IV_LEN: usize = 16;
/// Random nonce carried in both envelope formats.
pub const NONCE_LEN: usize = 16;
/// HMAC-SHA-256 output size.
pub const TAG_LEN: usize = 32;
/// Big-endian millisecond timestamp in the session frame.
pub const TIMESTAMP_LEN: usize = 8;

/// Smallest well-formed file envelope: nonce, iv, one block, tag.
pub const FILE_ENVELOPE_MIN_LEN: usize = NONCE_LEN + IV_LEN + 16 + TAG_LEN;

/// Envelope sealing and opening errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Tag mismatch. Raised before decryption; nothing about the plaintext
    /// is learned.
    #[error("envelope authentication failed")]
    AuthenticationFailed,

    #[error("invalid PKCS#7 padding")]
    InvalidPadding,

    #[error("envelope too short: {0} bytes")]
    TooShort(usize),

    #[error("ciphertext length is not a multiple of the block size")]
    MisalignedCiphertext,

    /// Decrypted session frame shorter than its fixed header.
    #[error("malformed inner message")]
    MalformedMessage,
}

/// A successfully opened session message.
#[derive(Debug, PartialEq, Eq)]
pub struct OpenedMessage {
    pub timestamp_ms: u64,
    pub nonce: [u8; NONCE_LEN],
    pub payload: Vec<u8>,
}

/// Seal a session message under the given keys.
///
/// A fresh random nonce and IV are drawn from the OS CSPRNG per call.
pub fn seal_message(keys: &SessionKeys, timestamp_ms: u64, payload: &[u8]) -> Vec<u8> {
    let mut nonce = [0u8; NONCE_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    rand::rngs::OsRng.fill_bytes(&mut iv);
    seal_message_with(keys, timestamp_ms, &nonce, &iv, payload)
}

fn seal_message_with(
    keys: &SessionKeys,
    timestamp_ms: u64,
    nonce: &[u8; NONCE_LEN],
    iv: &[u8; IV_LEN],
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(TIMESTAMP_LEN + NONCE_LEN + payload.len());
    frame.extend_from_slice(&timestamp_ms.to_be_bytes());
    frame.extend_from_slice(nonce);
    frame.extend_from_slice(payload);

    let ct = cbc_encrypt(&keys.k_enc, iv, &frame);
    let tag = compute_tag(&keys.k_mac, iv, &ct);

    let mut out = Vec::with_capacity(IV_LEN + ct.len() + TAG_LEN);
    out.extend_from_slice(iv);
    out.extend_from_slice(&ct);
    out.extend_from_slice(&tag);
    out
}

/// Open a session message: verify the tag, decrypt, strip the frame.
pub fn open_message(keys: &SessionKeys, envelope: &[u8]) -> Result<OpenedMessage, EnvelopeError> {
    if envelope.len() < IV_LEN + 16 + TAG_LEN {
        return Err(EnvelopeError::TooShort(envelope.len()));
    }
    let (iv, rest) = envelope.split_at(IV_LEN);
    let (ct, tag) = rest.split_at(rest.len() - TAG_LEN);

    verify_tag(&keys.k_mac, iv, ct, tag)?;
    let frame = cbc_decrypt(&keys.k_enc, iv, ct)?;

    if frame.len() < TIMESTAMP_LEN + NONCE_LEN {
        return Err(EnvelopeError::MalformedMessage);
    }
    let mut ts_bytes = [0u8; TIMESTAMP_LEN];
    ts_bytes.copy_from_slice(&frame[..TIMESTAMP_LEN]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&frame[TIMESTAMP_LEN..TIMESTAMP_LEN + NONCE_LEN]);

    Ok(OpenedMessage {
        timestamp_ms: u64::from_be_bytes(ts_bytes),
        nonce,
        payload: frame[TIMESTAMP_LEN + NONCE_LEN..].to_vec(),
    })
}

/// Seal a file blob under the given keys.
pub fn seal_file(keys: &SessionKeys, plaintext: &[u8]) -> Vec<u8> {
    let mut nonce = [0u8; NONCE_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    rand::rngs::OsRng.fill_bytes(&mut iv);
    seal_file_with(keys, &nonce, &iv, plaintext)
}

fn seal_file_with(
    keys: &SessionKeys,
    nonce: &[u8; NONCE_LEN],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Vec<u8> {
    let ct = cbc_encrypt(&keys.k_enc, iv, plaintext);
    let tag = compute_tag(&keys.k_mac, iv, &ct);

    let mut out = Vec::with_capacity(NONCE_LEN + IV_LEN + ct.len() + TAG_LEN);
    out.extend_from_slice(nonce);
    out.extend_from_slice(iv);
    out.extend_from_slice(&ct);
    out.extend_from_slice(&tag);
    out
}

/// Open a file blob. The leading nonce is skipped, the tag covers `iv ‖ ct`.
pub fn open_file(keys: &SessionKeys, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.len() < FILE_ENVELOPE_MIN_LEN {
        return Err(EnvelopeError::TooShort(envelope.len()));
    }
    let rest = &envelope[NONCE_LEN..];
    let (iv, rest) = rest.split_at(IV_LEN);
    let (ct, tag) = rest.split_at(rest.len() - TAG_LEN);

    verify_tag(&keys.k_mac, iv, ct, tag)?;
    cbc_decrypt(&keys.k_enc, iv, ct)
}

fn compute_tag(k_mac: &[u8; 32], iv: &[u8], ct: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(k_mac).expect("hmac accepts keys of any length");
    mac.update(iv);
    mac.update(ct);
    mac.finalize().into_bytes().into()
}

fn verify_tag(k_mac: &[u8; 32], iv: &[u8], ct: &[u8], tag: &[u8]) -> Result<(), EnvelopeError> {
    let expected = compute_tag(k_mac, iv, ct);
    if expected.ct_eq(tag).into() {
        Ok(())
    } else {
        Err(EnvelopeError::AuthenticationFailed)
    }
}

fn cbc_encrypt(key: &[u8; 32], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = pkcs7_pad(plaintext);
    let mut enc = Aes256CbcEnc::new(key.into(), GenericArray::from_slice(iv));
    for block in buf.chunks_exact_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    buf
}

fn cbc_decrypt(key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(EnvelopeError::MisalignedCiphertext);
    }
    let mut buf = ciphertext.to_vec();
    let mut dec = Aes256CbcDec::new(key.into(), GenericArray::from_slice(iv));
    for block in buf.chunks_exact_mut(16) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    pkcs7_unpad(&mut buf)?;
    Ok(buf)
}

// Always pads: a block-aligned input gains a full padding block.
fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = 16 - data.len() % 16;
    let mut buf = Vec::with_capacity(data.len() + pad);
    buf.extend_from_slice(data);
    buf.resize(data.len() + pad, pad as u8);
    buf
}

fn pkcs7_unpad(buf: &mut Vec<u8>) -> Result<(), EnvelopeError> {
    let pad = *buf.last().ok_or(EnvelopeError::InvalidPadding)? as usize;
    if pad == 0 || pad > 16 || pad > buf.len() {
        return Err(EnvelopeError::InvalidPadding);
    }
    if buf[buf.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(EnvelopeError::InvalidPadding);
    }
    buf.truncate(buf.len() - pad);
    Ok(())
}
