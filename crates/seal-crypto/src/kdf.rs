//! Session key derivation.
//!
//! The handshake produces one 32-byte shared secret `ks`. Two independent
//! keys are expanded from it with a single-step HMAC label expansion:
//!
//! ```text
//! k_mac = HMAC-SHA-256(key = ks, data = "mac")
//! k_enc = HMAC-SHA-256(key = ks, data = "enc")
//! ```
//!
//! This is deliberately not a full HKDF extract+expand; the secret is
//! already uniform (fresh CSPRNG output), so one keyed-hash invocation per
//! label matches the wire peers. Derivation is pure and can be repeated at
//! will from a cached `ks`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length of both derived keys, in bytes.
pub const KEY_LEN: usize = 32;

/// The derived key pair protecting one session.
///
/// `k_enc` is consumed as an AES-256 key, `k_mac` as an HMAC-SHA-256 key.
/// Both are zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub k_mac: [u8; KEY_LEN],
    pub k_enc: [u8; KEY_LEN],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of logs.
        write!(f, "SessionKeys(..)")
    }
}

/// Expand the shared secret into the MAC and encryption keys.
pub fn derive_keys(ks: &[u8; 32]) -> SessionKeys {
    SessionKeys {
        k_mac: expand_label(ks, b"mac"),
        k_enc: expand_label(ks, b"enc"),
    }
}

fn expand_label(ks: &[u8; 32], label: &[u8]) -> [u8; KEY_LEN] {
    let mut mac = HmacSha256::new_from_slice(ks).expect("hmac accepts keys of any length");
    mac.update(label);
    mac.finalize().into_bytes().into()
}
