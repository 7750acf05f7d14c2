//! Common helper functions for Coffer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as stamped into session envelopes.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encode a filename for the `X-Orig-Filename` header.
///
/// Filenames are arbitrary UTF-8 and HTTP header values are not, so the
/// name travels base64-encoded.
pub fn encode_filename(name: &str) -> String {
    BASE64.encode(name.as_bytes())
}

/// Decode a filename from its header form.
pub fn decode_filename(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}
