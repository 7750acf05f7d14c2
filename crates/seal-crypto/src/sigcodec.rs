//! ECDSA signature transport codec.
//!
//! Signing and verification operate on raw fixed-width `R‖S` signatures
//! (32 bytes each for P-256), but the wire carries ASN.1 DER
//! `SEQUENCE { INTEGER r, INTEGER s }`. This module converts between the
//! two representations in both directions.
//!
//! DER integers are variable-length: a value whose first byte has the high
//! bit set gets a leading `0x00` so it stays non-negative, and values
//! shorter than 32 bytes are legal on the wire. Parsing normalizes every
//! integer back to exactly 32 bytes.

use thiserror::Error;

/// DER parse failure. The payload names the first structural problem found.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed DER signature: {0}")]
pub struct MalformedSignature(pub &'static str);

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;
const SCALAR_LEN: usize = 32;

/// Encode a raw `R‖S` signature as DER `SEQUENCE { INTEGER r, INTEGER s }`.
///
/// Each scalar is emitted at its full 32-byte width, with a leading zero
/// byte when the high bit is set. The sequence length always fits the
/// short form (at most 70 content bytes).
pub fn raw_to_der(r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
    let r_int = encode_integer(r);
    let s_int = encode_integer(s);

    let mut der = Vec::with_capacity(2 + r_int.len() + s_int.len());
    der.push(TAG_SEQUENCE);
    der.push((r_int.len() + s_int.len()) as u8);
    der.extend_from_slice(&r_int);
    der.extend_from_slice(&s_int);
    der
}

/// Decode a DER signature back to raw `(r, s)` scalars.
///
/// Accepts both short-form and multi-byte long-form lengths. Integers
/// longer than 32 bytes must carry only zero padding beyond the scalar;
/// shorter integers are left-padded with zeros.
pub fn der_to_raw(der: &[u8]) -> Result<([u8; 32], [u8; 32]), MalformedSignature> {
    let mut pos = 0usize;

    if next_byte(der, &mut pos)? != TAG_SEQUENCE {
        return Err(MalformedSignature("expected SEQUENCE tag"));
    }
    let seq_len = read_length(der, &mut pos)?;
    if der.len() - pos != seq_len {
        return Err(MalformedSignature("SEQUENCE length mismatch"));
    }

    let r = read_integer(der, &mut pos)?;
    let s = read_integer(der, &mut pos)?;

    if pos != der.len() {
        return Err(MalformedSignature("trailing bytes after S"));
    }
    Ok((r, s))
}

fn encode_integer(scalar: &[u8; SCALAR_LEN]) -> Vec<u8> {
    let pad = scalar[0] & 0x80 != 0;
    let mut int = Vec::with_capacity(2 + SCALAR_LEN + pad as usize);
    int.push(TAG_INTEGER);
    int.push((SCALAR_LEN + pad as usize) as u8);
    if pad {
        int.push(0x00);
    }
    int.extend_from_slice(scalar);
    int
}

fn next_byte(der: &[u8], pos: &mut usize) -> Result<u8, MalformedSignature> {
    let b = *der
        .get(*pos)
        .ok_or(MalformedSignature("unexpected end of input"))?;
    *pos += 1;
    Ok(b)
}

fn read_length(der: &[u8], pos: &mut usize) -> Result<usize, MalformedSignature> {
    let first = next_byte(der, pos)?;
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }

    let num_bytes = (first & 0x7f) as usize;
    if num_bytes == 0 || num_bytes > 4 {
        return Err(MalformedSignature("unsupported long-form length"));
    }
    let mut len = 0usize;
    for _ in 0..num_bytes {
        len = (len << 8) | next_byte(der, pos)? as usize;
    }
    Ok(len)
}

fn read_integer(der: &[u8], pos: &mut usize) -> Result<[u8; 32], MalformedSignature> {
    if next_byte(der, pos)? != TAG_INTEGER {
        return Err(MalformedSignature("expected INTEGER tag"));
    }
    let len = read_length(der, pos)?;
    if len == 0 {
        return Err(MalformedSignature("empty INTEGER"));
    }
    if der.len() - *pos < len {
        return Err(MalformedSignature("truncated INTEGER"));
    }
    let bytes = &der[*pos..*pos + len];
    *pos += len;

    let mut out = [0u8; SCALAR_LEN];
    if len > SCALAR_LEN {
        // Only zero padding may precede the scalar.
        let (pad, scalar) = bytes.split_at(len - SCALAR_LEN);
        if pad.iter().any(|&b| b != 0) {
            return Err(MalformedSignature("INTEGER exceeds scalar width"));
        }
        out.copy_from_slice(scalar);
    } else {
        out[SCALAR_LEN - len..].copy_from_slice(bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn test_roundtrip_plain() {
        let r = [0x12u8; 32];
        let s = [0x34u8; 32];
        let der = raw_to_der(&r, &s);
        assert_eq!(der_to_raw(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_roundtrip_high_bit() {
        // High bit set forces a leading zero byte in the DER integer.
        let mut r = [0u8; 32];
        r[0] = 0x80;
        let s = [0xffu8; 32];

        let der = raw_to_der(&r, &s);
        // SEQUENCE(2) + two INTEGERs of 33 content bytes each.
        assert_eq!(der.len(), 2 + 35 + 35);
        assert_eq!(der[2], 0x02);
        assert_eq!(der[3], 33);
        assert_eq!(der[4], 0x00);
        assert_eq!(der_to_raw(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_roundtrip_leading_zeros() {
        let mut r = [0u8; 32];
        r[31] = 0x01;
        let mut s = [0u8; 32];
        s[30] = 0x02;
        let der = raw_to_der(&r, &s);
        assert_eq!(der_to_raw(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_long_form_length_accepted() {
        let r = [0x42u8; 32];
        let s = [0x24u8; 32];
        let short = raw_to_der(&r, &s);

        // Rewrite the sequence length as a two-byte long form.
        let mut long = vec![TAG_SEQUENCE, 0x81, short[1]];
        long.extend_from_slice(&short[2..]);
        assert_eq!(der_to_raw(&long).unwrap(), (r, s));
    }

    #[test]
    fn test_parses_minimal_der_from_p256() {
        // p256 emits minimal DER (leading zeros stripped); our parser must
        // re-normalize those integers to 32 bytes.
        let key = SigningKey::random(&mut OsRng);
        for i in 0u8..8 {
            let sig: Signature = key.sign(&[i; 16]);
            let raw: [u8; 64] = sig.to_bytes().into();
            let (r, s) = der_to_raw(sig.to_der().as_bytes()).unwrap();
            assert_eq!(&r[..], &raw[..32]);
            assert_eq!(&s[..], &raw[32..]);
        }
    }

    #[test]
    fn test_rejects_bad_structure() {
        let r = [1u8; 32];
        let s = [2u8; 32];
        let good = raw_to_der(&r, &s);

        // Wrong outer tag.
        let mut bad = good.clone();
        bad[0] = 0x31;
        assert!(der_to_raw(&bad).is_err());

        // Wrong integer tag.
        let mut bad = good.clone();
        bad[2] = 0x03;
        assert!(der_to_raw(&bad).is_err());

        // Truncated input.
        assert!(der_to_raw(&good[..good.len() - 1]).is_err());

        // Trailing garbage.
        let mut bad = good.clone();
        bad[1] -= 1;
        assert!(der_to_raw(&bad).is_err());

        assert!(der_to_raw(&[]).is_err());
    }

    #[test]
    fn test_rejects_oversized_integer() {
        // 34-byte INTEGER with a nonzero lead byte cannot fit a P-256 scalar.
        let mut der = vec![TAG_SEQUENCE, 0u8];
        der.push(TAG_INTEGER);
        der.push(34);
        der.push(0x01);
        der.extend_from_slice(&[0u8; 33]);
        der.push(TAG_INTEGER);
        der.push(1);
        der.push(0x05);
        der[1] = (der.len() - 2) as u8;
        assert_eq!(
            der_to_raw(&der),
            Err(MalformedSignature("INTEGER exceeds scalar width"))
        );
    }
}
