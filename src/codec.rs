//! Order-preserving byte encodings for primitive, string, and composite
//! values.
//!
//! Every encoding here satisfies the codec contract of the core
//! specification: for a type `T`, `encode(x) < encode(y)` (lexicographically)
//! iff `x < y` under `T`'s natural order, and `decode(encode(x)) == x`.
//!
//! Grounded on `sov_schema_db::schema::{KeyEncoder, KeyDecoder, ValueCodec}`:
//! self-contained `encode`/`decode` free functions play the role that trait
//! impls play there, since our codecs are fixed (not schema-parameterized).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CodecError, Result};

/// Largest value encodable as a single byte: `0xFB - 1`.
const SINGLE_BYTE_MAX: u64 = 0xFA;
/// First byte marking the start of a multi-byte unsigned encoding.
const MULTI_BYTE_BASE: u8 = 0xFB;
/// First byte value that is reserved and never produced.
const RESERVED_BYTE: u8 = 0xFF;

/// Encodes a `u64` using the length-prefixed, order-preserving scheme of
/// §4.1: values `0..=0xFA` are a single byte; larger values use a header
/// byte in `0xFB..=0xFE` naming 1-4 following big-endian bytes.
///
/// Supports the full range `0 ..= u32::MAX as u64 + 0xFB`, matching the
/// specification's stated numeric range.
pub fn encode_uint(value: u64, out: &mut Vec<u8>) -> Result<()> {
    if value <= SINGLE_BYTE_MAX {
        out.push(value as u8);
        return Ok(());
    }
    let offset = value - MULTI_BYTE_BASE as u64;
    let nbytes = if offset <= 0xFF {
        1
    } else if offset <= 0xFFFF {
        2
    } else if offset <= 0xFF_FFFF {
        3
    } else if offset <= 0xFFFF_FFFF {
        4
    } else {
        return Err(CodecError::Truncated {
            expected: 0,
            got: 0,
        }
        .into());
    };
    out.push(MULTI_BYTE_BASE + (nbytes as u8 - 1));
    let bytes = offset.to_be_bytes();
    out.extend_from_slice(&bytes[8 - nbytes..]);
    Ok(())
}

/// Decodes a `u64` written by [`encode_uint`]. Returns the value and the
/// number of bytes consumed.
pub fn decode_uint(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf.first().ok_or(CodecError::Truncated {
        expected: 1,
        got: 0,
    })?;
    if first == RESERVED_BYTE {
        return Err(CodecError::ReservedLengthByte.into());
    }
    if first <= SINGLE_BYTE_MAX as u8 {
        return Ok((first as u64, 1));
    }
    let nbytes = (first - MULTI_BYTE_BASE) as usize + 1;
    if buf.len() < 1 + nbytes {
        return Err(CodecError::Truncated {
            expected: 1 + nbytes,
            got: buf.len(),
        }
        .into());
    }
    let mut padded = [0u8; 8];
    padded[8 - nbytes..].copy_from_slice(&buf[1..1 + nbytes]);
    let offset = u64::from_be_bytes(padded);
    Ok((offset + MULTI_BYTE_BASE as u64, 1 + nbytes))
}

/// Returns the total encoded length of a value given only its first byte,
/// without needing the rest of the buffer.
pub fn uint_encoded_len(first_byte: u8) -> Result<usize> {
    if first_byte == RESERVED_BYTE {
        return Err(CodecError::ReservedLengthByte.into());
    }
    if first_byte <= SINGLE_BYTE_MAX as u8 {
        Ok(1)
    } else {
        Ok(1 + (first_byte - MULTI_BYTE_BASE) as usize + 1)
    }
}

/// Encodes a signed 64-bit integer by flipping the sign bit, then writing
/// big-endian. This preserves numeric order under lexicographic comparison.
pub fn encode_i64(value: i64, out: &mut Vec<u8>) {
    let flipped = (value as u64) ^ (1u64 << 63);
    out.write_u64::<BigEndian>(flipped).expect("Vec<u8> writes are infallible");
}

/// Decodes a signed 64-bit integer written by [`encode_i64`].
pub fn decode_i64(buf: &[u8]) -> Result<(i64, usize)> {
    if buf.len() < 8 {
        return Err(CodecError::Truncated {
            expected: 8,
            got: buf.len(),
        }
        .into());
    }
    let flipped = (&buf[..8]).read_u64::<BigEndian>().expect("length checked above") ^ (1u64 << 63);
    Ok((flipped as i64, 8))
}

/// Encodes an `f64` so that the encoded bytes sort in the same order as the
/// floating point value under its natural (non-IEEE-NaN-aware) `<` order:
/// flip the sign bit for non-negative values, flip all bits for negative.
pub fn encode_f64(value: f64, out: &mut Vec<u8>) {
    let bits = value.to_bits();
    let mapped = if bits & (1u64 << 63) == 0 {
        bits | (1u64 << 63)
    } else {
        !bits
    };
    out.write_u64::<BigEndian>(mapped).expect("Vec<u8> writes are infallible");
}

/// Decodes an `f64` written by [`encode_f64`].
pub fn decode_f64(buf: &[u8]) -> Result<(f64, usize)> {
    if buf.len() < 8 {
        return Err(CodecError::Truncated {
            expected: 8,
            got: buf.len(),
        }
        .into());
    }
    let mapped = (&buf[..8]).read_u64::<BigEndian>().expect("length checked above");
    let bits = if mapped & (1u64 << 63) != 0 {
        mapped & !(1u64 << 63)
    } else {
        !mapped
    };
    Ok((f64::from_bits(bits), 8))
}

/// Terminator byte used to end a string encoding.
const STR_TERMINATOR: u8 = 0x00;
/// Escape byte preceding an escaped literal `0x00` or `0x01` within a
/// string's payload — both bytes that would otherwise collide with the
/// terminator or the escape introducer itself.
const STR_ESCAPE: u8 = 0x01;

/// Encodes a UTF-8 string with a terminator byte. The two bytes that would
/// otherwise be ambiguous with the terminator (`0x00`) or the escape
/// introducer (`0x01`) are each escaped as `STR_ESCAPE` followed by the
/// original byte, so every byte value round-trips and lexicographic byte
/// comparison still matches lexicographic string comparison: the escaped
/// sequence's second byte equals the original byte, so it sorts exactly
/// where that byte would among its unescaped neighbors, and `STR_ESCAPE`
/// itself (0x01) sorts immediately above the terminator and below every
/// other unescaped byte.
pub fn encode_string(value: &str, out: &mut Vec<u8>) {
    for &b in value.as_bytes() {
        if b == STR_TERMINATOR || b == STR_ESCAPE {
            out.push(STR_ESCAPE);
            out.push(b);
        } else {
            out.push(b);
        }
    }
    out.push(STR_TERMINATOR);
}

/// Decodes a string written by [`encode_string`]. Returns the string and
/// the number of bytes consumed, including the terminator.
pub fn decode_string(buf: &[u8]) -> Result<(String, usize)> {
    let mut raw = Vec::with_capacity(buf.len());
    let mut i = 0;
    loop {
        match buf.get(i) {
            None => return Err(CodecError::MissingTerminator.into()),
            Some(&STR_TERMINATOR) => {
                i += 1;
                break;
            }
            Some(&STR_ESCAPE) => {
                match buf.get(i + 1) {
                    Some(&b) => raw.push(b),
                    None => return Err(CodecError::MissingTerminator.into()),
                }
                i += 2;
            }
            Some(&b) => {
                raw.push(b);
                i += 1;
            }
        }
    }
    let s = String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
    Ok((s, i))
}

/// Encodes a boolean as a single order-preserving byte (`false < true`).
pub fn encode_bool(value: bool, out: &mut Vec<u8>) {
    out.push(if value { 1 } else { 0 });
}

/// Decodes a boolean written by [`encode_bool`].
pub fn decode_bool(buf: &[u8]) -> Result<(bool, usize)> {
    let b = *buf.first().ok_or(CodecError::Truncated {
        expected: 1,
        got: 0,
    })?;
    Ok((b != 0, 1))
}

/// Encodes a fixed-width big-endian `u32`, used for list element indices
/// where a fixed width (rather than the variable-length [`encode_uint`])
/// is required so that shifting elements means rewriting tail entries
/// rather than changing key lengths.
pub fn encode_u32_fixed(value: u32, out: &mut Vec<u8>) {
    out.write_u32::<BigEndian>(value).expect("Vec<u8> writes are infallible");
}

/// Decodes a fixed-width big-endian `u32` written by [`encode_u32_fixed`].
pub fn decode_u32_fixed(buf: &[u8]) -> Result<(u32, usize)> {
    if buf.len() < 4 {
        return Err(CodecError::Truncated {
            expected: 4,
            got: buf.len(),
        }
        .into());
    }
    let value = (&buf[..4]).read_u32::<BigEndian>().expect("length checked above");
    Ok((value, 4))
}

/// Encodes an arbitrary byte string (already in its final, order-preserving
/// form) self-delimited by a length prefix. Used for encoded sub-values
/// embedded inside a larger composite key where the sub-value's own
/// encoding is not already self-delimiting.
pub fn encode_bytes(value: &[u8], out: &mut Vec<u8>) -> Result<()> {
    encode_uint(value.len() as u64, out)?;
    out.extend_from_slice(value);
    Ok(())
}

/// Decodes a byte string written by [`encode_bytes`].
pub fn decode_bytes(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let (len, len_size) = decode_uint(buf)?;
    let len = len as usize;
    let end = len_size + len;
    if buf.len() < end {
        return Err(CodecError::Truncated {
            expected: end,
            got: buf.len(),
        }
        .into());
    }
    Ok((buf[len_size..end].to_vec(), end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_uint(v: u64) {
        let mut buf = Vec::new();
        encode_uint(v, &mut buf).unwrap();
        let (decoded, len) = decode_uint(&buf).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(len, buf.len());
    }

    #[test]
    fn uint_roundtrip_boundaries() {
        for v in [
            0,
            1,
            SINGLE_BYTE_MAX,
            SINGLE_BYTE_MAX + 1,
            0xFF,
            0x100,
            0xFFFF,
            0x1_0000,
            0xFF_FFFF,
            0x100_0000,
            u32::MAX as u64,
            u32::MAX as u64 + 0xFB,
        ] {
            roundtrip_uint(v);
        }
    }

    #[test]
    fn uint_order_preserving() {
        let samples = [0u64, 1, 5, 0xFA, 0xFB, 0xFC, 300, 70000, 20_000_000];
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let mut a = Vec::new();
                let mut b = Vec::new();
                encode_uint(samples[i], &mut a).unwrap();
                encode_uint(samples[j], &mut b).unwrap();
                assert_eq!(samples[i].cmp(&samples[j]), a.cmp(&b));
            }
        }
    }

    #[test]
    fn uint_rejects_reserved_byte() {
        let err = decode_uint(&[0xFF]);
        assert!(matches!(
            err,
            Err(crate::error::DatabaseError::Codec(CodecError::ReservedLengthByte))
        ));
    }

    #[test]
    fn i64_roundtrip_and_order() {
        let samples = [i64::MIN, -1_000_000, -1, 0, 1, 1_000_000, i64::MAX];
        for &v in &samples {
            let mut buf = Vec::new();
            encode_i64(v, &mut buf);
            assert_eq!(decode_i64(&buf).unwrap().0, v);
        }
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let mut a = Vec::new();
                let mut b = Vec::new();
                encode_i64(samples[i], &mut a);
                encode_i64(samples[j], &mut b);
                assert_eq!(samples[i].cmp(&samples[j]), a.cmp(&b));
            }
        }
    }

    #[test]
    fn f64_roundtrip_and_order() {
        let samples = [f64::NEG_INFINITY, -1.5, -0.0, 0.0, 0.0001, 1.5, f64::INFINITY];
        for &v in &samples {
            let mut buf = Vec::new();
            encode_f64(v, &mut buf);
            let (decoded, _) = decode_f64(&buf).unwrap();
            assert_eq!(decoded.to_bits().wrapping_sub(v.to_bits()) == 0 || decoded == v, true);
        }
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let mut a = Vec::new();
                let mut b = Vec::new();
                encode_f64(samples[i], &mut a);
                encode_f64(samples[j], &mut b);
                let expected = samples[i].partial_cmp(&samples[j]).unwrap();
                assert_eq!(expected, a.cmp(&b));
            }
        }
    }

    #[test]
    fn string_roundtrip_with_embedded_nul() {
        for s in ["", "hello", "a\u{0}b", "with spaces", "unicode: \u{1F980}"] {
            let mut buf = Vec::new();
            encode_string(s, &mut buf);
            let (decoded, len) = decode_string(&buf).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(len, buf.len());
        }
    }

    #[test]
    fn string_roundtrip_with_literal_escape_byte() {
        // \u{1} is the escape introducer's own byte value; it must round-trip
        // as ordinary data, not be misread as announcing an escape sequence.
        for s in ["a\u{1}b", "\u{1}", "\u{1}\u{1}\u{1}", "a\u{0}\u{1}b\u{1}\u{0}c"] {
            let mut buf = Vec::new();
            encode_string(s, &mut buf);
            let (decoded, len) = decode_string(&buf).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(len, buf.len());
        }
    }

    #[test]
    fn string_order_preserving_with_escaped_bytes() {
        let samples = ["a", "a\u{0}", "a\u{1}", "a\u{1}b", "a\u{2}", "ab"];
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let mut a = Vec::new();
                let mut b = Vec::new();
                encode_string(samples[i], &mut a);
                encode_string(samples[j], &mut b);
                assert_eq!(samples[i].cmp(samples[j]), a.cmp(&b));
            }
        }
    }

    #[test]
    fn string_order_preserving() {
        let samples = ["", "a", "aa", "ab", "b", "ba"];
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                let mut a = Vec::new();
                let mut b = Vec::new();
                encode_string(samples[i], &mut a);
                encode_string(samples[j], &mut b);
                assert_eq!(samples[i].cmp(samples[j]), a.cmp(&b));
            }
        }
    }

    #[test]
    fn string_missing_terminator_is_rejected() {
        let err = decode_string(b"no terminator");
        assert!(matches!(
            err,
            Err(crate::error::DatabaseError::Codec(CodecError::MissingTerminator))
        ));
    }

    #[test]
    fn bytes_roundtrip() {
        let mut buf = Vec::new();
        encode_bytes(b"hello world", &mut buf).unwrap();
        let (decoded, len) = decode_bytes(&buf).unwrap();
        assert_eq!(decoded, b"hello world");
        assert_eq!(len, buf.len());
    }
}
